//! Framed request/response over a real TCP listener

use bytes::BytesMut;
use dronepost_server::{session, GroundStation};
use dronepost_shared::codec;
use dronepost_shared::{Envelope, NewCommand, Payload, Reply, Request, Response};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

struct Client {
    stream: TcpStream,
    buf: BytesMut,
    seq: u64,
}

impl Client {
    async fn call(&mut self, request: Request) -> Envelope {
        self.seq += 1;
        let frame = codec::encode(&Envelope::request("drone_01", self.seq, request)).unwrap();
        self.stream.write_all(&frame).await.unwrap();

        loop {
            if let Some(env) = codec::decode(&mut self.buf).unwrap() {
                return env;
            }
            let mut chunk = [0u8; 4096];
            let n = tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut chunk))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0, "server closed the connection");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

#[tokio::test]
async fn poll_and_report_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(session::accept_loop(
        listener,
        GroundStation::in_memory(),
        shutdown_rx,
    ));

    let mut client = Client {
        stream: TcpStream::connect(addr).await.unwrap(),
        buf: BytesMut::new(),
        seq: 0,
    };

    let reply = client
        .call(Request::Enqueue(NewCommand {
            drone_id: "drone_01".into(),
            command: "TAKEOFF".into(),
            parameters: Some(serde_json::json!({"altitude": 15})),
        }))
        .await;
    assert_eq!(reply.header.sequence_id, 1);
    let Payload::Response(Response::Ok(Reply::Command(cmd))) = reply.payload else {
        panic!("expected a command, got {:?}", reply.payload);
    };

    let reply = client
        .call(Request::PollPending {
            drone_id: "drone_01".into(),
        })
        .await;
    assert_eq!(reply.header.sequence_id, 2);
    let Payload::Response(Response::Ok(Reply::Commands(pending))) = reply.payload else {
        panic!("expected commands");
    };
    assert_eq!(pending, vec![cmd.clone()]);

    let reply = client
        .call(Request::UpdateStatus {
            id: cmd.id,
            status: "EXECUTING".into(),
            result: None,
        })
        .await;
    assert!(matches!(
        reply.payload,
        Payload::Response(Response::Ok(Reply::Command(_)))
    ));

    shutdown_tx.send(true).unwrap();
    server.await.unwrap().unwrap();
}
