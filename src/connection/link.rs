//! Request/response link with reconnection and backoff

use super::GroundApi;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use dronepost_shared::codec::{self, FrameDecoder};
use dronepost_shared::{Envelope, Payload, Request, Response};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Configuration for the ground link
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub device_id: String,
    pub server: String,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

struct Call {
    request: Request,
    reply: oneshot::Sender<Result<Response>>,
}

/// Handle to the connection task; cheap to clone
///
/// The task owns the socket and serialises calls, so every caller sees
/// exactly the response to its own request.
#[derive(Clone)]
pub struct GroundLink {
    calls: mpsc::Sender<Call>,
}

impl GroundLink {
    /// Start the connection task
    pub fn connect(config: LinkConfig) -> Self {
        let (calls, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            link_loop(config, rx).await;
        });
        Self { calls }
    }
}

#[async_trait]
impl GroundApi for GroundLink {
    async fn call(&self, request: Request) -> Result<Response> {
        let (reply, rx) = oneshot::channel();
        self.calls
            .send(Call { request, reply })
            .await
            .map_err(|_| anyhow!("link closed"))?;
        rx.await.map_err(|_| anyhow!("link closed"))?
    }
}

/// Main connection loop with reconnection logic
async fn link_loop(config: LinkConfig, mut calls: mpsc::Receiver<Call>) {
    let mut reconnect_delay = config.reconnect_delay;
    let mut sequence_id = 0u64;

    loop {
        match timeout(config.connect_timeout, TcpStream::connect(&config.server)).await {
            Ok(Ok(stream)) => {
                reconnect_delay = config.reconnect_delay;
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(error = %e, "failed to set TCP_NODELAY");
                }
                info!(server = %config.server, "connected to ground service");

                match serve_calls(stream, &config, &mut sequence_id, &mut calls).await {
                    Ok(()) => {
                        debug!("all link handles dropped");
                        return;
                    }
                    Err(e) => warn!(error = %e, "ground link lost"),
                }
            }
            Ok(Err(e)) => warn!(server = %config.server, error = %e, "connect failed"),
            Err(_) => warn!(server = %config.server, "connect timed out"),
        }

        // Wait before reconnecting; calls made meanwhile fail immediately
        let wait = tokio::time::sleep(reconnect_delay);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                call = calls.recv() => match call {
                    Some(call) => {
                        let _ = call.reply.send(Err(anyhow!("ground service unreachable")));
                    }
                    None => return,
                },
            }
        }

        // Exponential backoff
        reconnect_delay = std::cmp::min(reconnect_delay * 2, config.max_reconnect_delay);
    }
}

/// Handle calls over an active connection until it fails
async fn serve_calls(
    mut stream: TcpStream,
    config: &LinkConfig,
    sequence_id: &mut u64,
    calls: &mut mpsc::Receiver<Call>,
) -> Result<()> {
    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];

    while let Some(call) = calls.recv().await {
        *sequence_id += 1;
        let seq = *sequence_id;
        let envelope = Envelope::request(&config.device_id, seq, call.request);

        let exchanged = timeout(
            config.request_timeout,
            exchange(&mut stream, &mut decoder, &mut read_buf, &envelope),
        )
        .await
        .unwrap_or_else(|_| Err(anyhow!("request {seq} timed out")));

        match exchanged {
            Ok(response) => {
                let _ = call.reply.send(Ok(response));
            }
            Err(e) => {
                // The stream may hold a half-read frame; start over on a new one
                let _ = call.reply.send(Err(anyhow!("{e:#}")));
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Write one request and read until its response arrives
async fn exchange(
    stream: &mut TcpStream,
    decoder: &mut FrameDecoder,
    read_buf: &mut [u8],
    envelope: &Envelope,
) -> Result<Response> {
    let seq = envelope.header.sequence_id;
    stream.write_all(&codec::encode(envelope)?).await?;

    loop {
        while let Some(incoming) = decoder.decode_next()? {
            // Sequence 0 answers a frame the ground could not read
            if incoming.header.sequence_id != seq && incoming.header.sequence_id != 0 {
                debug!(
                    expected = seq,
                    got = incoming.header.sequence_id,
                    "dropping stale response"
                );
                continue;
            }
            match incoming.payload {
                Payload::Response(response) => return Ok(response),
                Payload::Request(_) => bail!("unexpected request from ground service"),
            }
        }

        let n = stream.read(read_buf).await?;
        if n == 0 {
            bail!("ground service closed connection");
        }
        decoder.extend(&read_buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dronepost_server::{session, GroundStation};
    use dronepost_shared::Reply;
    use tokio::net::TcpListener;
    use tokio::sync::watch;

    fn config(server: String) -> LinkConfig {
        LinkConfig {
            device_id: "drone_01".into(),
            server,
            reconnect_delay: Duration::from_millis(50),
            max_reconnect_delay: Duration::from_millis(200),
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        tokio::spawn(session::accept_loop(listener, GroundStation::in_memory(), rx));

        let link = GroundLink::connect(config(addr.to_string()));
        for _ in 0..3 {
            assert_eq!(link.call(Request::Ping).await.unwrap(), Response::Ok(Reply::Pong));
        }
        let _ = tx.send(true);
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast() {
        // Bind then drop to get a port nothing listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let link = GroundLink::connect(config(addr.to_string()));
        let result = timeout(Duration::from_secs(3), link.call(Request::Ping)).await;
        assert!(matches!(result, Ok(Err(_))));
    }
}
