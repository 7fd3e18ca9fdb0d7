//! One client connection: read request frames, answer each with a response

use crate::station::GroundStation;
use anyhow::Result;
use dronepost_shared::codec::{self, CodecError, FrameDecoder};
use dronepost_shared::{Envelope, ErrorKind, Payload, Response};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Device id the ground service stamps on its responses
pub const GROUND_DEVICE_ID: &str = "ground";

/// What arrived on the wire
pub enum Inbound {
    Envelope(Envelope),
    /// A complete frame whose body did not decode; the stream is still usable
    Malformed(CodecError),
}

/// Active client session over any byte stream
pub struct DeviceSession<S> {
    stream: S,
    addr: SocketAddr,
    device_id: Option<String>,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl<S> DeviceSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            device_id: None,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 4096],
        }
    }

    /// Device id from the first envelope header, if one has arrived
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Read the next frame
    ///
    /// Returns `Ok(None)` when the peer closes the connection and `Err` when
    /// the framing itself is broken.
    pub async fn recv(&mut self) -> Result<Option<Inbound>> {
        loop {
            // First try to decode from existing buffer
            match self.decoder.decode_next() {
                Ok(Some(envelope)) => {
                    if self.device_id.is_none() {
                        self.device_id = Some(envelope.header.device_id.clone());
                        debug!(addr = %self.addr, device_id = %envelope.header.device_id, "device identified");
                    }
                    return Ok(Some(Inbound::Envelope(envelope)));
                }
                Ok(None) => {}
                Err(e) if e.is_recoverable() => return Ok(Some(Inbound::Malformed(e))),
                Err(e) => return Err(e.into()),
            }

            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.decoder.extend(&self.read_buf[..n]);
        }
    }

    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let frame = codec::encode(envelope)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Answer requests until the peer disconnects or shutdown is signalled
    pub async fn serve(mut self, station: GroundStation, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(addr = %self.addr, "session started");

        loop {
            let inbound = tokio::select! {
                inbound = self.recv() => inbound?,
                _ = shutdown.changed() => {
                    debug!(addr = %self.addr, "session closing for shutdown");
                    break;
                }
            };

            let reply = match inbound {
                None => break,
                Some(Inbound::Envelope(envelope)) => self.respond(&station, envelope).await,
                Some(Inbound::Malformed(e)) => {
                    warn!(addr = %self.addr, error = %e, "malformed frame");
                    // The request could not be read, so there is no sequence id to echo
                    Envelope::response(
                        GROUND_DEVICE_ID,
                        0,
                        Response::error(ErrorKind::Protocol, e.to_string()),
                    )
                }
            };
            self.send(&reply).await?;
        }

        info!(
            addr = %self.addr,
            device_id = self.device_id().unwrap_or("-"),
            "session ended"
        );
        Ok(())
    }

    async fn respond(&self, station: &GroundStation, envelope: Envelope) -> Envelope {
        let seq = envelope.header.sequence_id;
        let response = match envelope.payload {
            Payload::Request(request) => {
                debug!(
                    device_id = %envelope.header.device_id,
                    seq,
                    op = request.name(),
                    "request"
                );
                station.handle(request).await
            }
            Payload::Response(_) => {
                Response::error(ErrorKind::Protocol, "the ground service only accepts requests")
            }
        };
        Envelope::response(GROUND_DEVICE_ID, seq, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use dronepost_shared::{Reply, Request};

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    async fn read_response<S: AsyncRead + Unpin>(stream: &mut S) -> Envelope {
        let mut buf = BytesMut::new();
        loop {
            if let Some(env) = codec::decode(&mut buf).unwrap() {
                return env;
            }
            let mut chunk = [0u8; 1024];
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "session closed before responding");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    #[tokio::test]
    async fn test_request_answered_with_same_sequence() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (_tx, rx) = watch::channel(false);
        let session = DeviceSession::new(server, addr());
        let task = tokio::spawn(session.serve(GroundStation::in_memory(), rx));

        let frame = codec::encode(&Envelope::request("drone_01", 7, Request::Ping)).unwrap();
        client.write_all(&frame).await.unwrap();

        let reply = read_response(&mut client).await;
        assert_eq!(reply.header.sequence_id, 7);
        assert_eq!(reply.header.device_id, GROUND_DEVICE_ID);
        assert_eq!(reply.payload, Payload::Response(Response::Ok(Reply::Pong)));

        drop(client);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_malformed_body_gets_protocol_error() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(DeviceSession::new(server, addr()).serve(GroundStation::in_memory(), rx));

        let body = b"{not json";
        client.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
        client.write_all(body).await.unwrap();

        let reply = read_response(&mut client).await;
        match reply.payload {
            Payload::Response(Response::Err(e)) => assert_eq!(e.kind, ErrorKind::Protocol),
            other => panic!("expected protocol error, got {other:?}"),
        }

        // The session is still usable
        let frame = codec::encode(&Envelope::request("drone_01", 2, Request::Ping)).unwrap();
        client.write_all(&frame).await.unwrap();
        assert_eq!(read_response(&mut client).await.header.sequence_id, 2);

        drop(client);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_session() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(DeviceSession::new(server, addr()).serve(GroundStation::in_memory(), rx));

        client.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_ends_session() {
        let (_client, server) = tokio::io::duplex(1024);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(DeviceSession::new(server, addr()).serve(GroundStation::in_memory(), rx));

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
