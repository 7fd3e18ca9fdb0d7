//! Connection to the ground service
//!
//! This module handles:
//! - A persistent TCP connection with automatic reconnection
//! - Request/response exchange matched by sequence id
//! - Failing calls fast while the ground service is unreachable

mod link;

pub use link::{GroundLink, LinkConfig};

use anyhow::Result;
use async_trait::async_trait;
use dronepost_shared::{Reply, Request, Response};

/// Anything that answers ground-service requests
#[async_trait]
pub trait GroundApi: Send + Sync {
    async fn call(&self, request: Request) -> Result<Response>;
}

/// Unwrap a successful reply, turning an error response into an error
pub fn expect_ok(response: Response) -> Result<Reply> {
    match response {
        Response::Ok(reply) => Ok(reply),
        Response::Err(e) => Err(anyhow::anyhow!("{}: {}", e.kind, e.message)),
    }
}
