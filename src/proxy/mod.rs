//! Proxy implementations
//!
//! Provides:
//! - The frontend handler: routes browser requests into the tunnel or direct
//! - The backend handler: unwraps tunnel frames and forwards to the origin
//! - The listener that accepts connections and runs one handler task each

mod backend;
mod frontend;
mod listener;

pub use backend::{BackendHandler, BackendSettings};
pub use frontend::{FrontendHandler, FrontendSettings, Route};
pub use listener::ProxyListener;

use crate::crypto::CipherError;
use crate::protocol::HttpError;
use crate::transport::TransportError;
use crate::tunnel::WireError;
use async_trait::async_trait;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Connection-level errors
///
/// Any of these ends the connection without a response.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Tunnel framing error: {0}")]
    Wire(#[from] WireError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Request has no Host header")]
    MissingHost,
}

impl ProxyError {
    /// True if the connection ended because of shutdown
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProxyError::Transport(TransportError::Cancelled))
    }
}

/// Per-connection unit of work: one request/response cycle on one socket
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Drive the connection to completion; the socket is closed on return
    async fn handle(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        cancel: CancellationToken,
    ) -> Result<(), ProxyError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}
