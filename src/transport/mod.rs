//! Transport layer
//!
//! Plain TCP with:
//! - address-reusing listeners
//! - connect and I/O deadlines raced against a cancellation token
//! - the networked Diffie-Hellman handshake

mod key_exchange;
mod tcp;

pub use key_exchange::KeyExchange;
pub use tcp::{bind, bind_reuse, connect, host_port, with_deadline};

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection to {0} failed: {1}")]
    ConnectionFailed(String, io::Error),

    #[error("No address found for {0}")]
    Unresolved(String),

    #[error("Timeout")]
    Timeout,

    #[error("Cancelled")]
    Cancelled,
}

/// Socket deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Timeout for each read or write step in seconds
    pub io_timeout: u64,
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            io_timeout: 60,
        }
    }
}
