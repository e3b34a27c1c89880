//! # Secure HTTP Proxy
//!
//! A pair of cooperating intercepting HTTP proxies. The *frontend* runs next
//! to a browser and the *backend* next to an origin server. Requests for the
//! paired backend host travel through a private encrypted tunnel; everything
//! else is forwarded as plain HTTP.
//!
//! ## Architecture
//!
//! ```text
//!  browser ──► frontend ──(hex(AES(request)))──► backend ──► origin
//!                 │      ◄─(hex(AES(response)))─    ▲
//!                 │                                 │
//!                 └── other hosts: plain HTTP       └── one-time DH handshake
//! ```
//!
//! - **crypto**: Diffie-Hellman key agreement and the stateless AES engine
//! - **protocol**: HTTP message framing (start line, headers, body)
//! - **tunnel**: hex line framing of ciphertext on the wire
//! - **transport**: sockets, deadlines and the networked handshake
//! - **proxy**: listener and per-connection handlers

pub mod config;
pub mod crypto;
pub mod protocol;
pub mod proxy;
pub mod transport;
pub mod tunnel;

pub use config::Config;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default frontend proxy port
pub const DEFAULT_FRONTEND_PORT: u16 = 1234;

/// Default backend proxy (and handshake) port
pub const DEFAULT_BACKEND_PORT: u16 = 4321;

/// Port used for pass-through requests and by the origin server
pub const HTTP_PORT: u16 = 80;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cipher error: {0}")]
    Cipher(#[from] crypto::CipherError),

    #[error("Handshake error: {0}")]
    Handshake(#[from] crypto::HandshakeError),

    #[error("HTTP error: {0}")]
    Http(#[from] protocol::HttpError),

    #[error("Wire error: {0}")]
    Wire(#[from] tunnel::WireError),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error("Configuration error: {0}")]
    Config(String),
}
