//! HTTP message framing
//!
//! Just enough HTTP/1.x to proxy one request/response pair:
//! - a start line (request line or status line)
//! - ordered, multi-valued headers
//! - a body sized by `Content-Length`, copied as raw bytes
//!
//! Chunked encoding, keep-alive and pipelining are not supported.

mod headers;
mod message;

pub use headers::Headers;
pub use message::HttpMessage;

use thiserror::Error;

/// HTTP framing errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Stream ended before the start line")]
    MissingStartLine,

    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("Invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("Body truncated: expected {expected} bytes, got {actual}")]
    TruncatedBody { expected: usize, actual: usize },

    #[error("Body too large: {0} bytes")]
    BodyTooLarge(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Maximum length of a start line or header line (64 KB)
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Maximum declared body length (64 MB)
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// Header carrying the target host
pub const HOST: &str = "Host";

/// Header carrying the body length
pub const CONTENT_LENGTH: &str = "Content-Length";
