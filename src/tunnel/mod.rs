//! Tunnel layer - hex line framing of ciphertext
//!
//! One frame is a single line of lowercase hex followed by a blank line, so
//! a line-oriented reader finds the end of a message by looking for an empty
//! line. The same framing carries the handshake's public keys.

mod frame;

pub use frame::{encode_frame, read_frame, write_frame, TunnelCodec, FRAME_TERMINATOR};

use thiserror::Error;

/// Tunnel layer errors
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Invalid hex payload: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Stream ended before the frame terminator")]
    Truncated,

    #[error("Connection closed before a frame was received")]
    Closed,

    #[error("Frame too large: {0} > {1}")]
    FrameTooLarge(usize, usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Largest hex text accepted for one frame (a 64 MiB body plus headers, padded)
pub const MAX_FRAME_HEX_LEN: usize = 2 * (64 * 1024 * 1024 + 64 * 1024 + 16);
