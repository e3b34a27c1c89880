//! Frame encoding/decoding for the tunnel protocol
//!
//! Frame format:
//! ```text
//! 4f1a...c3\n        lowercase hex, two digits per byte, one or more lines
//! \n                 blank line: end of frame
//! ```
//!
//! Receivers concatenate every non-empty line before the blank one and
//! accept `\r\n` line endings.

use super::{WireError, MAX_FRAME_HEX_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder, FramedRead};

/// Bytes appended after the hex line: line end plus the blank line
pub const FRAME_TERMINATOR: &[u8] = b"\n\n";

/// Encode ciphertext as one frame
pub fn encode_frame(payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(payload.len() * 2 + FRAME_TERMINATOR.len());
    buf.put_slice(hex::encode(payload).as_bytes());
    buf.put_slice(FRAME_TERMINATOR);
    buf
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_frame(payload)).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one frame
///
/// Bytes the peer sent after the frame are discarded; every connection
/// carries one frame per direction.
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, TunnelCodec::new());
    frames.next().await.unwrap_or(Err(WireError::Closed))
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// `tokio_util` codec for tunnel frames
#[derive(Debug, Clone)]
pub struct TunnelCodec {
    max_len: usize,
    // Start of the line being assembled
    line_start: usize,
    // Offset of the first byte not yet scanned for a line end
    next_index: usize,
    // Hex digits seen in the complete lines of the pending frame
    hex_len: usize,
}

impl TunnelCodec {
    /// Create a codec with the default size limit
    pub fn new() -> Self {
        Self::with_max_len(MAX_FRAME_HEX_LEN)
    }

    /// Create a codec that rejects frames whose text exceeds `max_len` bytes
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len,
            line_start: 0,
            next_index: 0,
            hex_len: 0,
        }
    }

    fn reset(&mut self) {
        self.line_start = 0;
        self.next_index = 0;
        self.hex_len = 0;
    }
}

impl Default for TunnelCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TunnelCodec {
    type Item = Bytes;
    type Error = WireError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, WireError> {
        while let Some(offset) = buf[self.next_index..].iter().position(|&b| b == b'\n') {
            let line_end = self.next_index + offset;
            let line_len = trim_cr(&buf[self.line_start..line_end]).len();
            self.line_start = line_end + 1;
            self.next_index = self.line_start;

            if line_len == 0 {
                let frame = buf.split_to(self.line_start);
                let mut text = Vec::with_capacity(self.hex_len);
                for line in frame[..].split(|&b| b == b'\n') {
                    text.extend_from_slice(trim_cr(line));
                }
                self.reset();
                return Ok(Some(Bytes::from(hex::decode(&text)?)));
            }

            self.hex_len += line_len;
        }

        if buf.len() > self.max_len {
            return Err(WireError::FrameTooLarge(buf.len(), self.max_len));
        }
        self.next_index = buf.len();
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, WireError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(WireError::Truncated),
        }
    }
}

impl Encoder<Bytes> for TunnelCodec {
    type Error = WireError;

    fn encode(&mut self, payload: Bytes, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.reserve(payload.len() * 2 + FRAME_TERMINATOR.len());
        buf.put_slice(hex::encode(&payload).as_bytes());
        buf.put_slice(FRAME_TERMINATOR);
        Ok(())
    }
}
