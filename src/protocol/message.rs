//! HTTP message parsing and serialization

use super::{Headers, HttpError, CONTENT_LENGTH, HOST, MAX_BODY_LEN, MAX_LINE_LEN};
use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// One HTTP request or response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpMessage {
    /// Request line or status line, without the line terminator
    pub start_line: Bytes,
    pub headers: Headers,
    pub body: Bytes,
}

/// Read one line including its `\n`, bounded by `MAX_LINE_LEN`
async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>) -> Result<usize, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let n = (&mut *reader)
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', line)
        .await?;
    if n > MAX_LINE_LEN && line.last() != Some(&b'\n') {
        return Err(HttpError::LineTooLong(MAX_LINE_LEN));
    }
    Ok(n)
}

fn strip_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

impl HttpMessage {
    pub fn new(start_line: impl Into<Bytes>) -> Self {
        Self {
            start_line: start_line.into(),
            ..Default::default()
        }
    }

    /// Parse one message from a buffered stream
    ///
    /// Header lines without a colon are skipped. The body is read only when
    /// the first `Content-Length` value is positive, and must be complete.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, HttpError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::new();

        read_line(reader, &mut line).await?;
        let start_line = strip_line_end(&line);
        if start_line.is_empty() {
            return Err(HttpError::MissingStartLine);
        }
        let start_line = Bytes::copy_from_slice(start_line);

        let mut headers = Headers::new();
        loop {
            if read_line(reader, &mut line).await? == 0 {
                break;
            }
            let content = line.strip_suffix(b"\n").unwrap_or(&line);
            if content.len() <= 1 {
                break;
            }

            let text = String::from_utf8_lossy(strip_line_end(content));
            match text.split_once(':') {
                Some((name, value)) => headers.append(name.trim(), value.trim()),
                None => trace!("Skipping malformed header line: {:?}", text),
            }
        }

        let body = match content_length(&headers)? {
            Some(len) => read_body(reader, len).await?,
            None => Bytes::new(),
        };

        Ok(Self {
            start_line,
            headers,
            body,
        })
    }

    /// Start line as text, for logging
    pub fn start_line_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.start_line)
    }

    /// Target host from the first `Host` header, without any `:port` suffix
    pub fn host(&self) -> Option<&str> {
        self.headers.get(HOST).map(strip_port)
    }

    /// Declared body length, if the message has a positive `Content-Length`
    pub fn content_length(&self) -> Result<Option<usize>, HttpError> {
        content_length(&self.headers)
    }

    /// Replace the body and its `Content-Length`
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        self.headers.set(CONTENT_LENGTH, self.body.len().to_string());
    }

    /// Serialize: start line, headers, blank line, raw body
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.start_line.len() + 256 + self.body.len());
        buf.put_slice(&self.start_line);
        buf.put_slice(b"\r\n");
        self.headers.write_to(&mut buf);
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Serialize onto a stream and flush
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), HttpError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn content_length(headers: &Headers) -> Result<Option<usize>, HttpError> {
    let Some(raw) = headers.get(CONTENT_LENGTH) else {
        return Ok(None);
    };
    let len: i64 = raw
        .parse()
        .map_err(|_| HttpError::InvalidContentLength(raw.to_string()))?;
    if len <= 0 {
        return Ok(None);
    }
    let len = usize::try_from(len).map_err(|_| HttpError::BodyTooLarge(usize::MAX))?;
    if len > MAX_BODY_LEN {
        return Err(HttpError::BodyTooLarge(len));
    }
    Ok(Some(len))
}

async fn read_body<R>(reader: &mut R, len: usize) -> Result<Bytes, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::with_capacity(len);
    (&mut *reader).take(len as u64).read_to_end(&mut body).await?;
    if body.len() < len {
        return Err(HttpError::TruncatedBody {
            expected: len,
            actual: body.len(),
        });
    }
    Ok(Bytes::from(body))
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // [v6addr] or [v6addr]:port
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
