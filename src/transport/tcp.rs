//! TCP listeners and connections with deadlines

use super::{TransportConfig, TransportError};
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run one I/O step, bounded by `limit` and by the cancellation token
///
/// The outer result carries the deadline, the inner one the step's own error.
pub async fn with_deadline<F, T, E>(
    cancel: &CancellationToken,
    limit: Duration,
    step: F,
) -> Result<Result<T, E>, TransportError>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TransportError::Cancelled),
        res = tokio::time::timeout(limit, step) => res.map_err(|_| TransportError::Timeout),
    }
}

/// Bind a listener with `SO_REUSEADDR` set
pub fn bind_reuse(addr: SocketAddr) -> Result<TcpListener, TransportError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    Ok(TcpListener::from_std(socket.into())?)
}

/// Resolve `addr` and bind the first address it yields
pub async fn bind(addr: &str) -> Result<TcpListener, TransportError> {
    let resolved = lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| TransportError::Unresolved(addr.to_string()))?;
    bind_reuse(resolved)
}

/// Connect to `addr` within the configured connect timeout
pub async fn connect(
    addr: &str,
    config: &TransportConfig,
    cancel: &CancellationToken,
) -> Result<TcpStream, TransportError> {
    debug!("Connecting to {}", addr);
    let stream = with_deadline(cancel, config.connect_timeout(), TcpStream::connect(addr))
        .await?
        .map_err(|e| TransportError::ConnectionFailed(addr.to_string(), e))?;

    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// Format `host:port`, bracketing IPv6 literals
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bind_and_connect() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(&buf[..n]).await.unwrap();
        });

        let cancel = CancellationToken::new();
        let mut stream = connect(&addr.to_string(), &TransportConfig::default(), &cancel)
            .await
            .unwrap();
        stream.write_all(b"Hello, TCP!").await.unwrap();

        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"Hello, TCP!");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_rebind_after_close() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(bind_reuse(addr).is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cancel = CancellationToken::new();
        let err = connect(&addr.to_string(), &TransportConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(..)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_times_out() {
        let cancel = CancellationToken::new();
        let res = with_deadline(
            &cancel,
            Duration::from_secs(5),
            std::future::pending::<Result<(), std::io::Error>>(),
        )
        .await;
        assert!(matches!(res, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn test_deadline_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = with_deadline(
            &cancel,
            Duration::from_secs(5),
            async { Ok::<_, std::io::Error>(1) },
        )
        .await;
        assert!(matches!(res, Err(TransportError::Cancelled)));
    }

    #[test]
    fn test_host_port() {
        assert_eq!(host_port("example.com", 80), "example.com:80");
        assert_eq!(host_port("::1", 8080), "[::1]:8080");
    }
}
