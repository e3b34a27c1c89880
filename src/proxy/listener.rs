//! Accept loop

use super::{ConnectionHandler, ProxyError};
use crate::transport;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

type Completion = (SocketAddr, Result<(), ProxyError>);

/// Listening socket that spawns one handler task per accepted connection
pub struct ProxyListener {
    listener: TcpListener,
}

impl ProxyListener {
    /// Bind with address reuse enabled
    pub async fn bind(addr: &str) -> Result<Self, ProxyError> {
        Ok(Self {
            listener: transport::bind(addr).await?,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until `shutdown` fires, then cancel and drain in-flight handlers
    ///
    /// The loop never waits on a handler; completed tasks are reaped as they
    /// finish and their results logged.
    pub async fn run<H>(self, handler: Arc<H>, shutdown: CancellationToken) -> Result<(), ProxyError>
    where
        H: ConnectionHandler,
    {
        info!("{} proxy listening on {}", handler.name(), self.local_addr()?);

        let mut tasks: JoinSet<Completion> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                Some(joined) = tasks.join_next() => log_completion(joined),

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };

                    let handler = Arc::clone(&handler);
                    let cancel = shutdown.child_token();
                    let span = info_span!("conn", %peer, proxy = handler.name());

                    tasks.spawn(
                        async move {
                            debug!("Connection established");
                            let result = handler.handle(stream, peer, cancel).await;
                            debug!("Connection closed");
                            (peer, result)
                        }
                        .instrument(span),
                    );
                }
            }
        }

        drop(self.listener);
        if !tasks.is_empty() {
            info!("Waiting for {} connection(s) to finish", tasks.len());
        }
        while let Some(joined) = tasks.join_next().await {
            log_completion(joined);
        }
        info!("{} proxy stopped", handler.name());
        Ok(())
    }
}

fn log_completion(joined: Result<Completion, JoinError>) {
    match joined {
        Ok((_, Ok(()))) => {}
        Ok((peer, Err(e))) if e.is_cancelled() => debug!(%peer, "Connection cancelled"),
        Ok((peer, Err(e))) => warn!(%peer, "Connection failed: {}", e),
        Err(e) => error!("Connection task panicked: {}", e),
    }
}
