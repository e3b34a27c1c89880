//! Backend (origin-side) connection handler
//!
//! Reads one tunnel frame, decrypts the request inside, forwards it to the
//! origin server and sends the encrypted response back as one frame.

use super::{ConnectionHandler, ProxyError};
use crate::crypto::TunnelCipher;
use crate::protocol::HttpMessage;
use crate::transport::{connect, with_deadline, TransportConfig};
use crate::tunnel::{TunnelCodec, WireError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Backend handler configuration
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Origin server address (`host:port`)
    pub origin: String,
    pub transport: TransportConfig,
}

/// Backend connection handler
pub struct BackendHandler {
    settings: BackendSettings,
    cipher: Arc<TunnelCipher>,
}

impl BackendHandler {
    pub fn new(settings: BackendSettings, cipher: Arc<TunnelCipher>) -> Self {
        Self { settings, cipher }
    }

    /// Send a plaintext request to the origin and parse its response
    async fn forward(
        &self,
        request: &[u8],
        cancel: &CancellationToken,
    ) -> Result<HttpMessage, ProxyError> {
        let io_timeout = self.settings.transport.io_timeout();

        let mut origin = connect(&self.settings.origin, &self.settings.transport, cancel).await?;
        with_deadline(cancel, io_timeout, async {
            origin.write_all(request).await?;
            origin.flush().await
        })
        .await??;
        debug!("Request forwarded to origin {}", self.settings.origin);

        let mut reader = BufReader::new(origin);
        let response = with_deadline(cancel, io_timeout, HttpMessage::read_from(&mut reader)).await??;
        debug!("Origin response: {}", response.start_line_str());
        Ok(response)
    }
}

#[async_trait]
impl ConnectionHandler for BackendHandler {
    async fn handle(
        &self,
        stream: TcpStream,
        _peer: SocketAddr,
        cancel: CancellationToken,
    ) -> Result<(), ProxyError> {
        let io_timeout = self.settings.transport.io_timeout();
        let mut framed = Framed::new(stream, TunnelCodec::new());

        let frame = with_deadline(&cancel, io_timeout, async {
            framed.next().await.unwrap_or(Err(WireError::Closed))
        })
        .await??;
        let request = self.cipher.decrypt(&frame)?;
        info!("Tunnel request decrypted ({} bytes)", request.len());
        trace!("Tunnel request:\n{}", String::from_utf8_lossy(&request));

        let response = self.forward(&request, &cancel).await?.to_bytes();
        trace!("Tunnel response:\n{}", String::from_utf8_lossy(&response));

        let ciphertext = Bytes::from(self.cipher.encrypt(&response)?);
        let sent = ciphertext.len();
        with_deadline(&cancel, io_timeout, framed.send(ciphertext)).await??;
        info!("Response encrypted and sent ({} bytes)", sent);

        with_deadline(&cancel, io_timeout, framed.get_mut().shutdown()).await??;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "backend"
    }
}
