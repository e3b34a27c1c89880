//! Frontend (browser-side) connection handler
//!
//! Per connection:
//! 1. Parse the browser's request
//! 2. Route on the `Host` header
//! 3. Tunnel: encrypt, frame, send to the backend, read and decrypt its reply
//!    Direct: forward the plain request to the host itself
//! 4. Write the response bytes back and close

use super::{ConnectionHandler, ProxyError};
use crate::crypto::TunnelCipher;
use crate::protocol::HttpMessage;
use crate::transport::{connect, host_port, with_deadline, TransportConfig};
use crate::tunnel::{read_frame, write_frame};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Where a request goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Encrypted, to the paired backend
    Tunnel,
    /// Plain HTTP, to the requested host
    Direct,
}

/// Frontend handler configuration
#[derive(Debug, Clone)]
pub struct FrontendSettings {
    /// `Host` value whose requests are tunneled
    pub paired_host: String,
    /// Backend proxy address (`host:port`)
    pub tunnel_addr: String,
    /// Port for pass-through requests
    pub direct_port: u16,
    pub transport: TransportConfig,
}

/// Frontend connection handler
pub struct FrontendHandler {
    settings: FrontendSettings,
    cipher: Arc<TunnelCipher>,
}

impl FrontendHandler {
    pub fn new(settings: FrontendSettings, cipher: Arc<TunnelCipher>) -> Self {
        Self { settings, cipher }
    }

    /// Tunnel requests for the paired host, everything else goes direct
    pub fn route(&self, host: &str) -> Route {
        if host.eq_ignore_ascii_case(&self.settings.paired_host) {
            Route::Tunnel
        } else {
            Route::Direct
        }
    }

    async fn tunnel(
        &self,
        request: &HttpMessage,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ProxyError> {
        let io_timeout = self.settings.transport.io_timeout();

        let plaintext = request.to_bytes();
        trace!("Tunnel request:\n{}", String::from_utf8_lossy(&plaintext));
        let ciphertext = self.cipher.encrypt(&plaintext)?;

        let mut backend = connect(&self.settings.tunnel_addr, &self.settings.transport, cancel).await?;
        with_deadline(cancel, io_timeout, write_frame(&mut backend, &ciphertext)).await??;
        info!("Request encrypted and sent ({} bytes)", ciphertext.len());

        let frame = with_deadline(cancel, io_timeout, read_frame(&mut backend)).await??;
        let response = self.cipher.decrypt(&frame)?;
        info!("Response received and decrypted ({} bytes)", response.len());
        trace!("Tunnel response:\n{}", String::from_utf8_lossy(&response));

        Ok(Bytes::from(response))
    }

    async fn direct(
        &self,
        host: &str,
        request: &HttpMessage,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ProxyError> {
        let io_timeout = self.settings.transport.io_timeout();
        let addr = host_port(host, self.settings.direct_port);

        let mut upstream = connect(&addr, &self.settings.transport, cancel).await?;
        with_deadline(cancel, io_timeout, request.write_to(&mut upstream)).await??;
        info!("Request sent to external host {}", addr);

        let mut reader = BufReader::new(upstream);
        let response = with_deadline(cancel, io_timeout, HttpMessage::read_from(&mut reader)).await??;
        debug!("Response from {}: {}", addr, response.start_line_str());

        Ok(response.to_bytes())
    }
}

#[async_trait]
impl ConnectionHandler for FrontendHandler {
    async fn handle(
        &self,
        mut stream: TcpStream,
        _peer: SocketAddr,
        cancel: CancellationToken,
    ) -> Result<(), ProxyError> {
        let io_timeout = self.settings.transport.io_timeout();
        let (reader, mut writer) = stream.split();

        let mut reader = BufReader::new(reader);
        let request = with_deadline(&cancel, io_timeout, HttpMessage::read_from(&mut reader)).await??;
        let host = request.host().ok_or(ProxyError::MissingHost)?;
        debug!("{} (host {})", request.start_line_str(), host);

        let response = match self.route(host) {
            Route::Tunnel => self.tunnel(&request, &cancel).await?,
            Route::Direct => self.direct(host, &request, &cancel).await?,
        };

        with_deadline(&cancel, io_timeout, async {
            writer.write_all(&response).await?;
            writer.shutdown().await
        })
        .await??;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "frontend"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CipherEngine, SharedSecret};

    fn handler(paired_host: &str) -> FrontendHandler {
        let cipher = TunnelCipher::new(
            CipherEngine::default(),
            SharedSecret::from_bytes(vec![9; 256]),
        );
        FrontendHandler::new(
            FrontendSettings {
                paired_host: paired_host.to_string(),
                tunnel_addr: "127.0.0.1:4321".to_string(),
                direct_port: 80,
                transport: TransportConfig::default(),
            },
            Arc::new(cipher),
        )
    }

    #[test]
    fn test_route_paired_host() {
        let frontend = handler("backend.example");
        assert_eq!(frontend.route("backend.example"), Route::Tunnel);
        assert_eq!(frontend.route("Backend.Example"), Route::Tunnel);
    }

    #[test]
    fn test_route_other_hosts() {
        let frontend = handler("backend.example");
        assert_eq!(frontend.route("example.com"), Route::Direct);
        assert_eq!(frontend.route("backend.example.com"), Route::Direct);
        assert_eq!(frontend.route(""), Route::Direct);
    }
}
