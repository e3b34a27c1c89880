//! One-shot Diffie-Hellman handshake over TCP
//!
//! Each side sends its DER public key as one tunnel frame. The initiator
//! speaks first; the responder answers with a key in the initiator's group.
//! Any failure here is fatal for the process.

use super::{connect, TransportConfig, TransportError};
use crate::crypto::{DhHandshake, DhParams, HandshakeError, HandshakeRole, SharedSecret};
use crate::tunnel::{read_frame, write_frame};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

impl From<TransportError> for HandshakeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => HandshakeError::Timeout,
            TransportError::Cancelled => HandshakeError::Cancelled,
            TransportError::Io(e) | TransportError::ConnectionFailed(_, e) => HandshakeError::Io(e),
            TransportError::Unresolved(addr) => HandshakeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address found for {}", addr),
            )),
        }
    }
}

/// Networked key exchange
#[derive(Debug, Clone)]
pub struct KeyExchange {
    params: DhParams,
    timeout: Duration,
    cancel: CancellationToken,
}

impl KeyExchange {
    /// Create a key exchange that offers `params` when initiating
    pub fn new(params: DhParams) -> Self {
        Self {
            params,
            timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    /// Bound connecting and each read/write step
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort the exchange when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the handshake in `role` against `addr`
    ///
    /// The initiator connects to `addr`; the responder binds it and accepts
    /// exactly one connection.
    pub async fn perform(
        &self,
        role: HandshakeRole,
        addr: &str,
    ) -> Result<SharedSecret, HandshakeError> {
        match role {
            HandshakeRole::Initiator => self.initiate(addr).await,
            HandshakeRole::Responder => {
                let listener = super::bind(addr).await?;
                self.respond(listener).await
            }
        }
    }

    /// Connect to a responder and agree on a secret
    pub async fn initiate(&self, addr: &str) -> Result<SharedSecret, HandshakeError> {
        let handshake = DhHandshake::new_initiator(&self.params)?;
        debug!("Created DH key pair ({} bit group)", self.params.prime_bits());

        let transport = TransportConfig {
            connect_timeout: self.timeout.as_secs().max(1),
            ..Default::default()
        };
        let mut stream = connect(addr, &transport, &self.cancel).await?;
        info!("Connected to handshake peer {}", addr);

        self.send_key(&mut stream, &handshake).await?;
        let peer = self.receive_key(&mut stream).await?;

        let secret = handshake.finish(&peer)?;
        info!(
            "Shared secret established ({} bytes, fingerprint {})",
            secret.len(),
            secret.fingerprint()
        );
        Ok(secret)
    }

    /// Accept one initiator on `listener`, then close the listener
    pub async fn respond(&self, listener: TcpListener) -> Result<SharedSecret, HandshakeError> {
        if let Ok(addr) = listener.local_addr() {
            info!("Waiting for handshake on {}", addr);
        }

        let (mut stream, peer_addr) = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(HandshakeError::Cancelled),
            accepted = listener.accept() => accepted?,
        };
        drop(listener);
        info!("Handshake connection from {}", peer_addr);

        let peer = self.receive_key(&mut stream).await?;
        let handshake = DhHandshake::new_responder(&peer)?;
        debug!("Created DH key pair in the initiator's group");
        self.send_key(&mut stream, &handshake).await?;

        let secret = handshake.finish(&peer)?;
        info!(
            "Shared secret established ({} bytes, fingerprint {})",
            secret.len(),
            secret.fingerprint()
        );
        Ok(secret)
    }

    async fn send_key(
        &self,
        stream: &mut TcpStream,
        handshake: &DhHandshake,
    ) -> Result<(), HandshakeError> {
        let message = handshake.write_message();
        super::with_deadline(&self.cancel, self.timeout, write_frame(stream, &message)).await??;
        debug!("Sent public key ({} bytes)", message.len());
        Ok(())
    }

    async fn receive_key(
        &self,
        stream: &mut TcpStream,
    ) -> Result<crate::crypto::DhPublicKey, HandshakeError> {
        let message = super::with_deadline(&self.cancel, self.timeout, read_frame(stream)).await??;
        debug!("Received peer public key ({} bytes)", message.len());
        DhHandshake::read_message(&message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::bind;

    #[tokio::test]
    async fn test_exchange_over_loopback() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let responder = tokio::spawn(async move {
            KeyExchange::new(DhParams::default())
                .respond(listener)
                .await
                .unwrap()
        });

        let initiator = KeyExchange::new(DhParams::default())
            .initiate(&addr)
            .await
            .unwrap();
        let responder = responder.await.unwrap();

        assert_eq!(initiator.as_bytes(), responder.as_bytes());
        assert_eq!(initiator.len(), 256);
    }

    #[tokio::test]
    async fn test_responder_cancelled() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let res = KeyExchange::new(DhParams::default())
            .with_cancellation(cancel)
            .respond(listener)
            .await;
        assert!(matches!(res, Err(HandshakeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_initiator_without_responder() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let res = KeyExchange::new(DhParams::default()).initiate(&addr).await;
        assert!(matches!(res, Err(HandshakeError::Io(_))));
    }
}
