//! Diffie-Hellman handshake state machine
//!
//! One message in each direction:
//! - Initiator generates a key pair in its chosen group and sends its public key
//! - Responder adopts the group embedded in that key, generates its own pair
//!   and answers with its public key
//!
//! Neither side is authenticated. The session is consumed when the secret is
//! extracted, so the private exponent does not outlive the handshake.

use super::{DhKeyPair, DhParams, DhPublicKey, HandshakeError, SharedSecret};

/// Role in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    /// Initiator (frontend)
    Initiator,
    /// Responder (backend)
    Responder,
}

/// Ephemeral DH session for one handshake
#[derive(Debug)]
pub struct DhHandshake {
    role: HandshakeRole,
    key_pair: DhKeyPair,
}

impl DhHandshake {
    /// Create an initiator with a fresh key pair in `params`
    pub fn new_initiator(params: &DhParams) -> Result<Self, HandshakeError> {
        Ok(Self {
            role: HandshakeRole::Initiator,
            key_pair: DhKeyPair::generate(params)?,
        })
    }

    /// Create a responder whose key pair uses the initiator's group
    pub fn new_responder(initiator_public: &DhPublicKey) -> Result<Self, HandshakeError> {
        initiator_public.validate()?;
        Ok(Self {
            role: HandshakeRole::Responder,
            key_pair: DhKeyPair::generate(initiator_public.params())?,
        })
    }

    /// Get the handshake role
    pub fn role(&self) -> HandshakeRole {
        self.role
    }

    /// Our public key
    pub fn public_key(&self) -> &DhPublicKey {
        self.key_pair.public()
    }

    /// Our public key as sent on the wire (DER)
    pub fn write_message(&self) -> Vec<u8> {
        self.key_pair.public().to_der()
    }

    /// Decode the peer's wire message
    pub fn read_message(message: &[u8]) -> Result<DhPublicKey, HandshakeError> {
        DhPublicKey::from_der(message)
    }

    /// Complete the agreement with the peer key and extract the shared secret
    pub fn finish(self, peer: &DhPublicKey) -> Result<SharedSecret, HandshakeError> {
        self.key_pair.agree(peer)
    }
}
