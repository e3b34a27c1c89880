//! Cryptographic primitives for the secure proxy pair
//!
//! This module provides:
//! - Finite-field Diffie-Hellman key agreement (RFC 3526 MODP groups)
//! - X.509 `SubjectPublicKeyInfo` encoding of DH public keys
//! - A stateless AES engine (ECB/CBC, PKCS#5 or no padding)
//! - Secure random number generation

mod cipher;
mod der;
mod dh;
mod handshake;
mod keys;

pub use cipher::{
    transform, Algorithm, BlockMode, CipherConfig, CipherEngine, Direction, Padding, BLOCK_SIZE,
};
pub use der::DerError;
pub use dh::{DhKeyPair, DhParams, DhPublicKey, MIN_PRIME_BITS};
pub use handshake::{DhHandshake, HandshakeRole};
pub use keys::{SharedSecret, TunnelCipher};

use thiserror::Error;

/// Errors raised by the cipher engine
///
/// Configuration errors mean the engine can never work with the given
/// transform or key; operation errors are specific to one input.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("The secret key must be set before encryption or decryption")]
    MissingKey,

    #[error("Invalid key length: {algorithm} needs {expected} bytes, got {actual}")]
    InvalidKeyLength {
        algorithm: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported transform: {0}")]
    UnsupportedTransform(String),

    #[error("Invalid initialization vector: {0}")]
    InvalidIv(String),

    #[error("Input length {0} is not a multiple of the block size")]
    InvalidInputLength(usize),

    #[error("Padding validation failed")]
    BadPadding,
}

impl CipherError {
    /// True if the error comes from the cipher configuration rather than the data
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CipherError::MissingKey
                | CipherError::InvalidKeyLength { .. }
                | CipherError::UnsupportedTransform(_)
                | CipherError::InvalidIv(_)
        )
    }
}

/// Errors raised while establishing the shared secret
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Framing error: {0}")]
    Framing(#[from] crate::tunnel::WireError),

    #[error("Malformed public key: {0}")]
    MalformedKey(#[from] DerError),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Unsupported parameters: {0}")]
    UnsupportedParameters(String),

    #[error("Random number generation failed")]
    Random,

    #[error("Handshake timed out")]
    Timeout,

    #[error("Handshake cancelled")]
    Cancelled,
}

/// Fill `buf` with cryptographically secure random bytes
pub fn random_bytes(buf: &mut [u8]) -> Result<(), HandshakeError> {
    use ring::rand::{SecureRandom, SystemRandom};
    let rng = SystemRandom::new();
    rng.fill(buf).map_err(|_| HandshakeError::Random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let mut buf1 = [0u8; 32];
        let mut buf2 = [0u8; 32];
        random_bytes(&mut buf1).unwrap();
        random_bytes(&mut buf2).unwrap();
        assert_ne!(buf1, buf2);
    }

    #[test]
    fn test_cipher_error_classes() {
        assert!(CipherError::MissingKey.is_configuration());
        assert!(CipherError::UnsupportedTransform("DES".into()).is_configuration());
        assert!(!CipherError::BadPadding.is_configuration());
        assert!(!CipherError::InvalidInputLength(3).is_configuration());
    }
}
