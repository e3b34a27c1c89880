//! Key material produced by the handshake

use super::{CipherEngine, CipherError};
use std::fmt;

/// Raw DH shared secret (kept secret, zeroed on drop)
///
/// The tunnel uses its leading bytes as the AES key.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    /// Wrap raw secret bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short SHA-256 fingerprint, safe to log, for comparing both ends
    pub fn fingerprint(&self) -> String {
        let digest = ring::digest::digest(&ring::digest::SHA256, &self.0);
        hex::encode(&digest.as_ref()[..8])
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([REDACTED; {}])", self.0.len())
    }
}

// Zeroize secret on drop
impl Drop for SharedSecret {
    fn drop(&mut self) {
        for byte in &mut self.0 {
            // SAFETY: `byte` is a valid, exclusive reference into our own buffer
            unsafe {
                std::ptr::write_volatile(byte, 0);
            }
        }
        std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
    }
}

/// The process-wide tunnel cipher: an engine plus the handshake secret
///
/// Immutable, so one `Arc<TunnelCipher>` is shared by every connection.
#[derive(Debug)]
pub struct TunnelCipher {
    engine: CipherEngine,
    secret: SharedSecret,
}

impl TunnelCipher {
    pub fn new(engine: CipherEngine, secret: SharedSecret) -> Self {
        Self { engine, secret }
    }

    pub fn engine(&self) -> &CipherEngine {
        &self.engine
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.engine.encrypt(self.secret.as_bytes(), plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.engine.decrypt(self.secret.as_bytes(), ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_debug_redacts_secret() {
        let secret = SharedSecret::from_bytes(vec![0x42; 32]);
        let shown = format!("{:?}", secret);
        assert_eq!(shown, "SharedSecret([REDACTED; 32])");
        assert!(!shown.contains("42"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = SharedSecret::from_bytes(vec![1; 256]);
        let b = SharedSecret::from_bytes(vec![1; 256]);
        let c = SharedSecret::from_bytes(vec![2; 256]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }

    #[test]
    fn test_tunnel_cipher_shared_across_threads() {
        let cipher = Arc::new(TunnelCipher::new(
            CipherEngine::default(),
            SharedSecret::from_bytes(vec![7; 256]),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cipher = Arc::clone(&cipher);
                std::thread::spawn(move || {
                    let message = format!("message number {}", i).into_bytes();
                    for _ in 0..50 {
                        let ct = cipher.encrypt(&message).unwrap();
                        assert_eq!(cipher.decrypt(&ct).unwrap(), message);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_empty_secret_is_missing_key() {
        let cipher = TunnelCipher::new(CipherEngine::default(), SharedSecret::from_bytes(vec![]));
        assert!(matches!(cipher.encrypt(b"x"), Err(CipherError::MissingKey)));
    }
}
