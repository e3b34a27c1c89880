//! Stateless block cipher engine
//!
//! Every call builds a fresh AES instance for the requested direction, so a
//! single [`CipherEngine`] can be shared by any number of connections without
//! locking. The key is supplied per call.

use super::CipherError;
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use std::fmt;
use std::str::FromStr;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Block cipher algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// AES with a 128-bit key (`AES`)
    Aes128,
    /// AES with a 192-bit key (`AES-192`)
    Aes192,
    /// AES with a 256-bit key (`AES-256`)
    Aes256,
}

impl Algorithm {
    /// Number of key bytes taken from the key material
    pub fn key_len(self) -> usize {
        match self {
            Algorithm::Aes128 => 16,
            Algorithm::Aes192 => 24,
            Algorithm::Aes256 => 32,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Algorithm::Aes128 => "AES",
            Algorithm::Aes192 => "AES-192",
            Algorithm::Aes256 => "AES-256",
        }
    }
}

/// Block chaining mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    /// Electronic codebook: no chaining, no IV
    Ecb,
    /// Cipher block chaining: requires a 16-byte IV
    Cbc,
}

impl BlockMode {
    /// Whether the mode needs an initialization vector
    pub fn requires_iv(self) -> bool {
        matches!(self, BlockMode::Cbc)
    }

    fn name(self) -> &'static str {
        match self {
            BlockMode::Ecb => "ECB",
            BlockMode::Cbc => "CBC",
        }
    }
}

/// Block padding scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// PKCS#5/PKCS#7 padding
    Pkcs5,
    /// No padding: input must be block aligned
    None,
}

impl Padding {
    fn name(self) -> &'static str {
        match self {
            Padding::Pkcs5 => "PKCS5Padding",
            Padding::None => "NoPadding",
        }
    }
}

/// Direction of a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Immutable cipher configuration: algorithm, mode, padding and optional IV
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CipherConfig {
    algorithm: Algorithm,
    mode: BlockMode,
    padding: Padding,
    iv: Option<[u8; BLOCK_SIZE]>,
}

impl CipherConfig {
    /// Create a configuration without IV
    pub fn new(algorithm: Algorithm, mode: BlockMode, padding: Padding) -> Self {
        Self {
            algorithm,
            mode,
            padding,
            iv: None,
        }
    }

    /// Attach an initialization vector (CBC only)
    pub fn with_iv(mut self, iv: &[u8]) -> Result<Self, CipherError> {
        if !self.mode.requires_iv() {
            return Err(CipherError::InvalidIv(format!(
                "{} mode does not take an IV",
                self.mode.name()
            )));
        }
        let iv: [u8; BLOCK_SIZE] = iv.try_into().map_err(|_| {
            CipherError::InvalidIv(format!("expected {} bytes, got {}", BLOCK_SIZE, iv.len()))
        })?;
        self.iv = Some(iv);
        Ok(self)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn mode(&self) -> BlockMode {
        self.mode
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn iv(&self) -> Option<&[u8; BLOCK_SIZE]> {
        self.iv.as_ref()
    }

    /// Check that the IV matches the mode
    pub fn validate(&self) -> Result<(), CipherError> {
        match (self.mode.requires_iv(), self.iv.is_some()) {
            (true, false) => Err(CipherError::InvalidIv(format!(
                "{} mode requires an IV",
                self.mode.name()
            ))),
            (false, true) => Err(CipherError::InvalidIv(format!(
                "{} mode does not take an IV",
                self.mode.name()
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for CipherConfig {
    /// `AES/ECB/PKCS5Padding`
    fn default() -> Self {
        Self::new(Algorithm::Aes128, BlockMode::Ecb, Padding::Pkcs5)
    }
}

impl fmt::Display for CipherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.algorithm.name(),
            self.mode.name(),
            self.padding.name()
        )
    }
}

impl fmt::Debug for CipherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherConfig({}, iv: {})", self, self.iv.is_some())
    }
}

impl FromStr for CipherConfig {
    type Err = CipherError;

    /// Parse a transform name such as `AES/ECB/PKCS5Padding`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || CipherError::UnsupportedTransform(s.to_string());

        let mut parts = s.trim().split('/');
        let (algorithm, mode, padding) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(a), Some(m), Some(p), None) => (a, m, p),
            _ => return Err(unsupported()),
        };

        let algorithm = match algorithm.to_ascii_uppercase().as_str() {
            "AES" | "AES-128" | "AES128" => Algorithm::Aes128,
            "AES-192" | "AES192" => Algorithm::Aes192,
            "AES-256" | "AES256" => Algorithm::Aes256,
            _ => return Err(unsupported()),
        };

        let mode = match mode.to_ascii_uppercase().as_str() {
            "ECB" => BlockMode::Ecb,
            "CBC" => BlockMode::Cbc,
            _ => return Err(unsupported()),
        };

        let padding = match padding.to_ascii_uppercase().as_str() {
            "PKCS5PADDING" | "PKCS7PADDING" => Padding::Pkcs5,
            "NOPADDING" => Padding::None,
            _ => return Err(unsupported()),
        };

        Ok(Self::new(algorithm, mode, padding))
    }
}

/// Encrypt or decrypt `data` under `config` with the given key material
///
/// Only the first [`Algorithm::key_len`] bytes of `key` are used.
pub fn transform(
    config: &CipherConfig,
    direction: Direction,
    key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CipherError> {
    config.validate()?;

    if key.is_empty() {
        return Err(CipherError::MissingKey);
    }
    let algorithm = config.algorithm;
    let key = key
        .get(..algorithm.key_len())
        .ok_or(CipherError::InvalidKeyLength {
            algorithm: algorithm.name(),
            expected: algorithm.key_len(),
            actual: key.len(),
        })?;

    // Unpadded input must already be block aligned, and ciphertext always is
    let must_align = direction == Direction::Decrypt || config.padding == Padding::None;
    if must_align && data.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::InvalidInputLength(data.len()));
    }

    match algorithm {
        Algorithm::Aes128 => run::<Aes128>(config, direction, key, data),
        Algorithm::Aes192 => run::<Aes192>(config, direction, key, data),
        Algorithm::Aes256 => run::<Aes256>(config, direction, key, data),
    }
}

fn run<C>(
    config: &CipherConfig,
    direction: Direction,
    key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CipherError>
where
    C: BlockCipher + BlockEncryptMut + BlockDecryptMut + KeyInit,
{
    let bad_key = || CipherError::InvalidKeyLength {
        algorithm: config.algorithm.name(),
        expected: config.algorithm.key_len(),
        actual: key.len(),
    };
    let bad_iv = || CipherError::InvalidIv(format!("expected {} bytes", BLOCK_SIZE));

    match (config.mode, direction) {
        (BlockMode::Ecb, Direction::Encrypt) => {
            let enc = ecb::Encryptor::<C>::new_from_slice(key).map_err(|_| bad_key())?;
            Ok(match config.padding {
                Padding::Pkcs5 => enc.encrypt_padded_vec_mut::<Pkcs7>(data),
                Padding::None => enc.encrypt_padded_vec_mut::<NoPadding>(data),
            })
        }
        (BlockMode::Ecb, Direction::Decrypt) => {
            let dec = ecb::Decryptor::<C>::new_from_slice(key).map_err(|_| bad_key())?;
            match config.padding {
                Padding::Pkcs5 => dec.decrypt_padded_vec_mut::<Pkcs7>(data),
                Padding::None => dec.decrypt_padded_vec_mut::<NoPadding>(data),
            }
            .map_err(|_| CipherError::BadPadding)
        }
        (BlockMode::Cbc, Direction::Encrypt) => {
            let iv = config.iv.ok_or_else(bad_iv)?;
            let enc = cbc::Encryptor::<C>::new_from_slices(key, &iv).map_err(|_| bad_key())?;
            Ok(match config.padding {
                Padding::Pkcs5 => enc.encrypt_padded_vec_mut::<Pkcs7>(data),
                Padding::None => enc.encrypt_padded_vec_mut::<NoPadding>(data),
            })
        }
        (BlockMode::Cbc, Direction::Decrypt) => {
            let iv = config.iv.ok_or_else(bad_iv)?;
            let dec = cbc::Decryptor::<C>::new_from_slices(key, &iv).map_err(|_| bad_key())?;
            match config.padding {
                Padding::Pkcs5 => dec.decrypt_padded_vec_mut::<Pkcs7>(data),
                Padding::None => dec.decrypt_padded_vec_mut::<NoPadding>(data),
            }
            .map_err(|_| CipherError::BadPadding)
        }
    }
}

/// A configured cipher with no key and no mutable state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CipherEngine {
    config: CipherConfig,
}

impl CipherEngine {
    /// Create an engine, rejecting an IV that does not match the mode
    pub fn new(config: CipherConfig) -> Result<Self, CipherError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create an engine from a transform name and an optional IV
    pub fn from_transform(name: &str, iv: Option<&[u8]>) -> Result<Self, CipherError> {
        let config: CipherConfig = name.parse()?;
        let config = match iv {
            Some(iv) => config.with_iv(iv)?,
            None => config,
        };
        Self::new(config)
    }

    pub fn config(&self) -> &CipherConfig {
        &self.config
    }

    /// Encrypt a message with the given key material
    pub fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        transform(&self.config, Direction::Encrypt, key, plaintext)
    }

    /// Decrypt a message with the given key material
    pub fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        transform(&self.config, Direction::Decrypt, key, ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [
        0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77,
        0x88,
    ];

    #[test]
    fn test_parse_transform() {
        let config: CipherConfig = "AES/ECB/PKCS5Padding".parse().unwrap();
        assert_eq!(config, CipherConfig::default());
        assert_eq!(config.to_string(), "AES/ECB/PKCS5Padding");

        let config: CipherConfig = "aes-256/cbc/NoPadding".parse().unwrap();
        assert_eq!(config.algorithm(), Algorithm::Aes256);
        assert_eq!(config.mode(), BlockMode::Cbc);
        assert_eq!(config.padding(), Padding::None);
    }

    #[test]
    fn test_unsupported_transform() {
        for name in ["DES/ECB/PKCS5Padding", "AES/GCM/NoPadding", "AES/ECB", "AES/ECB/ISO10126"] {
            let err = name.parse::<CipherConfig>().unwrap_err();
            assert!(matches!(err, CipherError::UnsupportedTransform(_)), "{}", name);
        }
    }

    #[test]
    fn test_ecb_roundtrip() {
        let engine = CipherEngine::default();
        let plaintext = b"GET / HTTP/1.1\r\nHost: backend.example\r\n\r\n";

        let ciphertext = engine.encrypt(&KEY, plaintext).unwrap();
        assert_eq!(ciphertext.len() % BLOCK_SIZE, 0);
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let decrypted = engine.decrypt(&KEY, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_plaintext_is_one_padding_block() {
        let engine = CipherEngine::default();
        let ciphertext = engine.encrypt(&KEY, b"").unwrap();
        assert_eq!(ciphertext.len(), BLOCK_SIZE);
        assert!(engine.decrypt(&KEY, &ciphertext).unwrap().is_empty());
    }

    #[test]
    fn test_ecb_is_deterministic() {
        // Same key and plaintext under ECB leak equality of messages and blocks
        let engine = CipherEngine::default();
        let block = [0x41u8; BLOCK_SIZE];
        let plaintext = [block, block].concat();

        let c1 = engine.encrypt(&KEY, &plaintext).unwrap();
        let c2 = engine.encrypt(&KEY, &plaintext).unwrap();
        assert_eq!(c1, c2);
        assert_eq!(c1[..BLOCK_SIZE], c1[BLOCK_SIZE..2 * BLOCK_SIZE]);
    }

    #[test]
    fn test_only_first_bytes_of_key_are_used() {
        let engine = CipherEngine::default();
        let mut long_key = KEY.to_vec();
        long_key.extend_from_slice(&[0xAB; 240]);

        let c1 = engine.encrypt(&KEY, b"hello").unwrap();
        let c2 = engine.encrypt(&long_key, b"hello").unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_key_errors() {
        let engine = CipherEngine::default();
        assert!(matches!(
            engine.encrypt(&[], b"x"),
            Err(CipherError::MissingKey)
        ));
        assert!(matches!(
            engine.encrypt(&KEY[..8], b"x"),
            Err(CipherError::InvalidKeyLength { expected: 16, actual: 8, .. })
        ));

        let engine = CipherEngine::from_transform("AES-256/ECB/PKCS5Padding", None).unwrap();
        assert!(matches!(
            engine.encrypt(&KEY, b"x"),
            Err(CipherError::InvalidKeyLength { expected: 32, .. })
        ));
    }

    #[test]
    fn test_decrypt_errors() {
        let engine = CipherEngine::default();
        assert!(matches!(
            engine.decrypt(&KEY, &[0u8; 15]),
            Err(CipherError::InvalidInputLength(15))
        ));

        let ciphertext = engine.encrypt(&KEY, b"hello").unwrap();
        let mut other_key = KEY;
        other_key[0] ^= 0xFF;
        // A wrong key almost always breaks the padding; it must never panic
        if let Err(e) = engine.decrypt(&other_key, &ciphertext) {
            assert!(matches!(e, CipherError::BadPadding));
        }
    }

    #[test]
    fn test_no_padding_requires_alignment() {
        let engine = CipherEngine::from_transform("AES/ECB/NoPadding", None).unwrap();
        assert!(matches!(
            engine.encrypt(&KEY, b"short"),
            Err(CipherError::InvalidInputLength(5))
        ));

        let block = [7u8; 32];
        let ciphertext = engine.encrypt(&KEY, &block).unwrap();
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(engine.decrypt(&KEY, &ciphertext).unwrap(), block);
    }

    #[test]
    fn test_cbc_requires_iv() {
        assert!(matches!(
            CipherEngine::from_transform("AES/CBC/PKCS5Padding", None),
            Err(CipherError::InvalidIv(_))
        ));
        assert!(matches!(
            CipherEngine::from_transform("AES/ECB/PKCS5Padding", Some(&[0u8; 16])),
            Err(CipherError::InvalidIv(_))
        ));
        assert!(matches!(
            CipherEngine::from_transform("AES/CBC/PKCS5Padding", Some(&[0u8; 8])),
            Err(CipherError::InvalidIv(_))
        ));
    }

    #[test]
    fn test_cbc_roundtrip_hides_repeated_blocks() {
        let engine = CipherEngine::from_transform("AES/CBC/PKCS5Padding", Some(&[9u8; 16])).unwrap();
        let block = [0x41u8; BLOCK_SIZE];
        let plaintext = [block, block].concat();

        let ciphertext = engine.encrypt(&KEY, &plaintext).unwrap();
        assert_ne!(ciphertext[..BLOCK_SIZE], ciphertext[BLOCK_SIZE..2 * BLOCK_SIZE]);
        assert_eq!(engine.decrypt(&KEY, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_direction_can_flip_between_calls() {
        let engine = CipherEngine::default();
        let a = engine.encrypt(&KEY, b"first").unwrap();
        let a_plain = engine.decrypt(&KEY, &a).unwrap();
        let b = engine.encrypt(&KEY, b"second").unwrap();
        assert_eq!(a_plain, b"first");
        assert_eq!(engine.decrypt(&KEY, &b).unwrap(), b"second");
    }
}
