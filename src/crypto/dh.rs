//! Finite-field Diffie-Hellman key agreement

use super::der::DhKeyInfo;
use super::{random_bytes, HandshakeError, SharedSecret};
use num_bigint::BigUint;
use std::fmt;

/// Smallest prime accepted from a peer
pub const MIN_PRIME_BITS: u64 = 1024;

/// RFC 3526 group 14 (2048-bit MODP), generator 2
const MODP_2048_PRIME: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
    "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
    "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
    "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
    "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
    "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
    "DE2BCBF6955817183995497CEA956AE515D2261898FA0510",
    "15728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

/// DH domain parameters: prime modulus `p` and generator `g`
#[derive(Clone, PartialEq, Eq)]
pub struct DhParams {
    p: BigUint,
    g: BigUint,
}

impl DhParams {
    /// Build parameters from a modulus and generator, checking they are usable
    pub fn new(p: BigUint, g: BigUint) -> Result<Self, HandshakeError> {
        let params = Self { p, g };
        params.validate()?;
        Ok(params)
    }

    /// RFC 3526 2048-bit MODP group
    pub fn modp2048() -> Self {
        let p = BigUint::parse_bytes(MODP_2048_PRIME.as_bytes(), 16).unwrap_or_default();
        Self {
            p,
            g: BigUint::from(2u32),
        }
    }

    /// Parse a hexadecimal prime and a generator
    pub fn from_hex(prime: &str, generator: u32) -> Result<Self, HandshakeError> {
        let cleaned: String = prime.chars().filter(|c| !c.is_whitespace()).collect();
        let p = BigUint::parse_bytes(cleaned.as_bytes(), 16).ok_or_else(|| {
            HandshakeError::UnsupportedParameters("prime is not valid hexadecimal".to_string())
        })?;
        Self::new(p, BigUint::from(generator))
    }

    pub fn prime(&self) -> &BigUint {
        &self.p
    }

    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    /// Size of the prime in bits
    pub fn prime_bits(&self) -> u64 {
        self.p.bits()
    }

    /// Size of the prime in bytes, and therefore of the shared secret
    pub fn byte_len(&self) -> usize {
        ((self.prime_bits() + 7) / 8) as usize
    }

    /// Private exponent size in bits
    fn private_bits(&self) -> u64 {
        (self.prime_bits() / 8).max(256)
    }

    /// Reject parameters no honest peer would send
    ///
    /// Primality is not tested; the responder trusts the initiator's group.
    pub fn validate(&self) -> Result<(), HandshakeError> {
        if self.prime_bits() < MIN_PRIME_BITS {
            return Err(HandshakeError::UnsupportedParameters(format!(
                "prime has {} bits, at least {} required",
                self.prime_bits(),
                MIN_PRIME_BITS
            )));
        }
        if !self.p.bit(0) {
            return Err(HandshakeError::UnsupportedParameters(
                "prime is even".to_string(),
            ));
        }
        let one = BigUint::from(1u32);
        if self.g <= one || self.g >= &self.p - &one {
            return Err(HandshakeError::UnsupportedParameters(
                "generator out of range".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DhParams {
    fn default() -> Self {
        Self::modp2048()
    }
}

impl fmt::Debug for DhParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DhParams({} bits, g = {})", self.prime_bits(), self.g)
    }
}

/// A DH public value together with the group it belongs to
#[derive(Clone, PartialEq, Eq)]
pub struct DhPublicKey {
    params: DhParams,
    y: BigUint,
}

impl DhPublicKey {
    /// Wrap a public value without validating it
    pub fn new(params: DhParams, y: BigUint) -> Self {
        Self { params, y }
    }

    pub fn params(&self) -> &DhParams {
        &self.params
    }

    pub fn value(&self) -> &BigUint {
        &self.y
    }

    /// Check the group and that `1 < y < p - 1`
    pub fn validate(&self) -> Result<(), HandshakeError> {
        self.params.validate()?;
        let one = BigUint::from(1u32);
        if self.y <= one || self.y >= &self.params.p - &one {
            return Err(HandshakeError::InvalidPublicKey(
                "public value out of range".to_string(),
            ));
        }
        Ok(())
    }

    /// X.509 `SubjectPublicKeyInfo` DER encoding
    pub fn to_der(&self) -> Vec<u8> {
        DhKeyInfo {
            p: self.params.p.clone(),
            g: self.params.g.clone(),
            y: self.y.clone(),
        }
        .encode()
    }

    /// Decode and validate a peer key
    pub fn from_der(der: &[u8]) -> Result<Self, HandshakeError> {
        let info = DhKeyInfo::decode(der)?;
        let key = Self {
            params: DhParams {
                p: info.p,
                g: info.g,
            },
            y: info.y,
        };
        key.validate()?;
        Ok(key)
    }
}

impl fmt::Debug for DhPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.y.to_bytes_be();
        write!(
            f,
            "DhPublicKey({:?}, y = {}...)",
            self.params,
            hex::encode(&bytes[..bytes.len().min(4)])
        )
    }
}

/// Ephemeral DH key pair
pub struct DhKeyPair {
    private: BigUint,
    public: DhPublicKey,
}

impl DhKeyPair {
    /// Generate a fresh key pair in the given group
    pub fn generate(params: &DhParams) -> Result<Self, HandshakeError> {
        params.validate()?;

        let bits = params.private_bits();
        let mut bytes = vec![0u8; ((bits + 7) / 8) as usize];
        random_bytes(&mut bytes)?;
        // Fix the top bit so the exponent has its full size, and so x >= 2
        bytes[0] |= 0x80;
        let private = BigUint::from_bytes_be(&bytes);

        let y = params.g.modpow(&private, &params.p);
        Ok(Self {
            private,
            public: DhPublicKey {
                params: params.clone(),
                y,
            },
        })
    }

    pub fn public(&self) -> &DhPublicKey {
        &self.public
    }

    pub fn params(&self) -> &DhParams {
        &self.public.params
    }

    /// Final phase of the agreement
    ///
    /// Returns `peer^x mod p`, big-endian and left-padded to the length of `p`.
    pub fn agree(&self, peer: &DhPublicKey) -> Result<SharedSecret, HandshakeError> {
        if peer.params != self.public.params {
            return Err(HandshakeError::UnsupportedParameters(
                "peer key uses a different group".to_string(),
            ));
        }
        peer.validate()?;

        let params = &self.public.params;
        let z = peer.y.modpow(&self.private, &params.p);
        if z <= BigUint::from(1u32) {
            return Err(HandshakeError::InvalidPublicKey(
                "degenerate shared value".to_string(),
            ));
        }

        let value = z.to_bytes_be();
        let mut secret = vec![0u8; params.byte_len()];
        let offset = secret.len() - value.len();
        secret[offset..].copy_from_slice(&value);
        Ok(SharedSecret::from_bytes(secret))
    }
}

impl fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DhKeyPair({:?}, private: [REDACTED])", self.public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modp2048_is_probably_prime() {
        let params = DhParams::modp2048();
        let p = params.prime();
        let one = BigUint::from(1u32);
        assert_eq!(params.prime_bits(), 2048);
        assert_eq!(params.byte_len(), 256);

        // Fermat test on p and on the Sophie Germain prime q = (p - 1) / 2
        assert_eq!(BigUint::from(2u32).modpow(&(p - &one), p), one);
        let q = (p - &one) >> 1;
        assert_eq!(BigUint::from(3u32).modpow(&(&q - &one), &q), one);
    }

    #[test]
    fn test_agreement_is_symmetric() {
        let params = DhParams::default();
        let alice = DhKeyPair::generate(&params).unwrap();
        let bob = DhKeyPair::generate(alice.params()).unwrap();

        let s1 = alice.agree(bob.public()).unwrap();
        let s2 = bob.agree(alice.public()).unwrap();
        assert_eq!(s1.as_bytes(), s2.as_bytes());
        assert_eq!(s1.len(), 256);
    }

    #[test]
    fn test_fresh_key_pairs_differ() {
        let params = DhParams::default();
        let a = DhKeyPair::generate(&params).unwrap();
        let b = DhKeyPair::generate(&params).unwrap();
        assert_ne!(a.public().value(), b.public().value());
    }

    #[test]
    fn test_public_key_der_roundtrip() {
        let pair = DhKeyPair::generate(&DhParams::default()).unwrap();
        let der = pair.public().to_der();
        let decoded = DhPublicKey::from_der(&der).unwrap();
        assert_eq!(&decoded, pair.public());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let params = DhParams::default();
        let p_minus_one = params.prime() - BigUint::from(1u32);
        for y in [BigUint::from(0u32), BigUint::from(1u32), p_minus_one] {
            let key = DhPublicKey::new(params.clone(), y);
            assert!(matches!(
                DhPublicKey::from_der(&key.to_der()),
                Err(HandshakeError::InvalidPublicKey(_))
            ));
        }
    }

    #[test]
    fn test_rejects_weak_parameters() {
        let small = DhParams {
            p: BigUint::from(23u32),
            g: BigUint::from(5u32),
        };
        assert!(matches!(
            small.validate(),
            Err(HandshakeError::UnsupportedParameters(_))
        ));

        let bad_generator = DhParams {
            p: DhParams::modp2048().p,
            g: BigUint::from(1u32),
        };
        assert!(bad_generator.validate().is_err());
    }

    #[test]
    fn test_rejects_mismatched_group() {
        let a = DhKeyPair::generate(&DhParams::default()).unwrap();
        let other = DhParams::new(DhParams::modp2048().p, BigUint::from(5u32)).unwrap();
        let b = DhKeyPair::generate(&other).unwrap();
        assert!(matches!(
            a.agree(b.public()),
            Err(HandshakeError::UnsupportedParameters(_))
        ));
    }

    #[test]
    fn test_from_hex() {
        let params = DhParams::from_hex(MODP_2048_PRIME, 2).unwrap();
        assert_eq!(params, DhParams::modp2048());
        assert!(DhParams::from_hex("not hex", 2).is_err());
    }
}
