//! Minimal DER support for Diffie-Hellman public keys
//!
//! Encodes and decodes the X.509 `SubjectPublicKeyInfo` structure used by
//! PKCS#3 DH keys:
//!
//! ```text
//! SEQUENCE {
//!   SEQUENCE {
//!     OBJECT IDENTIFIER dhKeyAgreement (1.2.840.113549.1.3.1)
//!     SEQUENCE { INTEGER p, INTEGER g, [INTEGER l] }
//!   }
//!   BIT STRING { INTEGER y }
//! }
//! ```

use bytes::{BufMut, BytesMut};
use num_bigint::BigUint;
use thiserror::Error;

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;

/// DER body of the `dhKeyAgreement` object identifier
pub const DH_KEY_AGREEMENT_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x03, 0x01];

/// DER decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DerError {
    #[error("unexpected end of data")]
    Truncated,

    #[error("expected tag {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("unsupported length encoding")]
    BadLength,

    #[error("invalid integer")]
    BadInteger,

    #[error("unsupported key algorithm")]
    UnsupportedAlgorithm,

    #[error("trailing data after {0}")]
    TrailingData(&'static str),
}

/// Encoded DH public key fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DhKeyInfo {
    pub p: BigUint,
    pub g: BigUint,
    pub y: BigUint,
}

impl DhKeyInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut params = BytesMut::new();
        put_uint(&mut params, &self.p);
        put_uint(&mut params, &self.g);

        let mut algorithm = BytesMut::new();
        put_tlv(&mut algorithm, TAG_OID, DH_KEY_AGREEMENT_OID);
        put_tlv(&mut algorithm, TAG_SEQUENCE, &params);

        let mut key = BytesMut::new();
        put_uint(&mut key, &self.y);
        let mut bits = BytesMut::with_capacity(key.len() + 1);
        bits.put_u8(0); // no unused bits
        bits.extend_from_slice(&key);

        let mut body = BytesMut::new();
        put_tlv(&mut body, TAG_SEQUENCE, &algorithm);
        put_tlv(&mut body, TAG_BIT_STRING, &bits);

        let mut out = BytesMut::new();
        put_tlv(&mut out, TAG_SEQUENCE, &body);
        out.to_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, DerError> {
        let mut outer = DerReader::new(data);
        let body = outer.expect(TAG_SEQUENCE)?;
        outer.finish("public key")?;

        let mut body = DerReader::new(body);
        let algorithm = body.expect(TAG_SEQUENCE)?;
        let bits = body.expect(TAG_BIT_STRING)?;
        body.finish("key info")?;

        let mut algorithm = DerReader::new(algorithm);
        if algorithm.expect(TAG_OID)? != DH_KEY_AGREEMENT_OID {
            return Err(DerError::UnsupportedAlgorithm);
        }
        let params = algorithm.expect(TAG_SEQUENCE)?;
        algorithm.finish("algorithm identifier")?;

        let mut params = DerReader::new(params);
        let p = params.read_uint()?;
        let g = params.read_uint()?;
        if !params.is_empty() {
            // Optional private value length, not needed for agreement
            params.read_uint()?;
        }
        params.finish("DH parameters")?;

        let (&unused, key) = bits.split_first().ok_or(DerError::Truncated)?;
        if unused != 0 {
            return Err(DerError::BadLength);
        }
        let mut key = DerReader::new(key);
        let y = key.read_uint()?;
        key.finish("public value")?;

        Ok(Self { p, g, y })
    }
}

fn put_len(out: &mut BytesMut, len: usize) {
    if len < 0x80 {
        out.put_u8(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.put_u8(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

fn put_tlv(out: &mut BytesMut, tag: u8, content: &[u8]) {
    out.put_u8(tag);
    put_len(out, content.len());
    out.extend_from_slice(content);
}

fn put_uint(out: &mut BytesMut, value: &BigUint) {
    let mut bytes = value.to_bytes_be();
    // Keep the value positive in two's complement
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    put_tlv(out, TAG_INTEGER, &bytes);
}

struct DerReader<'a> {
    buf: &'a [u8],
}

impl<'a> DerReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn finish(&self, what: &'static str) -> Result<(), DerError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(DerError::TrailingData(what))
        }
    }

    fn expect(&mut self, tag: u8) -> Result<&'a [u8], DerError> {
        let (&found, rest) = self.buf.split_first().ok_or(DerError::Truncated)?;
        if found != tag {
            return Err(DerError::UnexpectedTag {
                expected: tag,
                found,
            });
        }

        let (&first, mut rest) = rest.split_first().ok_or(DerError::Truncated)?;
        let len = if first < 0x80 {
            first as usize
        } else {
            let n = (first & 0x7f) as usize;
            if n == 0 || n > 4 || rest.len() < n {
                return Err(DerError::BadLength);
            }
            let len = rest[..n].iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
            rest = &rest[n..];
            len
        };

        if rest.len() < len {
            return Err(DerError::Truncated);
        }
        let (content, rest) = rest.split_at(len);
        self.buf = rest;
        Ok(content)
    }

    fn read_uint(&mut self) -> Result<BigUint, DerError> {
        let content = self.expect(TAG_INTEGER)?;
        match content.first() {
            None => Err(DerError::BadInteger),
            Some(&b) if b & 0x80 != 0 => Err(DerError::BadInteger),
            Some(_) => Ok(BigUint::from_bytes_be(content)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DhKeyInfo {
        DhKeyInfo {
            p: BigUint::from_bytes_be(&[0xFF; 40]),
            g: BigUint::from(2u32),
            y: BigUint::from_bytes_be(&[0x80, 0x01, 0x02]),
        }
    }

    #[test]
    fn test_encode_decode() {
        let info = sample();
        let der = info.encode();
        assert_eq!(der[0], TAG_SEQUENCE);
        assert_eq!(DhKeyInfo::decode(&der).unwrap(), info);
    }

    #[test]
    fn test_long_form_length() {
        let mut out = BytesMut::new();
        put_len(&mut out, 0x1234);
        assert_eq!(&out[..], &[0x82, 0x12, 0x34]);

        let mut out = BytesMut::new();
        put_len(&mut out, 0x7f);
        assert_eq!(&out[..], &[0x7f]);
    }

    #[test]
    fn test_high_bit_integer_is_padded() {
        let mut out = BytesMut::new();
        put_uint(&mut out, &BigUint::from(0x80u32));
        assert_eq!(&out[..], &[TAG_INTEGER, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn test_optional_private_length_is_accepted() {
        let info = sample();
        let mut params = BytesMut::new();
        put_uint(&mut params, &info.p);
        put_uint(&mut params, &info.g);
        put_uint(&mut params, &BigUint::from(1024u32));

        let mut algorithm = BytesMut::new();
        put_tlv(&mut algorithm, TAG_OID, DH_KEY_AGREEMENT_OID);
        put_tlv(&mut algorithm, TAG_SEQUENCE, &params);

        let mut key = BytesMut::new();
        put_uint(&mut key, &info.y);
        let mut bits = vec![0u8];
        bits.extend_from_slice(&key);

        let mut body = BytesMut::new();
        put_tlv(&mut body, TAG_SEQUENCE, &algorithm);
        put_tlv(&mut body, TAG_BIT_STRING, &bits);
        let mut der = BytesMut::new();
        put_tlv(&mut der, TAG_SEQUENCE, &body);

        assert_eq!(DhKeyInfo::decode(&der).unwrap(), info);
    }

    #[test]
    fn test_rejects_malformed_input() {
        let der = sample().encode();

        assert_eq!(DhKeyInfo::decode(&[]), Err(DerError::Truncated));
        assert_eq!(
            DhKeyInfo::decode(&der[..der.len() - 1]),
            Err(DerError::Truncated)
        );

        let mut trailing = der.clone();
        trailing.push(0);
        assert_eq!(
            DhKeyInfo::decode(&trailing),
            Err(DerError::TrailingData("public key"))
        );

        let mut wrong_tag = der.clone();
        wrong_tag[0] = TAG_INTEGER;
        assert!(matches!(
            DhKeyInfo::decode(&wrong_tag),
            Err(DerError::UnexpectedTag { .. })
        ));
    }

    #[test]
    fn test_rejects_other_algorithms() {
        let mut der = sample().encode();
        let pos = der
            .windows(DH_KEY_AGREEMENT_OID.len())
            .position(|w| w == DH_KEY_AGREEMENT_OID)
            .unwrap();
        der[pos + DH_KEY_AGREEMENT_OID.len() - 1] = 0x02;
        assert_eq!(DhKeyInfo::decode(&der), Err(DerError::UnsupportedAlgorithm));
    }
}
