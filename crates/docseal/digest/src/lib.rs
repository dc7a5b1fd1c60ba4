//! Digest engine for DocSeal.
//!
//! Two pure operations back every integrity guarantee in the workspace:
//!
//! - [`digest_content`] hashes arbitrary bytes (document content, payloads)
//! - [`digest_record`] hashes an ordered tuple of audit record fields
//!
//! Both are 256-bit BLAKE3. Record fields are length-prefixed and the two
//! operations use distinct domain tags, so a field tuple can never collide
//! with raw content or with a differently split tuple.

#![deny(unsafe_code)]

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const CONTENT_DOMAIN: &[u8] = b"docseal.content.v1";
const RECORD_DOMAIN: &[u8] = b"docseal.record.v1";

/// Length of every digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Errors raised when parsing a digest from its textual form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    #[error("invalid digest length: expected {expected} hex chars, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex in digest: {0}")]
    InvalidHex(String),
}

/// A fixed-length 256-bit digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    /// The genesis constant: `previous_record_digest` of record 0.
    pub const ZERO: Digest = Digest([0u8; DIGEST_LEN]);

    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, DigestError> {
        if s.len() != DIGEST_LEN * 2 {
            return Err(DigestError::InvalidLength {
                expected: DIGEST_LEN * 2,
                actual: s.len(),
            });
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| DigestError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// One field of a record tuple. Fields are hashed in the order given.
#[derive(Debug, Clone, Copy)]
pub enum RecordField<'a> {
    U64(u64),
    Str(&'a str),
    Bytes(&'a [u8]),
    Digest(&'a Digest),
}

impl RecordField<'_> {
    fn tag(&self) -> u8 {
        match self {
            RecordField::U64(_) => 0x01,
            RecordField::Str(_) => 0x02,
            RecordField::Bytes(_) => 0x03,
            RecordField::Digest(_) => 0x04,
        }
    }

    fn write_into(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&[self.tag()]);
        match self {
            RecordField::U64(v) => {
                hasher.update(&8u64.to_be_bytes());
                hasher.update(&v.to_be_bytes());
            }
            RecordField::Str(s) => write_prefixed(hasher, s.as_bytes()),
            RecordField::Bytes(b) => write_prefixed(hasher, b),
            RecordField::Digest(d) => write_prefixed(hasher, d.as_bytes()),
        }
    }
}

fn write_prefixed(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Digest arbitrary content. Empty input yields a fixed, valid digest.
pub fn digest_content(bytes: &[u8]) -> Digest {
    let mut hasher = blake3::Hasher::new();
    write_prefixed(&mut hasher, CONTENT_DOMAIN);
    hasher.update(bytes);
    Digest(*hasher.finalize().as_bytes())
}

/// Digest an ordered tuple of fields.
pub fn digest_record(fields: &[RecordField<'_>]) -> Digest {
    let mut hasher = blake3::Hasher::new();
    write_prefixed(&mut hasher, RECORD_DOMAIN);
    hasher.update(&(fields.len() as u64).to_be_bytes());
    for field in fields {
        field.write_into(&mut hasher);
    }
    Digest(*hasher.finalize().as_bytes())
}
