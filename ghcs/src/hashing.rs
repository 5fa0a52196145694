// Copyright (c) 2024 Botho Foundation

//! Hashing and canonical encoding primitives shared by both ledgers.
//!
//! Every digest in the system is SHA-256. Structured values are fed into the
//! hasher field by field in a fixed order, with integers as little-endian
//! `u64`/`i64` and strings length-prefixed, so two encodings can never collide
//! by shifting bytes between adjacent fields.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A 32-byte SHA-256 digest.
///
/// Rendered (and serialized) as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

#[derive(Debug, Error, PartialEq)]
pub enum HashParseError {
    #[error("missing 0x prefix")]
    MissingPrefix,

    #[error("expected {expected} hex characters, got {got}")]
    BadLength { expected: usize, got: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl Hash256 {
    /// All-zero digest, used as the genesis block's previous hash.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Hash raw bytes.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight bytes as hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[0..8])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self)
    }
}

impl FromStr for Hash256 {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_prefixed_hex::<32>(s)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Decode a `0x`-prefixed hex string of exactly `N` bytes.
pub(crate) fn decode_prefixed_hex<const N: usize>(s: &str) -> Result<[u8; N], HashParseError> {
    let body = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or(HashParseError::MissingPrefix)?;
    if body.len() != N * 2 {
        return Err(HashParseError::BadLength {
            expected: N * 2,
            got: body.len(),
        });
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(body, &mut out)?;
    Ok(out)
}

/// Field-by-field SHA-256 encoder with a domain tag.
///
/// ```ignore
/// let mut h = CanonicalHasher::new(b"ghcs-tx");
/// h.str(&tx.sender).str(&tx.recipient).u64(tx.amount);
/// let digest = h.finish();
/// ```
pub struct CanonicalHasher {
    inner: Sha256,
}

impl CanonicalHasher {
    pub fn new(domain: &[u8]) -> Self {
        let mut inner = Sha256::new();
        inner.update((domain.len() as u64).to_le_bytes());
        inner.update(domain);
        Self { inner }
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.inner.update(value.to_le_bytes());
        self
    }

    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.inner.update(value.to_le_bytes());
        self
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.inner.update((value.len() as u64).to_le_bytes());
        self.inner.update(value.as_bytes());
        self
    }

    pub fn hash(&mut self, value: &Hash256) -> &mut Self {
        self.inner.update(value.0);
        self
    }

    pub fn finish(self) -> Hash256 {
        Hash256(self.inner.finalize().into())
    }
}
