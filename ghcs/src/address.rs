// Copyright (c) 2024 Botho Foundation

//! Contract-ledger account addresses.
//!
//! An address is 20 bytes written as `0x` followed by 40 hex characters.
//! Parsing is case-insensitive; display is always lowercase. The all-zero
//! address is reserved and never names a real account.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::hashing::{decode_prefixed_hex, CanonicalHasher, HashParseError};

/// Address length in bytes
pub const ADDRESS_LEN: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Deterministic address for an account name, used when an account is
    /// registered without an explicit address.
    pub fn derive_from_name(name: &str) -> Self {
        let mut hasher = CanonicalHasher::new(b"ghcs-account-address");
        hasher.str(name);
        Self::from_digest_tail(hasher.finish().as_bytes())
    }

    /// Address of a contract deployed by `owner`.
    pub fn derive_contract(owner: &Address, nonce: u64) -> Self {
        let mut hasher = CanonicalHasher::new(b"ghcs-contract-address");
        hasher.str(&owner.to_string()).u64(nonce);
        Self::from_digest_tail(hasher.finish().as_bytes())
    }

    fn from_digest_tail(digest: &[u8; 32]) -> Self {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[32 - ADDRESS_LEN..]);
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(decode_prefixed_hex::<ADDRESS_LEN>(s.trim())?))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
