// Copyright (c) 2024 Botho Foundation

//! Credit transactions.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::hashing::{CanonicalHasher, Hash256};

/// Sender name for network-issued credit. It is never debited.
pub const NETWORK_SENDER: &str = "system";

const TX_HASH_DOMAIN: &[u8] = b"ghcs-tx-v1";

/// A credit movement between two named accounts.
///
/// Transactions are immutable once created. The content hash covers every
/// other field, so a stored transaction can be checked against its hash when
/// the chain is reloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    #[serde(default)]
    pub details: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub hash: Hash256,
}

impl Transaction {
    /// Build a transaction stamped with the current time.
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
        details: impl Into<String>,
    ) -> Self {
        Self::with_timestamp(sender, recipient, amount, details, Utc::now())
    }

    /// Build a transaction with an explicit timestamp (truncated to
    /// milliseconds, the precision the hash and the stored form use).
    pub fn with_timestamp(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
        details: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            details: details.into(),
            timestamp: timestamp.trunc_subsecs(3),
            hash: Hash256::ZERO,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    pub fn compute_hash(&self) -> Hash256 {
        let mut hasher = CanonicalHasher::new(TX_HASH_DOMAIN);
        hasher
            .str(&self.sender)
            .str(&self.recipient)
            .u64(self.amount)
            .str(&self.details)
            .i64(self.timestamp.timestamp_millis());
        hasher.finish()
    }

    /// Does the stored hash match the content?
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Credit created by the network rather than moved between accounts
    pub fn is_issuance(&self) -> bool {
        self.sender == NETWORK_SENDER
    }

    pub fn involves(&self, account: &str) -> bool {
        self.sender == account || self.recipient == account
    }

    /// Signed effect of this transaction on `account`'s balance.
    pub fn delta_for(&self, account: &str) -> i128 {
        let amount = i128::from(self.amount);
        let mut delta = 0i128;
        if self.recipient == account {
            delta += amount;
        }
        if self.sender == account {
            delta -= amount;
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_hash_covers_every_field() {
        let base = Transaction::with_timestamp("a", "b", 10, "memo", fixed_time());
        assert!(base.verify_hash());

        let variants = [
            Transaction::with_timestamp("x", "b", 10, "memo", fixed_time()),
            Transaction::with_timestamp("a", "x", 10, "memo", fixed_time()),
            Transaction::with_timestamp("a", "b", 11, "memo", fixed_time()),
            Transaction::with_timestamp("a", "b", 10, "other", fixed_time()),
            Transaction::with_timestamp(
                "a",
                "b",
                10,
                "memo",
                fixed_time() + chrono::Duration::milliseconds(1),
            ),
        ];
        for v in variants {
            assert_ne!(v.hash, base.hash);
        }
    }

    #[test]
    fn test_tampered_amount_fails_verification() {
        let mut tx = Transaction::with_timestamp("a", "b", 10, "", fixed_time());
        tx.amount = 1_000;
        assert!(!tx.verify_hash());
    }

    #[test]
    fn test_timestamp_is_millisecond_precision() {
        let precise = fixed_time() + chrono::Duration::nanoseconds(1_234_567);
        let tx = Transaction::with_timestamp("a", "b", 1, "", precise);
        assert_eq!(tx.timestamp.timestamp_subsec_nanos(), 1_000_000);

        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
        assert!(back.verify_hash());
    }

    #[test]
    fn test_delta_for() {
        let tx = Transaction::with_timestamp("a", "b", 7, "", fixed_time());
        assert_eq!(tx.delta_for("a"), -7);
        assert_eq!(tx.delta_for("b"), 7);
        assert_eq!(tx.delta_for("c"), 0);
        assert!(!tx.is_issuance());
        assert!(Transaction::new(NETWORK_SENDER, "b", 1, "").is_issuance());
    }
}
