// Copyright (c) 2024 Botho Foundation

//! Issuance approval workflow.
//!
//! A producer asks for credits; a state verifier certifies, rejects or
//! escalates the request for government review. Certification is the only
//! path that reaches the ledger, through its mint capability.
//!
//! ```text
//!                     Scrutinize (verifier)
//!  Pending Verification ───────────────────▶ Under Scrutiny
//!        │                                       │
//!        │ Certify / Reject (verifier)           │ Certify / Reject
//!        ▼                                       ▼ (verifier or government)
//!  Certified / Rejected (request removed)
//! ```

use chrono::{DateTime, SubsecRound, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

use crate::account::{validate_account_name, Role};
use crate::ledger::{CreditLedger, ErrorKind, LedgerError};

const ID_PREFIX: &str = "ISSUE-";

/// Request identifier, rendered as `ISSUE-<n>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IssuanceId(pub u64);

impl fmt::Display for IssuanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ID_PREFIX}{}", self.0)
    }
}

impl FromStr for IssuanceId {
    type Err = IssuanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.strip_prefix(ID_PREFIX).unwrap_or(s);
        digits
            .parse()
            .map(IssuanceId)
            .map_err(|_| IssuanceError::MalformedId(s.to_string()))
    }
}

impl Serialize for IssuanceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IssuanceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssuanceStatus {
    #[serde(rename = "Pending Verification")]
    PendingVerification,
    #[serde(rename = "Under Scrutiny")]
    UnderScrutiny,
    Certified,
    Rejected,
}

impl IssuanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IssuanceStatus::Certified | IssuanceStatus::Rejected)
    }
}

impl fmt::Display for IssuanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssuanceStatus::PendingVerification => "Pending Verification",
            IssuanceStatus::UnderScrutiny => "Under Scrutiny",
            IssuanceStatus::Certified => "Certified",
            IssuanceStatus::Rejected => "Rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceAction {
    Certify,
    Scrutinize,
    Reject,
}

impl fmt::Display for IssuanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssuanceAction::Certify => "certify",
            IssuanceAction::Scrutinize => "scrutinize",
            IssuanceAction::Reject => "reject",
        };
        f.write_str(s)
    }
}

impl FromStr for IssuanceAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "certify" | "approve" => Ok(IssuanceAction::Certify),
            "scrutinize" | "escalate" => Ok(IssuanceAction::Scrutinize),
            "reject" => Ok(IssuanceAction::Reject),
            other => Err(format!("unknown issuance action '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRequest {
    pub id: IssuanceId,
    pub producer: String,
    pub amount: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub status: IssuanceStatus,
}

/// Outcome of a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub id: IssuanceId,
    pub producer: String,
    pub amount: u64,
    pub status: IssuanceStatus,
}

#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("Issuance amount must be greater than zero")]
    ZeroAmount,

    #[error("Invalid producer '{name}': {reason}")]
    InvalidProducer { name: String, reason: &'static str },

    #[error("Producer account is frozen: {0}")]
    ProducerFrozen(String),

    #[error("Malformed issuance id: {0}")]
    MalformedId(String),

    #[error("No active issuance request {0}")]
    UnknownRequest(IssuanceId),

    #[error("{role} may not {action} a request that is {status}")]
    Unauthorized {
        role: Role,
        action: IssuanceAction,
        status: IssuanceStatus,
    },

    #[error("Cannot {action} a request that is {status}")]
    InvalidTransition {
        action: IssuanceAction,
        status: IssuanceStatus,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl IssuanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IssuanceError::ZeroAmount
            | IssuanceError::InvalidProducer { .. }
            | IssuanceError::MalformedId(_)
            | IssuanceError::UnknownRequest(_)
            | IssuanceError::InvalidTransition { .. } => ErrorKind::Validation,
            IssuanceError::ProducerFrozen(_) | IssuanceError::Unauthorized { .. } => {
                ErrorKind::Authorization
            }
            IssuanceError::Ledger(e) => e.kind(),
        }
    }
}

/// Active issuance requests and the id counter.
///
/// The workflow never holds a ledger; the caller passes one in for the
/// decisions that need it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuanceWorkflow {
    requests: BTreeMap<IssuanceId, IssuanceRequest>,
    counter: u64,
}

impl IssuanceWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from persisted requests. The counter is raised past any stored
    /// id so ids are never reused.
    pub fn from_parts(requests: impl IntoIterator<Item = IssuanceRequest>, counter: u64) -> Self {
        let requests: BTreeMap<_, _> = requests.into_iter().map(|r| (r.id, r)).collect();
        let highest = requests.keys().next_back().map(|id| id.0).unwrap_or(0);
        Self {
            requests,
            counter: counter.max(highest),
        }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn get(&self, id: IssuanceId) -> Option<&IssuanceRequest> {
        self.requests.get(&id)
    }

    /// Active requests in id order.
    pub fn active(&self) -> impl Iterator<Item = &IssuanceRequest> {
        self.requests.values()
    }

    pub fn with_status(&self, status: IssuanceStatus) -> impl Iterator<Item = &IssuanceRequest> {
        self.requests.values().filter(move |r| r.status == status)
    }

    /// Open a new request in `Pending Verification`.
    pub fn request(
        &mut self,
        producer: &str,
        amount: u64,
        ledger: &dyn CreditLedger,
    ) -> Result<IssuanceId, IssuanceError> {
        if amount == 0 {
            return Err(IssuanceError::ZeroAmount);
        }
        validate_account_name(producer).map_err(|reason| IssuanceError::InvalidProducer {
            name: producer.to_string(),
            reason,
        })?;
        if ledger.is_frozen(producer) {
            return Err(IssuanceError::ProducerFrozen(producer.to_string()));
        }

        self.counter += 1;
        let id = IssuanceId(self.counter);
        self.requests.insert(
            id,
            IssuanceRequest {
                id,
                producer: producer.to_string(),
                amount,
                created_at: Utc::now().trunc_subsecs(3),
                status: IssuanceStatus::PendingVerification,
            },
        );
        info!(%id, producer, amount, "Issuance requested");
        Ok(id)
    }

    /// Apply `action` by an actor holding `role`.
    ///
    /// A failed certification leaves the request active and the ledger
    /// untouched.
    pub fn decide(
        &mut self,
        id: IssuanceId,
        action: IssuanceAction,
        role: Role,
        ledger: &mut dyn CreditLedger,
    ) -> Result<Decision, IssuanceError> {
        let request = self
            .requests
            .get(&id)
            .ok_or(IssuanceError::UnknownRequest(id))?;
        let status = request.status;

        match (role, action) {
            (Role::StateVerifier, IssuanceAction::Scrutinize) => {
                if status != IssuanceStatus::PendingVerification {
                    return Err(IssuanceError::InvalidTransition { action, status });
                }
            }
            (Role::StateVerifier, _) => {}
            (Role::Government, IssuanceAction::Certify | IssuanceAction::Reject)
                if status == IssuanceStatus::UnderScrutiny => {}
            _ => {
                warn!(%id, %role, %action, %status, "Issuance decision refused");
                return Err(IssuanceError::Unauthorized {
                    role,
                    action,
                    status,
                });
            }
        }

        let decision = match action {
            IssuanceAction::Scrutinize => {
                if let Some(request) = self.requests.get_mut(&id) {
                    request.status = IssuanceStatus::UnderScrutiny;
                }
                self.decision(id, IssuanceStatus::UnderScrutiny)?
            }
            IssuanceAction::Certify => {
                let producer = request.producer.clone();
                let amount = request.amount;
                if ledger.is_frozen(&producer) {
                    warn!(%id, producer = %producer, "Certification refused for frozen producer");
                    return Err(IssuanceError::ProducerFrozen(producer));
                }
                let details = format!("Issuance {id} certified by {role}");
                ledger.mint(&producer, amount, &details)?;
                self.remove(id, IssuanceStatus::Certified)?
            }
            IssuanceAction::Reject => self.remove(id, IssuanceStatus::Rejected)?,
        };

        info!(
            %id,
            producer = %decision.producer,
            amount = decision.amount,
            %role,
            status = %decision.status,
            "Issuance decided"
        );
        Ok(decision)
    }

    fn decision(&self, id: IssuanceId, status: IssuanceStatus) -> Result<Decision, IssuanceError> {
        let request = self
            .requests
            .get(&id)
            .ok_or(IssuanceError::UnknownRequest(id))?;
        Ok(Decision {
            id,
            producer: request.producer.clone(),
            amount: request.amount,
            status,
        })
    }

    fn remove(
        &mut self,
        id: IssuanceId,
        status: IssuanceStatus,
    ) -> Result<Decision, IssuanceError> {
        let request = self
            .requests
            .remove(&id)
            .ok_or(IssuanceError::UnknownRequest(id))?;
        Ok(Decision {
            id,
            producer: request.producer,
            amount: request.amount,
            status,
        })
    }
}
