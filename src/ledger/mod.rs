//! Ledger collaborator contracts
//!
//! The orchestrator consumes the ledger purely through the
//! [`LedgerClient`] trait: one availability check and one
//! already-built broadcast call. Building a real RPC client lives
//! outside this crate; tests and embedders supply their own
//! implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Upstream ledger failure, carrying the raw upstream message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct LedgerError {
    pub message: String,
}

impl LedgerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Coarse classification of a broadcast failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastFailureKind {
    /// The issuer lacks the spendable allowance to claim an
    /// account-creation right.
    InsufficientResourceCredits,
    /// The account name was registered between check and broadcast.
    AccountExists,
    /// Anything else falls through to the generic category.
    Other,
}

/// Classify an upstream error message by substring.
///
/// This is the single place string-matching on upstream messages
/// occurs; the ledger exposes no structured error code, so the
/// classification is inherently fragile and deliberately fenced in
/// here. Ambiguous messages fall through to [`BroadcastFailureKind::Other`].
pub fn classify_broadcast_failure(message: &str) -> BroadcastFailureKind {
    let lower = message.to_lowercase();
    if lower.contains("insufficient resource credits") {
        BroadcastFailureKind::InsufficientResourceCredits
    } else if lower.contains("already exists") {
        BroadcastFailureKind::AccountExists
    } else {
        BroadcastFailureKind::Other
    }
}

/// A ledger-native structure expressing which keys and accounts may act
/// in a role, with what weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub weight_threshold: u32,

    /// (public key, weight) pairs.
    pub key_auths: Vec<(String, u16)>,

    /// (account name, weight) pairs.
    pub account_auths: Vec<(String, u16)>,
}

impl Authority {
    /// The common case: one key, weight 1, threshold 1.
    pub fn single_key(public_key: impl Into<String>) -> Self {
        Self {
            weight_threshold: 1,
            key_auths: vec![(public_key.into(), 1)],
            account_auths: Vec::new(),
        }
    }
}

/// Everything the ledger needs to create one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    /// Operator account performing (and paying for) the creation.
    pub issuer: String,

    pub new_account_name: String,

    pub owner: Authority,
    pub active: Authority,
    pub posting: Authority,

    /// Memo role carries a bare public key, not an authority.
    pub memo_key: String,

    /// Free-form account metadata, JSON-encoded.
    pub json_metadata: String,
}

/// Broadcast-only ledger interface consumed by the orchestrator.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Whether `name` is already registered.
    async fn account_exists(&self, name: &str) -> std::result::Result<bool, LedgerError>;

    /// Sign and broadcast the account-creation operation. Returns the
    /// ledger transaction id. This is the one irreversible side effect
    /// in the provisioning flow.
    async fn broadcast_create_account(
        &self,
        request: CreateAccountRequest,
    ) -> std::result::Result<String, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_resource_credits() {
        assert_eq!(
            classify_broadcast_failure("tx rejected: Insufficient Resource Credits for operation"),
            BroadcastFailureKind::InsufficientResourceCredits
        );
    }

    #[test]
    fn test_classify_account_exists() {
        assert_eq!(
            classify_broadcast_failure("account skateuser already exists"),
            BroadcastFailureKind::AccountExists
        );
    }

    #[test]
    fn test_classify_falls_through_to_other() {
        assert_eq!(
            classify_broadcast_failure("connection reset by peer"),
            BroadcastFailureKind::Other
        );
        assert_eq!(classify_broadcast_failure(""), BroadcastFailureKind::Other);
    }

    #[test]
    fn test_single_key_authority() {
        let auth = Authority::single_key("LGRabc");
        assert_eq!(auth.weight_threshold, 1);
        assert_eq!(auth.key_auths, vec![("LGRabc".to_string(), 1)]);
        assert!(auth.account_auths.is_empty());
    }
}
