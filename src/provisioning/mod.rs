//! Provisioning orchestrator
//!
//! Two-phase account provisioning:
//!
//! ```text
//! Prepare(subject)  -> availability check
//!                   -> derive role-key bundle
//!                   -> reservation (single-use, 15 min)
//!                   -> escrow copy (best effort)
//!                   -> private keys + session handle to caller
//!
//! Finalize(session) -> uniform reject on missing/expired session
//!                   -> subject and key-set must match the reservation
//!                   -> atomic consume (anti-replay)
//!                   -> ledger broadcast (the one irreversible step)
//!                   -> escrow marked delivered, tx id returned
//! ```
//!
//! A used session can never be replayed, even after a downstream
//! broadcast failure - recovery is a fresh Prepare.

mod service;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::keys::KeyRole;

pub use service::ProvisioningService;

/// Result of a successful Prepare: the only point at which private
/// keys ever leave the process.
#[derive(Debug, Clone, Serialize)]
pub struct PrepareReceipt {
    pub subject_name: String,

    /// Master secret; with the subject name it regenerates every key.
    pub seed: String,

    pub private_keys: BTreeMap<KeyRole, String>,
    pub public_keys: BTreeMap<KeyRole, String>,

    /// Handle to present at finalize time.
    pub session_id: String,

    /// Unix seconds after which the session is void.
    pub expires_at: u64,
}

/// Client confirmation submitted in phase two.
#[derive(Debug, Clone, Deserialize)]
pub struct FinalizeRequest {
    pub session_id: String,
    pub subject_name: String,

    /// Must equal the reserved key set exactly, all four roles.
    pub public_keys: BTreeMap<KeyRole, String>,

    /// Optional custody proof: the seed is re-derived against the
    /// reserved keys when present.
    pub seed: Option<String>,
}

/// Result of a successful Finalize or direct creation.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeReceipt {
    pub subject_name: String,

    /// Ledger transaction id of the creation operation.
    pub transaction_id: String,
}
