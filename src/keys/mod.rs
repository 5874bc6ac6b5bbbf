//! Key Derivation Engine
//!
//! Turns a secret seed plus an account name into a deterministic family
//! of four role-scoped Ed25519 keypairs. The seed is the sole secret:
//! anyone holding the seed and the account name can regenerate every
//! private key for that account. That is intentional (it is what makes
//! offline recovery possible) and it is the trust boundary of this
//! module - the seed must never be logged or persisted outside the
//! escrow path.

mod codec;
mod derive;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use codec::{decode_private_key, decode_public_key, encode_private_key, encode_public_key};
pub use derive::{derive, generate_seed, validate, validate_subject_name, DERIVATION_VERSION};

/// Authority roles a ledger account carries, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    /// Can change every other key, including itself.
    Owner,
    /// Funds and account-state operations.
    Active,
    /// Content and social operations.
    Posting,
    /// Encrypts/decrypts private messaging payloads.
    Memo,
}

impl KeyRole {
    /// All roles in derivation order.
    pub const ALL: [KeyRole; 4] = [
        KeyRole::Owner,
        KeyRole::Active,
        KeyRole::Posting,
        KeyRole::Memo,
    ];

    /// Lowercase label used as the derivation-input suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRole::Owner => "owner",
            KeyRole::Active => "active",
            KeyRole::Posting => "posting",
            KeyRole::Memo => "memo",
        }
    }
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One derived identity's complete credential set.
///
/// Invariant: `public_keys[role]` is always the public half of
/// `private_keys[role]`; both maps contain exactly the four roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyBundle {
    /// The master secret this bundle was derived from.
    pub seed: String,

    /// Role -> WIF-encoded private key.
    pub private_keys: BTreeMap<KeyRole, String>,

    /// Role -> prefixed base58 public key.
    pub public_keys: BTreeMap<KeyRole, String>,
}
