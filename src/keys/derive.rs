//! Deterministic role-key derivation.
//!
//! Each role key is the SHA-256 digest of `seed || subject || role`,
//! used directly as an Ed25519 signing-key seed. Determinism is
//! load-bearing: Finalize trusts a client-submitted seed against a
//! previously issued bundle precisely because the same
//! `(seed, subject, role)` triple always yields the same keypair.

use std::collections::BTreeMap;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::types::{Result, UsherError};

use super::codec::{encode_private_key, encode_public_key};
use super::{KeyBundle, KeyRole};

/// Version of the derivation input layout. Bumped if the
/// `seed || subject || role` concatenation ever changes.
pub const DERIVATION_VERSION: u32 = 1;

/// Entropy pulled for a generated seed, before encoding.
const SEED_ENTROPY_LEN: usize = 32;

/// Ledger account-name length bounds.
const SUBJECT_MIN_LEN: usize = 3;
const SUBJECT_MAX_LEN: usize = 16;

/// Generate a fresh high-entropy seed from the OS RNG.
///
/// Format: `P` + 64 hex chars (32 random bytes).
pub fn generate_seed() -> String {
    let mut entropy = [0u8; SEED_ENTROPY_LEN];
    OsRng.fill_bytes(&mut entropy);
    let seed = format!("P{}", hex::encode(entropy));
    entropy.zeroize();
    seed
}

/// Check a subject name against the ledger's account-name rules.
///
/// Names are 3-16 chars of dot-separated segments; each segment starts
/// with a lowercase letter, continues with `[a-z0-9-]`, ends with an
/// alphanumeric, contains no double dash, and is at least 3 chars long.
pub fn validate_subject_name(subject: &str) -> Result<()> {
    if subject.len() < SUBJECT_MIN_LEN || subject.len() > SUBJECT_MAX_LEN {
        return Err(UsherError::InvalidInput(format!(
            "Account name must be {SUBJECT_MIN_LEN}-{SUBJECT_MAX_LEN} characters"
        )));
    }

    for segment in subject.split('.') {
        if segment.len() < SUBJECT_MIN_LEN {
            return Err(UsherError::InvalidInput(
                "Each account name segment must be at least 3 characters".into(),
            ));
        }
        let bytes = segment.as_bytes();
        if !bytes[0].is_ascii_lowercase() {
            return Err(UsherError::InvalidInput(
                "Account name segments must start with a letter".into(),
            ));
        }
        if !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
            return Err(UsherError::InvalidInput(
                "Account name segments must end with a letter or digit".into(),
            ));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(UsherError::InvalidInput(
                "Account names may only contain a-z, 0-9, '.' and '-'".into(),
            ));
        }
        if segment.contains("--") {
            return Err(UsherError::InvalidInput(
                "Account names may not contain consecutive dashes".into(),
            ));
        }
    }

    Ok(())
}

/// Derive the complete role-key family for `subject`.
///
/// When `seed` is `None` a fresh one is generated; a caller-supplied
/// seed enables deterministic re-derivation for verification and
/// offline recovery. Malformed input fails with `InvalidInput` - this
/// never falls back to random keys silently.
pub fn derive(subject: &str, seed: Option<&str>) -> Result<KeyBundle> {
    validate_subject_name(subject)?;

    if let Some(s) = seed {
        if s.trim().is_empty() {
            return Err(UsherError::InvalidInput("Seed must not be empty".into()));
        }
    }

    let seed = seed.map(str::to_owned).unwrap_or_else(generate_seed);

    let mut private_keys = BTreeMap::new();
    let mut public_keys = BTreeMap::new();

    for role in KeyRole::ALL {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(subject.as_bytes());
        hasher.update(role.as_str().as_bytes());
        let mut key_bytes: [u8; 32] = hasher.finalize().into();

        let signing_key = SigningKey::from_bytes(&key_bytes);
        let verifying_key = signing_key.verifying_key();

        private_keys.insert(role, encode_private_key(&key_bytes));
        public_keys.insert(role, encode_public_key(&verifying_key.to_bytes()));

        key_bytes.zeroize();
    }

    Ok(KeyBundle {
        seed,
        private_keys,
        public_keys,
    })
}

/// Prove seed custody without re-exposing private keys: re-derive and
/// compare all four public keys for exact equality.
pub fn validate(
    subject: &str,
    seed: &str,
    expected_public_keys: &BTreeMap<KeyRole, String>,
) -> Result<bool> {
    let bundle = derive(subject, Some(seed))?;

    if expected_public_keys.len() != KeyRole::ALL.len() {
        return Ok(false);
    }

    Ok(KeyRole::ALL.iter().all(|role| {
        expected_public_keys.get(role) == bundle.public_keys.get(role)
    }))
}
