//! Text encodings for key material.
//!
//! Public keys travel as `LGR` + base58(key || 4-byte SHA-256 checksum).
//! Private keys use the WIF layout: base58(0x80 || key || 4-byte
//! double-SHA-256 checksum). Both decoders verify the checksum so a
//! single flipped character is always caught.

use sha2::{Digest, Sha256};

use crate::types::{Result, UsherError};

/// Prefix identifying ledger public keys in text form.
pub const PUBLIC_KEY_PREFIX: &str = "LGR";

/// WIF version byte for private keys.
const WIF_VERSION: u8 = 0x80;

/// Checksum length appended to both encodings.
const CHECKSUM_LEN: usize = 4;

/// Raw Ed25519 key length.
const KEY_LEN: usize = 32;

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encode a 32-byte public key as `LGR` + base58(key || checksum).
pub fn encode_public_key(key: &[u8; KEY_LEN]) -> String {
    let mut payload = Vec::with_capacity(KEY_LEN + CHECKSUM_LEN);
    payload.extend_from_slice(key);
    payload.extend_from_slice(&sha256(key)[..CHECKSUM_LEN]);
    format!("{}{}", PUBLIC_KEY_PREFIX, bs58::encode(payload).into_string())
}

/// Decode a prefixed public key, verifying the checksum.
pub fn decode_public_key(encoded: &str) -> Result<[u8; KEY_LEN]> {
    let body = encoded
        .strip_prefix(PUBLIC_KEY_PREFIX)
        .ok_or_else(|| UsherError::InvalidInput("Public key missing LGR prefix".into()))?;

    let payload = bs58::decode(body)
        .into_vec()
        .map_err(|e| UsherError::InvalidInput(format!("Invalid public key encoding: {e}")))?;

    if payload.len() != KEY_LEN + CHECKSUM_LEN {
        return Err(UsherError::InvalidInput("Invalid public key length".into()));
    }

    let (key, checksum) = payload.split_at(KEY_LEN);
    if checksum != &sha256(key)[..CHECKSUM_LEN] {
        return Err(UsherError::InvalidInput("Public key checksum mismatch".into()));
    }

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(key);
    Ok(out)
}

/// Encode a 32-byte private key in WIF form.
pub fn encode_private_key(key: &[u8; KEY_LEN]) -> String {
    let mut payload = Vec::with_capacity(1 + KEY_LEN + CHECKSUM_LEN);
    payload.push(WIF_VERSION);
    payload.extend_from_slice(key);
    let checksum = sha256(&sha256(&payload));
    payload.extend_from_slice(&checksum[..CHECKSUM_LEN]);
    bs58::encode(payload).into_string()
}

/// Decode a WIF private key, verifying version byte and checksum.
pub fn decode_private_key(encoded: &str) -> Result<[u8; KEY_LEN]> {
    let payload = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| UsherError::InvalidInput(format!("Invalid private key encoding: {e}")))?;

    if payload.len() != 1 + KEY_LEN + CHECKSUM_LEN {
        return Err(UsherError::InvalidInput("Invalid private key length".into()));
    }

    let (body, checksum) = payload.split_at(1 + KEY_LEN);
    if body[0] != WIF_VERSION {
        return Err(UsherError::InvalidInput("Unknown private key version".into()));
    }

    if checksum != &sha256(&sha256(body))[..CHECKSUM_LEN] {
        return Err(UsherError::InvalidInput("Private key checksum mismatch".into()));
    }

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&body[1..]);
    Ok(out)
}
