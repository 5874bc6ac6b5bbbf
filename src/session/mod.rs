//! Reservation store
//!
//! Short-lived, single-use reservations binding an account name to the
//! set of public keys promised at prepare time. The store is the
//! anti-replay core: `consume` performs the exists / not-expired /
//! not-used check and the used-flag flip under one per-entry guard, so
//! two racing finalize calls on the same id resolve to exactly one
//! winner.
//!
//! All negative lookups are uniform - a missing, expired, or used id
//! looks the same from outside, so probing clients cannot learn whether
//! a reservation ever existed.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::keys::KeyRole;

/// Fixed reservation lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

/// How long a reservation survives past expiry before sweeping, for
/// post-use audit reads.
pub const DEFAULT_AUDIT_GRACE: Duration = Duration::from_secs(5 * 60);

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A pending provisioning request.
///
/// Immutable once created except for the `used` flag, which transitions
/// false -> true exactly once and never reverses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Unguessable session id (`sess_` + UUIDv4).
    pub id: String,

    /// Account name being reserved.
    pub subject_name: String,

    /// The four role public keys promised to be bound to the subject.
    pub public_keys: BTreeMap<KeyRole, String>,

    /// Operator account that will perform the ledger creation.
    pub issuer_name: String,

    /// Unix seconds.
    pub created_at: u64,

    /// Unix seconds; reservations are never consulted past this point.
    pub expires_at: u64,

    /// Single-use flag.
    pub used: bool,
}

/// Map entry pairing the reservation with a monotonic deadline, so
/// expiry checks do not depend on wall-clock moves.
struct StoredReservation {
    reservation: Reservation,
    deadline: Instant,
}

impl StoredReservation {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// In-memory reservation table.
///
/// Explicitly single-process: a multi-instance deployment must
/// externalize this behind a store with atomic conditional writes.
pub struct ReservationStore {
    sessions: DashMap<String, StoredReservation>,
    ttl: Duration,
    audit_grace: Duration,
}

impl ReservationStore {
    pub fn new(ttl: Duration, audit_grace: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            audit_grace,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SESSION_TTL, DEFAULT_AUDIT_GRACE)
    }

    /// Allocate a fresh reservation binding `subject` to `public_keys`.
    pub fn create(
        &self,
        subject: &str,
        public_keys: BTreeMap<KeyRole, String>,
        issuer: &str,
    ) -> Reservation {
        let now = unix_now();
        let reservation = Reservation {
            id: format!("sess_{}", uuid::Uuid::new_v4()),
            subject_name: subject.to_string(),
            public_keys,
            issuer_name: issuer.to_string(),
            created_at: now,
            expires_at: now + self.ttl.as_secs(),
            used: false,
        };

        self.sessions.insert(
            reservation.id.clone(),
            StoredReservation {
                reservation: reservation.clone(),
                deadline: Instant::now() + self.ttl,
            },
        );

        debug!(
            session_id = %reservation.id,
            subject = %reservation.subject_name,
            "Created provisioning reservation"
        );

        reservation
    }

    /// Get a live reservation. Expired entries are removed on the way
    /// out (lazy expiry) and reported absent.
    pub fn get(&self, id: &str) -> Option<Reservation> {
        let entry = self.sessions.get(id)?;
        if entry.is_expired() {
            drop(entry);
            self.sessions.remove(id);
            return None;
        }
        Some(entry.reservation.clone())
    }

    /// True iff a live, not-yet-used reservation exists at `id` and its
    /// key set equals `public_keys` exactly, all four roles.
    pub fn matches(&self, id: &str, public_keys: &BTreeMap<KeyRole, String>) -> bool {
        match self.get(id) {
            Some(reservation) => {
                !reservation.used && reservation.public_keys == *public_keys
            }
            None => false,
        }
    }

    /// Atomically check exists / not-expired / not-used and flip the
    /// used flag. Returns false on any violation.
    ///
    /// The per-entry exclusive guard makes the check-and-flip one step,
    /// so concurrent callers on the same id see exactly one `true`.
    pub fn consume(&self, id: &str) -> bool {
        let Some(mut entry) = self.sessions.get_mut(id) else {
            return false;
        };

        if entry.is_expired() {
            drop(entry);
            self.sessions.remove(id);
            return false;
        }

        if entry.reservation.used {
            return false;
        }

        entry.reservation.used = true;
        debug!(session_id = %id, "Consumed provisioning reservation");
        true
    }

    /// Remove entries past expiry plus the audit grace window.
    ///
    /// Side-effect-only; correctness never depends on this running.
    pub fn sweep_expired(&self) -> usize {
        let cutoff = Instant::now();
        let grace = self.audit_grace;
        let mut removed = 0;

        self.sessions.retain(|_, entry| {
            if cutoff >= entry.deadline + grace {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            info!(removed, "Swept expired reservations");
        }
        removed
    }

    /// Table statistics for observability.
    pub fn stats(&self) -> ReservationStoreStats {
        let total = self.sessions.len();
        let mut expired = 0;
        let mut used = 0;
        for entry in self.sessions.iter() {
            if entry.is_expired() {
                expired += 1;
            } else if entry.reservation.used {
                used += 1;
            }
        }

        ReservationStoreStats {
            total,
            expired,
            used,
            live: total - expired - used,
        }
    }
}

impl Default for ReservationStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Reservation table statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationStoreStats {
    pub total: usize,
    pub live: usize,
    pub used: usize,
    pub expired: usize,
}
