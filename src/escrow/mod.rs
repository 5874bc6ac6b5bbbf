//! Emergency recovery cache
//!
//! Durable, restricted-permission escrow of generated key bundles.
//! Prepare hands private keys to the caller over the wire; if the
//! caller loses them (crash, dropped response), this local escrow is
//! the only recovery path. It is deliberately best-effort and
//! out-of-band from the transactional path: a storage failure is
//! logged and swallowed so escrow unavailability can never block
//! provisioning.
//!
//! One file per record, written to a `.tmp` sibling and renamed into
//! place so readers never observe a partial record. Records are never
//! deleted automatically; deletion is a manual operator action.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::keys::KeyRole;
use crate::types::Result;

/// Retention window after which records read as logically expired.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(72 * 3600);

/// Lifecycle of an escrow record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Written at prepare time; keys may not have reached the caller.
    Created,
    /// Finalize confirmed the caller holds the keys.
    Delivered,
    /// Past the retention window (computed at read time, never stored).
    Expired,
}

/// Advisory request context captured alongside the bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub trace_id: Option<String>,
}

/// Durable escrow copy of a key bundle tied to one provisioning attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyRecord {
    pub subject_name: String,

    /// Session id at creation; replaced by the ledger transaction id
    /// when marked delivered.
    pub correlation_id: String,

    pub created_at: DateTime<Utc>,
    pub status: EscrowStatus,

    pub seed: String,
    pub private_keys: BTreeMap<KeyRole, String>,
    pub public_keys: BTreeMap<KeyRole, String>,

    pub request_metadata: RequestMetadata,
}

/// Listing view of a record. Secret material is included only on
/// explicit request.
#[derive(Debug, Clone, Serialize)]
pub struct EscrowSummary {
    pub subject_name: String,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub status: EscrowStatus,
    pub age_hours: f64,
    pub expired: bool,
    pub public_keys: BTreeMap<KeyRole, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_keys: Option<BTreeMap<KeyRole, String>>,
}

/// Filesystem-backed escrow store.
pub struct EscrowStore {
    root: PathBuf,
    retention: Duration,
}

impl EscrowStore {
    pub fn new(root: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            root: root.into(),
            retention,
        }
    }

    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        Self::new(root, DEFAULT_RETENTION)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append a record. Never propagates errors outward - failures are
    /// logged and swallowed so the primary provisioning path cannot be
    /// blocked by escrow trouble.
    pub fn store(&self, record: &EmergencyRecord) {
        match self.store_inner(record) {
            Ok(path) => {
                debug!(
                    subject = %record.subject_name,
                    path = %path.display(),
                    "Escrowed key bundle"
                );
            }
            Err(e) => {
                error!(
                    subject = %record.subject_name,
                    error = %e,
                    "Failed to escrow key bundle; provisioning continues without recovery copy"
                );
            }
        }
    }

    fn store_inner(&self, record: &EmergencyRecord) -> Result<PathBuf> {
        self.ensure_root()?;

        let path = self.root.join(Self::file_name(record));
        self.write_record(&path, record)?;
        Ok(path)
    }

    /// Filename: compact UTC timestamp + subject, sortable and
    /// collision-resistant across concurrent writers.
    fn file_name(record: &EmergencyRecord) -> String {
        format!(
            "{}_{}.json",
            record.created_at.format("%Y%m%dT%H%M%S%.6fZ"),
            record.subject_name
        )
    }

    fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.root, fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    fn write_record(&self, path: &Path, record: &EmergencyRecord) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(record)?;
        fs::write(&tmp, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// All parseable record files newest-first. Mid-write or corrupt
    /// files are treated as absent.
    fn load_all(&self) -> Vec<(PathBuf, EmergencyRecord)> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();

        // Timestamp-prefixed names sort chronologically
        files.sort();
        files.reverse();

        files
            .into_iter()
            .filter_map(|path| match fs::read(&path) {
                Ok(bytes) => match serde_json::from_slice::<EmergencyRecord>(&bytes) {
                    Ok(record) => Some((path, record)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable escrow record");
                        None
                    }
                },
                Err(_) => None,
            })
            .collect()
    }

    fn age_of(&self, record: &EmergencyRecord) -> Duration {
        (Utc::now() - record.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn is_past_retention(&self, record: &EmergencyRecord) -> bool {
        self.age_of(record) > self.retention
    }

    /// Most recent record for `subject`. Records past the retention
    /// window are returned with status `Expired` (the file itself is
    /// untouched); delivery is a terminal fact and is never downgraded.
    pub fn retrieve(&self, subject: &str) -> Option<EmergencyRecord> {
        let (_, mut record) = self
            .load_all()
            .into_iter()
            .find(|(_, r)| r.subject_name == subject)?;

        if record.status == EscrowStatus::Created && self.is_past_retention(&record) {
            record.status = EscrowStatus::Expired;
        }
        Some(record)
    }

    /// Flip the newest record for `subject` to delivered and stamp the
    /// ledger transaction id as its correlation id. Idempotent:
    /// re-marking an already-delivered record is a no-op, not an error.
    ///
    /// Returns true if a matching record exists.
    pub fn mark_delivered(&self, subject: &str, correlation_id: &str) -> bool {
        let Some((path, mut record)) = self
            .load_all()
            .into_iter()
            .find(|(_, r)| r.subject_name == subject)
        else {
            return false;
        };

        if record.status == EscrowStatus::Delivered {
            return true;
        }

        record.status = EscrowStatus::Delivered;
        record.correlation_id = correlation_id.to_string();

        if let Err(e) = self.write_record(&path, &record) {
            error!(
                subject = %subject,
                error = %e,
                "Failed to mark escrow record delivered"
            );
            return false;
        }

        debug!(subject = %subject, correlation_id = %correlation_id, "Marked escrow record delivered");
        true
    }

    /// Record summaries newest-first, annotated with age and an
    /// expired flag when past the retention window.
    pub fn list(&self, include_secrets: bool) -> Vec<EscrowSummary> {
        self.load_all()
            .into_iter()
            .map(|(_, record)| {
                let age = self.age_of(&record);
                EscrowSummary {
                    subject_name: record.subject_name,
                    correlation_id: record.correlation_id,
                    created_at: record.created_at,
                    status: record.status,
                    age_hours: age.as_secs_f64() / 3600.0,
                    expired: age > self.retention,
                    public_keys: record.public_keys,
                    seed: include_secrets.then_some(record.seed),
                    private_keys: include_secrets.then_some(record.private_keys),
                }
            })
            .collect()
    }
}
