//! The provisioning service tying derivation, reservations, escrow and
//! the ledger collaborator together.

use std::sync::Arc;

use tracing::{info, warn};

use crate::escrow::{EmergencyRecord, EscrowStatus, EscrowStore, RequestMetadata};
use crate::keys::{self, KeyRole};
use crate::ledger::{
    classify_broadcast_failure, Authority, BroadcastFailureKind, CreateAccountRequest,
    LedgerClient, LedgerError,
};
use crate::session::{ReservationStore, ReservationStoreStats};
use crate::types::{Result, UsherError};

use super::{FinalizeReceipt, FinalizeRequest, PrepareReceipt};

/// Two-phase provisioning orchestrator.
pub struct ProvisioningService {
    sessions: Arc<ReservationStore>,
    escrow: Arc<EscrowStore>,
    ledger: Arc<dyn LedgerClient>,
    issuer_name: String,
}

impl ProvisioningService {
    pub fn new(
        sessions: Arc<ReservationStore>,
        escrow: Arc<EscrowStore>,
        ledger: Arc<dyn LedgerClient>,
        issuer_name: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            escrow,
            ledger,
            issuer_name: issuer_name.into(),
        }
    }

    /// Phase one: derive a key bundle, reserve the name, escrow the
    /// secrets, return everything the client needs to finalize later.
    pub async fn prepare(
        &self,
        subject: &str,
        metadata: RequestMetadata,
    ) -> Result<PrepareReceipt> {
        keys::validate_subject_name(subject)?;

        if self.check_exists(subject).await? {
            return Err(UsherError::NameTaken(subject.to_string()));
        }

        let bundle = keys::derive(subject, None)?;

        let reservation =
            self.sessions
                .create(subject, bundle.public_keys.clone(), &self.issuer_name);

        // Best effort: escrow trouble must never block provisioning
        self.escrow.store(&EmergencyRecord {
            subject_name: subject.to_string(),
            correlation_id: reservation.id.clone(),
            created_at: chrono::Utc::now(),
            status: EscrowStatus::Created,
            seed: bundle.seed.clone(),
            private_keys: bundle.private_keys.clone(),
            public_keys: bundle.public_keys.clone(),
            request_metadata: metadata,
        });

        info!(
            subject = %subject,
            session_id = %reservation.id,
            expires_at = reservation.expires_at,
            "Prepared account provisioning"
        );

        Ok(PrepareReceipt {
            subject_name: subject.to_string(),
            seed: bundle.seed,
            private_keys: bundle.private_keys,
            public_keys: bundle.public_keys,
            session_id: reservation.id,
            expires_at: reservation.expires_at,
        })
    }

    /// Phase two: validate the confirmation against the reservation,
    /// consume it, and broadcast the creation.
    pub async fn finalize(&self, request: FinalizeRequest) -> Result<FinalizeReceipt> {
        // Missing and expired ids are indistinguishable by design. A
        // used session still resolves here and fails at consume, so a
        // replay reports SessionAlreadyUsed rather than the uniform
        // negative.
        let reservation = self
            .sessions
            .get(&request.session_id)
            .ok_or(UsherError::InvalidSession)?;

        if reservation.subject_name != request.subject_name {
            return Err(UsherError::SessionMismatch);
        }

        // Binds the finalize call to the exact bundle issued at prepare
        // time; any substituted key fails byte-for-byte comparison.
        if reservation.public_keys != request.public_keys {
            return Err(UsherError::KeyMismatch);
        }

        if let Some(seed) = &request.seed {
            if !keys::validate(&request.subject_name, seed, &reservation.public_keys)? {
                return Err(UsherError::KeyMismatch);
            }
        }

        if !self.sessions.consume(&request.session_id) {
            return Err(UsherError::SessionAlreadyUsed);
        }

        let ledger_request = CreateAccountRequest {
            issuer: self.issuer_name.clone(),
            new_account_name: request.subject_name.clone(),
            owner: Authority::single_key(&reservation.public_keys[&KeyRole::Owner]),
            active: Authority::single_key(&reservation.public_keys[&KeyRole::Active]),
            posting: Authority::single_key(&reservation.public_keys[&KeyRole::Posting]),
            memo_key: reservation.public_keys[&KeyRole::Memo].clone(),
            json_metadata: "{}".to_string(),
        };

        let transaction_id = match self.ledger.broadcast_create_account(ledger_request).await {
            Ok(tx) => tx,
            Err(e) => {
                // The session stays consumed: a used session cannot be
                // replayed even after a downstream failure. The caller
                // retries via a fresh Prepare.
                warn!(
                    subject = %request.subject_name,
                    session_id = %request.session_id,
                    error = %e,
                    "Broadcast failed after session consumption"
                );
                return Err(self.map_broadcast_failure(&request.subject_name, e));
            }
        };

        if !self
            .escrow
            .mark_delivered(&request.subject_name, &transaction_id)
        {
            warn!(
                subject = %request.subject_name,
                "No escrow record to mark delivered"
            );
        }

        info!(
            subject = %request.subject_name,
            transaction_id = %transaction_id,
            "Account provisioned"
        );

        Ok(FinalizeReceipt {
            subject_name: request.subject_name,
            transaction_id,
        })
    }

    /// One-phase compatibility mode: caller supplies its own
    /// authorities, no server-generated keys, no escrow, no session.
    pub async fn create_account_direct(
        &self,
        subject: &str,
        owner: Authority,
        active: Authority,
        posting: Authority,
        memo_key: String,
        json_metadata: String,
    ) -> Result<FinalizeReceipt> {
        keys::validate_subject_name(subject)?;

        if self.check_exists(subject).await? {
            return Err(UsherError::NameTaken(subject.to_string()));
        }

        let request = CreateAccountRequest {
            issuer: self.issuer_name.clone(),
            new_account_name: subject.to_string(),
            owner,
            active,
            posting,
            memo_key,
            json_metadata,
        };

        let transaction_id = self
            .ledger
            .broadcast_create_account(request)
            .await
            .map_err(|e| self.map_broadcast_failure(subject, e))?;

        info!(
            subject = %subject,
            transaction_id = %transaction_id,
            "Account created (direct mode)"
        );

        Ok(FinalizeReceipt {
            subject_name: subject.to_string(),
            transaction_id,
        })
    }

    async fn check_exists(&self, subject: &str) -> Result<bool> {
        self.ledger
            .account_exists(subject)
            .await
            .map_err(|e| UsherError::Ledger(e.to_string()))
    }

    fn map_broadcast_failure(&self, subject: &str, error: LedgerError) -> UsherError {
        match classify_broadcast_failure(&error.message) {
            BroadcastFailureKind::AccountExists => UsherError::NameTaken(subject.to_string()),
            BroadcastFailureKind::InsufficientResourceCredits | BroadcastFailureKind::Other => {
                UsherError::Ledger(error.message)
            }
        }
    }

    /// Reservation table statistics.
    pub fn session_stats(&self) -> ReservationStoreStats {
        self.sessions.stats()
    }

    /// Sweep expired reservations; returns the number removed.
    pub fn sweep_sessions(&self) -> usize {
        self.sessions.sweep_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Scriptable in-memory ledger.
    struct MockLedger {
        existing: Mutex<HashSet<String>>,
        broadcast_failure: Mutex<Option<String>>,
        broadcasts: Mutex<Vec<CreateAccountRequest>>,
    }

    impl MockLedger {
        fn new() -> Self {
            Self {
                existing: Mutex::new(HashSet::new()),
                broadcast_failure: Mutex::new(None),
                broadcasts: Mutex::new(Vec::new()),
            }
        }

        fn with_existing(name: &str) -> Self {
            let ledger = Self::new();
            ledger.existing.lock().unwrap().insert(name.to_string());
            ledger
        }

        fn fail_broadcasts(&self, message: &str) {
            *self.broadcast_failure.lock().unwrap() = Some(message.to_string());
        }

        fn broadcast_count(&self) -> usize {
            self.broadcasts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LedgerClient for MockLedger {
        async fn account_exists(&self, name: &str) -> std::result::Result<bool, LedgerError> {
            Ok(self.existing.lock().unwrap().contains(name))
        }

        async fn broadcast_create_account(
            &self,
            request: CreateAccountRequest,
        ) -> std::result::Result<String, LedgerError> {
            if let Some(message) = self.broadcast_failure.lock().unwrap().clone() {
                return Err(LedgerError::new(message));
            }
            let mut broadcasts = self.broadcasts.lock().unwrap();
            broadcasts.push(request);
            Ok(format!("tx_{:08x}", broadcasts.len()))
        }
    }

    struct Harness {
        service: ProvisioningService,
        ledger: Arc<MockLedger>,
        escrow: Arc<EscrowStore>,
        _dir: tempfile::TempDir,
    }

    fn harness_with_ledger(ledger: MockLedger) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(ledger);
        let escrow = Arc::new(EscrowStore::with_defaults(dir.path()));
        let service = ProvisioningService::new(
            Arc::new(ReservationStore::with_defaults()),
            Arc::clone(&escrow),
            Arc::clone(&ledger) as Arc<dyn LedgerClient>,
            "operator",
        );
        Harness {
            service,
            ledger,
            escrow,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_with_ledger(MockLedger::new())
    }

    fn finalize_request_from(receipt: &PrepareReceipt) -> FinalizeRequest {
        FinalizeRequest {
            session_id: receipt.session_id.clone(),
            subject_name: receipt.subject_name.clone(),
            public_keys: receipt.public_keys.clone(),
            seed: None,
        }
    }

    #[tokio::test]
    async fn test_prepare_returns_bundle_and_session() {
        let h = harness();

        let receipt = h
            .service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap();

        assert_eq!(receipt.subject_name, "skateuser");
        assert_eq!(receipt.private_keys.len(), 4);
        assert_eq!(receipt.public_keys.len(), 4);
        assert!(receipt.session_id.starts_with("sess_"));

        // Escrow holds a copy correlated by session id
        let record = h.escrow.retrieve("skateuser").unwrap();
        assert_eq!(record.correlation_id, receipt.session_id);
        assert_eq!(record.status, EscrowStatus::Created);
        assert_eq!(record.public_keys, receipt.public_keys);
    }

    #[tokio::test]
    async fn test_prepare_rejects_taken_name() {
        let h = harness_with_ledger(MockLedger::with_existing("skateuser"));

        let err = h
            .service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UsherError::NameTaken(_)));
    }

    #[tokio::test]
    async fn test_prepare_rejects_malformed_name() {
        let h = harness();

        let err = h
            .service
            .prepare("Bad_Name", RequestMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UsherError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_prepare_survives_escrow_failure() {
        // Escrow root occupied by a file: every store fails internally
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("blocked");
        std::fs::write(&bogus, b"occupied").unwrap();

        let ledger = Arc::new(MockLedger::new());
        let service = ProvisioningService::new(
            Arc::new(ReservationStore::with_defaults()),
            Arc::new(EscrowStore::with_defaults(&bogus)),
            ledger as Arc<dyn LedgerClient>,
            "operator",
        );

        let receipt = service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap();
        assert_eq!(receipt.private_keys.len(), 4);
    }

    #[tokio::test]
    async fn test_full_two_phase_flow() {
        let h = harness();

        let receipt = h
            .service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap();

        let outcome = h
            .service
            .finalize(finalize_request_from(&receipt))
            .await
            .unwrap();

        assert_eq!(outcome.subject_name, "skateuser");
        assert!(outcome.transaction_id.starts_with("tx_"));

        // Broadcast carried the reserved keys as single-key authorities
        let broadcasts = h.ledger.broadcasts.lock().unwrap();
        let request = &broadcasts[0];
        assert_eq!(request.issuer, "operator");
        assert_eq!(
            request.owner.key_auths[0].0,
            receipt.public_keys[&KeyRole::Owner]
        );
        assert_eq!(request.memo_key, receipt.public_keys[&KeyRole::Memo]);
        drop(broadcasts);

        // Escrow record flipped to delivered with the tx id
        let record = h.escrow.retrieve("skateuser").unwrap();
        assert_eq!(record.status, EscrowStatus::Delivered);
        assert_eq!(record.correlation_id, outcome.transaction_id);
    }

    #[tokio::test]
    async fn test_finalize_replay_fails_session_already_used() {
        let h = harness();

        let receipt = h
            .service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap();

        h.service
            .finalize(finalize_request_from(&receipt))
            .await
            .unwrap();

        let err = h
            .service
            .finalize(finalize_request_from(&receipt))
            .await
            .unwrap_err();
        assert!(matches!(err, UsherError::SessionAlreadyUsed));
        assert_eq!(h.ledger.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn test_finalize_rejects_unknown_session() {
        let h = harness();

        let receipt = h
            .service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap();

        let mut request = finalize_request_from(&receipt);
        request.session_id = "sess_never-issued".to_string();

        let err = h.service.finalize(request).await.unwrap_err();
        assert!(matches!(err, UsherError::InvalidSession));
    }

    #[tokio::test]
    async fn test_finalize_rejects_subject_mismatch() {
        let h = harness();

        let receipt = h
            .service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap();

        let mut request = finalize_request_from(&receipt);
        request.subject_name = "otheruser".to_string();

        let err = h.service.finalize(request).await.unwrap_err();
        assert!(matches!(err, UsherError::SessionMismatch));
    }

    #[tokio::test]
    async fn test_finalize_rejects_substituted_key() {
        let h = harness();

        let receipt = h
            .service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap();

        let mut request = finalize_request_from(&receipt);
        let posting = request.public_keys.get_mut(&KeyRole::Posting).unwrap();
        posting.pop();
        posting.push('X');

        let err = h.service.finalize(request).await.unwrap_err();
        assert!(matches!(err, UsherError::KeyMismatch));
        assert_eq!(h.ledger.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn test_finalize_with_seed_proof() {
        let h = harness();

        let receipt = h
            .service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap();

        let mut request = finalize_request_from(&receipt);
        request.seed = Some(receipt.seed.clone());

        assert!(h.service.finalize(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_finalize_rejects_wrong_seed_proof() {
        let h = harness();

        let receipt = h
            .service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap();

        let mut request = finalize_request_from(&receipt);
        request.seed = Some("Pnot-the-seed".to_string());

        let err = h.service.finalize(request).await.unwrap_err();
        assert!(matches!(err, UsherError::KeyMismatch));
    }

    #[tokio::test]
    async fn test_broadcast_failure_consumes_session() {
        let h = harness();

        let receipt = h
            .service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap();

        h.ledger.fail_broadcasts("rpc connection reset");

        let err = h
            .service
            .finalize(finalize_request_from(&receipt))
            .await
            .unwrap_err();
        assert!(matches!(err, UsherError::Ledger(_)));

        // No retry via the same session, even after upstream failure
        let err = h
            .service
            .finalize(finalize_request_from(&receipt))
            .await
            .unwrap_err();
        assert!(matches!(err, UsherError::SessionAlreadyUsed));
    }

    #[tokio::test]
    async fn test_broadcast_already_exists_maps_to_name_taken() {
        let h = harness();

        let receipt = h
            .service
            .prepare("skateuser", RequestMetadata::default())
            .await
            .unwrap();

        h.ledger.fail_broadcasts("account skateuser already exists");

        let err = h
            .service
            .finalize(finalize_request_from(&receipt))
            .await
            .unwrap_err();
        assert!(matches!(err, UsherError::NameTaken(_)));
    }

    #[tokio::test]
    async fn test_direct_mode() {
        let h = harness();

        let outcome = h
            .service
            .create_account_direct(
                "skateuser",
                Authority::single_key("LGRowner"),
                Authority::single_key("LGRactive"),
                Authority::single_key("LGRposting"),
                "LGRmemo".to_string(),
                "{}".to_string(),
            )
            .await
            .unwrap();

        assert!(outcome.transaction_id.starts_with("tx_"));

        // No session, no escrow in direct mode
        assert_eq!(h.service.session_stats().total, 0);
        assert!(h.escrow.retrieve("skateuser").is_none());
    }

    #[tokio::test]
    async fn test_direct_mode_rejects_taken_name() {
        let h = harness_with_ledger(MockLedger::with_existing("skateuser"));

        let err = h
            .service
            .create_account_direct(
                "skateuser",
                Authority::single_key("LGRowner"),
                Authority::single_key("LGRactive"),
                Authority::single_key("LGRposting"),
                "LGRmemo".to_string(),
                "{}".to_string(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UsherError::NameTaken(_)));
    }
}
