//! Error types for Usher
//!
//! One crate-wide enum so every operation returns the same discriminated
//! taxonomy. Each variant maps to a stable category string that the
//! transport layer can relay verbatim; messages are human-readable and
//! never carry seed or private key material.

/// Main error type for Usher operations
#[derive(Debug, thiserror::Error)]
pub enum UsherError {
    /// Malformed account name or seed; local check, never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested account name is already registered on the ledger.
    #[error("Account name is taken: {0}")]
    NameTaken(String),

    /// Session id is unknown, expired, or already used. Deliberately
    /// indistinguishable so probing clients learn nothing.
    #[error("Invalid or expired provisioning session")]
    InvalidSession,

    /// Finalize named a different account than the session reserved.
    #[error("Session was issued for a different account name")]
    SessionMismatch,

    /// Submitted public keys do not match the keys bound at prepare time.
    #[error("Submitted keys do not match the reserved key set")]
    KeyMismatch,

    /// Lost the single-use race; the session was consumed by another call.
    #[error("Provisioning session has already been used")]
    SessionAlreadyUsed,

    /// Upstream ledger failure, with the upstream detail preserved.
    #[error("Ledger broadcast failed: {0}")]
    Ledger(String),

    /// Escrow storage fault. Swallowed before the orchestrator boundary;
    /// surfaces only from the operator CLI paths.
    #[error("Escrow storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UsherError {
    /// Stable machine-readable category for wire payloads and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NameTaken(_) => "name_taken",
            Self::InvalidSession => "invalid_session",
            Self::SessionMismatch => "session_mismatch",
            Self::KeyMismatch => "key_mismatch",
            Self::SessionAlreadyUsed => "session_already_used",
            Self::Ledger(_) => "ledger_error",
            Self::Storage(_) => "storage_error",
            Self::Config(_) => "config_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// True for protocol violations the caller must not retry on the
    /// same session.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSession
                | Self::SessionMismatch
                | Self::KeyMismatch
                | Self::SessionAlreadyUsed
        )
    }
}

impl From<std::io::Error> for UsherError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for UsherError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}

/// Result type alias for Usher operations
pub type Result<T> = std::result::Result<T, UsherError>;
