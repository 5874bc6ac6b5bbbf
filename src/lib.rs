//! Usher - custodial account provisioning gateway
//!
//! Provisions accounts on a federated ledger on behalf of end users
//! without ever exposing the operator's signing credential to the
//! client. The core is a two-phase protocol: Prepare derives a
//! role-scoped key bundle and issues a single-use reservation; Finalize
//! checks the client's confirmation against that reservation before the
//! operator broadcasts the creation.
//!
//! ## Modules
//!
//! - **keys**: deterministic role-key derivation and text encodings
//! - **session**: short-lived single-use reservations (anti-replay)
//! - **escrow**: durable best-effort recovery copies of issued secrets
//! - **ledger**: collaborator contracts for the broadcast-only client
//! - **provisioning**: the two-phase orchestrator
//!
//! Transport, schema validation and perimeter rate limiting live
//! outside this crate; embedders wire [`provisioning::ProvisioningService`]
//! behind whatever surface they serve.

pub mod config;
pub mod escrow;
pub mod keys;
pub mod ledger;
pub mod logging;
pub mod provisioning;
pub mod session;
pub mod types;

pub use config::Args;
pub use types::{Result, UsherError};
