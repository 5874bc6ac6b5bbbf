//! Configuration for Usher
//!
//! CLI arguments and environment variable handling using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Usher - custodial account provisioning gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "usher")]
#[command(about = "Operator tooling for the Usher provisioning gateway")]
pub struct Args {
    /// Root directory for emergency escrow records
    #[arg(long, env = "USHER_ESCROW_DIR", default_value = "./escrow")]
    pub escrow_dir: PathBuf,

    /// Operator account that performs ledger creations
    #[arg(long, env = "USHER_ISSUER")]
    pub issuer: Option<String>,

    /// Provisioning session lifetime in seconds
    #[arg(long, env = "USHER_SESSION_TTL_SECS", default_value = "900")]
    pub session_ttl_secs: u64,

    /// Escrow retention window in hours; older records read as expired
    #[arg(long, env = "USHER_ESCROW_RETENTION_HOURS", default_value = "72")]
    pub escrow_retention_hours: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Inspect and manage emergency escrow records
    #[command(subcommand)]
    Escrow(EscrowCommand),

    /// Re-derive a key family offline from a recovered seed
    Derive {
        /// Account name the keys were derived for
        subject: String,

        /// The master seed (also read from USHER_SEED)
        #[arg(long, env = "USHER_SEED", hide_env_values = true)]
        seed: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum EscrowCommand {
    /// List record summaries, newest first (no secret material)
    List,

    /// Show the most recent record for a subject
    Show {
        subject: String,

        /// Include seed and private keys in the output
        #[arg(long)]
        reveal: bool,
    },

    /// Mark a record delivered under a ledger transaction id
    MarkDelivered {
        subject: String,
        correlation_id: String,
    },
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.session_ttl_secs == 0 {
            return Err("USHER_SESSION_TTL_SECS must be greater than zero".to_string());
        }
        if self.escrow_retention_hours == 0 {
            return Err("USHER_ESCROW_RETENTION_HOURS must be greater than zero".to_string());
        }
        Ok(())
    }
}
