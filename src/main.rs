//! Usher operator CLI
//!
//! Escrow inspection and offline key recovery. Account-facing
//! provisioning runs embedded behind a transport layer; this binary is
//! the manual, access-controlled side of the system.

use clap::Parser;
use std::time::Duration;
use tracing::warn;

use usher::config::{Args, Command, EscrowCommand};
use usher::escrow::EscrowStore;
use usher::keys;
use usher::logging;

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args.log_level);

    if let Err(e) = args.validate() {
        anyhow::bail!("Configuration error: {e}");
    }

    let escrow = EscrowStore::new(
        &args.escrow_dir,
        Duration::from_secs(args.escrow_retention_hours * 3600),
    );

    match args.command {
        Command::Escrow(escrow_command) => run_escrow(&escrow, escrow_command),
        Command::Derive { subject, seed } => run_derive(&subject, &seed),
    }
}

fn run_escrow(escrow: &EscrowStore, command: EscrowCommand) -> anyhow::Result<()> {
    match command {
        EscrowCommand::List => {
            let summaries = escrow.list(false);
            if summaries.is_empty() {
                eprintln!("No escrow records under {}", escrow.root().display());
                return Ok(());
            }
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }

        EscrowCommand::Show { subject, reveal } => {
            if reveal {
                warn!(subject = %subject, "Revealing escrowed secret material");
            }
            let summary = escrow
                .list(reveal)
                .into_iter()
                .find(|s| s.subject_name == subject)
                .ok_or_else(|| anyhow::anyhow!("No escrow record for '{subject}'"))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        EscrowCommand::MarkDelivered {
            subject,
            correlation_id,
        } => {
            if !escrow.mark_delivered(&subject, &correlation_id) {
                anyhow::bail!("No escrow record for '{subject}'");
            }
            println!("Marked '{subject}' delivered under {correlation_id}");
        }
    }
    Ok(())
}

fn run_derive(subject: &str, seed: &str) -> anyhow::Result<()> {
    let bundle = keys::derive(subject, Some(seed))?;

    // Stdout only - derived secrets must never hit the log stream
    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}
