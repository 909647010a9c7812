//! Clap CLI surface for the `af-server` binary: the HTTP daemon plus the
//! audit-verify subcommand and its verification exit codes.

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "af-server", version, about = "AgentFlow execution substrate: control-plane daemon and audit tooling")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP ingress daemon (default when no subcommand is given).
    Serve,
    /// Audit hash-chain operations.
    #[command(subcommand)]
    Audit(AuditCommands),
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify a tenant's audit chain and exit 0 (valid), 1 (tampered or
    /// infrastructure error), or another code on an unexpected failure.
    Verify {
        #[arg(long)]
        tenant: Uuid,
    },
}
