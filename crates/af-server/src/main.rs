//! Composition root for the AgentFlow execution substrate: boots the
//! `/api/v1` HTTP daemon, or runs the audit-verify CLI with its own exit codes
//! against the same storage the daemon would use.

mod cli;
mod composition;

use af_observe::AppConfig;
use clap::Parser;
use cli::{AuditCommands, Cli, Commands};
use composition::Composition;
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("af-server: {e:#}");
            std::process::exit(2);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = AppConfig::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            af_observe::init_tracing(&config)?;
            serve(config).await?;
            Ok(0)
        }
        Commands::Audit(AuditCommands::Verify { tenant }) => verify(config, tenant).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let composition = Composition::build(&config)?;
    let state = composition.into_app_state();
    let app = af_api::router(state);

    let addr: SocketAddr = "0.0.0.0:8080".parse().expect("static address parses");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "af-server listening");

    axum::serve(listener, app).await?;
    af_observe::shutdown_tracing();
    Ok(())
}

/// Runs `Verify` standalone, without booting the HTTP daemon, and maps the
/// outcome onto the documented exit codes: 0 valid, 1 tampered or
/// infrastructure error, 2 unexpected.
async fn verify(config: AppConfig, tenant: uuid::Uuid) -> anyhow::Result<i32> {
    let composition = match Composition::build(&config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("af-server: failed to reach storage: {e:#}");
            return Ok(1);
        }
    };

    let deadline = config.audit_verify_timeout;
    let outcome = tokio::time::timeout(deadline, composition.audit.verify(tenant)).await;

    match outcome {
        Ok(Ok(result)) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.valid { 0 } else { 1 })
        }
        Ok(Err(e)) => {
            eprintln!("af-server: verification failed: {e}");
            Ok(1)
        }
        Err(_) => {
            eprintln!("af-server: verification did not complete within {deadline:?}");
            Ok(1)
        }
    }
}
