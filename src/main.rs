//! AH32 (阿蛤) - office assistant backend for WPS task panes
//!
//! Usage:
//!   ah32 serve                      Start the HTTP API
//!   ah32 plan check plan.json       Normalize and validate a Plan
//!   ah32 route "把这段话写到文档末尾"   Show the writeback decision
//!   ah32 session-id --path a.docx   Derive a session id
//!   ah32 --help                     Show all commands

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use ah32::cli::output::OutputMode;
use ah32::cli::{Cli, Commands};
use ah32::config::Settings;
use ah32::init::AppContext;
use ah32::server::serve;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("ah32=info".parse()?),
        )
        .init();

    let mode = OutputMode::from_json_flag(cli.json);

    match &cli.command {
        Commands::Serve => {
            let settings = Settings::load(&cli.env_file)?;
            let ctx = Arc::new(AppContext::new(settings).await?);
            serve(ctx).await?;
        }
        cmd => ah32::cli::execute(cmd, mode).await?,
    }

    Ok(())
}
