//! CLI interface for AH32.

pub mod handlers;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::memory::DocumentIdentity;
use output::OutputMode;

/// AH32 (阿蛤) - office assistant backend for WPS task panes
#[derive(Parser)]
#[command(name = "ah32", version, about, long_about = None)]
pub struct Cli {
    /// Required env file with provider settings
    #[arg(long, env = "AH32_ENV_FILE", default_value = ".env", global = true)]
    pub env_file: PathBuf,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API
    Serve,

    /// Plan utilities
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },

    /// Show the writeback routing decision for a message
    Route {
        /// The chat message
        message: String,
        /// Host application (wps, et, wpp)
        #[arg(long, default_value = "wps")]
        host: String,
        /// Prior conversation text, for continuation detection
        #[arg(long)]
        prior: Option<String>,
    },

    /// Derive the deterministic session id for a document
    SessionId {
        /// Full document path
        #[arg(long)]
        path: Option<String>,
        /// Host-assigned document id
        #[arg(long)]
        doc_id: Option<String>,
        /// Document name
        #[arg(long)]
        name: Option<String>,
        /// Host application
        #[arg(long)]
        host: Option<String>,
        /// Client id
        #[arg(long)]
        client: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Normalize and validate a Plan file
    Check {
        /// File with Plan JSON or model output containing a fenced Plan
        file: PathBuf,
        /// Expected host application
        #[arg(long)]
        host: Option<String>,
    },
}

/// Run an offline command. `serve` is handled in main.
pub async fn execute(command: &Commands, mode: OutputMode) -> anyhow::Result<()> {
    match command {
        Commands::Serve => unreachable!("serve handled in main"),
        Commands::Plan {
            command: PlanCommands::Check { file, host },
        } => handlers::plan::handle_plan_check(file, host.as_deref(), mode).await?,
        Commands::Route {
            message,
            host,
            prior,
        } => handlers::route::handle_route(message, host, prior.as_deref(), mode)?,
        Commands::SessionId {
            path,
            doc_id,
            name,
            host,
            client,
        } => {
            let document = DocumentIdentity {
                file_identity: None,
                path: path.clone(),
                doc_id: doc_id.clone(),
                name: name.clone(),
            };
            handlers::session::handle_session_id(document, host.as_deref(), client.as_deref(), mode)?
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plan_check() {
        let cli = Cli::try_parse_from(["ah32", "--json", "plan", "check", "plan.json", "--host", "et"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Plan {
                command: PlanCommands::Check { file, host },
            } => {
                assert_eq!(file, PathBuf::from("plan.json"));
                assert_eq!(host.as_deref(), Some("et"));
            }
            _ => panic!("expected plan check"),
        }
    }
}
