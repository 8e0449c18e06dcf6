//! CLI entry point for zotsync.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app;
mod cli;

use app::{commands, config, terminal};
use cli::{Cli, Command};

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Run completed without errors.
    Success,
    /// Run completed with per-unit errors.
    Partial,
    /// Run aborted.
    Failure,
}

impl ProcessExit {
    fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    let outcome = match run(cli).await {
        Ok(outcome) => outcome,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ProcessExit::Failure
        }
    };
    ExitCode::from(outcome.code())
}

async fn run(cli: Cli) -> Result<ProcessExit> {
    let file_config = config::load_default_file_config()?;
    let settings = config::Settings::resolve(&cli, file_config.as_ref());
    terminal::init_tracing(settings.log_level, settings.force_log_level);
    debug!(?settings, "configuration resolved");

    match &cli.command {
        Command::Connect(args) => commands::run_connect_command(&settings, args).await?,
        Command::Disconnect(args) => commands::run_disconnect_command(&settings, args).await?,
        Command::Status(args) => commands::run_status_command(&settings, args).await?,
        Command::Libraries(args) => commands::run_libraries_command(&settings, args).await?,
        Command::Sync(args) => {
            return commands::run_sync_command(&settings, file_config.as_ref(), args, cli.quiet)
                .await;
        }
    }
    Ok(ProcessExit::Success)
}
