//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Mirror Zotero libraries into a local document store.
///
/// Zotsync copies the PDF attachments of a personal library and its group
/// libraries into a local `SQLite` catalog, keeping the collection tree.
#[derive(Parser, Debug)]
#[command(name = "zotsync")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path of the local database
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Directory that receives downloaded documents
    #[arg(long, value_name = "DIR", global = true)]
    pub content_dir: Option<PathBuf>,

    /// Zotero Web API base URL
    #[arg(long, value_name = "URL", global = true)]
    pub api_base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store Zotero credentials for a local user (creates the user if needed)
    Connect(ConnectArgs),

    /// Remove the stored Zotero credentials of a user
    Disconnect(UserArgs),

    /// Print the connection status of a user as JSON
    Status(UserArgs),

    /// List the libraries and collections a user can sync
    Libraries(UserArgs),

    /// Run a sync
    Sync(SyncArgs),
}

#[derive(Args, Debug)]
pub struct UserArgs {
    /// Local user name
    #[arg(short, long)]
    pub user: String,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Local user name
    #[arg(short, long)]
    pub user: String,

    /// Zotero API key
    #[arg(long)]
    pub api_key: String,

    /// Numeric Zotero user id
    #[arg(long, value_parser = clap::value_parser!(u64))]
    pub zotero_user_id: u64,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Local user name
    #[arg(short, long)]
    pub user: String,

    /// Collections to sync as LIBRARY:KEY or LIBRARY:ALL (repeatable; default: everything)
    #[arg(short, long = "select", value_name = "LIB:KEY")]
    pub select: Vec<String>,

    /// Concurrent children fetches (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub fetch_concurrency: Option<u8>,

    /// Concurrent downloads (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub download_concurrency: Option<u8>,

    /// Concurrent document ingestions (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub ingest_concurrency: Option<u8>,

    /// Maximum attempts per remote call (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_sync_defaults() {
        let cli = Cli::try_parse_from(["zotsync", "sync", "--user", "alice"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
        let Command::Sync(args) = cli.command else {
            panic!("expected sync command");
        };
        assert_eq!(args.user, "alice");
        assert!(args.select.is_empty());
        assert_eq!(args.fetch_concurrency, None);
        assert_eq!(args.max_retries, None);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "zotsync", "status", "-u", "alice", "-vv", "--db", "/tmp/z.db",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/z.db")));
    }

    #[test]
    fn test_cli_sync_selection_is_repeatable() {
        let cli = Cli::try_parse_from([
            "zotsync",
            "sync",
            "-u",
            "alice",
            "--select",
            "personal:ABCD1234",
            "-s",
            "42:ALL",
        ])
        .unwrap();
        let Command::Sync(args) = cli.command else {
            panic!("expected sync command");
        };
        assert_eq!(args.select, vec!["personal:ABCD1234", "42:ALL"]);
    }

    #[test]
    fn test_cli_concurrency_range_enforced() {
        let result = Cli::try_parse_from([
            "zotsync",
            "sync",
            "-u",
            "alice",
            "--fetch-concurrency",
            "0",
        ]);
        assert!(result.is_err());

        let result = Cli::try_parse_from([
            "zotsync",
            "sync",
            "-u",
            "alice",
            "--download-concurrency",
            "101",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_max_retries_range_enforced() {
        let result = Cli::try_parse_from(["zotsync", "sync", "-u", "a", "--max-retries", "11"]);
        assert!(result.is_err());
        let cli = Cli::try_parse_from(["zotsync", "sync", "-u", "a", "-r", "0"]).unwrap();
        let Command::Sync(args) = cli.command else {
            panic!("expected sync command");
        };
        assert_eq!(args.max_retries, Some(0));
    }

    #[test]
    fn test_cli_connect_requires_numeric_user_id() {
        let result = Cli::try_parse_from([
            "zotsync",
            "connect",
            "-u",
            "alice",
            "--api-key",
            "k",
            "--zotero-user-id",
            "abc",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_subcommand_is_required() {
        let result = Cli::try_parse_from(["zotsync"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["zotsync", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Cli::try_parse_from(["zotsync", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
