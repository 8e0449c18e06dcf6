//! Subcommand handlers.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};
use zotsync_core::store::User;
use zotsync_core::{
    CatalogLibrary, Database, DocumentStore, RetryPolicy, SqliteStore, SyncEngine, SyncOptions,
    SyncSelection, SyncStats, ZoteroConnector,
};

use super::config::{FileConfig, Settings, SyncSettings};
use super::{progress, terminal};
use crate::ProcessExit;
use crate::cli::{ConnectArgs, SyncArgs, UserArgs};

async fn open_store(settings: &Settings) -> Result<SqliteStore> {
    if let Some(parent) = settings.database_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }
    let db = Database::new(&settings.database_path, &settings.database)
        .await
        .with_context(|| {
            format!("Failed to open database '{}'", settings.database_path.display())
        })?;
    Ok(SqliteStore::new(db, settings.content_dir.clone()))
}

async fn require_user(store: &SqliteStore, username: &str) -> Result<User> {
    match store.find_user_by_name(username).await? {
        Some(user) => Ok(user),
        None => bail!("Unknown user '{username}'\n  Suggestion: run `zotsync connect --user {username}` first"),
    }
}

fn engine(settings: &Settings, store: SqliteStore, options: SyncOptions) -> Result<SyncEngine> {
    let connector = ZoteroConnector::new(&settings.client).context("Invalid API settings")?;
    Ok(SyncEngine::new(Arc::new(store), Arc::new(connector), options)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

pub(crate) async fn run_connect_command(settings: &Settings, args: &ConnectArgs) -> Result<()> {
    let store = open_store(settings).await?;
    let user = store.ensure_user(&args.user).await?;
    store
        .save_connection(user.id, &args.api_key, &args.zotero_user_id.to_string())
        .await?;
    info!(user = %user.username, zotero_user_id = args.zotero_user_id, "connection saved");
    println!("Connected '{}' to Zotero user {}", user.username, args.zotero_user_id);
    Ok(())
}

pub(crate) async fn run_disconnect_command(settings: &Settings, args: &UserArgs) -> Result<()> {
    let store = open_store(settings).await?;
    let user = require_user(&store, &args.user).await?;
    if store.delete_connection(user.id).await? {
        println!("Disconnected '{}'", user.username);
    } else {
        println!("'{}' had no stored connection", user.username);
    }
    Ok(())
}

pub(crate) async fn run_status_command(settings: &Settings, args: &UserArgs) -> Result<()> {
    let store = open_store(settings).await?;
    let user = require_user(&store, &args.user).await?;
    let status = store.sync_status(user.id).await?;
    print_json(&status)
}

pub(crate) async fn run_libraries_command(settings: &Settings, args: &UserArgs) -> Result<()> {
    let store = open_store(settings).await?;
    let user = require_user(&store, &args.user).await?;
    let engine = engine(settings, store, SyncOptions::default())?;
    let catalog = engine.catalog(user.id).await?;

    let mut stdout = io::stdout().lock();
    write!(stdout, "{}", render_catalog(&catalog))?;
    Ok(())
}

/// Renders the catalog as an indented tree with selection ids.
pub(crate) fn render_catalog(catalog: &[CatalogLibrary]) -> String {
    let mut out = String::new();
    for entry in catalog {
        let id = entry.library.id;
        out.push_str(&format!("{} [{id}:ALL]\n", entry.library.name));
        for collection in &entry.collections {
            let indent = "  ".repeat(collection.depth + 1);
            out.push_str(&format!(
                "{indent}{} [{id}:{}] ({} items)\n",
                collection.name, collection.key, collection.item_count
            ));
        }
    }
    out
}

pub(crate) async fn run_sync_command(
    settings: &Settings,
    file_config: Option<&FileConfig>,
    args: &SyncArgs,
    quiet: bool,
) -> Result<ProcessExit> {
    let selection =
        SyncSelection::from_pairs(&args.select).context("Invalid --select value")?;
    let sync_settings = SyncSettings::resolve(args, file_config);
    debug!(?sync_settings, everything = selection.is_everything(), "resolved sync settings");

    let store = open_store(settings).await?;
    let user = require_user(&store, &args.user).await?;

    let options = SyncOptions {
        fetch_concurrency: sync_settings.fetch_concurrency,
        download_concurrency: sync_settings.download_concurrency,
        ingest_concurrency: sync_settings.ingest_concurrency,
        retry_policy: RetryPolicy::with_max_attempts(sync_settings.max_retries),
    };
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = engine(settings, store, options)?.with_events(tx);

    let use_spinner = terminal::should_use_spinner(
        io::stderr().is_terminal(),
        quiet,
        terminal::is_dumb_terminal(),
    );
    let progress = progress::spawn_progress_ui(use_spinner, rx);

    let result = engine.run(user.id, &selection).await;
    drop(engine);
    let _ = progress.await;

    let stats = result?;
    print_json(&stats)?;
    Ok(determine_exit_outcome(&stats))
}

/// Maps run statistics to the process exit outcome.
pub(crate) fn determine_exit_outcome(stats: &SyncStats) -> ProcessExit {
    if stats.is_clean() {
        ProcessExit::Success
    } else {
        ProcessExit::Partial
    }
}
