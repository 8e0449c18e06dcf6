//! Zotsync Core Library
//!
//! Mirrors a user's Zotero libraries (personal plus groups) into a local
//! document store, incrementally and idempotently.
//!
//! # Architecture
//!
//! - [`remote`] - Zotero Web API client, pagination, retry policy
//! - [`store`] - Local document store trait and its `SQLite` implementation
//! - [`sync`] - Sync engine: reconciliation, selection, fetch, ingest, cleanup
//! - [`db`] - Database connection and schema management
//! - [`library`] - Library identity shared by all of the above

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod db;
pub mod library;
pub mod remote;
pub mod store;
pub mod sync;
mod user_agent;

// Re-export commonly used types
pub use db::{Database, DatabaseOptions, DbError};
pub use library::{Library, LibraryId, LibraryKind};
pub use remote::{
    ClientOptions, DEFAULT_MAX_RETRIES, RemoteConnector, RemoteError, RemoteLibrary, RetryPolicy,
    ZoteroClient, ZoteroConnector,
};
pub use store::{DocumentStore, SqliteStore, StoreError, SyncConnection, SyncStatus};
pub use sync::{
    CatalogLibrary, SelectionError, SyncEngine, SyncError, SyncEvent, SyncOptions, SyncPhase,
    SyncSelection, SyncStats,
};
