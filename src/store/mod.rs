//! Local document store.
//!
//! The sync engine only talks to the [`DocumentStore`] trait. [`SqliteStore`]
//! is the shipped implementation: rows in `SQLite`, document bytes on disk.
//!
//! The store owns two race resolutions the engine relies on:
//! - collection get-or-create keyed by `(library, remote_key)`
//! - the `documents.remote_key` UNIQUE constraint (dedup key)

mod error;
mod filename;
mod sqlite;

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::FromRow;

pub use error::{DbErrorKind, Result, StoreError};
pub use filename::{content_filename, document_filename, sanitize_filename, write_unique_file};
pub use sqlite::SqliteStore;

use crate::library::LibraryId;

/// A local user.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// Stored remote credentials for a user.
#[derive(Clone, PartialEq, Eq, FromRow)]
pub struct SyncConnection {
    /// Owning local user.
    pub user_id: i64,
    /// Remote API key.
    pub api_key: String,
    /// Remote account id (numeric, as text).
    pub remote_user_id: String,
    /// UTC timestamp of the last completed sync, `YYYY-MM-DD HH:MM:SS`.
    pub last_synced_at: Option<String>,
}

impl fmt::Debug for SyncConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConnection")
            .field("user_id", &self.user_id)
            .field("api_key", &"<redacted>")
            .field("remote_user_id", &self.remote_user_id)
            .field("last_synced_at", &self.last_synced_at)
            .finish()
    }
}

/// Access level on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    View,
    Edit,
    Manage,
}

impl Permission {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "VIEW",
            Self::Edit => "EDIT",
            Self::Manage => "MANAGE",
        }
    }
}

/// A local collection row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LocalCollection {
    pub id: i64,
    pub library_id: String,
    pub remote_key: Option<String>,
    pub name: String,
    pub parent_id: Option<i64>,
}

/// A local document row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LocalDocument {
    pub id: i64,
    pub title: String,
    pub collection_id: i64,
    pub ingested_by: i64,
    pub remote_key: String,
    pub filename: String,
    pub content_path: String,
    pub byte_size: i64,
}

/// Desired state of a local collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    /// Library the collection mirrors.
    pub library_id: LibraryId,
    /// Remote collection key; `None` for local-only collections (Unfiled).
    pub remote_key: Option<String>,
    /// Display name.
    pub name: String,
    /// Local parent collection.
    pub parent_id: Option<i64>,
}

/// Result of [`DocumentStore::upsert_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertedCollection {
    /// Local collection id.
    pub id: i64,
    /// True when the row was inserted by this call.
    pub created: bool,
}

/// A document to ingest.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Dedup key (remote attachment key).
    pub remote_key: String,
    pub title: String,
    pub collection_id: i64,
    pub ingested_by: i64,
    /// Library the attachment came from; selects the content subdirectory.
    pub library_id: LibraryId,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Outcome of [`DocumentStore::create_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentInsert {
    /// A new document row was created.
    Created(i64),
    /// A document with the same dedup key already exists.
    AlreadyPresent,
}

/// Connection status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub connected: bool,
    pub last_synced_at: Option<String>,
}

/// Storage operations used by a sync run.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Looks up a user by id.
    async fn find_user(&self, user_id: i64) -> Result<Option<User>>;

    /// Loads the user's stored remote connection.
    async fn load_connection(&self, user_id: i64) -> Result<Option<SyncConnection>>;

    /// Stamps the connection's last-synced timestamp with the current time.
    async fn mark_synced(&self, user_id: i64) -> Result<()>;

    /// Finds or creates the collection described by `spec`, updating its
    /// name and parent in place when they changed.
    async fn upsert_collection(&self, spec: &CollectionSpec) -> Result<UpsertedCollection>;

    /// Grants `user_id` MANAGE permission on a collection (idempotent).
    async fn grant_manage(&self, collection_id: i64, user_id: i64) -> Result<()>;

    /// Returns the subset of `remote_keys` that already have a document.
    async fn existing_document_keys(&self, remote_keys: &[String]) -> Result<HashSet<String>>;

    /// Stores a document; a duplicate dedup key is reported, not an error.
    async fn create_document(&self, document: NewDocument) -> Result<DocumentInsert>;

    /// True when the collection or any descendant holds a document.
    async fn subtree_has_documents(&self, collection_id: i64) -> Result<bool>;

    /// Deletes a collection row.
    async fn delete_collection(&self, collection_id: i64) -> Result<()>;

    /// Connection status for a user.
    async fn sync_status(&self, user_id: i64) -> Result<SyncStatus>;
}
