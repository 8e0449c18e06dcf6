//! `SQLite` implementation of [`DocumentStore`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, instrument, warn};

use super::filename::{content_filename, write_unique_file};
use super::{
    CollectionSpec, DocumentInsert, DocumentStore, LocalCollection, LocalDocument, NewDocument,
    Permission, Result, StoreError, SyncConnection, SyncStatus, UpsertedCollection, User,
};
use crate::db::Database;
use crate::library::LibraryId;

/// Keeps `IN (...)` lists under `SQLite`'s bound-parameter limit.
const KEY_CHUNK_SIZE: usize = 500;

/// Document store backed by `SQLite` rows and files under a content directory.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
    content_dir: PathBuf,
}

impl SqliteStore {
    /// Creates a store over `db`, writing document bytes below `content_dir`.
    #[must_use]
    pub fn new(db: Database, content_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            content_dir: content_dir.into(),
        }
    }

    /// The underlying database.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Root directory of stored document bytes.
    #[must_use]
    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    /// Returns the user named `username`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn ensure_user(&self, username: &str) -> Result<User> {
        sqlx::query("INSERT INTO users (username) VALUES (?) ON CONFLICT(username) DO NOTHING")
            .bind(username)
            .execute(self.db.pool())
            .await?;
        self.find_user_by_name(username)
            .await?
            .ok_or_else(|| StoreError::not_found("user", username))
    }

    /// Looks up a user by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn find_user_by_name(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, username FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(user)
    }

    /// Stores (or replaces) a user's remote credentials.
    ///
    /// Replacing credentials keeps the last-synced timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails.
    #[instrument(skip(self, api_key))]
    pub async fn save_connection(
        &self,
        user_id: i64,
        api_key: &str,
        remote_user_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r"INSERT INTO sync_connections (user_id, api_key, remote_user_id)
              VALUES (?, ?, ?)
              ON CONFLICT(user_id) DO UPDATE SET
                  api_key = excluded.api_key,
                  remote_user_id = excluded.remote_user_id,
                  updated_at = datetime('now')",
        )
        .bind(user_id)
        .bind(api_key)
        .bind(remote_user_id)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Deletes a user's stored connection. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_connection(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sync_connections WHERE user_id = ?")
            .bind(user_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Looks up the collection mirroring `remote_key` in `library`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn find_collection(
        &self,
        library: LibraryId,
        remote_key: &str,
    ) -> Result<Option<LocalCollection>> {
        let collection = sqlx::query_as::<_, LocalCollection>(
            r"SELECT id, library_id, remote_key, name, parent_id
              FROM collections WHERE library_id = ? AND remote_key = ?",
        )
        .bind(library.to_string())
        .bind(remote_key)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(collection)
    }

    /// Lists every collection, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn list_collections(&self) -> Result<Vec<LocalCollection>> {
        let collections = sqlx::query_as::<_, LocalCollection>(
            "SELECT id, library_id, remote_key, name, parent_id FROM collections ORDER BY id",
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(collections)
    }

    /// Lists every document, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn list_documents(&self) -> Result<Vec<LocalDocument>> {
        let documents = sqlx::query_as::<_, LocalDocument>(
            r"SELECT id, title, collection_id, ingested_by, remote_key, filename, content_path, byte_size
              FROM documents ORDER BY id",
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(documents)
    }

    /// Permission held by `user_id` on a collection, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn permission(&self, collection_id: i64, user_id: i64) -> Result<Option<String>> {
        let permission: Option<(String,)> = sqlx::query_as(
            "SELECT permission FROM collection_permissions WHERE collection_id = ? AND user_id = ?",
        )
        .bind(collection_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(permission.map(|(p,)| p))
    }

    async fn insert_document_row(
        &self,
        document: &NewDocument,
        content_path: &Path,
    ) -> Result<Option<i64>> {
        let byte_size = i64::try_from(document.bytes.len()).unwrap_or(i64::MAX);
        let row = sqlx::query(
            r"INSERT INTO documents
                (title, collection_id, ingested_by, remote_key, filename, content_path, byte_size)
              VALUES (?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(remote_key) DO NOTHING
              RETURNING id",
        )
        .bind(&document.title)
        .bind(document.collection_id)
        .bind(document.ingested_by)
        .bind(&document.remote_key)
        .bind(&document.filename)
        .bind(content_path.to_string_lossy().into_owned())
        .bind(byte_size)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(|row| row.get("id")))
    }
}

async fn discard_content(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), %error, "failed to remove orphaned content file");
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, username FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(user)
    }

    async fn load_connection(&self, user_id: i64) -> Result<Option<SyncConnection>> {
        let connection = sqlx::query_as::<_, SyncConnection>(
            r"SELECT user_id, api_key, remote_user_id, last_synced_at
              FROM sync_connections WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(connection)
    }

    #[instrument(skip(self))]
    async fn mark_synced(&self, user_id: i64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE sync_connections
              SET last_synced_at = datetime('now'), updated_at = datetime('now')
              WHERE user_id = ?",
        )
        .bind(user_id)
        .execute(self.db.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("sync connection", user_id));
        }
        Ok(())
    }

    #[instrument(skip(self, spec), fields(library = %spec.library_id, remote_key = ?spec.remote_key))]
    async fn upsert_collection(&self, spec: &CollectionSpec) -> Result<UpsertedCollection> {
        let library_id = spec.library_id.to_string();
        let is_unfiled = spec.remote_key.is_none();
        let mut tx = self.db.pool().begin().await?;

        let existing: Option<(i64,)> = match &spec.remote_key {
            // The library's Unfiled collection, identified by its marker only.
            None => {
                sqlx::query_as(
                    "SELECT id FROM collections WHERE library_id = ? AND is_unfiled = 1",
                )
                .bind(&library_id)
                .fetch_optional(&mut *tx)
                .await?
            }
            Some(remote_key) => {
                let exact: Option<(i64,)> = sqlx::query_as(
                    "SELECT id FROM collections WHERE library_id = ? AND remote_key = ?",
                )
                .bind(&library_id)
                .bind(remote_key)
                .fetch_optional(&mut *tx)
                .await?;
                match exact {
                    Some(row) => Some(row),
                    // Legacy row matched by name and parent, never the Unfiled one.
                    None => {
                        sqlx::query_as(
                            r"SELECT id FROM collections
                              WHERE library_id = ? AND remote_key IS NULL AND is_unfiled = 0
                                AND name = ? AND parent_id IS ?
                              ORDER BY id LIMIT 1",
                        )
                        .bind(&library_id)
                        .bind(&spec.name)
                        .bind(spec.parent_id)
                        .fetch_optional(&mut *tx)
                        .await?
                    }
                }
            }
        };

        if let Some((id,)) = existing {
            sqlx::query(
                r"UPDATE collections
                  SET name = ?, parent_id = ?, remote_key = COALESCE(remote_key, ?),
                      updated_at = datetime('now')
                  WHERE id = ? AND (name IS NOT ? OR parent_id IS NOT ? OR remote_key IS NOT ?)",
            )
            .bind(&spec.name)
            .bind(spec.parent_id)
            .bind(&spec.remote_key)
            .bind(id)
            .bind(&spec.name)
            .bind(spec.parent_id)
            .bind(&spec.remote_key)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            debug!(id, "collection exists");
            return Ok(UpsertedCollection { id, created: false });
        }

        // A concurrent writer holding the same identity wins.
        let inserted: Option<(i64,)> = sqlx::query_as(
            r"INSERT INTO collections (library_id, remote_key, name, parent_id, is_unfiled)
              VALUES (?, ?, ?, ?, ?)
              ON CONFLICT DO NOTHING
              RETURNING id",
        )
        .bind(&library_id)
        .bind(&spec.remote_key)
        .bind(&spec.name)
        .bind(spec.parent_id)
        .bind(is_unfiled)
        .fetch_optional(&mut *tx)
        .await?;

        let result = match inserted {
            Some((id,)) => UpsertedCollection { id, created: true },
            None => {
                let (id,): (i64,) = sqlx::query_as(
                    r"SELECT id FROM collections
                      WHERE library_id = ? AND (remote_key = ? OR (? AND is_unfiled = 1))",
                )
                .bind(&library_id)
                .bind(&spec.remote_key)
                .bind(is_unfiled)
                .fetch_one(&mut *tx)
                .await?;
                UpsertedCollection { id, created: false }
            }
        };
        tx.commit().await?;
        debug!(id = result.id, created = result.created, "collection upserted");
        Ok(result)
    }

    async fn grant_manage(&self, collection_id: i64, user_id: i64) -> Result<()> {
        sqlx::query(
            r"INSERT INTO collection_permissions (collection_id, user_id, permission)
              VALUES (?, ?, ?)
              ON CONFLICT(collection_id, user_id) DO UPDATE SET permission = excluded.permission",
        )
        .bind(collection_id)
        .bind(user_id)
        .bind(Permission::Manage.as_str())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn existing_document_keys(&self, remote_keys: &[String]) -> Result<HashSet<String>> {
        let mut existing = HashSet::new();
        for chunk in remote_keys.chunks(KEY_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT remote_key FROM documents WHERE remote_key IN ({placeholders})");
            let mut query = sqlx::query_as::<_, (String,)>(&sql);
            for key in chunk {
                query = query.bind(key);
            }
            let rows = query.fetch_all(self.db.pool()).await?;
            existing.extend(rows.into_iter().map(|(key,)| key));
        }
        Ok(existing)
    }

    #[instrument(skip(self, document), fields(remote_key = %document.remote_key, bytes = document.bytes.len()))]
    async fn create_document(&self, document: NewDocument) -> Result<DocumentInsert> {
        let dir = self.content_dir.join(document.library_id.to_string());
        let name = content_filename(&document.remote_key, &document.filename);
        let content_path = write_unique_file(&dir, &name, &document.bytes)
            .await
            .map_err(|source| StoreError::content(&dir, source))?;

        match self.insert_document_row(&document, &content_path).await {
            Ok(Some(id)) => Ok(DocumentInsert::Created(id)),
            Ok(None) => {
                debug!("document already present");
                discard_content(&content_path).await;
                Ok(DocumentInsert::AlreadyPresent)
            }
            Err(error) => {
                discard_content(&content_path).await;
                Err(error)
            }
        }
    }

    async fn subtree_has_documents(&self, collection_id: i64) -> Result<bool> {
        let (has_documents,): (i64,) = sqlx::query_as(
            r"WITH RECURSIVE subtree(id) AS (
                  SELECT ?
                  UNION
                  SELECT c.id FROM collections c JOIN subtree s ON c.parent_id = s.id
              )
              SELECT EXISTS (
                  SELECT 1 FROM documents WHERE collection_id IN (SELECT id FROM subtree)
              )",
        )
        .bind(collection_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(has_documents != 0)
    }

    #[instrument(skip(self))]
    async fn delete_collection(&self, collection_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(collection_id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("collection", collection_id));
        }
        Ok(())
    }

    async fn sync_status(&self, user_id: i64) -> Result<SyncStatus> {
        let status = match self.load_connection(user_id).await? {
            Some(connection) => SyncStatus {
                connected: true,
                last_synced_at: connection.last_synced_at,
            },
            None => SyncStatus {
                connected: false,
                last_synced_at: None,
            },
        };
        Ok(status)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::document_filename;

    async fn store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new_in_memory().await.unwrap();
        (SqliteStore::new(db, dir.path()), dir)
    }

    fn spec(remote_key: Option<&str>, name: &str, parent_id: Option<i64>) -> CollectionSpec {
        CollectionSpec {
            library_id: LibraryId::Personal,
            remote_key: remote_key.map(str::to_string),
            name: name.to_string(),
            parent_id,
        }
    }

    fn document(user_id: i64, collection_id: i64, key: &str) -> NewDocument {
        NewDocument {
            remote_key: key.to_string(),
            title: "A Paper".to_string(),
            collection_id,
            ingested_by: user_id,
            library_id: LibraryId::Personal,
            filename: "paper.pdf".to_string(),
            bytes: b"%PDF-1.7".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_ensure_user_is_idempotent() {
        let (store, _dir) = store().await;
        let first = store.ensure_user("alice").await.unwrap();
        let second = store.ensure_user("alice").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.find_user(first.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_connection_lifecycle_and_status() {
        let (store, _dir) = store().await;
        let user = store.ensure_user("alice").await.unwrap();

        assert!(!store.sync_status(user.id).await.unwrap().connected);

        store.save_connection(user.id, "k1", "100").await.unwrap();
        store.mark_synced(user.id).await.unwrap();
        store.save_connection(user.id, "k2", "100").await.unwrap();

        let connection = store.load_connection(user.id).await.unwrap().unwrap();
        assert_eq!(connection.api_key, "k2");
        let status = store.sync_status(user.id).await.unwrap();
        assert!(status.connected);
        assert!(status.last_synced_at.is_some(), "re-connect keeps timestamp");

        assert!(store.delete_connection(user.id).await.unwrap());
        assert!(!store.delete_connection(user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_connection_debug_redacts_key() {
        let connection = SyncConnection {
            user_id: 1,
            api_key: "super-secret".to_string(),
            remote_user_id: "1".to_string(),
            last_synced_at: None,
        };
        assert!(!format!("{connection:?}").contains("super-secret"));
    }

    #[tokio::test]
    async fn test_upsert_collection_is_idempotent() {
        let (store, _dir) = store().await;
        let first = store
            .upsert_collection(&spec(Some("AAAA2222"), "Zotero: Papers", None))
            .await
            .unwrap();
        let second = store
            .upsert_collection(&spec(Some("AAAA2222"), "Zotero: Papers", None))
            .await
            .unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_collections().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_collection_rename_updates_in_place() {
        let (store, _dir) = store().await;
        let first = store
            .upsert_collection(&spec(Some("AAAA2222"), "Zotero: Papers", None))
            .await
            .unwrap();
        let renamed = store
            .upsert_collection(&spec(Some("AAAA2222"), "Zotero: Articles", None))
            .await
            .unwrap();
        assert_eq!(first.id, renamed.id);
        let row = store
            .find_collection(LibraryId::Personal, "AAAA2222")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.name, "Zotero: Articles");
    }

    #[tokio::test]
    async fn test_upsert_collection_adopts_legacy_row() {
        let (store, _dir) = store().await;
        sqlx::query("INSERT INTO collections (library_id, name) VALUES ('personal', 'Zotero: Papers')")
            .execute(store.database().pool())
            .await
            .unwrap();

        let adopted = store
            .upsert_collection(&spec(Some("AAAA2222"), "Zotero: Papers", None))
            .await
            .unwrap();
        assert!(!adopted.created);
        let row = store
            .find_collection(LibraryId::Personal, "AAAA2222")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.id, adopted.id);
    }

    #[tokio::test]
    async fn test_unfiled_collection_never_adopted_by_remote_collection() {
        let (store, _dir) = store().await;
        let unfiled = store
            .upsert_collection(&spec(None, "Zotero: Unfiled", None))
            .await
            .unwrap();
        assert!(unfiled.created);

        let remote = store
            .upsert_collection(&spec(Some("UNF00001"), "Zotero: Unfiled", None))
            .await
            .unwrap();
        assert!(remote.created);
        assert_ne!(remote.id, unfiled.id);

        let (unfiled_key,): (Option<String>,) =
            sqlx::query_as("SELECT remote_key FROM collections WHERE id = ?")
                .bind(unfiled.id)
                .fetch_one(store.database().pool())
                .await
                .unwrap();
        assert_eq!(unfiled_key, None);

        let again = store
            .upsert_collection(&spec(None, "Zotero: Unfiled", None))
            .await
            .unwrap();
        assert_eq!(again.id, unfiled.id);
        assert!(!again.created);
    }

    #[tokio::test]
    async fn test_same_remote_key_in_two_libraries_is_distinct() {
        let (store, _dir) = store().await;
        let personal = store
            .upsert_collection(&spec(Some("AAAA2222"), "Zotero: Papers", None))
            .await
            .unwrap();
        let group = store
            .upsert_collection(&CollectionSpec {
                library_id: LibraryId::Group(9),
                ..spec(Some("AAAA2222"), "Zotero (Lab): Papers", None)
            })
            .await
            .unwrap();
        assert_ne!(personal.id, group.id);
        assert!(group.created);
    }

    #[tokio::test]
    async fn test_grant_manage_is_idempotent() {
        let (store, _dir) = store().await;
        let user = store.ensure_user("alice").await.unwrap();
        let collection = store
            .upsert_collection(&spec(Some("AAAA2222"), "Zotero: Papers", None))
            .await
            .unwrap();
        store.grant_manage(collection.id, user.id).await.unwrap();
        store.grant_manage(collection.id, user.id).await.unwrap();
        assert_eq!(
            store.permission(collection.id, user.id).await.unwrap().as_deref(),
            Some("MANAGE")
        );
    }

    #[tokio::test]
    async fn test_create_document_writes_content_and_dedups() {
        let (store, dir) = store().await;
        let user = store.ensure_user("alice").await.unwrap();
        let collection = store
            .upsert_collection(&spec(Some("AAAA2222"), "Zotero: Papers", None))
            .await
            .unwrap();

        let first = store
            .create_document(document(user.id, collection.id, "ATT00001"))
            .await
            .unwrap();
        let second = store
            .create_document(document(user.id, collection.id, "ATT00001"))
            .await
            .unwrap();

        assert!(matches!(first, DocumentInsert::Created(_)));
        assert_eq!(second, DocumentInsert::AlreadyPresent);

        let documents = store.list_documents().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].byte_size, 8);
        assert!(documents[0].content_path.starts_with(&*dir.path().to_string_lossy()));

        let files: Vec<_> = std::fs::read_dir(dir.path().join("personal"))
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1, "duplicate content file must be removed");
    }

    #[tokio::test]
    async fn test_create_document_removes_file_when_insert_fails() {
        let (store, dir) = store().await;
        let user = store.ensure_user("alice").await.unwrap();

        let result = store.create_document(document(user.id, 999, "ATT00001")).await;
        assert!(result.is_err(), "dangling collection must be rejected");

        let files: Vec<_> = std::fs::read_dir(dir.path().join("personal"))
            .unwrap()
            .collect();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_create_document_with_long_multibyte_filename() {
        let (store, _dir) = store().await;
        let user = store.ensure_user("alice").await.unwrap();
        let collection = store
            .upsert_collection(&spec(Some("AAAA2222"), "Zotero: Papers", None))
            .await
            .unwrap();
        let title = "論".repeat(120);
        let mut new = document(user.id, collection.id, "ATT00001");
        new.title.clone_from(&title);
        new.filename = document_filename(None, &title);

        let inserted = store.create_document(new).await.unwrap();
        assert!(matches!(inserted, DocumentInsert::Created(_)));

        let stored = &store.list_documents().await.unwrap()[0];
        let file_name = Path::new(&stored.content_path)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(file_name.starts_with("ATT00001_"));
        assert!(file_name.len() <= 255);
    }

    #[tokio::test]
    async fn test_same_display_filename_gets_distinct_content_files() {
        let (store, _dir) = store().await;
        let user = store.ensure_user("alice").await.unwrap();
        let collection = store
            .upsert_collection(&spec(Some("AAAA2222"), "Zotero: Papers", None))
            .await
            .unwrap();
        for key in ["ATT00001", "ATT00002"] {
            let mut new = document(user.id, collection.id, key);
            new.filename = "Full Text PDF.pdf".to_string();
            store.create_document(new).await.unwrap();
        }

        let documents = store.list_documents().await.unwrap();
        assert_eq!(documents.len(), 2);
        assert!(documents.iter().all(|d| d.filename == "Full Text PDF.pdf"));
        assert!(documents[0].content_path.ends_with("ATT00001_Full Text PDF.pdf"));
        assert!(documents[1].content_path.ends_with("ATT00002_Full Text PDF.pdf"));
    }

    #[tokio::test]
    async fn test_existing_document_keys_returns_subset() {
        let (store, _dir) = store().await;
        let user = store.ensure_user("alice").await.unwrap();
        let collection = store
            .upsert_collection(&spec(Some("AAAA2222"), "Zotero: Papers", None))
            .await
            .unwrap();
        store
            .create_document(document(user.id, collection.id, "ATT00001"))
            .await
            .unwrap();

        let keys = vec!["ATT00001".to_string(), "ATT00002".to_string()];
        let existing = store.existing_document_keys(&keys).await.unwrap();
        assert_eq!(existing, HashSet::from(["ATT00001".to_string()]));
        assert!(store.existing_document_keys(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subtree_has_documents_is_transitive() {
        let (store, _dir) = store().await;
        let user = store.ensure_user("alice").await.unwrap();
        let root = store
            .upsert_collection(&spec(Some("ROOT0001"), "Zotero: Root", None))
            .await
            .unwrap();
        let child = store
            .upsert_collection(&spec(Some("CHLD0001"), "Zotero: Child", Some(root.id)))
            .await
            .unwrap();
        let sibling = store
            .upsert_collection(&spec(Some("SIBL0001"), "Zotero: Sibling", Some(root.id)))
            .await
            .unwrap();

        assert!(!store.subtree_has_documents(root.id).await.unwrap());
        store
            .create_document(document(user.id, child.id, "ATT00001"))
            .await
            .unwrap();
        assert!(store.subtree_has_documents(root.id).await.unwrap());
        assert!(store.subtree_has_documents(child.id).await.unwrap());
        assert!(!store.subtree_has_documents(sibling.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_subtree_query_tolerates_cycles() {
        let (store, _dir) = store().await;
        let a = store
            .upsert_collection(&spec(Some("AAAA0001"), "Zotero: A", None))
            .await
            .unwrap();
        let b = store
            .upsert_collection(&spec(Some("BBBB0001"), "Zotero: B", Some(a.id)))
            .await
            .unwrap();
        sqlx::query("UPDATE collections SET parent_id = ? WHERE id = ?")
            .bind(b.id)
            .bind(a.id)
            .execute(store.database().pool())
            .await
            .unwrap();

        assert!(!store.subtree_has_documents(a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_collection_missing_row_is_not_found() {
        let (store, _dir) = store().await;
        let err = store.delete_collection(42).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
