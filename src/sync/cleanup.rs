//! Post-sync sweep of empty collections.

use tracing::{debug, info, instrument, warn};

use super::stats::SyncCounters;
use crate::store::DocumentStore;

/// Deletes every candidate collection whose subtree holds no document.
///
/// Candidates are the collections created by this run, in creation order;
/// they are visited newest first so children go before their parents.
/// Returns the number of deleted collections.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub(crate) async fn sweep_empty_collections(
    store: &dyn DocumentStore,
    candidates: &[i64],
    counters: &SyncCounters,
) -> usize {
    let mut deleted = 0;
    for &collection_id in candidates.iter().rev() {
        match store.subtree_has_documents(collection_id).await {
            Ok(true) => {
                debug!(collection_id, "collection holds documents, keeping");
            }
            Ok(false) => match store.delete_collection(collection_id).await {
                Ok(()) => {
                    debug!(collection_id, "deleted empty collection");
                    counters.collection_deleted();
                    deleted += 1;
                }
                Err(e) => {
                    warn!(collection_id, error = %e, "failed to delete empty collection");
                    counters.error();
                }
            },
            Err(e) => {
                warn!(collection_id, error = %e, "failed to inspect collection");
                counters.error();
            }
        }
    }
    if deleted > 0 {
        info!(deleted, "removed empty collections");
    }
    deleted
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::library::LibraryId;
    use crate::store::{CollectionSpec, NewDocument, SqliteStore};

    async fn store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new_in_memory().await.unwrap();
        (SqliteStore::new(db, dir.path()), dir)
    }

    async fn collection(store: &SqliteStore, key: &str, parent_id: Option<i64>) -> i64 {
        store
            .upsert_collection(&CollectionSpec {
                library_id: LibraryId::Personal,
                remote_key: Some(key.to_string()),
                name: key.to_string(),
                parent_id,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_sweep_keeps_ancestors_of_documents() {
        let (store, _dir) = store().await;
        let user = store.ensure_user("alice").await.unwrap();
        let root = collection(&store, "ROOT", None).await;
        let full = collection(&store, "FULL", Some(root)).await;
        let empty = collection(&store, "EMPTY", Some(root)).await;
        store
            .create_document(NewDocument {
                remote_key: "ATT1".to_string(),
                title: "Paper".to_string(),
                collection_id: full,
                ingested_by: user.id,
                library_id: LibraryId::Personal,
                filename: "paper.pdf".to_string(),
                bytes: b"%PDF".to_vec(),
            })
            .await
            .unwrap();

        let counters = SyncCounters::default();
        let deleted = sweep_empty_collections(&store, &[root, full, empty], &counters).await;

        assert_eq!(deleted, 1);
        assert_eq!(counters.snapshot().empty_collections_deleted, 1);
        let remaining: Vec<i64> = store
            .list_collections()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(remaining, vec![root, full]);
    }

    #[tokio::test]
    async fn test_sweep_removes_empty_chain_child_first() {
        let (store, _dir) = store().await;
        let root = collection(&store, "ROOT", None).await;
        let child = collection(&store, "CHILD", Some(root)).await;

        let counters = SyncCounters::default();
        let deleted = sweep_empty_collections(&store, &[root, child], &counters).await;

        assert_eq!(deleted, 2);
        assert_eq!(counters.snapshot().errors, 0);
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_ignores_collections_not_created_by_run() {
        let (store, _dir) = store().await;
        let existing = collection(&store, "OLD", None).await;

        let counters = SyncCounters::default();
        assert_eq!(sweep_empty_collections(&store, &[], &counters).await, 0);
        assert!(store.find_collection(LibraryId::Personal, "OLD").await.unwrap().is_some());
        assert_eq!(store.list_collections().await.unwrap()[0].id, existing);
    }
}
