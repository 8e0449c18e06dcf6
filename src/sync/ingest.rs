//! Document ingestion.
//!
//! Downloaded attachments are stored as documents in the first reconciled
//! collection their item belongs to, or in the library's Unfiled collection.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::fetch::DownloadedAttachment;
use super::hierarchy::CollectionMap;
use super::pool::WorkerPool;
use super::stats::SyncCounters;
use crate::library::Library;
use crate::remote::RemoteItem;
use crate::store::{
    CollectionSpec, DocumentInsert, DocumentStore, NewDocument, StoreError, UpsertedCollection,
    document_filename,
};

/// Name of the fallback collection for items outside every reconciled collection.
pub const UNFILED_COLLECTION_NAME: &str = "Unfiled";

/// Title used when an item has none.
pub const UNTITLED: &str = "Untitled";

/// Shared, read-only state of one library's ingestion stage.
pub(crate) struct Ingestor {
    store: Arc<dyn DocumentStore>,
    library: Library,
    user_id: i64,
    collections: Arc<CollectionMap>,
    items: HashMap<String, RemoteItem>,
    unfiled: OnceCell<UpsertedCollection>,
    created_unfiled: OnceLock<i64>,
}

impl Ingestor {
    pub(crate) fn new(
        store: Arc<dyn DocumentStore>,
        library: Library,
        user_id: i64,
        collections: Arc<CollectionMap>,
        items: &[RemoteItem],
    ) -> Self {
        Self {
            store,
            library,
            user_id,
            collections,
            items: items
                .iter()
                .map(|item| (item.key.clone(), item.clone()))
                .collect(),
            unfiled: OnceCell::new(),
            created_unfiled: OnceLock::new(),
        }
    }

    /// Id of the Unfiled collection when this stage created it, even if
    /// granting access to it failed afterwards.
    pub(crate) fn created_unfiled(&self) -> Option<i64> {
        self.created_unfiled.get().copied()
    }

    /// Ingests every downloaded attachment and tallies the outcomes.
    #[instrument(skip_all, fields(library = %self.library.id, attachments = downloaded.len()))]
    pub(crate) async fn ingest_all(
        self: &Arc<Self>,
        pool: &WorkerPool,
        downloaded: Vec<DownloadedAttachment>,
        counters: &SyncCounters,
    ) -> usize {
        let keys: Vec<String> = downloaded.iter().map(|d| d.attachment.key.clone()).collect();
        let inputs: Vec<(String, DownloadedAttachment)> = downloaded
            .into_iter()
            .map(|d| (d.attachment.key.clone(), d))
            .collect();

        let ingestor = Arc::clone(self);
        let mut results = pool
            .run("ingest", inputs, move |downloaded| {
                let ingestor = Arc::clone(&ingestor);
                async move { ingestor.ingest_one(downloaded).await }
            })
            .await;

        let mut created = 0;
        for key in keys {
            match results.remove(&key) {
                Some(Ok(DocumentInsert::Created(id))) => {
                    debug!(attachment_key = %key, document_id = id, "document created");
                    counters.pdf_downloaded();
                    created += 1;
                }
                Some(Ok(DocumentInsert::AlreadyPresent)) => {
                    debug!(attachment_key = %key, "document already present");
                }
                Some(Err(e)) => {
                    warn!(attachment_key = %key, error = %e, "failed to ingest document");
                    counters.error();
                }
                None => {
                    warn!(attachment_key = %key, "ingestion produced no result");
                    counters.error();
                }
            }
        }
        created
    }

    async fn ingest_one(&self, downloaded: DownloadedAttachment) -> Result<DocumentInsert, StoreError> {
        let DownloadedAttachment { attachment, bytes } = downloaded;
        let item = self.items.get(&attachment.parent_item);

        let target = item
            .and_then(|item| item.collections.iter().find_map(|key| self.collections.get(key)));
        let collection_id = match target {
            Some(id) => id,
            None => self.unfiled_collection().await?.id,
        };

        let title = item
            .and_then(|item| item.title.clone())
            .unwrap_or_else(|| UNTITLED.to_string());
        let filename = document_filename(attachment.filename.as_deref(), &title);

        self.store
            .create_document(NewDocument {
                remote_key: attachment.key,
                title,
                collection_id,
                ingested_by: self.user_id,
                library_id: self.library.id,
                filename,
                bytes,
            })
            .await
    }

    async fn unfiled_collection(&self) -> Result<UpsertedCollection, StoreError> {
        self.unfiled
            .get_or_try_init(|| async {
                let spec = CollectionSpec {
                    library_id: self.library.id,
                    remote_key: None,
                    name: self.library.collection_display_name(UNFILED_COLLECTION_NAME),
                    parent_id: None,
                };
                let upserted = self.store.upsert_collection(&spec).await?;
                if upserted.created {
                    let _ = self.created_unfiled.set(upserted.id);
                }
                self.store.grant_manage(upserted.id, self.user_id).await?;
                info!(collection_id = upserted.id, created = upserted.created, "using unfiled collection");
                Ok(upserted)
            })
            .await
            .copied()
    }
}
