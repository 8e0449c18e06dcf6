//! Concurrent fetch stages: children, attachment discovery, downloads.
//!
//! Each stage runs to completion on a [`WorkerPool`] before the next starts.
//! Per-unit failures are logged and counted; a unit with no result (its
//! worker panicked) counts as a failure too.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::pool::WorkerPool;
use super::stats::SyncCounters;
use crate::library::LibraryId;
use crate::remote::{
    FileFetch, RemoteAttachment, RemoteChild, RemoteError, RemoteItem, RemoteLibrary, RetryPolicy,
};
use crate::store::{DocumentStore, StoreError};

/// A PDF attachment whose bytes were downloaded.
#[derive(Debug, Clone)]
pub struct DownloadedAttachment {
    pub attachment: RemoteAttachment,
    pub bytes: Vec<u8>,
}

/// Remote calls of one library, each wrapped in the retry policy.
#[derive(Clone)]
pub(crate) struct Fetcher {
    remote: Arc<dyn RemoteLibrary>,
    library: LibraryId,
    retry: RetryPolicy,
}

impl Fetcher {
    pub(crate) fn new(remote: Arc<dyn RemoteLibrary>, library: LibraryId, retry: RetryPolicy) -> Self {
        Self {
            remote,
            library,
            retry,
        }
    }

    /// Fetches the children of every item; failed items are absent from the
    /// returned map.
    #[instrument(skip_all, fields(library = %self.library, items = items.len()))]
    pub(crate) async fn fetch_children(
        &self,
        pool: &WorkerPool,
        items: &[RemoteItem],
        counters: &SyncCounters,
    ) -> HashMap<String, Vec<RemoteChild>> {
        let inputs: Vec<(String, String)> = items
            .iter()
            .map(|item| (item.key.clone(), item.key.clone()))
            .collect();

        let fetcher = self.clone();
        let mut results = pool
            .run("children", inputs, move |item_key| {
                let fetcher = fetcher.clone();
                async move {
                    fetcher
                        .retry
                        .run("list_children", || {
                            fetcher.remote.list_children(&item_key, fetcher.library)
                        })
                        .await
                }
            })
            .await;

        let mut children = HashMap::with_capacity(items.len());
        for item in items {
            match results.remove(&item.key) {
                Some(Ok(list)) => {
                    counters.add_items_synced(1);
                    children.insert(item.key.clone(), list);
                }
                Some(Err(e)) => {
                    warn!(item_key = %item.key, error = %e, "failed to fetch item children");
                    counters.error();
                }
                None => {
                    warn!(item_key = %item.key, "children fetch produced no result");
                    counters.error();
                }
            }
        }
        children
    }

    /// Downloads every attachment. Attachments without a stored file and
    /// failed downloads are both counted as errors.
    #[instrument(skip_all, fields(library = %self.library, attachments = attachments.len()))]
    pub(crate) async fn download(
        &self,
        pool: &WorkerPool,
        attachments: Vec<RemoteAttachment>,
        counters: &SyncCounters,
    ) -> Vec<DownloadedAttachment> {
        let inputs: Vec<(String, String)> = attachments
            .iter()
            .map(|a| (a.key.clone(), a.key.clone()))
            .collect();

        let fetcher = self.clone();
        let mut results = pool
            .run("download", inputs, move |attachment_key| {
                let fetcher = fetcher.clone();
                async move { fetcher.download_one(&attachment_key).await }
            })
            .await;

        let mut downloaded = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            match results.remove(&attachment.key) {
                Some(Ok(Some(bytes))) => downloaded.push(DownloadedAttachment { attachment, bytes }),
                Some(Ok(None)) => {
                    warn!(attachment_key = %attachment.key, "attachment has no stored file");
                    counters.error();
                }
                Some(Err(e)) => {
                    warn!(attachment_key = %attachment.key, error = %e, "failed to download attachment");
                    counters.error();
                }
                None => {
                    warn!(attachment_key = %attachment.key, "download produced no result");
                    counters.error();
                }
            }
        }
        downloaded
    }

    async fn download_one(&self, attachment_key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let remote = &self.remote;
        let library = self.library;
        self.retry
            .run("download_file", || async move {
                match remote.download_file(attachment_key, library).await {
                    FileFetch::Found(bytes) => Ok(Some(bytes)),
                    FileFetch::NotFound => Ok(None),
                    FileFetch::Failed(e) => Err(e),
                }
            })
            .await
    }
}

/// PDF attachments of the selected items, in item order.
///
/// An attachment key seen twice in one run is kept once.
#[must_use]
pub fn discover_attachments(
    items: &[RemoteItem],
    children: &HashMap<String, Vec<RemoteChild>>,
) -> Vec<RemoteAttachment> {
    let mut seen = HashSet::new();
    let mut attachments = Vec::new();
    for item in items {
        let Some(list) = children.get(&item.key) else {
            continue;
        };
        for child in list {
            if !child.is_pdf_attachment() || seen.contains(&child.key) {
                continue;
            }
            if let Some(attachment) = child.clone().into_pdf_attachment(&item.key) {
                seen.insert(attachment.key.clone());
                attachments.push(attachment);
            }
        }
    }
    attachments
}

/// Drops attachments that already have a local document.
///
/// # Errors
///
/// Returns the store error when the lookup fails; the caller must not
/// download in that case.
pub(crate) async fn filter_undiscovered(
    store: &dyn DocumentStore,
    attachments: Vec<RemoteAttachment>,
) -> Result<Vec<RemoteAttachment>, StoreError> {
    if attachments.is_empty() {
        return Ok(attachments);
    }
    let keys: Vec<String> = attachments.iter().map(|a| a.key.clone()).collect();
    let existing = store.existing_document_keys(&keys).await?;
    debug!(
        candidates = attachments.len(),
        existing = existing.len(),
        "filtered already-ingested attachments"
    );
    Ok(attachments
        .into_iter()
        .filter(|a| !existing.contains(&a.key))
        .collect())
}
