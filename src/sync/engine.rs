//! Sync run driver.
//!
//! A run loads the user's connection, enumerates the libraries, and processes
//! them one at a time:
//!
//! 1. reconcile the selected collections
//! 2. select the items to mirror
//! 3. fetch children, discover new PDF attachments, download them
//! 4. ingest the downloads as documents
//!
//! After the last library, collections created by the run that ended up
//! empty are removed and the connection is stamped as synced.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zotsync_core::remote::{ClientOptions, ZoteroConnector};
//! use zotsync_core::store::SqliteStore;
//! use zotsync_core::sync::{SyncEngine, SyncOptions, SyncSelection};
//! use zotsync_core::Database;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new_in_memory().await?;
//! let store = Arc::new(SqliteStore::new(db, "./documents"));
//! let connector = Arc::new(ZoteroConnector::new(&ClientOptions::default())?);
//! let engine = SyncEngine::new(store, connector, SyncOptions::default())?;
//! let stats = engine.run(1, &SyncSelection::all()).await?;
//! println!("downloaded {} PDFs, {} errors", stats.pdfs_downloaded, stats.errors);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

use super::catalog::{self, CatalogLibrary};
use super::cleanup::sweep_empty_collections;
use super::fetch::{Fetcher, discover_attachments, filter_undiscovered};
use super::hierarchy::reconcile;
use super::ingest::Ingestor;
use super::pool::{DEFAULT_FETCH_WIDTH, DEFAULT_INGEST_WIDTH, WorkerPool};
use super::selection::{CollectionSelection, SyncSelection};
use super::selector::select_items;
use super::stats::{EventSink, SyncCounters, SyncEvent, SyncPhase, SyncStats};
use super::SyncError;
use crate::library::Library;
use crate::remote::{RemoteConnector, RemoteLibrary, RetryPolicy};
use crate::store::DocumentStore;

/// Tunables of a sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Width of the children-fetch stage.
    pub fetch_concurrency: usize,
    /// Width of the download stage.
    pub download_concurrency: usize,
    /// Width of the ingestion stage.
    pub ingest_concurrency: usize,
    /// Retry policy applied to every remote call.
    pub retry_policy: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_WIDTH,
            download_concurrency: DEFAULT_FETCH_WIDTH,
            ingest_concurrency: DEFAULT_INGEST_WIDTH,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Mirrors remote libraries into a [`DocumentStore`].
pub struct SyncEngine {
    store: Arc<dyn DocumentStore>,
    connector: Arc<dyn RemoteConnector>,
    fetch_pool: WorkerPool,
    download_pool: WorkerPool,
    ingest_pool: WorkerPool,
    retry: RetryPolicy,
    events: EventSink,
}

/// State threaded through one run.
struct Run<'a> {
    user_id: i64,
    remote: Arc<dyn RemoteLibrary>,
    counters: &'a SyncCounters,
    /// Collections created by this run, in creation order.
    created: Vec<i64>,
}

impl SyncEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConcurrency`] when a pool width is outside
    /// `1..=100`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        connector: Arc<dyn RemoteConnector>,
        options: SyncOptions,
    ) -> Result<Self, SyncError> {
        Ok(Self {
            store,
            connector,
            fetch_pool: WorkerPool::new(options.fetch_concurrency)?,
            download_pool: WorkerPool::new(options.download_concurrency)?,
            ingest_pool: WorkerPool::new(options.ingest_concurrency)?,
            retry: options.retry_policy,
            events: EventSink::default(),
        })
    }

    /// Publishes [`SyncEvent`]s to `sender` while runs execute.
    #[must_use]
    pub fn with_events(mut self, sender: UnboundedSender<SyncEvent>) -> Self {
        self.events = EventSink::new(Some(sender));
        self
    }

    /// Runs a full sync for `user_id`.
    ///
    /// # Errors
    ///
    /// Fails only when the user or their connection is missing, the store
    /// cannot load them, or no client can be built from the connection.
    /// Everything else is counted in the returned [`SyncStats`].
    #[instrument(skip(self, selection))]
    pub async fn run(&self, user_id: i64, selection: &SyncSelection) -> Result<SyncStats, SyncError> {
        let remote = match self.prepare(user_id).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(phase = %SyncPhase::Aborted, error = %e, "sync aborted");
                self.events.emit(SyncEvent::Aborted {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };
        info!(phase = %SyncPhase::Init, "sync started");

        let counters = SyncCounters::default();
        let mut run = Run {
            user_id,
            remote,
            counters: &counters,
            created: Vec::new(),
        };

        let libraries: Vec<(Library, CollectionSelection)> = self
            .enumerate_libraries(&run, selection)
            .await
            .into_iter()
            .filter_map(|library| selection.for_library(library.id).map(|s| (library, s)))
            .collect();

        let total = libraries.len();
        for (index, (library, collections)) in libraries.into_iter().enumerate() {
            self.events.emit(SyncEvent::LibraryStarted {
                library: library.clone(),
                position: index + 1,
                total,
            });
            self.sync_library(&mut run, &library, &collections).await;
        }

        info!(phase = %SyncPhase::Cleanup, candidates = run.created.len(), "sweeping empty collections");
        self.events.emit(SyncEvent::CleanupStarted {
            candidates: run.created.len(),
        });
        sweep_empty_collections(self.store.as_ref(), &run.created, &counters).await;

        if let Err(e) = self.store.mark_synced(user_id).await {
            warn!(error = %e, "failed to record sync time");
            counters.error();
        }

        let stats = counters.snapshot();
        info!(
            phase = %SyncPhase::Done,
            libraries = stats.libraries_synced,
            collections_created = stats.collections_created,
            collections_updated = stats.collections_updated,
            items = stats.items_synced,
            pdfs = stats.pdfs_downloaded,
            deleted = stats.empty_collections_deleted,
            errors = stats.errors,
            "sync finished"
        );
        self.events.emit(SyncEvent::Finished(stats.clone()));
        Ok(stats)
    }

    /// Lists the user's libraries with their flattened collection trees.
    ///
    /// # Errors
    ///
    /// Fails under the same conditions as [`SyncEngine::run`].
    #[instrument(skip(self))]
    pub async fn catalog(&self, user_id: i64) -> Result<Vec<CatalogLibrary>, SyncError> {
        let remote = self.prepare(user_id).await?;
        Ok(catalog::list_libraries(remote, &self.retry).await)
    }

    async fn prepare(&self, user_id: i64) -> Result<Arc<dyn RemoteLibrary>, SyncError> {
        if self.store.find_user(user_id).await?.is_none() {
            return Err(SyncError::UserNotFound(user_id));
        }
        let connection = self
            .store
            .load_connection(user_id)
            .await?
            .ok_or(SyncError::ConnectionMissing(user_id))?;
        Ok(self.connector.connect(&connection)?)
    }

    async fn enumerate_libraries(&self, run: &Run<'_>, selection: &SyncSelection) -> Vec<Library> {
        let mut libraries = vec![Library::personal()];
        if !selection.needs_groups() {
            return libraries;
        }
        match self.retry.run("list_groups", || run.remote.list_groups()).await {
            Ok(groups) => {
                debug!(groups = groups.len(), "listed group libraries");
                libraries.extend(groups.into_iter().map(|g| Library::group(g.id, g.name)));
            }
            Err(e) => {
                warn!(error = %e, "failed to list group libraries, syncing personal library only");
                run.counters.error();
            }
        }
        libraries
    }

    #[instrument(skip_all, fields(library = %library.id, name = %library.name))]
    async fn sync_library(&self, run: &mut Run<'_>, library: &Library, selection: &CollectionSelection) {
        let counters = run.counters;
        let remote = &run.remote;

        let remote_collections = match self
            .retry
            .run("list_collections", || remote.list_collections(library.id))
            .await
        {
            Ok(collections) => collections,
            Err(e) => {
                self.library_failed(run, library, "failed to list collections", &e);
                return;
            }
        };

        let outcome = reconcile(
            self.store.as_ref(),
            library,
            run.user_id,
            &remote_collections,
            selection,
            counters,
        )
        .await;
        run.created.extend_from_slice(&outcome.created);
        self.phase(library, SyncPhase::CollectionsReconciled, outcome.collections.len());

        let items = match self
            .retry
            .run("list_top_level_items", || run.remote.list_top_level_items(library.id))
            .await
        {
            Ok(items) => items,
            Err(e) => {
                self.library_failed(run, library, "failed to list items", &e);
                return;
            }
        };
        let items = select_items(items, selection, &outcome.collections);
        self.phase(library, SyncPhase::ItemsSelected, items.len());

        let fetcher = Fetcher::new(Arc::clone(&run.remote), library.id, self.retry.clone());
        let children = fetcher.fetch_children(&self.fetch_pool, &items, counters).await;
        self.phase(library, SyncPhase::ChildrenFetched, children.len());

        let attachments = discover_attachments(&items, &children);
        let attachments = match filter_undiscovered(self.store.as_ref(), attachments).await {
            Ok(attachments) => attachments,
            Err(e) => {
                self.library_failed(run, library, "failed to check existing documents", &e);
                return;
            }
        };
        let downloaded = fetcher
            .download(&self.download_pool, attachments, counters)
            .await;
        self.phase(library, SyncPhase::AttachmentsDownloaded, downloaded.len());

        let ingestor = Arc::new(Ingestor::new(
            Arc::clone(&self.store),
            library.clone(),
            run.user_id,
            Arc::clone(&outcome.collections),
            &items,
        ));
        let created = ingestor
            .ingest_all(&self.ingest_pool, downloaded, counters)
            .await;
        if let Some(unfiled_id) = ingestor.created_unfiled() {
            counters.collection_created();
            run.created.push(unfiled_id);
        }
        self.phase(library, SyncPhase::DocumentsIngested, created);

        counters.library_synced();
    }

    fn phase(&self, library: &Library, phase: SyncPhase, count: usize) {
        info!(library = %library.id, phase = %phase, count, "phase completed");
        self.events.emit(SyncEvent::PhaseCompleted {
            library: library.id,
            phase,
            count,
        });
    }

    fn library_failed(
        &self,
        run: &Run<'_>,
        library: &Library,
        message: &str,
        error: &dyn std::error::Error,
    ) {
        warn!(library = %library.id, error = %error, "{message}");
        run.counters.error();
        self.events.emit(SyncEvent::LibraryFailed {
            library: library.id,
            reason: format!("{message}: {error}"),
        });
    }
}
