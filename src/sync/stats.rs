//! Run statistics, phases, and progress events.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::library::{Library, LibraryId};

/// Summary of a completed sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub collections_created: usize,
    pub collections_updated: usize,
    /// Selected items whose children were fetched.
    pub items_synced: usize,
    /// Documents created by this run.
    pub pdfs_downloaded: usize,
    /// Per-unit failures (never fatal).
    pub errors: usize,
    pub empty_collections_deleted: usize,
    pub libraries_synced: usize,
}

impl SyncStats {
    /// True when the run finished without per-unit failures.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

/// Thread-safe counters shared with worker tasks.
#[derive(Debug, Default)]
pub(crate) struct SyncCounters {
    collections_created: AtomicUsize,
    collections_updated: AtomicUsize,
    items_synced: AtomicUsize,
    pdfs_downloaded: AtomicUsize,
    errors: AtomicUsize,
    empty_collections_deleted: AtomicUsize,
    libraries_synced: AtomicUsize,
}

impl SyncCounters {
    pub(crate) fn collection_created(&self) {
        self.collections_created.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn collection_updated(&self) {
        self.collections_updated.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn add_items_synced(&self, count: usize) {
        self.items_synced.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn pdf_downloaded(&self) {
        self.pdfs_downloaded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn error(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn collection_deleted(&self) {
        self.empty_collections_deleted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn library_synced(&self) {
        self.libraries_synced.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self) -> SyncStats {
        SyncStats {
            collections_created: self.collections_created.load(Ordering::SeqCst),
            collections_updated: self.collections_updated.load(Ordering::SeqCst),
            items_synced: self.items_synced.load(Ordering::SeqCst),
            pdfs_downloaded: self.pdfs_downloaded.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            empty_collections_deleted: self.empty_collections_deleted.load(Ordering::SeqCst),
            libraries_synced: self.libraries_synced.load(Ordering::SeqCst),
        }
    }
}

/// Phases of a sync run.
///
/// Library phases repeat for every library, then `Cleanup` and `Done` run once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Init,
    CollectionsReconciled,
    ItemsSelected,
    ChildrenFetched,
    AttachmentsDownloaded,
    DocumentsIngested,
    Cleanup,
    Done,
    Aborted,
}

impl SyncPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::CollectionsReconciled => "collections_reconciled",
            Self::ItemsSelected => "items_selected",
            Self::ChildrenFetched => "children_fetched",
            Self::AttachmentsDownloaded => "attachments_downloaded",
            Self::DocumentsIngested => "documents_ingested",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress notification published while a run executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Processing of a library began.
    LibraryStarted {
        library: Library,
        /// 1-based position among the run's libraries.
        position: usize,
        total: usize,
    },
    /// A library phase finished; `count` is the number of units it produced.
    PhaseCompleted {
        library: LibraryId,
        phase: SyncPhase,
        count: usize,
    },
    /// Processing of a library stopped early after a failure.
    LibraryFailed { library: LibraryId, reason: String },
    /// The cleanup sweep began.
    CleanupStarted { candidates: usize },
    /// The run completed.
    Finished(SyncStats),
    /// The run aborted before doing any work.
    Aborted { reason: String },
}

/// Optional sink for [`SyncEvent`]s.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    sender: Option<UnboundedSender<SyncEvent>>,
}

impl EventSink {
    pub(crate) fn new(sender: Option<UnboundedSender<SyncEvent>>) -> Self {
        Self { sender }
    }

    /// Publishes an event; a dropped receiver is ignored.
    pub(crate) fn emit(&self, event: SyncEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
