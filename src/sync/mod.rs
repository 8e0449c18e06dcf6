//! Library synchronization engine.
//!
//! [`SyncEngine::run`] mirrors the selected libraries of one user into a
//! [`DocumentStore`](crate::store::DocumentStore). Stages:
//! - [`hierarchy`]: ancestor closure and collection reconciliation
//! - [`selector`]: item selection
//! - [`fetch`]: children fetch, attachment discovery, downloads
//! - [`ingest`]: document creation
//! - [`cleanup`]: removal of empty collections created by the run
//!
//! Fan-out stages run on a bounded [`WorkerPool`].

mod catalog;
mod cleanup;
mod engine;
mod error;
mod fetch;
pub mod hierarchy;
mod ingest;
mod pool;
mod selection;
pub mod selector;
mod stats;

pub use catalog::{CATALOG_WIDTH, CatalogEntry, CatalogLibrary, flatten_collections};
pub use engine::{SyncEngine, SyncOptions};
pub use error::SyncError;
pub use fetch::{DownloadedAttachment, discover_attachments};
pub use hierarchy::{CollectionMap, ReconcileOutcome, ancestor_closure, materialization_order};
pub use ingest::{UNFILED_COLLECTION_NAME, UNTITLED};
pub use pool::{DEFAULT_FETCH_WIDTH, DEFAULT_INGEST_WIDTH, MAX_WIDTH, MIN_WIDTH, WorkerPool};
pub use selection::{ALL_COLLECTIONS, CollectionSelection, SelectionError, SyncSelection};
pub use selector::select_items;
pub use stats::{SyncEvent, SyncPhase, SyncStats};
