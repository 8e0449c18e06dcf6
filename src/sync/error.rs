//! Fatal errors of a sync run.
//!
//! Per-unit failures (one collection, item, or attachment) never surface
//! here; they are logged and counted in [`SyncStats`](super::SyncStats).

use thiserror::Error;

use super::pool::{MAX_WIDTH, MIN_WIDTH};
use crate::remote::RemoteError;
use crate::store::StoreError;

/// Errors that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The user to sync does not exist.
    #[error("user {0} not found")]
    UserNotFound(i64),

    /// The user has no stored remote connection.
    #[error("user {0} has no sync connection\n  Suggestion: run `zotsync connect` first")]
    ConnectionMissing(i64),

    /// A worker pool width is outside the allowed range.
    #[error("invalid concurrency value {value}: must be between {MIN_WIDTH} and {MAX_WIDTH}")]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The store failed while loading run prerequisites or finishing the run.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The remote client could not be created from the stored connection.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}
