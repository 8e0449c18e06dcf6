//! Remote library access.
//!
//! [`RemoteLibrary`] is the read-only view of a user's libraries that the sync
//! engine consumes. [`ZoteroClient`] implements it over the Web API v3;
//! tests substitute scripted fakes.

mod client;
mod error;
mod pagination;
mod retry;
mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use client::{
    CONNECT_TIMEOUT_SECS, ClientOptions, DEFAULT_API_BASE_URL, READ_TIMEOUT_SECS, ZoteroClient,
    ZoteroConnector,
};
pub use error::RemoteError;
pub use pagination::{MAX_PAGES, PAGE_LIMIT, next_link};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, MAX_RETRY_AFTER, RetryDecision, RetryPolicy,
    classify_error, parse_retry_after,
};
pub use types::{
    FileFetch, ItemType, RemoteAttachment, RemoteChild, RemoteCollection, RemoteGroup, RemoteItem,
};

use crate::library::LibraryId;
use crate::store::SyncConnection;

/// Read-only access to one account's libraries.
///
/// List operations return every record across all pages. Implementations do
/// not retry; callers wrap calls in [`RetryPolicy::run`].
#[async_trait]
pub trait RemoteLibrary: Send + Sync {
    /// Group libraries the account can access.
    async fn list_groups(&self) -> Result<Vec<RemoteGroup>, RemoteError>;

    /// Every collection of `library`.
    async fn list_collections(&self, library: LibraryId)
    -> Result<Vec<RemoteCollection>, RemoteError>;

    /// Every top-level item of `library`.
    async fn list_top_level_items(&self, library: LibraryId) -> Result<Vec<RemoteItem>, RemoteError>;

    /// Child notes and attachments of `item_key`.
    async fn list_children(
        &self,
        item_key: &str,
        library: LibraryId,
    ) -> Result<Vec<RemoteChild>, RemoteError>;

    /// Stored file of an attachment.
    async fn download_file(&self, attachment_key: &str, library: LibraryId) -> FileFetch;
}

/// Opens a [`RemoteLibrary`] for a stored connection.
pub trait RemoteConnector: Send + Sync {
    /// Builds a client authenticated with `connection`'s credentials.
    ///
    /// # Errors
    ///
    /// Returns an error when the credentials cannot form a valid client.
    fn connect(&self, connection: &SyncConnection) -> Result<Arc<dyn RemoteLibrary>, RemoteError>;
}
