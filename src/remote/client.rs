//! reqwest-backed client for the Zotero Web API v3.
//!
//! One [`ZoteroClient`] serves one connected account. List calls follow the
//! `Link: rel="next"` chain and concatenate pages; file downloads report a
//! missing stored file as [`FileFetch::NotFound`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{LINK, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use super::pagination::{MAX_PAGES, PAGE_LIMIT, next_link};
use super::types::{CollectionRecord, GroupRecord, ItemRecord};
use super::{
    FileFetch, RemoteChild, RemoteCollection, RemoteConnector, RemoteError, RemoteGroup,
    RemoteItem, RemoteLibrary,
};
use crate::library::LibraryId;
use crate::store::SyncConnection;
use crate::user_agent;

/// Default API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.zotero.org";

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

const API_KEY_HEADER: &str = "Zotero-API-Key";
const API_VERSION_HEADER: &str = "Zotero-API-Version";
const API_VERSION: &str = "3";
const BACKOFF_HEADER: &str = "Backoff";

/// Connection-independent client settings.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API base URL.
    pub base_url: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub read_timeout_secs: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

/// Builds the shared reqwest client.
fn build_client(options: &ClientOptions) -> Result<Client, RemoteError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(options.connect_timeout_secs))
        .timeout(Duration::from_secs(options.read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_api_user_agent())
        .build()
        .map_err(|source| RemoteError::ClientBuild { source })
}

fn parse_base_url(base_url: &str) -> Result<Url, RemoteError> {
    let url = Url::parse(base_url).map_err(|_| RemoteError::invalid_url(base_url))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(RemoteError::invalid_url(base_url));
    }
    Ok(url)
}

/// API client bound to one account.
///
/// # Example
///
/// ```no_run
/// use zotsync_core::LibraryId;
/// use zotsync_core::remote::{ClientOptions, RemoteLibrary, ZoteroClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ZoteroClient::new(&ClientOptions::default(), "secret", "12345")?;
/// let collections = client.list_collections(LibraryId::Personal).await?;
/// println!("{} collections", collections.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ZoteroClient {
    client: Client,
    base_url: Url,
    api_key: String,
    user_id: String,
}

impl ZoteroClient {
    /// Creates a client for the account `user_id` authenticated by `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidUrl`] for a malformed base URL or user id,
    /// or [`RemoteError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(
        options: &ClientOptions,
        api_key: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let client = build_client(options)?;
        Self::with_client(client, &options.base_url, api_key.into(), user_id.into())
    }

    fn with_client(
        client: Client,
        base_url: &str,
        api_key: String,
        user_id: String,
    ) -> Result<Self, RemoteError> {
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() || !user_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(RemoteError::invalid_url(format!("user id {user_id:?}")));
        }
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            api_key,
            user_id,
        })
    }

    fn library_segments(&self, library: LibraryId) -> [String; 2] {
        match library {
            LibraryId::Personal => ["users".to_string(), self.user_id.clone()],
            LibraryId::Group(id) => ["groups".to_string(), id.to_string()],
        }
    }

    fn endpoint<I, S>(&self, segments: I, paged: bool) -> Result<Url, RemoteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::invalid_url(self.base_url.as_str()))?
            .pop_if_empty()
            .extend(segments);
        if paged {
            url.query_pairs_mut()
                .append_pair("limit", &PAGE_LIMIT.to_string());
        }
        Ok(url)
    }

    fn library_endpoint(
        &self,
        library: LibraryId,
        tail: &[&str],
        paged: bool,
    ) -> Result<Url, RemoteError> {
        let head = self.library_segments(library);
        let segments = head.iter().map(String::as_str).chain(tail.iter().copied());
        self.endpoint(segments, paged)
    }

    /// Sends an authenticated GET, mapping non-success statuses to errors.
    async fn send(&self, url: &str) -> Result<reqwest::Response, RemoteError> {
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(API_VERSION_HEADER, API_VERSION)
            .send()
            .await
            .map_err(|e| RemoteError::network(url, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .or_else(|| response.headers().get(BACKOFF_HEADER))
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        Err(RemoteError::http_status_with_retry_after(
            url,
            status.as_u16(),
            retry_after,
        ))
    }

    fn is_api_origin(&self, candidate: &str) -> bool {
        Url::parse(candidate).is_ok_and(|url| url.origin() == self.base_url.origin())
    }

    /// Walks the continuation chain starting at `first`, concatenating pages.
    ///
    /// A record that does not match `R` is logged and skipped; a body that is
    /// not a JSON array fails the whole call.
    async fn paginate<R: DeserializeOwned>(&self, first: Url) -> Result<Vec<R>, RemoteError> {
        let mut records = Vec::new();
        let mut next = Some(first.to_string());
        let mut pages = 0usize;

        while let Some(current) = next.take() {
            if pages >= MAX_PAGES {
                warn!(url = %current, max_pages = MAX_PAGES, "page limit reached, stopping");
                break;
            }
            pages += 1;

            let response = self.send(&current).await?;
            let link = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);
            let body = response
                .bytes()
                .await
                .map_err(|e| RemoteError::network(&current, e))?;
            let page: Vec<serde_json::Value> =
                serde_json::from_slice(&body).map_err(|e| RemoteError::decode(&current, e))?;
            debug!(url = %current, records = page.len(), "fetched page");
            records.extend(
                page.into_iter()
                    .filter_map(|value| decode_record(&current, value)),
            );

            next = match link {
                Some(candidate) if candidate == current => None,
                Some(candidate) if !self.is_api_origin(&candidate) => {
                    warn!(url = %candidate, "next link leaves the API origin, stopping");
                    None
                }
                other => other,
            };
        }

        Ok(records)
    }
}

fn decode_record<R: DeserializeOwned>(url: &str, value: serde_json::Value) -> Option<R> {
    let key = value
        .get("key")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string);
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(error) => {
            warn!(url, key = key.as_deref().unwrap_or("<none>"), %error, "skipping malformed record");
            None
        }
    }
}

#[async_trait]
impl RemoteLibrary for ZoteroClient {
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    async fn list_groups(&self) -> Result<Vec<RemoteGroup>, RemoteError> {
        let url = self.endpoint(["users", self.user_id.as_str(), "groups"], true)?;
        let records: Vec<GroupRecord> = self.paginate(url).await?;
        Ok(records.into_iter().map(RemoteGroup::from).collect())
    }

    #[instrument(skip(self), fields(library = %library))]
    async fn list_collections(
        &self,
        library: LibraryId,
    ) -> Result<Vec<RemoteCollection>, RemoteError> {
        let url = self.library_endpoint(library, &["collections"], true)?;
        let records: Vec<CollectionRecord> = self.paginate(url).await?;
        Ok(records.into_iter().map(RemoteCollection::from).collect())
    }

    #[instrument(skip(self), fields(library = %library))]
    async fn list_top_level_items(&self, library: LibraryId) -> Result<Vec<RemoteItem>, RemoteError> {
        let url = self.library_endpoint(library, &["items", "top"], true)?;
        let records: Vec<ItemRecord> = self.paginate(url).await?;
        Ok(records.into_iter().map(RemoteItem::from).collect())
    }

    #[instrument(skip(self), fields(library = %library))]
    async fn list_children(
        &self,
        item_key: &str,
        library: LibraryId,
    ) -> Result<Vec<RemoteChild>, RemoteError> {
        let url = self.library_endpoint(library, &["items", item_key, "children"], true)?;
        let records: Vec<ItemRecord> = self.paginate(url).await?;
        Ok(records.into_iter().map(RemoteChild::from).collect())
    }

    #[instrument(skip(self), fields(library = %library))]
    async fn download_file(&self, attachment_key: &str, library: LibraryId) -> FileFetch {
        let url = match self.library_endpoint(library, &["items", attachment_key, "file"], false) {
            Ok(url) => url.to_string(),
            Err(error) => return FileFetch::Failed(error),
        };

        let response = match self.send(&url).await {
            Ok(response) => response,
            Err(error) if error.status() == Some(404) => {
                debug!(attachment_key, "no stored file");
                return FileFetch::NotFound;
            }
            Err(error) => return FileFetch::Failed(error),
        };

        match response.bytes().await {
            Ok(bytes) => FileFetch::Found(bytes.to_vec()),
            Err(e) => FileFetch::Failed(RemoteError::network(url, e)),
        }
    }
}

/// Builds [`ZoteroClient`]s from stored connections, sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct ZoteroConnector {
    client: Client,
    base_url: String,
}

impl ZoteroConnector {
    /// Creates a connector.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed base URL or if the HTTP client cannot be built.
    pub fn new(options: &ClientOptions) -> Result<Self, RemoteError> {
        parse_base_url(&options.base_url)?;
        Ok(Self {
            client: build_client(options)?,
            base_url: options.base_url.clone(),
        })
    }
}

impl RemoteConnector for ZoteroConnector {
    fn connect(
        &self,
        connection: &SyncConnection,
    ) -> Result<Arc<dyn RemoteLibrary>, RemoteError> {
        let client = ZoteroClient::with_client(
            self.client.clone(),
            &self.base_url,
            connection.api_key.clone(),
            connection.remote_user_id.clone(),
        )?;
        Ok(Arc::new(client))
    }
}
