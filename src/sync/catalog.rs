//! Library catalog: every library with its collection tree flattened for
//! browsing and building a selection.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::pool::WorkerPool;
use crate::library::{Library, LibraryKind};
use crate::remote::{RemoteCollection, RemoteLibrary, RetryPolicy};

/// Maximum number of libraries fetched at once.
pub const CATALOG_WIDTH: usize = 8;

/// One collection in a flattened tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub key: String,
    pub name: String,
    /// 0 for roots.
    pub depth: usize,
    /// Parent key; `None` for roots, including orphans.
    pub parent: Option<String>,
    pub item_count: u64,
}

/// A library and its flattened collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogLibrary {
    #[serde(flatten)]
    pub library: Library,
    pub collections: Vec<CatalogEntry>,
}

/// Flattens a collection list depth-first, parents before children.
///
/// Roots are collections without a parent or whose parent is unknown, in
/// input order. Collections only reachable through a parent cycle are left
/// out.
#[must_use]
pub fn flatten_collections(collections: &[RemoteCollection]) -> Vec<CatalogEntry> {
    let known: HashMap<&str, &RemoteCollection> =
        collections.iter().map(|c| (c.key.as_str(), c)).collect();
    let mut children: HashMap<&str, Vec<&RemoteCollection>> = HashMap::new();
    let mut roots = Vec::new();
    for collection in collections {
        match collection.parent_key.as_deref() {
            Some(parent) if known.contains_key(parent) => {
                children.entry(parent).or_default().push(collection);
            }
            _ => roots.push(collection),
        }
    }

    let mut flattened = Vec::with_capacity(collections.len());
    let mut stack: Vec<(&RemoteCollection, usize, Option<&str>)> =
        roots.into_iter().rev().map(|c| (c, 0, None)).collect();
    while let Some((collection, depth, parent)) = stack.pop() {
        flattened.push(CatalogEntry {
            key: collection.key.clone(),
            name: collection.name.clone(),
            depth,
            parent: parent.map(str::to_string),
            item_count: collection.item_count,
        });
        if let Some(kids) = children.get(collection.key.as_str()) {
            stack.extend(
                kids.iter()
                    .rev()
                    .map(|kid| (*kid, depth + 1, Some(collection.key.as_str()))),
            );
        }
    }
    flattened
}

/// Lists the personal library and every group with their collection trees.
///
/// Libraries are fetched concurrently; one whose collections cannot be
/// fetched is logged and omitted. A failed group listing leaves only the
/// personal library. The personal library sorts first, then groups by name.
#[instrument(skip_all)]
pub(crate) async fn list_libraries(
    remote: Arc<dyn RemoteLibrary>,
    retry: &RetryPolicy,
) -> Vec<CatalogLibrary> {
    let mut libraries = vec![Library::personal()];
    match retry.run("list_groups", || remote.list_groups()).await {
        Ok(groups) => libraries.extend(groups.into_iter().map(|g| Library::group(g.id, g.name))),
        Err(e) => warn!(error = %e, "failed to list group libraries"),
    }

    let Ok(pool) = WorkerPool::new(CATALOG_WIDTH.min(libraries.len())) else {
        return Vec::new();
    };
    let inputs: Vec<(String, Library)> = libraries
        .into_iter()
        .map(|library| (library.id.to_string(), library))
        .collect();

    let retry = retry.clone();
    let results = pool
        .run("catalog", inputs, move |library| {
            let remote = Arc::clone(&remote);
            let retry = retry.clone();
            async move {
                let fetched = retry
                    .run("list_collections", || remote.list_collections(library.id))
                    .await;
                (library, fetched)
            }
        })
        .await;

    let mut catalog: Vec<CatalogLibrary> = results
        .into_values()
        .filter_map(|(library, fetched)| match fetched {
            Ok(collections) => Some(CatalogLibrary {
                collections: flatten_collections(&collections),
                library,
            }),
            Err(e) => {
                warn!(library = %library.id, error = %e, "failed to fetch library collections");
                None
            }
        })
        .collect();

    catalog.sort_by(|a, b| {
        let rank = |l: &Library| u8::from(l.kind != LibraryKind::Personal);
        rank(&a.library)
            .cmp(&rank(&b.library))
            .then_with(|| a.library.name.cmp(&b.library.name))
    });
    debug!(libraries = catalog.len(), "catalog assembled");
    catalog
}
