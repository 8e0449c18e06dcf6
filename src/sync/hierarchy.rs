//! Collection hierarchy reconciliation.
//!
//! The selected collections are widened to their ancestor closure, ordered so
//! parents come before children, and materialized locally one by one. The
//! resulting remote-key to local-id map is frozen before any worker reads it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::selection::CollectionSelection;
use super::stats::SyncCounters;
use crate::library::Library;
use crate::remote::RemoteCollection;
use crate::store::{CollectionSpec, DocumentStore};

/// Keys of the selected collections plus every ancestor reachable through
/// known parents.
///
/// Selected keys missing from `collections` are logged and ignored. The walk
/// stops at an unknown parent or at a key already in the closure, so parent
/// cycles terminate.
#[must_use]
pub fn ancestor_closure(
    collections: &[RemoteCollection],
    selection: &CollectionSelection,
) -> HashSet<String> {
    let by_key: HashMap<&str, &RemoteCollection> =
        collections.iter().map(|c| (c.key.as_str(), c)).collect();

    let selected = match selection {
        CollectionSelection::All => return by_key.keys().map(|k| (*k).to_string()).collect(),
        CollectionSelection::Keys(keys) => keys,
    };

    let mut closure = HashSet::new();
    for key in selected {
        let Some(mut current) = by_key.get(key.as_str()).copied() else {
            warn!(collection_key = %key, "selected collection not found in remote library");
            continue;
        };
        loop {
            if !closure.insert(current.key.clone()) {
                break;
            }
            match current
                .parent_key
                .as_deref()
                .and_then(|parent| by_key.get(parent))
            {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }
    closure
}

/// Orders the collections in `closure` so every parent precedes its children.
///
/// Roots (no parent, or a parent outside the closure) come first in input
/// order, followed breadth-first by their descendants. Collections stuck in a
/// parent cycle are appended last and treated as roots.
#[must_use]
pub fn materialization_order<'a>(
    collections: &'a [RemoteCollection],
    closure: &HashSet<String>,
) -> Vec<&'a RemoteCollection> {
    let members: Vec<&RemoteCollection> = collections
        .iter()
        .filter(|c| closure.contains(&c.key))
        .collect();

    let mut children: HashMap<&str, Vec<&RemoteCollection>> = HashMap::new();
    let mut queue = VecDeque::new();
    for collection in &members {
        match collection.parent_key.as_deref() {
            Some(parent) if closure.contains(parent) && parent != collection.key => {
                children.entry(parent).or_default().push(collection);
            }
            _ => queue.push_back(*collection),
        }
    }

    let mut placed: HashSet<&str> = HashSet::with_capacity(members.len());
    let mut order = Vec::with_capacity(members.len());
    while let Some(collection) = queue.pop_front() {
        if !placed.insert(collection.key.as_str()) {
            continue;
        }
        order.push(collection);
        if let Some(kids) = children.get(collection.key.as_str()) {
            queue.extend(kids.iter().copied());
        }
    }

    for collection in members {
        if placed.insert(collection.key.as_str()) {
            warn!(collection_key = %collection.key, "collection parent cycle, treating as root");
            order.push(collection);
        }
    }
    order
}

/// Frozen map from remote collection key to local collection id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionMap {
    ids: HashMap<String, i64>,
}

impl CollectionMap {
    /// Local id for a remote collection key.
    #[must_use]
    pub fn get(&self, remote_key: &str) -> Option<i64> {
        self.ids.get(remote_key).copied()
    }

    #[must_use]
    pub fn contains(&self, remote_key: &str) -> bool {
        self.ids.contains_key(remote_key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<(String, i64)> for CollectionMap {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Result of reconciling one library's collections.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub collections: Arc<CollectionMap>,
    /// Local ids of collections inserted by this run, in creation order.
    pub created: Vec<i64>,
}

/// Materializes the selected collections of `library` locally.
///
/// A collection whose upsert fails is counted as an error and left out of the
/// map; its children are then created at the library root.
#[instrument(skip_all, fields(library = %library.id))]
pub(crate) async fn reconcile(
    store: &dyn DocumentStore,
    library: &Library,
    user_id: i64,
    collections: &[RemoteCollection],
    selection: &CollectionSelection,
    counters: &SyncCounters,
) -> ReconcileOutcome {
    let closure = ancestor_closure(collections, selection);
    let order = materialization_order(collections, &closure);
    debug!(selected = closure.len(), "reconciling collections");

    let mut ids: HashMap<String, i64> = HashMap::with_capacity(order.len());
    let mut created = Vec::new();

    for remote in order {
        let parent_id = match remote.parent_key.as_deref() {
            Some(parent) if closure.contains(parent) => {
                let id = ids.get(parent).copied();
                if id.is_none() {
                    warn!(
                        collection_key = %remote.key,
                        parent_key = parent,
                        "parent collection unavailable, creating at root"
                    );
                }
                id
            }
            _ => None,
        };

        let spec = CollectionSpec {
            library_id: library.id,
            remote_key: Some(remote.key.clone()),
            name: library.collection_display_name(&remote.name),
            parent_id,
        };

        let upserted = match store.upsert_collection(&spec).await {
            Ok(upserted) => upserted,
            Err(e) => {
                warn!(collection_key = %remote.key, error = %e, "failed to reconcile collection");
                counters.error();
                continue;
            }
        };

        if upserted.created {
            counters.collection_created();
            created.push(upserted.id);
        } else {
            counters.collection_updated();
        }

        if let Err(e) = store.grant_manage(upserted.id, user_id).await {
            warn!(collection_id = upserted.id, error = %e, "failed to grant collection permission");
            counters.error();
        }

        ids.insert(remote.key.clone(), upserted.id);
    }

    ReconcileOutcome {
        collections: Arc::new(ids.into_iter().collect()),
        created,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn collection(key: &str, parent: Option<&str>) -> RemoteCollection {
        RemoteCollection {
            key: key.to_string(),
            version: 1,
            name: format!("Name {key}"),
            parent_key: parent.map(str::to_string),
            item_count: 0,
        }
    }

    fn select(keys: &[&str]) -> CollectionSelection {
        CollectionSelection::Keys(keys.iter().map(|k| (*k).to_string()).collect::<BTreeSet<_>>())
    }

    fn keys(order: &[&RemoteCollection]) -> Vec<String> {
        order.iter().map(|c| c.key.clone()).collect()
    }

    #[test]
    fn test_closure_includes_ancestors() {
        let all = vec![
            collection("ROOT", None),
            collection("MID", Some("ROOT")),
            collection("LEAF", Some("MID")),
            collection("OTHER", None),
        ];
        let closure = ancestor_closure(&all, &select(&["LEAF"]));
        let expected: HashSet<String> = ["ROOT", "MID", "LEAF"].map(String::from).into();
        assert_eq!(closure, expected);
    }

    #[test]
    fn test_closure_all_selects_every_collection() {
        let all = vec![collection("A", None), collection("B", Some("A"))];
        assert_eq!(ancestor_closure(&all, &CollectionSelection::All).len(), 2);
    }

    #[test]
    fn test_closure_ignores_unknown_keys_and_parents() {
        let all = vec![collection("A", Some("GONE"))];
        let closure = ancestor_closure(&all, &select(&["A", "MISSING"]));
        assert_eq!(closure, HashSet::from(["A".to_string()]));
    }

    #[test]
    fn test_closure_terminates_on_cycle() {
        let all = vec![collection("A", Some("B")), collection("B", Some("A"))];
        let closure = ancestor_closure(&all, &select(&["A"]));
        assert_eq!(closure.len(), 2);
    }

    #[test]
    fn test_order_places_parents_first() {
        let all = vec![
            collection("LEAF", Some("MID")),
            collection("MID", Some("ROOT")),
            collection("ROOT", None),
        ];
        let closure = ancestor_closure(&all, &CollectionSelection::All);
        let order = materialization_order(&all, &closure);
        assert_eq!(keys(&order), vec!["ROOT", "MID", "LEAF"]);
    }

    #[test]
    fn test_order_treats_unresolved_parent_as_root() {
        let all = vec![collection("B", None), collection("A", Some("ELSEWHERE"))];
        let closure = ancestor_closure(&all, &CollectionSelection::All);
        let order = materialization_order(&all, &closure);
        assert_eq!(keys(&order), vec!["B", "A"]);
    }

    #[test]
    fn test_order_appends_cycle_members() {
        let all = vec![
            collection("X", Some("Y")),
            collection("Y", Some("X")),
            collection("R", None),
        ];
        let closure = ancestor_closure(&all, &CollectionSelection::All);
        let order = materialization_order(&all, &closure);
        assert_eq!(order.len(), 3);
        assert_eq!(order[0].key, "R");
    }

    #[test]
    fn test_collection_map_lookup() {
        let map: CollectionMap = [("K1".to_string(), 7)].into_iter().collect();
        assert_eq!(map.get("K1"), Some(7));
        assert!(map.contains("K1"));
        assert!(!map.contains("K2"));
        assert_eq!(map.len(), 1);
        assert!(!map.is_empty());
    }
}
