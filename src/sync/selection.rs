//! Per-library collection selection for a sync run.
//!
//! The trigger map has the shape `{library_id: ["ALL"] | [collection_key, ...]}`.
//! An omitted (or empty) map means every library and every collection.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::library::LibraryId;

/// Marker that selects every collection of a library.
pub const ALL_COLLECTIONS: &str = "ALL";

/// Errors raised while parsing a selection.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// The JSON document is malformed or has the wrong shape.
    #[error("invalid selection JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A library id is neither `personal` nor a numeric group id.
    #[error("invalid library id '{0}' in selection")]
    InvalidLibrary(String),

    /// A `library:collection` pair is malformed.
    #[error("invalid selection '{0}': expected LIBRARY:COLLECTION_KEY or LIBRARY:ALL")]
    InvalidPair(String),
}

/// Which collections of one library to sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionSelection {
    /// Every collection, and every regular item regardless of membership.
    All,
    /// The named collections plus their ancestors.
    Keys(BTreeSet<String>),
}

impl CollectionSelection {
    fn from_keys<I, S>(keys: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selected = BTreeSet::new();
        for key in keys {
            let key = key.as_ref().trim();
            if key.eq_ignore_ascii_case(ALL_COLLECTIONS) {
                return Some(Self::All);
            }
            if !key.is_empty() {
                selected.insert(key.to_string());
            }
        }
        (!selected.is_empty()).then_some(Self::Keys(selected))
    }

    fn merge(&mut self, other: Self) {
        match other {
            Self::All => *self = Self::All,
            Self::Keys(more) => {
                if let Self::Keys(keys) = self {
                    keys.extend(more);
                }
            }
        }
    }
}

/// Library-to-collections selection for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSelection {
    /// `None` selects everything.
    libraries: Option<BTreeMap<LibraryId, CollectionSelection>>,
}

impl SyncSelection {
    /// Selects every library and every collection.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Parses the JSON trigger map.
    ///
    /// `null` and `{}` select everything. Libraries with an empty key list
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError`] for malformed JSON or library ids.
    pub fn from_json(json: &str) -> Result<Self, SelectionError> {
        let raw: Option<BTreeMap<String, Vec<String>>> = serde_json::from_str(json)?;
        let Some(raw) = raw.filter(|map| !map.is_empty()) else {
            return Ok(Self::all());
        };

        let mut libraries = BTreeMap::new();
        for (library, keys) in raw {
            let id = library
                .parse::<LibraryId>()
                .map_err(|_| SelectionError::InvalidLibrary(library.clone()))?;
            if let Some(selection) = CollectionSelection::from_keys(&keys) {
                insert_merged(&mut libraries, id, selection);
            }
        }
        Ok(Self {
            libraries: Some(libraries),
        })
    }

    /// Parses command-line `LIBRARY:KEY` pairs (`LIBRARY:ALL` for a whole library).
    ///
    /// No pairs selects everything.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError`] for malformed pairs or library ids.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, SelectionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut libraries = BTreeMap::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (library, key) = pair
                .split_once(':')
                .ok_or_else(|| SelectionError::InvalidPair(pair.to_string()))?;
            let id = library
                .parse::<LibraryId>()
                .map_err(|_| SelectionError::InvalidLibrary(library.to_string()))?;
            let selection = CollectionSelection::from_keys([key])
                .ok_or_else(|| SelectionError::InvalidPair(pair.to_string()))?;
            insert_merged(&mut libraries, id, selection);
        }

        if libraries.is_empty() {
            return Ok(Self::all());
        }
        Ok(Self {
            libraries: Some(libraries),
        })
    }

    /// True when no explicit map was given.
    #[must_use]
    pub fn is_everything(&self) -> bool {
        self.libraries.is_none()
    }

    /// Selection for `library`, or `None` when the library is not part of the run.
    #[must_use]
    pub fn for_library(&self, library: LibraryId) -> Option<CollectionSelection> {
        match &self.libraries {
            None => Some(CollectionSelection::All),
            Some(map) => map.get(&library).cloned(),
        }
    }

    /// True when group libraries are needed.
    #[must_use]
    pub fn needs_groups(&self) -> bool {
        self.libraries
            .as_ref()
            .is_none_or(|map| map.keys().any(|id| !id.is_personal()))
    }
}

fn insert_merged(
    libraries: &mut BTreeMap<LibraryId, CollectionSelection>,
    id: LibraryId,
    selection: CollectionSelection,
) {
    match libraries.get_mut(&id) {
        Some(existing) => existing.merge(selection),
        None => {
            libraries.insert(id, selection);
        }
    }
}
