//! Library identity shared by the remote client and the sync engine.
//!
//! A library is either the user's personal library or a group library. It is
//! enumerated once at the start of a run and never changes during it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Text form of the personal library identity.
pub const PERSONAL_LIBRARY_ID: &str = "personal";

/// Display name of the personal library.
pub const PERSONAL_LIBRARY_NAME: &str = "Personal Library";

/// Prefix applied to every local collection created by a sync.
const COLLECTION_NAME_PREFIX: &str = "Zotero";

/// Identity of a remote library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LibraryId {
    /// The syncing user's own library.
    Personal,
    /// A group library, by numeric group id.
    Group(u64),
}

impl LibraryId {
    /// Returns true for the personal library.
    #[must_use]
    pub fn is_personal(&self) -> bool {
        matches!(self, Self::Personal)
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Personal => f.write_str(PERSONAL_LIBRARY_ID),
            Self::Group(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for LibraryId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(PERSONAL_LIBRARY_ID) {
            return Ok(Self::Personal);
        }
        trimmed
            .parse::<u64>()
            .map(Self::Group)
            .map_err(|_| format!("invalid library id: {s}"))
    }
}

impl TryFrom<String> for LibraryId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LibraryId> for String {
    fn from(value: LibraryId) -> Self {
        value.to_string()
    }
}

/// Kind of remote library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryKind {
    Personal,
    Group,
}

/// A remote library targeted by a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    /// Library identity.
    pub id: LibraryId,
    /// Human-readable name.
    pub name: String,
    /// Personal or group.
    pub kind: LibraryKind,
}

impl Library {
    /// The implicit personal library.
    #[must_use]
    pub fn personal() -> Self {
        Self {
            id: LibraryId::Personal,
            name: PERSONAL_LIBRARY_NAME.to_string(),
            kind: LibraryKind::Personal,
        }
    }

    /// A group library.
    #[must_use]
    pub fn group(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: LibraryId::Group(id),
            name: name.into(),
            kind: LibraryKind::Group,
        }
    }

    /// Local display name for a collection of this library.
    ///
    /// `Zotero: <name>` for the personal library,
    /// `Zotero (<group>): <name>` for group libraries.
    #[must_use]
    pub fn collection_display_name(&self, collection_name: &str) -> String {
        match self.kind {
            LibraryKind::Personal => format!("{COLLECTION_NAME_PREFIX}: {collection_name}"),
            LibraryKind::Group => {
                format!("{COLLECTION_NAME_PREFIX} ({}): {collection_name}", self.name)
            }
        }
    }
}
