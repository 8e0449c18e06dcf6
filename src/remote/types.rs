//! Remote record types.
//!
//! Wire records mirror the Web API JSON (`{key, version, data, meta}`) and are
//! converted into the flat types the sync engine works with. Remote data is
//! unverified: every field the engine does not strictly need is optional.

use serde::{Deserialize, Deserializer};

/// Item type tag of a note.
const ITEM_TYPE_NOTE: &str = "note";

/// Item type tag of an attachment.
const ITEM_TYPE_ATTACHMENT: &str = "attachment";

/// A group library the user can access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteGroup {
    /// Numeric group id.
    pub id: u64,
    /// Group display name.
    pub name: String,
}

/// A collection record of one library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCollection {
    /// Remote key, unique within the library.
    pub key: String,
    /// Remote version counter.
    pub version: i64,
    /// Collection name.
    pub name: String,
    /// Parent collection key, `None` for top-level collections.
    pub parent_key: Option<String>,
    /// Number of items (metadata only).
    pub item_count: u64,
}

/// Classification of a remote item's `itemType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    Note,
    Attachment,
    /// Any bibliographic item type (`journalArticle`, `book`, ...).
    Regular(String),
}

impl ItemType {
    /// Parses the remote `itemType` tag.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag {
            ITEM_TYPE_NOTE => Self::Note,
            ITEM_TYPE_ATTACHMENT => Self::Attachment,
            other => Self::Regular(other.to_string()),
        }
    }

    /// Returns true for bibliographic items that can carry attachments.
    #[must_use]
    pub fn is_regular(&self) -> bool {
        matches!(self, Self::Regular(_))
    }
}

/// A top-level item of one library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    /// Remote key.
    pub key: String,
    /// Item type.
    pub item_type: ItemType,
    /// Title, when the item has one.
    pub title: Option<String>,
    /// Keys of the collections the item belongs to, in remote order.
    pub collections: Vec<String>,
}

/// A child of an item (note or attachment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChild {
    /// Remote key.
    pub key: String,
    /// Item type.
    pub item_type: ItemType,
    /// MIME type of the stored file, for attachments.
    pub content_type: Option<String>,
    /// Stored filename, for attachments.
    pub filename: Option<String>,
    /// Key of the owning item.
    pub parent_item: Option<String>,
}

impl RemoteChild {
    /// Returns true when this child is an attachment whose content type or
    /// filename indicates a PDF.
    #[must_use]
    pub fn is_pdf_attachment(&self) -> bool {
        if self.item_type != ItemType::Attachment {
            return false;
        }
        let pdf_content_type = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("pdf"));
        let pdf_filename = self
            .filename
            .as_deref()
            .is_some_and(|name| name.to_ascii_lowercase().ends_with(".pdf"));
        pdf_content_type || pdf_filename
    }

    /// Converts a PDF attachment child into a [`RemoteAttachment`] owned by `item_key`.
    #[must_use]
    pub fn into_pdf_attachment(self, item_key: &str) -> Option<RemoteAttachment> {
        if !self.is_pdf_attachment() {
            return None;
        }
        Some(RemoteAttachment {
            key: self.key,
            content_type: self.content_type,
            filename: self.filename,
            parent_item: self.parent_item.unwrap_or_else(|| item_key.to_string()),
        })
    }
}

/// A PDF attachment selected for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAttachment {
    /// Attachment key, used as the dedup key.
    pub key: String,
    /// MIME type.
    pub content_type: Option<String>,
    /// Stored filename.
    pub filename: Option<String>,
    /// Key of the owning item.
    pub parent_item: String,
}

/// Outcome of a file download.
///
/// A missing stored file is a normal outcome, distinct from transport failure.
#[derive(Debug)]
pub enum FileFetch {
    /// The file bytes.
    Found(Vec<u8>),
    /// The attachment has no stored file (HTTP 404).
    NotFound,
    /// The request failed.
    Failed(super::RemoteError),
}

// ==================== Wire records ====================

#[derive(Debug, Deserialize)]
pub(crate) struct GroupRecord {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) data: GroupData,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GroupData {
    #[serde(default)]
    pub(crate) name: Option<String>,
}

impl From<GroupRecord> for RemoteGroup {
    fn from(record: GroupRecord) -> Self {
        let name = record
            .data
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Group {}", record.id));
        Self {
            id: record.id,
            name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CollectionRecord {
    pub(crate) key: String,
    #[serde(default)]
    pub(crate) version: i64,
    pub(crate) data: CollectionData,
    #[serde(default)]
    pub(crate) meta: CollectionMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CollectionData {
    pub(crate) name: String,
    #[serde(default, deserialize_with = "parent_collection_key")]
    pub(crate) parent_collection: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CollectionMeta {
    #[serde(default)]
    pub(crate) num_items: u64,
}

impl From<CollectionRecord> for RemoteCollection {
    fn from(record: CollectionRecord) -> Self {
        Self {
            key: record.key,
            version: record.version,
            name: record.data.name,
            parent_key: record.data.parent_collection,
            item_count: record.meta.num_items,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemRecord {
    pub(crate) key: String,
    pub(crate) data: ItemData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemData {
    #[serde(default)]
    pub(crate) item_type: String,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) collections: Vec<String>,
    #[serde(default)]
    pub(crate) content_type: Option<String>,
    #[serde(default)]
    pub(crate) filename: Option<String>,
    #[serde(default)]
    pub(crate) parent_item: Option<String>,
}

impl From<ItemRecord> for RemoteItem {
    fn from(record: ItemRecord) -> Self {
        Self {
            key: record.key,
            item_type: ItemType::parse(&record.data.item_type),
            title: record.data.title.filter(|t| !t.trim().is_empty()),
            collections: record.data.collections,
        }
    }
}

impl From<ItemRecord> for RemoteChild {
    fn from(record: ItemRecord) -> Self {
        Self {
            key: record.key,
            item_type: ItemType::parse(&record.data.item_type),
            content_type: record.data.content_type.filter(|v| !v.is_empty()),
            filename: record.data.filename.filter(|v| !v.is_empty()),
            parent_item: record.data.parent_item,
        }
    }
}

/// The API encodes "no parent" as `false`; accept a key string, `false`, or null.
fn parent_collection_key<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ParentField {
        Key(String),
        Flag(#[allow(dead_code)] bool),
    }

    let field = Option::<ParentField>::deserialize(deserializer)?;
    Ok(match field {
        Some(ParentField::Key(key)) if !key.trim().is_empty() => Some(key),
        _ => None,
    })
}
