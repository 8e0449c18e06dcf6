//! Item selection against the reconciled collections.

use super::hierarchy::CollectionMap;
use super::selection::CollectionSelection;
use crate::remote::RemoteItem;

/// Keeps regular items (not notes, not attachments) that belong to a
/// reconciled collection, or every regular item when the whole library is
/// selected.
#[must_use]
pub fn select_items(
    items: Vec<RemoteItem>,
    selection: &CollectionSelection,
    collections: &CollectionMap,
) -> Vec<RemoteItem> {
    items
        .into_iter()
        .filter(|item| item.item_type.is_regular())
        .filter(|item| match selection {
            CollectionSelection::All => true,
            CollectionSelection::Keys(_) => {
                item.collections.iter().any(|key| collections.contains(key))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::remote::ItemType;

    fn item(key: &str, item_type: ItemType, collections: &[&str]) -> RemoteItem {
        RemoteItem {
            key: key.to_string(),
            item_type,
            title: None,
            collections: collections.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    fn article() -> ItemType {
        ItemType::Regular("journalArticle".to_string())
    }

    #[test]
    fn test_keeps_members_of_reconciled_collections() {
        let map: CollectionMap = [("PAPERS".to_string(), 1)].into_iter().collect();
        let selection = CollectionSelection::Keys(BTreeSet::from(["PAPERS".to_string()]));
        let items = vec![
            item("I1", article(), &["PAPERS"]),
            item("I2", article(), &["DRAFTS"]),
            item("I3", article(), &[]),
            item("N1", ItemType::Note, &["PAPERS"]),
            item("A1", ItemType::Attachment, &["PAPERS"]),
        ];

        let selected = select_items(items, &selection, &map);
        let keys: Vec<&str> = selected.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["I1"]);
    }

    #[test]
    fn test_all_selection_keeps_unfiled_items() {
        let items = vec![
            item("I1", article(), &[]),
            item("I2", ItemType::Regular("book".to_string()), &["X"]),
            item("N1", ItemType::Note, &[]),
        ];
        let selected = select_items(items, &CollectionSelection::All, &CollectionMap::default());
        assert_eq!(selected.len(), 2);
    }
}
