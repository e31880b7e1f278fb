//! Item name search and shelf highlighting.

use serde::{Deserialize, Serialize};

use crate::model::{EntityId, Item, Shelf};

/// An item matching a search, tagged with the shelf that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemHit {
    pub shelf_id: EntityId,
    #[serde(flatten)]
    pub item: Item,
}

/// Case-insensitive substring match on item names, in collection order.
///
/// An empty query matches every item; callers that highlight shelves should
/// go through [`highlighted_shelves`], which treats a blank query as "no
/// highlight".
pub fn search_items(shelves: &[Shelf], query: &str) -> Vec<ItemHit> {
    let needle = query.to_lowercase();
    shelves
        .iter()
        .flat_map(|shelf| {
            shelf
                .items
                .iter()
                .filter(|item| item.name.to_lowercase().contains(&needle))
                .map(|item| ItemHit {
                    shelf_id: shelf.id.clone(),
                    item: item.clone(),
                })
        })
        .collect()
}

/// Ids of the shelves holding a matching item, each listed once in first-hit order.
pub fn highlighted_shelves(shelves: &[Shelf], query: &str) -> Vec<EntityId> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let mut ids: Vec<EntityId> = Vec::new();
    for hit in search_items(shelves, query) {
        if !ids.contains(&hit.shelf_id) {
            ids.push(hit.shelf_id);
        }
    }
    ids
}

/// Distinct item names containing `query`, for a search box dropdown.
///
/// Names are de-duplicated case-insensitively, keeping the first spelling seen.
pub fn suggestions(shelves: &[Shelf], query: &str) -> Vec<String> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    let mut seen: Vec<String> = Vec::new();
    let mut names = Vec::new();
    for item in shelves.iter().flat_map(|s| s.items.iter()) {
        let lower = item.name.to_lowercase();
        if seen.contains(&lower) {
            continue;
        }
        seen.push(lower.clone());
        if lower.contains(&needle) {
            names.push(item.name.clone());
        }
    }
    names
}
