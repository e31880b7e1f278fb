//! Remote row shapes and their translation to domain records.
//!
//! Rows use snake_case names and RFC 3339 timestamp strings; the domain side
//! uses camelCase JSON and epoch milliseconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use warehouse_domain::{EntityId, Item, ItemPatch, Note, NotePatch, Position, Shelf, ShelfPatch, Size};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfRow {
    pub id: EntityId,
    pub position: Position,
    pub size: Size,
    pub color: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRow {
    pub id: EntityId,
    pub shelf_id: EntityId,
    pub name: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRow {
    pub id: EntityId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ShelfRow {
    pub fn from_shelf(shelf: &Shelf) -> Self {
        Self {
            id: shelf.id.clone(),
            position: shelf.position,
            size: shelf.size,
            color: shelf.color.clone(),
            name: shelf.name.clone(),
            created_at: None,
        }
    }

    pub fn into_shelf(self, items: Vec<Item>) -> Shelf {
        Shelf {
            id: self.id,
            position: self.position,
            size: self.size,
            color: self.color,
            name: self.name,
            items,
        }
    }
}

impl ItemRow {
    pub fn from_item(shelf_id: &str, item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            shelf_id: shelf_id.to_string(),
            name: item.name.clone(),
            quantity: item.quantity,
            created_at: None,
        }
    }

    pub fn into_item(self) -> Item {
        Item {
            id: self.id,
            name: self.name,
            quantity: self.quantity,
        }
    }
}

impl NoteRow {
    /// Row for a freshly created note. The backend assigns `created_at`.
    pub fn from_note(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            is_read: note.is_read,
            read_at: note.read_at.map(|t| t.to_rfc3339()),
            created_at: None,
        }
    }

    pub fn into_note(self) -> Note {
        let created_at = self
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(|| {
                tracing::warn!(id = %self.id, "Note row without a valid created_at");
                warehouse_domain::now_millis()
            });
        Note {
            created_at,
            read_at: self.read_at.as_deref().and_then(parse_timestamp),
            is_read: self.is_read,
            id: self.id,
            title: self.title,
            content: self.content,
        }
    }
}

/// Parse an RFC 3339 timestamp, truncated to milliseconds.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(s).ok()?;
    DateTime::from_timestamp_millis(parsed.timestamp_millis())
}

fn object(fields: Map<String, Value>) -> Value {
    Value::Object(fields)
}

/// Only the fields the patch sets; a cleared name is sent as `null`.
pub(crate) fn shelf_patch_fields(patch: &ShelfPatch) -> Value {
    let mut fields = Map::new();
    if let Some(position) = patch.position {
        fields.insert("position".into(), json!(<[f64; 3]>::from(position)));
    }
    if let Some(size) = patch.size {
        fields.insert("size".into(), json!(<[f64; 3]>::from(size)));
    }
    if let Some(color) = &patch.color {
        fields.insert("color".into(), json!(color));
    }
    if let Some(name) = &patch.name {
        fields.insert("name".into(), json!(name));
    }
    object(fields)
}

pub(crate) fn item_patch_fields(patch: &ItemPatch) -> Value {
    let mut fields = Map::new();
    if let Some(name) = &patch.name {
        fields.insert("name".into(), json!(name));
    }
    if let Some(quantity) = patch.quantity {
        fields.insert("quantity".into(), json!(quantity));
    }
    object(fields)
}

pub(crate) fn note_patch_fields(patch: &NotePatch) -> Value {
    let mut fields = Map::new();
    if let Some(title) = &patch.title {
        fields.insert("title".into(), json!(title));
    }
    if let Some(content) = &patch.content {
        fields.insert("content".into(), json!(content));
    }
    object(fields)
}

/// Attach items to their shelves by `shelf_id`, keeping both input orders.
///
/// Items whose shelf is not in `shelves` are dropped.
pub(crate) fn join_items(shelves: Vec<ShelfRow>, items: Vec<ItemRow>) -> Vec<Shelf> {
    let mut joined: Vec<Shelf> = shelves.into_iter().map(|s| s.into_shelf(Vec::new())).collect();
    for item in items {
        match joined.iter_mut().find(|s| s.id == item.shelf_id) {
            Some(shelf) => shelf.items.push(item.into_item()),
            None => tracing::debug!(item = %item.id, shelf = %item.shelf_id, "Dropping orphan item row"),
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shelf_row(id: &str) -> ShelfRow {
        ShelfRow {
            id: id.into(),
            position: Position::new(0.0, 1.0, 0.0),
            size: Size::new(1.0, 2.0, 0.5),
            color: "#8B4513".into(),
            name: None,
            created_at: Some("2026-01-01T10:00:00Z".into()),
        }
    }

    fn item_row(id: &str, shelf_id: &str) -> ItemRow {
        ItemRow {
            id: id.into(),
            shelf_id: shelf_id.into(),
            name: format!("item {}", id),
            quantity: 1,
            created_at: None,
        }
    }

    #[test]
    fn join_groups_items_by_shelf() {
        let shelves = vec![shelf_row("a"), shelf_row("b")];
        let items = vec![
            item_row("1", "b"),
            item_row("2", "a"),
            item_row("3", "b"),
            item_row("4", "gone"),
        ];
        let joined = join_items(shelves, items);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(), vec!["2"]);
        assert_eq!(
            joined[1].items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec!["1", "3"]
        );
    }

    #[test]
    fn note_row_converts_timestamps() {
        let row: NoteRow = serde_json::from_value(json!({
            "id": "n1",
            "title": "Consegna",
            "content": "Martedì",
            "is_read": true,
            "read_at": "2026-03-01T12:00:00.123456+00:00",
            "created_at": "2026-03-01T08:30:00+00:00"
        }))
        .unwrap();
        let note = row.into_note();
        assert!(note.is_read);
        assert_eq!(note.created_at.timestamp_millis(), 1_772_353_800_000);
        assert_eq!(note.read_at.unwrap().timestamp_subsec_millis(), 123);
        assert_eq!(note.read_at.unwrap().timestamp_subsec_micros(), 123_000);
    }

    #[test]
    fn shelf_patch_sends_only_set_fields() {
        let fields = shelf_patch_fields(&ShelfPatch::position(Position::new(2.0, 1.0, -1.0)));
        assert_eq!(fields, json!({ "position": [2.0, 1.0, -1.0] }));

        let cleared = shelf_patch_fields(&ShelfPatch::name(None));
        assert_eq!(cleared, json!({ "name": null }));
    }

    #[test]
    fn shelf_row_serializes_snake_case() {
        let value = serde_json::to_value(ShelfRow {
            created_at: None,
            ..shelf_row("x")
        })
        .unwrap();
        assert_eq!(value["position"], json!([0.0, 1.0, 0.0]));
        assert!(value.get("created_at").is_none());
    }
}
