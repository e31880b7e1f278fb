use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use warehouse_domain::{Item, ItemPatch, Note, NotePatch, Shelf, ShelfPatch};

use super::rows::{self, ItemRow, NoteRow, ShelfRow};
use super::{ChangeFeed, RemoteBackend, SortOrder, Table};
use crate::error::RemoteError;

/// Typed access to the remote tables.
#[derive(Clone)]
pub struct RemoteAdapter {
    backend: Arc<dyn RemoteBackend>,
}

impl RemoteAdapter {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn RemoteBackend> {
        &self.backend
    }

    /// All shelves with their items attached, oldest first.
    pub async fn list_shelves(&self) -> Result<Vec<Shelf>, RemoteError> {
        let shelves: Vec<ShelfRow> = self.select(Table::Shelves, SortOrder::Ascending).await?;
        let items: Vec<ItemRow> = self.select(Table::Items, SortOrder::Ascending).await?;
        Ok(rows::join_items(shelves, items))
    }

    /// All notes, newest first.
    pub async fn list_notes(&self) -> Result<Vec<Note>, RemoteError> {
        let notes: Vec<NoteRow> = self.select(Table::Notes, SortOrder::Descending).await?;
        Ok(notes.into_iter().map(NoteRow::into_note).collect())
    }

    /// Insert the shelf row only. Items travel separately.
    pub async fn insert_shelf(&self, shelf: &Shelf) -> Result<(), RemoteError> {
        self.insert(Table::Shelves, &ShelfRow::from_shelf(shelf)).await
    }

    pub async fn update_shelf(&self, id: &str, patch: &ShelfPatch) -> Result<(), RemoteError> {
        self.backend
            .update(Table::Shelves, id, rows::shelf_patch_fields(patch))
            .await
    }

    pub async fn delete_shelf(&self, id: &str) -> Result<(), RemoteError> {
        self.backend.delete(Table::Shelves, id).await
    }

    pub async fn insert_item(&self, shelf_id: &str, item: &Item) -> Result<(), RemoteError> {
        self.insert(Table::Items, &ItemRow::from_item(shelf_id, item))
            .await
    }

    pub async fn update_item(&self, id: &str, patch: &ItemPatch) -> Result<(), RemoteError> {
        self.backend
            .update(Table::Items, id, rows::item_patch_fields(patch))
            .await
    }

    pub async fn delete_item(&self, id: &str) -> Result<(), RemoteError> {
        self.backend.delete(Table::Items, id).await
    }

    pub async fn insert_note(&self, note: &Note) -> Result<(), RemoteError> {
        self.insert(Table::Notes, &NoteRow::from_note(note)).await
    }

    pub async fn update_note(&self, id: &str, patch: &NotePatch) -> Result<(), RemoteError> {
        self.backend
            .update(Table::Notes, id, rows::note_patch_fields(patch))
            .await
    }

    pub async fn mark_note_read(&self, id: &str, at: DateTime<Utc>) -> Result<(), RemoteError> {
        let fields = json!({ "is_read": true, "read_at": at.to_rfc3339() });
        self.backend.update(Table::Notes, id, fields).await
    }

    pub async fn delete_note(&self, id: &str) -> Result<(), RemoteError> {
        self.backend.delete(Table::Notes, id).await
    }

    pub async fn subscribe(&self, table: Table) -> Result<ChangeFeed, RemoteError> {
        self.backend.subscribe(table).await
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: Table,
        order: SortOrder,
    ) -> Result<Vec<T>, RemoteError> {
        let raw = self.backend.select(table, order).await?;
        raw.into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    RemoteError::Unavailable(format!("malformed {} row: {}", table, e))
                })
            })
            .collect()
    }

    async fn insert<T: Serialize>(&self, table: Table, row: &T) -> Result<(), RemoteError> {
        let value: Value = serde_json::to_value(row)
            .map_err(|e| RemoteError::Rejected(format!("encode {} row: {}", table, e)))?;
        self.backend.insert(table, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryBackend;
    use warehouse_domain::{seed_shelves, NewNote};

    fn adapter() -> (Arc<MemoryBackend>, RemoteAdapter) {
        let backend = Arc::new(MemoryBackend::new());
        (backend.clone(), RemoteAdapter::new(backend))
    }

    #[tokio::test]
    async fn shelves_round_trip_through_rows() {
        let (_, remote) = adapter();
        let seed = seed_shelves();
        for shelf in &seed {
            remote.insert_shelf(shelf).await.unwrap();
            for item in &shelf.items {
                remote.insert_item(&shelf.id, item).await.unwrap();
            }
        }
        assert_eq!(remote.list_shelves().await.unwrap(), seed);
    }

    #[tokio::test]
    async fn notes_list_newest_first() {
        let (_, remote) = adapter();
        for title in ["first", "second", "third"] {
            let note = NewNote::new(title, "body").into_note(
                warehouse_domain::new_entity_id(),
                warehouse_domain::now_millis(),
            );
            remote.insert_note(&note).await.unwrap();
        }
        let titles: Vec<_> = remote
            .list_notes()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn mark_read_sets_timestamp() {
        let (_, remote) = adapter();
        let note = NewNote::new("t", "c").into_note("n1".into(), warehouse_domain::now_millis());
        remote.insert_note(&note).await.unwrap();

        let at = warehouse_domain::now_millis();
        remote.mark_note_read("n1", at).await.unwrap();

        let stored = remote.list_notes().await.unwrap().remove(0);
        assert!(stored.is_read);
        assert_eq!(stored.read_at, Some(at));
    }

    #[tokio::test]
    async fn item_for_missing_shelf_is_rejected() {
        let (_, remote) = adapter();
        let item = Item {
            id: "i".into(),
            name: "Viti".into(),
            quantity: 3,
        };
        let err = remote.insert_item("nope", &item).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(_)));
    }
}
