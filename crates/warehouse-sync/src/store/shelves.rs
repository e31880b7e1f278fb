use std::sync::Arc;

use async_trait::async_trait;
use warehouse_domain::{
    highlighted_shelves, new_entity_id, search_items, seed_shelves, suggestions, EntityId, Item,
    ItemHit, ItemPatch, NewItem, NewShelf, PointerRay, Position, Shelf, ShelfPatch, Size, SnapRules,
    Validate,
};

use super::{follow, Backing, Generation, SilentReload, StoreCore, StoreStatus, WatchHandle};
use crate::cache::{LocalCache, SHELVES_KEY};
use crate::config::SyncConfig;
use crate::error::{RemoteError, Result};
use crate::remote::Table;

/// How to take back an optimistic shelf or item change.
#[derive(Debug, Clone)]
enum Undo {
    RemoveShelf(EntityId),
    RestoreShelf { index: usize, shelf: Shelf },
    PatchShelf { id: EntityId, patch: ShelfPatch },
    RemoveItem { shelf_id: EntityId, item_id: EntityId },
    RestoreItem { shelf_id: EntityId, index: usize, item: Item },
    PatchItem { shelf_id: EntityId, item_id: EntityId, patch: ItemPatch },
}

impl Undo {
    fn apply(self, shelves: &mut Vec<Shelf>) {
        match self {
            Undo::RemoveShelf(id) => shelves.retain(|s| s.id != id),
            Undo::RestoreShelf { index, shelf } => {
                if shelves.iter().all(|s| s.id != shelf.id) {
                    shelves.insert(index.min(shelves.len()), shelf);
                }
            }
            Undo::PatchShelf { id, patch } => {
                if let Some(shelf) = shelves.iter_mut().find(|s| s.id == id) {
                    patch.apply(shelf);
                }
            }
            Undo::RemoveItem { shelf_id, item_id } => {
                if let Some(shelf) = shelves.iter_mut().find(|s| s.id == shelf_id) {
                    shelf.items.retain(|i| i.id != item_id);
                }
            }
            Undo::RestoreItem {
                shelf_id,
                index,
                item,
            } => {
                if let Some(shelf) = shelves.iter_mut().find(|s| s.id == shelf_id) {
                    if shelf.item(&item.id).is_none() {
                        let index = index.min(shelf.items.len());
                        shelf.items.insert(index, item);
                    }
                }
            }
            Undo::PatchItem {
                shelf_id,
                item_id,
                patch,
            } => {
                if let Some(item) = shelves
                    .iter_mut()
                    .find(|s| s.id == shelf_id)
                    .and_then(|s| s.item_mut(&item_id))
                {
                    patch.apply(item);
                }
            }
        }
    }
}

/// The shelf collection, with items nested in their shelves.
#[derive(Clone)]
pub struct ShelfStore {
    core: Arc<StoreCore<Shelf>>,
    backing: Backing,
    reload_after_write: bool,
    snap: SnapRules,
}

impl ShelfStore {
    pub fn new(backing: Backing, config: &SyncConfig) -> Self {
        let core = match &backing {
            Backing::Local(cache) => StoreCore::new("shelves").persisted(cache.clone(), SHELVES_KEY),
            Backing::Remote(_) => StoreCore::new("shelves"),
        };
        Self {
            core: Arc::new(core),
            backing,
            reload_after_write: config.reload_after_write,
            snap: SnapRules::default(),
        }
    }

    pub fn with_snap_rules(mut self, snap: SnapRules) -> Self {
        self.snap = snap;
        self
    }

    pub fn status(&self) -> StoreStatus {
        self.core.status()
    }

    pub fn watch_status(&self) -> tokio::sync::watch::Receiver<StoreStatus> {
        self.core.watch_status()
    }

    /// A copy of the current collection.
    pub fn snapshot(&self) -> Vec<Shelf> {
        self.core.snapshot()
    }

    pub fn get(&self, id: &str) -> Option<Shelf> {
        self.core
            .with(|shelves| shelves.iter().find(|s| s.id == id).cloned())
    }

    // Loading

    /// Replace the collection from the backing store, entering `Loading`.
    ///
    /// A remote failure leaves the collection empty and returns the error.
    pub async fn load(&self) -> Result<()> {
        self.reload(true).await
    }

    /// Like [`ShelfStore::load`] without the `Loading` phase.
    pub async fn reload_silent(&self) -> Result<()> {
        self.reload(false).await
    }

    async fn reload(&self, visible: bool) -> Result<()> {
        let ticket = self.core.begin_reload(visible);
        match &self.backing {
            Backing::Local(cache) => {
                self.core.finish_reload(ticket, read_cache(cache));
                Ok(())
            }
            Backing::Remote(remote) => match remote.list_shelves().await {
                Ok(shelves) => {
                    tracing::debug!(count = shelves.len(), "Loaded shelves");
                    self.core.finish_reload(ticket, shelves);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("Error loading shelves from remote: {}", e);
                    self.core.finish_reload(ticket, Vec::new());
                    Err(e.into())
                }
            },
        }
    }

    /// Reload silently on every remote change to shelves or items.
    ///
    /// Offline stores return an inactive handle.
    pub async fn watch_changes(&self) -> Result<WatchHandle> {
        let Backing::Remote(remote) = &self.backing else {
            return Ok(WatchHandle::inactive());
        };
        let shelves = remote.subscribe(Table::Shelves).await?;
        let items = remote.subscribe(Table::Items).await?;
        Ok(WatchHandle::new(vec![
            follow(self.clone(), shelves),
            follow(self.clone(), items),
        ]))
    }

    // Shelves

    /// Add a shelf and return its new id.
    pub async fn create(&self, fields: NewShelf) -> Result<EntityId> {
        fields.validate()?;
        let shelf = fields.into_shelf(new_entity_id());
        let id = shelf.id.clone();

        let ((), generation) = self.core.mutate(|shelves| shelves.push(shelf.clone()));

        if let Backing::Remote(remote) = &self.backing {
            let result = remote.insert_shelf(&shelf).await;
            self.settle("adding shelf", result, generation, Undo::RemoveShelf(id.clone()))
                .await?;
        }
        Ok(id)
    }

    /// Merge `patch` into the shelf. `Ok(false)` when there is no such shelf.
    pub async fn update(&self, id: &str, patch: ShelfPatch) -> Result<bool> {
        patch.validate()?;
        if patch.is_empty() {
            return Ok(self.get(id).is_some());
        }

        let applied = self.core.try_mutate(|shelves| {
            let shelf = shelves.iter_mut().find(|s| s.id == id)?;
            let inverse = patch.inverse(shelf);
            patch.apply(shelf);
            Some(inverse)
        });
        let Some((inverse, generation)) = applied else {
            tracing::warn!("Update of unknown shelf {}", id);
            return Ok(false);
        };

        if let Backing::Remote(remote) = &self.backing {
            let result = remote.update_shelf(id, &patch).await;
            let undo = Undo::PatchShelf {
                id: id.to_string(),
                patch: inverse,
            };
            self.settle("updating shelf", result, generation, undo).await?;
        }
        Ok(true)
    }

    /// Remove the shelf together with its items.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.core.try_mutate(|shelves| {
            let index = shelves.iter().position(|s| s.id == id)?;
            Some((index, shelves.remove(index)))
        });
        let Some(((index, shelf), generation)) = removed else {
            tracing::warn!("Delete of unknown shelf {}", id);
            return Ok(false);
        };

        if let Backing::Remote(remote) = &self.backing {
            let result = remote.delete_shelf(id).await;
            self.settle("deleting shelf", result, generation, Undo::RestoreShelf { index, shelf })
                .await?;
        }
        Ok(true)
    }

    // Geometry

    /// Move a shelf to the ground point `(x, z)`, snapping onto neighbours
    /// with the same footprint. Height is kept.
    pub async fn drag_to(&self, id: &str, x: f64, z: f64) -> Result<bool> {
        let target = self.core.with(|shelves| {
            let dragged = shelves.iter().find(|s| s.id == id)?;
            Some(self.snap.snap(dragged, x, z, shelves))
        });
        match target {
            Some(position) => self.update(id, ShelfPatch::position(position)).await,
            None => {
                tracing::warn!("Drag of unknown shelf {}", id);
                Ok(false)
            }
        }
    }

    /// Drag along a pointer ray; a ray that never meets the ground is ignored.
    pub async fn drag_along(&self, id: &str, ray: &PointerRay) -> Result<bool> {
        match ray.ground_intersection() {
            Some((x, z)) => self.drag_to(id, x, z).await,
            None => Ok(false),
        }
    }

    /// Set the box size and rest the shelf `elevation` above the ground.
    pub async fn resize(&self, id: &str, size: Size, elevation: f64) -> Result<bool> {
        let Some(current) = self.core.with(|shelves| {
            shelves.iter().find(|s| s.id == id).map(|s| s.position)
        }) else {
            tracing::warn!("Resize of unknown shelf {}", id);
            return Ok(false);
        };
        let position = Position::at_elevation(current.x, current.z, elevation, size.height);
        self.update(id, ShelfPatch::geometry(position, size)).await
    }

    // Items

    /// Add an item to a shelf. `Ok(None)` when the shelf does not exist.
    pub async fn add_item(&self, shelf_id: &str, fields: NewItem) -> Result<Option<EntityId>> {
        fields.validate()?;
        let item = fields.into_item(new_entity_id());
        let item_id = item.id.clone();

        let applied = self.core.try_mutate(|shelves| {
            let shelf = shelves.iter_mut().find(|s| s.id == shelf_id)?;
            shelf.items.push(item.clone());
            Some(())
        });
        let Some(((), generation)) = applied else {
            tracing::warn!("Item added to unknown shelf {}", shelf_id);
            return Ok(None);
        };

        if let Backing::Remote(remote) = &self.backing {
            let result = remote.insert_item(shelf_id, &item).await;
            let undo = Undo::RemoveItem {
                shelf_id: shelf_id.to_string(),
                item_id: item_id.clone(),
            };
            self.settle("adding item", result, generation, undo).await?;
        }
        Ok(Some(item_id))
    }

    pub async fn update_item(&self, shelf_id: &str, item_id: &str, patch: ItemPatch) -> Result<bool> {
        patch.validate()?;
        if patch.is_empty() {
            return Ok(self.get(shelf_id).is_some_and(|s| s.item(item_id).is_some()));
        }

        let applied = self.core.try_mutate(|shelves| {
            let item = shelves
                .iter_mut()
                .find(|s| s.id == shelf_id)?
                .item_mut(item_id)?;
            let inverse = patch.inverse(item);
            patch.apply(item);
            Some(inverse)
        });
        let Some((inverse, generation)) = applied else {
            tracing::warn!("Update of unknown item {} on shelf {}", item_id, shelf_id);
            return Ok(false);
        };

        if let Backing::Remote(remote) = &self.backing {
            let result = remote.update_item(item_id, &patch).await;
            let undo = Undo::PatchItem {
                shelf_id: shelf_id.to_string(),
                item_id: item_id.to_string(),
                patch: inverse,
            };
            self.settle("updating item", result, generation, undo).await?;
        }
        Ok(true)
    }

    pub async fn delete_item(&self, shelf_id: &str, item_id: &str) -> Result<bool> {
        let removed = self.core.try_mutate(|shelves| {
            let shelf = shelves.iter_mut().find(|s| s.id == shelf_id)?;
            let index = shelf.items.iter().position(|i| i.id == item_id)?;
            Some((index, shelf.items.remove(index)))
        });
        let Some(((index, item), generation)) = removed else {
            tracing::warn!("Delete of unknown item {} on shelf {}", item_id, shelf_id);
            return Ok(false);
        };

        if let Backing::Remote(remote) = &self.backing {
            let result = remote.delete_item(item_id).await;
            let undo = Undo::RestoreItem {
                shelf_id: shelf_id.to_string(),
                index,
                item,
            };
            self.settle("deleting item", result, generation, undo).await?;
        }
        Ok(true)
    }

    // Search

    pub fn search_items(&self, query: &str) -> Vec<ItemHit> {
        self.core.with(|shelves| search_items(shelves, query))
    }

    pub fn highlighted_shelves(&self, query: &str) -> Vec<EntityId> {
        self.core.with(|shelves| highlighted_shelves(shelves, query))
    }

    pub fn suggestions(&self, query: &str) -> Vec<String> {
        self.core.with(|shelves| suggestions(shelves, query))
    }

    /// Finish a remote write: keep the optimistic change, or roll it back.
    async fn settle(
        &self,
        action: &str,
        result: std::result::Result<(), RemoteError>,
        generation: Generation,
        undo: Undo,
    ) -> Result<()> {
        match result {
            Ok(()) => {
                if self.reload_after_write {
                    // A failed reload is already logged.
                    let _ = self.reload_silent().await;
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error {}: {}", action, e);
                self.core.rollback(generation, |shelves| undo.apply(shelves));
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl SilentReload for ShelfStore {
    async fn reload_silent(&self) -> Result<()> {
        ShelfStore::reload_silent(self).await
    }
}

/// Shelves from the local cache, installing the seed layout on first use.
fn read_cache(cache: &LocalCache) -> Vec<Shelf> {
    match cache.stored::<Shelf>(SHELVES_KEY) {
        Some(shelves) => shelves,
        None if !cache.is_seeded() => {
            tracing::info!("Installing sample shelves");
            cache.mark_seeded();
            seed_shelves()
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryBackend, RemoteAdapter};
    use crate::store::LoadPhase;

    fn offline() -> (LocalCache, ShelfStore) {
        let cache = LocalCache::in_memory();
        let store = ShelfStore::new(Backing::Local(cache.clone()), &SyncConfig::offline());
        (cache, store)
    }

    async fn online() -> (Arc<MemoryBackend>, ShelfStore) {
        let backend = Arc::new(MemoryBackend::new());
        let adapter = RemoteAdapter::new(backend.clone());
        let store = ShelfStore::new(Backing::Remote(adapter), &SyncConfig::default());
        store.load().await.unwrap();
        (backend, store)
    }

    #[tokio::test]
    async fn first_offline_load_installs_seed() {
        let (cache, store) = offline();
        store.load().await.unwrap();
        assert_eq!(store.snapshot(), seed_shelves());
        assert!(cache.is_seeded());
        assert_eq!(cache.load::<Shelf>(SHELVES_KEY), seed_shelves());
        assert_eq!(store.status().phase, LoadPhase::Ready);
    }

    #[tokio::test]
    async fn emptied_collection_stays_empty() {
        let (_, store) = offline();
        store.load().await.unwrap();
        for id in ["1", "2", "3"] {
            assert!(store.delete(id).await.unwrap());
        }
        store.load().await.unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn update_unknown_shelf_is_noop() {
        let (_, store) = offline();
        store.load().await.unwrap();
        let revision = store.status().revision;
        assert!(!store
            .update("missing", ShelfPatch::color("#000000"))
            .await
            .unwrap());
        assert_eq!(store.status().revision, revision);
    }

    #[tokio::test]
    async fn invalid_fields_are_rejected_before_mutation() {
        let (_, store) = offline();
        store.load().await.unwrap();
        let before = store.snapshot();
        let err = store.add_item("1", NewItem::new("Viti", 0)).await.unwrap_err();
        assert!(matches!(err, crate::SyncError::Validation(_)));
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn resize_rests_on_elevation() {
        let (_, store) = offline();
        store.load().await.unwrap();
        store.resize("2", Size::new(1.0, 3.0, 0.5), 0.5).await.unwrap();
        let shelf = store.get("2").unwrap();
        assert_eq!(shelf.position, Position::new(0.0, 2.0, 0.0));
        assert_eq!(shelf.elevation(), 0.5);
    }

    #[tokio::test]
    async fn drag_snaps_to_matching_neighbour() {
        let (_, store) = offline();
        store.load().await.unwrap();
        // Shelf "1" sits at x = -3; drop "3" close to it in z-row 0.
        store.drag_to("3", -2.7, 0.3).await.unwrap();
        let moved = store.get("3").unwrap();
        assert_eq!(moved.position, Position::new(-3.0, 1.0, 0.0));
    }

    #[tokio::test]
    async fn failed_insert_rolls_back() {
        let (backend, store) = online().await;
        backend.fail_next(RemoteError::Unavailable("offline".into()));
        let err = store.create(NewShelf::default()).await.unwrap_err();
        assert!(matches!(err, crate::SyncError::Remote(_)));
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn failed_item_delete_restores_position() {
        let (backend, store) = online().await;
        let shelf = store.create(NewShelf::default()).await.unwrap();
        let a = store.add_item(&shelf, NewItem::new("A", 1)).await.unwrap().unwrap();
        let b = store.add_item(&shelf, NewItem::new("B", 2)).await.unwrap().unwrap();

        backend.fail_next(RemoteError::Rejected("nope".into()));
        assert!(store.delete_item(&shelf, &a).await.is_err());

        let ids: Vec<_> = store.get(&shelf).unwrap().items.into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn failed_shelf_delete_restores_shelf_with_items() {
        let (backend, store) = online().await;
        store.create(NewShelf::default()).await.unwrap();
        let middle = store.create(NewShelf::default()).await.unwrap();
        store.create(NewShelf::default()).await.unwrap();
        store.add_item(&middle, NewItem::new("Colla", 2)).await.unwrap();
        store.add_item(&middle, NewItem::new("Carta", 9)).await.unwrap();
        let before = store.snapshot();

        backend.fail_next(RemoteError::Unavailable("timeout".into()));
        assert!(store.delete(&middle).await.is_err());
        assert_eq!(store.snapshot(), before);
        assert_eq!(backend.rows(Table::Items).len(), 2);
    }

    #[tokio::test]
    async fn failed_item_update_restores_fields() {
        let (backend, store) = online().await;
        let shelf = store.create(NewShelf::default()).await.unwrap();
        let item = store.add_item(&shelf, NewItem::new("Nastro", 4)).await.unwrap().unwrap();
        let before = store.get(&shelf).unwrap();

        backend.fail_next(RemoteError::Rejected("check violation".into()));
        let patch = ItemPatch {
            name: Some("Nastro adesivo".into()),
            quantity: Some(40),
        };
        assert!(store.update_item(&shelf, &item, patch).await.is_err());
        assert_eq!(store.get(&shelf).unwrap(), before);
    }

    #[tokio::test]
    async fn remote_load_failure_empties_collection() {
        let (backend, store) = online().await;
        store.create(NewShelf::default()).await.unwrap();
        backend.set_available(false);
        assert!(store.load().await.is_err());
        assert!(store.snapshot().is_empty());
        assert_eq!(store.status().phase, LoadPhase::Ready);
    }

    #[tokio::test]
    async fn offline_store_has_no_live_watch() {
        let (_, store) = offline();
        let handle = store.watch_changes().await.unwrap();
        assert!(!handle.is_active());
    }
}
