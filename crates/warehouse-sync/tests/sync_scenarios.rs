use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use warehouse_domain::{NewItem, NewNote, NewShelf, Position, Shelf, ShelfPatch, Size};
use warehouse_sync::cache::{NOTES_KEY, SHELVES_KEY};
use warehouse_sync::remote::SortOrder;
use warehouse_sync::{
    KeyValueStorage, LoadPhase, LocalCache, MemoryBackend, MemoryStorage, RemoteAdapter,
    RemoteBackend, RemoteConfig, RemoteError, ShelfStore, SqliteStorage, SyncConfig, Table,
    Warehouse,
};

fn online_config() -> Arc<SyncConfig> {
    Arc::new(SyncConfig::online(RemoteConfig::new(
        "https://demo.supabase.co",
        "anon",
    )))
}

async fn online_warehouse() -> (Arc<MemoryBackend>, Warehouse) {
    let backend = Arc::new(MemoryBackend::new());
    let remote: Arc<dyn RemoteBackend> = backend.clone();
    let warehouse = Warehouse::open(online_config(), Arc::new(MemoryStorage::new()), Some(remote));
    warehouse.load().await.unwrap();
    (backend, warehouse)
}

fn shelf_at(x: f64, z: f64) -> NewShelf {
    NewShelf {
        position: Position::new(x, 1.0, z),
        size: Size::new(1.0, 2.0, 0.5),
        ..Default::default()
    }
}

#[tokio::test]
async fn offline_cache_tracks_every_change() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn KeyValueStorage> =
        Arc::new(SqliteStorage::open(&dir.path().join("cache.sqlite")).unwrap());
    let cache = LocalCache::new(storage.clone());
    let warehouse = Warehouse::open(Arc::new(SyncConfig::offline()), storage, None);
    warehouse.load().await.unwrap();

    let shelves = &warehouse.shelves;
    let check = || assert_eq!(cache.load::<Shelf>(SHELVES_KEY), shelves.snapshot());

    check();
    let id = shelves.create(shelf_at(6.0, 0.0)).await.unwrap();
    check();
    let item = shelves
        .add_item(&id, NewItem::new("Guanti", 12))
        .await
        .unwrap()
        .unwrap();
    check();
    shelves
        .update_item(&id, &item, warehouse_domain::ItemPatch::quantity(10))
        .await
        .unwrap();
    check();
    shelves.update(&id, ShelfPatch::name(Some("Scaffale D".into()))).await.unwrap();
    check();
    shelves.delete_item(&id, &item).await.unwrap();
    check();
    shelves.delete(&id).await.unwrap();
    check();

    let note = warehouse.notes.create(NewNote::new("Ordine", "Viti M6")).await.unwrap();
    warehouse.notes.mark_read(&note).await.unwrap();
    assert_eq!(cache.load::<warehouse_domain::Note>(NOTES_KEY), warehouse.notes.snapshot());
}

#[tokio::test]
async fn seed_is_installed_exactly_once() {
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let config = Arc::new(SyncConfig::offline());

    let first = Warehouse::open(config.clone(), storage.clone(), None);
    first.load().await.unwrap();
    assert_eq!(first.shelves.snapshot().len(), 3);
    for shelf in first.shelves.snapshot() {
        first.shelves.delete(&shelf.id).await.unwrap();
    }

    let second = Warehouse::open(config, storage, None);
    second.load().await.unwrap();
    assert!(second.shelves.snapshot().is_empty());
}

#[tokio::test]
async fn failed_update_restores_previous_fields() {
    let (backend, warehouse) = online_warehouse().await;
    let id = warehouse.shelves.create(shelf_at(0.0, 0.0)).await.unwrap();
    let before = warehouse.shelves.get(&id).unwrap();

    backend.fail_next(RemoteError::Unavailable("timeout".into()));
    let patch = ShelfPatch {
        color: Some("#336699".into()),
        name: Some(Some("Nuovo".into())),
        ..Default::default()
    };
    assert!(warehouse.shelves.update(&id, patch).await.is_err());
    assert_eq!(warehouse.shelves.get(&id).unwrap(), before);
}

#[tokio::test]
async fn loading_twice_is_idempotent() {
    let (_, warehouse) = online_warehouse().await;
    let a = warehouse.shelves.create(shelf_at(0.0, 0.0)).await.unwrap();
    warehouse.shelves.add_item(&a, NewItem::new("Nastro", 4)).await.unwrap();
    warehouse.notes.create(NewNote::new("Nota", "Testo")).await.unwrap();

    warehouse.load().await.unwrap();
    let (shelves, notes) = (warehouse.shelves.snapshot(), warehouse.notes.snapshot());
    warehouse.load().await.unwrap();
    assert_eq!(warehouse.shelves.snapshot(), shelves);
    assert_eq!(warehouse.notes.snapshot(), notes);
}

#[tokio::test]
async fn deleting_a_shelf_cascades_to_items() {
    let (backend, warehouse) = online_warehouse().await;
    let a = warehouse.shelves.create(shelf_at(0.0, 0.0)).await.unwrap();
    let b = warehouse.shelves.create(shelf_at(3.0, 0.0)).await.unwrap();
    warehouse.shelves.add_item(&a, NewItem::new("Colla", 2)).await.unwrap();
    warehouse.shelves.add_item(&b, NewItem::new("Carta", 9)).await.unwrap();

    warehouse.shelves.delete(&a).await.unwrap();

    let items = backend.rows(Table::Items);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["shelf_id"], b.as_str());

    warehouse.shelves.load().await.unwrap();
    let shelves = warehouse.shelves.snapshot();
    assert_eq!(shelves.len(), 1);
    assert_eq!(shelves[0].items.len(), 1);
}

#[tokio::test]
async fn drag_snaps_onto_same_sized_neighbour() {
    let (_, warehouse) = online_warehouse().await;
    let a = warehouse.shelves.create(shelf_at(0.0, 3.0)).await.unwrap();
    warehouse.shelves.create(shelf_at(10.0, 0.0)).await.unwrap();

    warehouse.shelves.drag_to(&a, 9.7, 3.0).await.unwrap();
    assert_eq!(
        warehouse.shelves.get(&a).unwrap().position,
        Position::new(10.0, 1.0, 3.0)
    );

    // Persisted remotely as well.
    warehouse.shelves.load().await.unwrap();
    assert_eq!(warehouse.shelves.get(&a).unwrap().position.x, 10.0);
}

#[tokio::test]
async fn marking_read_twice_keeps_first_timestamp() {
    let warehouse = Warehouse::open(
        Arc::new(SyncConfig::offline()),
        Arc::new(MemoryStorage::new()),
        None,
    );
    warehouse.load().await.unwrap();
    let id = warehouse.notes.create(NewNote::new("Furgone", "Ore 9")).await.unwrap();

    warehouse.notes.mark_read(&id).await.unwrap();
    let first = warehouse.notes.get(&id).unwrap().read_at;
    assert!(first.is_some());

    tokio::time::sleep(Duration::from_millis(5)).await;
    warehouse.notes.mark_read(&id).await.unwrap();
    assert_eq!(warehouse.notes.get(&id).unwrap().read_at, first);
}

#[tokio::test]
async fn rollback_after_intervening_reload_is_discarded() {
    let backend = Arc::new(MemoryBackend::new());
    let store = ShelfStore::new(
        warehouse_sync::Backing::Remote(RemoteAdapter::new(backend.clone())),
        &SyncConfig::default(),
    );
    store.load().await.unwrap();
    let id = store.create(shelf_at(0.0, 0.0)).await.unwrap();

    // Another client recolours the shelf; this store has not seen it yet.
    backend
        .update(Table::Shelves, &id, json!({ "color": "#00FF00" }))
        .await
        .unwrap();

    backend.pause_writes();
    let update = {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move { store.update(&id, ShelfPatch::color("#000000")).await })
    };
    while backend.parked_writes() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(store.get(&id).unwrap().color, "#000000");

    store.reload_silent().await.unwrap();
    assert_eq!(store.get(&id).unwrap().color, "#00FF00");

    backend.fail_next(RemoteError::Rejected("conflict".into()));
    backend.resume_writes();
    assert!(update.await.unwrap().is_err());

    // The reload wins over the stale undo.
    assert_eq!(store.get(&id).unwrap().color, "#00FF00");
}

#[tokio::test]
async fn change_notice_reloads_without_loading_phase() {
    let (backend, warehouse) = online_warehouse().await;
    let (_shelf_watch, _note_watch) = warehouse.watch().await.unwrap();
    let mut status = warehouse.shelves.watch_status();

    backend
        .insert(
            Table::Shelves,
            json!({
                "id": "remote-1",
                "position": [4.0, 1.0, 4.0],
                "size": [1.0, 2.0, 0.5],
                "color": "#A0522D",
                "name": null
            }),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            status.changed().await.unwrap();
            let current = *status.borrow_and_update();
            assert_ne!(current.phase, LoadPhase::Loading);
            if warehouse.shelves.get("remote-1").is_some() {
                break;
            }
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn dropping_the_watch_releases_subscriptions() {
    let (backend, warehouse) = online_warehouse().await;
    let handle = warehouse.notes.watch_changes().await.unwrap();
    assert!(handle.is_active());
    handle.unsubscribe();

    // Let the aborted follower unwind before another client writes.
    tokio::task::yield_now().await;
    let revision = warehouse.notes.status().revision;
    backend
        .insert(
            Table::Notes,
            json!({
                "id": "remote-note",
                "title": "Altro client",
                "content": "x",
                "is_read": false,
                "read_at": null
            }),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(warehouse.notes.status().revision, revision);
    assert!(warehouse.notes.snapshot().is_empty());
    assert_eq!(
        backend.select(Table::Notes, SortOrder::Ascending).await.unwrap().len(),
        1
    );
}
