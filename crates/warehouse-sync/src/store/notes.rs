use std::sync::Arc;

use async_trait::async_trait;
use warehouse_domain::{new_entity_id, now_millis, EntityId, NewNote, Note, NotePatch, ReadState, Validate};

use super::{follow, Backing, Generation, SilentReload, StoreCore, StoreStatus, WatchHandle};
use crate::cache::NOTES_KEY;
use crate::config::SyncConfig;
use crate::error::{RemoteError, Result};
use crate::remote::Table;

#[derive(Debug, Clone)]
enum Undo {
    Remove(EntityId),
    Restore { index: usize, note: Note },
    Patch { id: EntityId, patch: NotePatch },
    Read { id: EntityId, state: ReadState },
}

impl Undo {
    fn apply(self, notes: &mut Vec<Note>) {
        match self {
            Undo::Remove(id) => notes.retain(|n| n.id != id),
            Undo::Restore { index, note } => {
                if notes.iter().all(|n| n.id != note.id) {
                    notes.insert(index.min(notes.len()), note);
                }
            }
            Undo::Patch { id, patch } => {
                if let Some(note) = notes.iter_mut().find(|n| n.id == id) {
                    patch.apply(note);
                }
            }
            Undo::Read { id, state } => {
                if let Some(note) = notes.iter_mut().find(|n| n.id == id) {
                    state.apply(note);
                }
            }
        }
    }
}

/// The note collection, newest first.
#[derive(Clone)]
pub struct NoteStore {
    core: Arc<StoreCore<Note>>,
    backing: Backing,
    reload_after_write: bool,
}

impl NoteStore {
    pub fn new(backing: Backing, config: &SyncConfig) -> Self {
        let core = match &backing {
            Backing::Local(cache) => StoreCore::new("notes").persisted(cache.clone(), NOTES_KEY),
            Backing::Remote(_) => StoreCore::new("notes"),
        };
        Self {
            core: Arc::new(core),
            backing,
            reload_after_write: config.reload_after_write,
        }
    }

    pub fn status(&self) -> StoreStatus {
        self.core.status()
    }

    pub fn watch_status(&self) -> tokio::sync::watch::Receiver<StoreStatus> {
        self.core.watch_status()
    }

    pub fn snapshot(&self) -> Vec<Note> {
        self.core.snapshot()
    }

    pub fn get(&self, id: &str) -> Option<Note> {
        self.core.with(|notes| notes.iter().find(|n| n.id == id).cloned())
    }

    pub fn unread_count(&self) -> usize {
        self.core.with(|notes| notes.iter().filter(|n| !n.is_read).count())
    }

    /// Notes never get sample data; an empty cache is an empty board.
    pub async fn load(&self) -> Result<()> {
        self.reload(true).await
    }

    pub async fn reload_silent(&self) -> Result<()> {
        self.reload(false).await
    }

    async fn reload(&self, visible: bool) -> Result<()> {
        let ticket = self.core.begin_reload(visible);
        match &self.backing {
            Backing::Local(cache) => {
                self.core.finish_reload(ticket, cache.load(NOTES_KEY));
                Ok(())
            }
            Backing::Remote(remote) => match remote.list_notes().await {
                Ok(notes) => {
                    tracing::debug!(count = notes.len(), "Loaded notes");
                    self.core.finish_reload(ticket, notes);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("Error loading notes from remote: {}", e);
                    self.core.finish_reload(ticket, Vec::new());
                    Err(e.into())
                }
            },
        }
    }

    pub async fn watch_changes(&self) -> Result<WatchHandle> {
        let Backing::Remote(remote) = &self.backing else {
            return Ok(WatchHandle::inactive());
        };
        let feed = remote.subscribe(Table::Notes).await?;
        Ok(WatchHandle::new(vec![follow(self.clone(), feed)]))
    }

    /// Post a note at the top of the board and return its id.
    pub async fn create(&self, fields: NewNote) -> Result<EntityId> {
        fields.validate()?;
        let note = fields.into_note(new_entity_id(), now_millis());
        let id = note.id.clone();

        let ((), generation) = self.core.mutate(|notes| notes.insert(0, note.clone()));

        if let Backing::Remote(remote) = &self.backing {
            let result = remote.insert_note(&note).await;
            self.settle("adding note", result, generation, Undo::Remove(id.clone()))
                .await?;
        }
        Ok(id)
    }

    /// Edit a note's title or content. The read flag only moves through
    /// [`NoteStore::mark_read`].
    pub async fn update(&self, id: &str, patch: NotePatch) -> Result<bool> {
        patch.validate()?;
        if patch.is_empty() {
            return Ok(self.get(id).is_some());
        }

        let applied = self.core.try_mutate(|notes| {
            let note = notes.iter_mut().find(|n| n.id == id)?;
            let inverse = patch.inverse(note);
            patch.apply(note);
            Some(inverse)
        });
        let Some((inverse, generation)) = applied else {
            tracing::warn!("Update of unknown note {}", id);
            return Ok(false);
        };

        if let Backing::Remote(remote) = &self.backing {
            let result = remote.update_note(id, &patch).await;
            let undo = Undo::Patch {
                id: id.to_string(),
                patch: inverse,
            };
            self.settle("updating note", result, generation, undo).await?;
        }
        Ok(true)
    }

    /// Mark a note read. The first `read_at` sticks; marking again changes
    /// nothing and makes no remote call.
    pub async fn mark_read(&self, id: &str) -> Result<bool> {
        match self.core.with(|notes| notes.iter().find(|n| n.id == id).map(|n| n.is_read)) {
            None => {
                tracing::warn!("Mark read of unknown note {}", id);
                return Ok(false);
            }
            Some(true) => return Ok(true),
            Some(false) => {}
        }

        let at = now_millis();
        let applied = self.core.try_mutate(|notes| {
            let note = notes.iter_mut().find(|n| n.id == id && !n.is_read)?;
            let before = ReadState::of(note);
            ReadState::read(at).apply(note);
            Some(before)
        });
        let Some((before, generation)) = applied else {
            return Ok(self.get(id).is_some());
        };

        if let Backing::Remote(remote) = &self.backing {
            let result = remote.mark_note_read(id, at).await;
            let undo = Undo::Read {
                id: id.to_string(),
                state: before,
            };
            self.settle("marking note read", result, generation, undo)
                .await?;
        }
        Ok(true)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.core.try_mutate(|notes| {
            let index = notes.iter().position(|n| n.id == id)?;
            Some((index, notes.remove(index)))
        });
        let Some(((index, note), generation)) = removed else {
            tracing::warn!("Delete of unknown note {}", id);
            return Ok(false);
        };

        if let Backing::Remote(remote) = &self.backing {
            let result = remote.delete_note(id).await;
            self.settle("deleting note", result, generation, Undo::Restore { index, note })
                .await?;
        }
        Ok(true)
    }

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
                    let _ = self.reload_silent().await;
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error {}: {}", action, e);
                self.core.rollback(generation, |notes| undo.apply(notes));
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl SilentReload for NoteStore {
    async fn reload_silent(&self) -> Result<()> {
        NoteStore::reload_silent(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::remote::{MemoryBackend, RemoteAdapter};

    fn offline() -> (LocalCache, NoteStore) {
        let cache = LocalCache::in_memory();
        let store = NoteStore::new(Backing::Local(cache.clone()), &SyncConfig::offline());
        (cache, store)
    }

    #[tokio::test]
    async fn offline_notes_start_empty_and_prepend() {
        let (cache, store) = offline();
        store.load().await.unwrap();
        assert!(store.snapshot().is_empty());

        store.create(NewNote::new("Primo", "a")).await.unwrap();
        store.create(NewNote::new("Secondo", "b")).await.unwrap();

        let titles: Vec<_> = store.snapshot().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["Secondo", "Primo"]);
        assert_eq!(cache.load::<Note>(NOTES_KEY), store.snapshot());
        assert_eq!(store.unread_count(), 2);
    }

    #[tokio::test]
    async fn empty_title_is_rejected() {
        let (_, store) = offline();
        assert!(store.create(NewNote::new("  ", "body")).await.is_err());
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn mark_read_skips_remote_when_already_read() {
        let backend = Arc::new(MemoryBackend::new());
        let store = NoteStore::new(
            Backing::Remote(RemoteAdapter::new(backend.clone())),
            &SyncConfig::default(),
        );
        store.load().await.unwrap();
        let id = store.create(NewNote::new("Turno", "Sabato")).await.unwrap();

        assert!(store.mark_read(&id).await.unwrap());
        // A second call must not reach the backend.
        backend.fail_next(RemoteError::Unavailable("should not be called".into()));
        assert!(store.mark_read(&id).await.unwrap());
        assert_eq!(store.unread_count(), 0);
    }

    #[tokio::test]
    async fn failed_mark_read_restores_unread() {
        let backend = Arc::new(MemoryBackend::new());
        let store = NoteStore::new(
            Backing::Remote(RemoteAdapter::new(backend.clone())),
            &SyncConfig::default(),
        );
        store.load().await.unwrap();
        let id = store.create(NewNote::new("Turno", "Sabato")).await.unwrap();

        backend.fail_next(RemoteError::Unavailable("down".into()));
        assert!(store.mark_read(&id).await.is_err());

        let note = store.get(&id).unwrap();
        assert!(!note.is_read);
        assert_eq!(note.read_at, None);
    }

    fn online() -> (Arc<MemoryBackend>, NoteStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = NoteStore::new(
            Backing::Remote(RemoteAdapter::new(backend.clone())),
            &SyncConfig::default(),
        );
        (backend, store)
    }

    #[tokio::test]
    async fn editing_a_read_note_keeps_read_at() {
        let (_, store) = offline();
        store.load().await.unwrap();
        let id = store.create(NewNote::new("Furgone", "Ore 9")).await.unwrap();
        store.mark_read(&id).await.unwrap();
        let read_at = store.get(&id).unwrap().read_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let patch = NotePatch {
            title: Some("Furgone in ritardo".into()),
            content: Some("Ore 10".into()),
        };
        assert!(store.update(&id, patch).await.unwrap());

        let note = store.get(&id).unwrap();
        assert_eq!(note.title, "Furgone in ritardo");
        assert!(note.is_read);
        assert_eq!(note.read_at, read_at);
    }

    #[tokio::test]
    async fn failed_create_removes_note() {
        let (backend, store) = online();
        store.load().await.unwrap();
        store.create(NewNote::new("Primo", "a")).await.unwrap();

        backend.fail_next(RemoteError::Rejected("duplicate".into()));
        assert!(store.create(NewNote::new("Secondo", "b")).await.is_err());

        let titles: Vec<_> = store.snapshot().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["Primo"]);
    }

    #[tokio::test]
    async fn failed_update_restores_text() {
        let (backend, store) = online();
        store.load().await.unwrap();
        let id = store.create(NewNote::new("Turno", "Sabato")).await.unwrap();
        let before = store.get(&id).unwrap();

        backend.fail_next(RemoteError::Unavailable("down".into()));
        let patch = NotePatch {
            title: Some("Turno spostato".into()),
            content: Some("Domenica".into()),
        };
        assert!(store.update(&id, patch).await.is_err());
        assert_eq!(store.get(&id).unwrap(), before);
    }

    #[tokio::test]
    async fn failed_delete_restores_note_at_its_index() {
        let (backend, store) = online();
        store.load().await.unwrap();
        store.create(NewNote::new("Primo", "a")).await.unwrap();
        let middle = store.create(NewNote::new("Secondo", "b")).await.unwrap();
        store.create(NewNote::new("Terzo", "c")).await.unwrap();
        let before = store.snapshot();

        backend.fail_next(RemoteError::Unavailable("down".into()));
        assert!(store.delete(&middle).await.is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn delete_unknown_note_is_noop() {
        let (_, store) = offline();
        store.load().await.unwrap();
        assert!(!store.delete("nope").await.unwrap());
    }
}
