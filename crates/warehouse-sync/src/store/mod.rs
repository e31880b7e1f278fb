//! Entity stores: the in-memory authority for one collection each.
//!
//! Mutations are optimistic. The in-memory change lands first, then the
//! backing store is written; when the remote write fails the change is undone,
//! unless a reload replaced the collection in the meantime. Reloads are
//! ticketed so that only the most recently started one can land.

mod notes;
mod shelves;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use notes::NoteStore;
pub use shelves::ShelfStore;

use crate::cache::LocalCache;
use crate::remote::{ChangeFeed, RemoteAdapter};

/// Where a store's collection lives.
#[derive(Clone)]
pub enum Backing {
    /// Local cache only; every in-memory change is persisted.
    Local(LocalCache),
    /// Remote tables; nothing is written locally.
    Remote(RemoteAdapter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Uninitialized,
    Loading,
    Ready,
}

/// Observable state of a store. `revision` grows with every in-memory change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    pub phase: LoadPhase,
    pub revision: u64,
}

/// Reload generation observed when an optimistic change was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Generation(u64);

#[derive(Debug, Clone, Copy)]
pub(crate) struct ReloadTicket(u64);

struct Collection<T> {
    entries: Vec<T>,
    generation: u64,
    issued: u64,
    applied: u64,
    /// Newest visible reload ticket issued.
    visible: u64,
}

impl<T> Collection<T> {
    fn phase(&self) -> LoadPhase {
        if self.visible > self.applied {
            LoadPhase::Loading
        } else {
            LoadPhase::Ready
        }
    }
}

struct Persistence {
    cache: LocalCache,
    key: &'static str,
}

pub(crate) struct StoreCore<T> {
    name: &'static str,
    state: RwLock<Collection<T>>,
    status: watch::Sender<StoreStatus>,
    persistence: Option<Persistence>,
}

impl<T: Clone + Serialize> StoreCore<T> {
    pub(crate) fn new(name: &'static str) -> Self {
        let (status, _) = watch::channel(StoreStatus {
            phase: LoadPhase::Uninitialized,
            revision: 0,
        });
        Self {
            name,
            state: RwLock::new(Collection {
                entries: Vec::new(),
                generation: 0,
                issued: 0,
                applied: 0,
                visible: 0,
            }),
            status,
            persistence: None,
        }
    }

    /// Persist the collection under `key` after every change.
    pub(crate) fn persisted(mut self, cache: LocalCache, key: &'static str) -> Self {
        self.persistence = Some(Persistence { cache, key });
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Collection<T>> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collection<T>> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn snapshot(&self) -> Vec<T> {
        self.read().entries.clone()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.read().entries)
    }

    pub(crate) fn status(&self) -> StoreStatus {
        *self.status.borrow()
    }

    pub(crate) fn watch_status(&self) -> watch::Receiver<StoreStatus> {
        self.status.subscribe()
    }

    /// Start a reload. A visible reload enters `Loading` until it lands.
    pub(crate) fn begin_reload(&self, visible: bool) -> ReloadTicket {
        let ticket = {
            let mut state = self.write();
            state.issued += 1;
            if visible {
                state.visible = state.issued;
            }
            ReloadTicket(state.issued)
        };
        if visible {
            self.status.send_modify(|s| s.phase = LoadPhase::Loading);
        }
        ticket
    }

    /// Replace the collection with a reload result.
    ///
    /// Returns `false` when a newer reload has already landed.
    pub(crate) fn finish_reload(&self, ticket: ReloadTicket, entries: Vec<T>) -> bool {
        let phase = {
            let mut state = self.write();
            if ticket.0 <= state.applied {
                tracing::debug!(store = self.name, ticket = ticket.0, "Dropping stale reload");
                return false;
            }
            state.applied = ticket.0;
            state.generation += 1;
            state.entries = entries;
            self.persist(&state.entries);
            state.phase()
        };
        self.publish_change(phase);
        true
    }

    /// Apply an optimistic change.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> (R, Generation) {
        let (applied, phase) = {
            let mut state = self.write();
            let result = f(&mut state.entries);
            self.persist(&state.entries);
            ((result, Generation(state.generation)), state.phase())
        };
        self.publish_change(phase);
        applied
    }

    /// Like [`StoreCore::mutate`], but `None` from `f` means nothing changed.
    pub(crate) fn try_mutate<R>(
        &self,
        f: impl FnOnce(&mut Vec<T>) -> Option<R>,
    ) -> Option<(R, Generation)> {
        let (applied, phase) = {
            let mut state = self.write();
            let result = f(&mut state.entries)?;
            self.persist(&state.entries);
            ((result, Generation(state.generation)), state.phase())
        };
        self.publish_change(phase);
        Some(applied)
    }

    /// Undo an optimistic change, unless a reload landed after it was made.
    pub(crate) fn rollback(&self, generation: Generation, undo: impl FnOnce(&mut Vec<T>)) -> bool {
        let phase = {
            let mut state = self.write();
            if state.generation != generation.0 {
                tracing::warn!(
                    store = self.name,
                    "Discarding rollback: collection was reloaded after the change"
                );
                return false;
            }
            undo(&mut state.entries);
            self.persist(&state.entries);
            state.phase()
        };
        self.publish_change(phase);
        true
    }

    fn persist(&self, entries: &[T]) {
        if let Some(p) = &self.persistence {
            p.cache.save(p.key, entries);
        }
    }

    /// Announce a change. The phase stays `Loading` while a visible reload
    /// newer than the applied one is outstanding.
    fn publish_change(&self, phase: LoadPhase) {
        self.status.send_modify(|s| {
            s.phase = phase;
            s.revision += 1;
        });
    }
}

/// A store that can refetch its collection without a visible loading phase.
#[async_trait]
pub(crate) trait SilentReload: Clone + Send + Sync + 'static {
    async fn reload_silent(&self) -> crate::Result<()>;
}

/// Live subscription that reloads a store on remote changes.
///
/// Dropping the handle (or calling [`WatchHandle::unsubscribe`]) stops the
/// follower tasks and releases their feeds.
#[derive(Debug)]
pub struct WatchHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl WatchHandle {
    pub(crate) fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tasks }
    }

    /// No-op handle for stores without a remote.
    pub(crate) fn inactive() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn is_active(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }

    pub fn unsubscribe(self) {}
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Reload `store` silently for each notice on `feed`.
///
/// Notices that pile up while a reload runs are coalesced into the next one.
pub(crate) fn follow<S: SilentReload>(store: S, mut feed: ChangeFeed) -> JoinHandle<()> {
    tokio::spawn(async move {
        while feed.recv().await.is_some() {
            let coalesced = feed.drain();
            tracing::debug!(table = %feed.table(), coalesced, "Change notice, reloading");
            // Failures are logged by the store.
            let _ = store.reload_silent().await;
        }
    })
}
