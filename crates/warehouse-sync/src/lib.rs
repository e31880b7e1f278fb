//! warehouse-sync: keeps the warehouse collections in memory and in sync.
//!
//! Two modes, picked once at startup from [`SyncConfig`]:
//!
//! - **Offline**: collections live in a [`LocalCache`] and every in-memory
//!   change is written back immediately.
//! - **Online**: collections live in remote tables behind a
//!   [`RemoteBackend`]. Writes are optimistic and rolled back on failure, and
//!   remote change notices trigger silent reloads.

pub mod cache;
pub mod config;
pub mod error;
pub mod remote;
pub mod store;
pub mod transfer;

use std::sync::Arc;

pub use cache::{KeyValueStorage, LocalCache, MemoryStorage};
#[cfg(feature = "sqlite")]
pub use cache::SqliteStorage;
pub use config::{Mode, RemoteConfig, SyncConfig};
pub use error::{CacheError, ConfigError, RemoteError, Result, SyncError, TransferError};
pub use remote::{ChangeFeed, ChangeNotice, MemoryBackend, RemoteAdapter, RemoteBackend, Table};
#[cfg(feature = "postgrest")]
pub use remote::PostgrestBackend;
pub use store::{Backing, LoadPhase, NoteStore, ShelfStore, StoreStatus, WatchHandle};
pub use transfer::{DataTransfer, ImportReport};

/// Both stores wired to one backing, plus backup transfer.
pub struct Warehouse {
    config: Arc<SyncConfig>,
    cache: LocalCache,
    online: bool,
    pub shelves: ShelfStore,
    pub notes: NoteStore,
}

impl Warehouse {
    /// Wire the stores. `backend` is used only when the config selects
    /// online mode; without one the warehouse falls back to offline.
    pub fn open(
        config: Arc<SyncConfig>,
        storage: Arc<dyn KeyValueStorage>,
        backend: Option<Arc<dyn RemoteBackend>>,
    ) -> Self {
        let cache = LocalCache::new(storage);
        let backing = match (config.mode(), backend) {
            (Mode::Online, Some(backend)) => Backing::Remote(RemoteAdapter::new(backend)),
            (Mode::Online, None) => {
                tracing::warn!("Online mode selected without a backend, staying offline");
                Backing::Local(cache.clone())
            }
            (Mode::Offline, _) => Backing::Local(cache.clone()),
        };
        let online = matches!(backing, Backing::Remote(_));
        tracing::info!(online, "Opening warehouse");

        Self {
            shelves: ShelfStore::new(backing.clone(), &config),
            notes: NoteStore::new(backing, &config),
            cache,
            online,
            config,
        }
    }

    /// Open with the hosted backend when the config selects online mode.
    #[cfg(feature = "postgrest")]
    pub fn connect(config: Arc<SyncConfig>, storage: Arc<dyn KeyValueStorage>) -> Result<Self> {
        let backend = match (&config.remote, config.mode()) {
            (Some(remote), Mode::Online) => {
                let backend: Arc<dyn RemoteBackend> =
                    Arc::new(PostgrestBackend::new(remote, &config.channel_prefix)?);
                Some(backend)
            }
            _ => None,
        };
        Ok(Self::open(config, storage, backend))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Load both collections. Failures leave the collection empty and are
    /// returned after both loads ran.
    pub async fn load(&self) -> Result<()> {
        let (shelves, notes) = tokio::join!(self.shelves.load(), self.notes.load());
        shelves.and(notes)
    }

    /// Follow remote changes for both collections.
    pub async fn watch(&self) -> Result<(WatchHandle, WatchHandle)> {
        Ok((
            self.shelves.watch_changes().await?,
            self.notes.watch_changes().await?,
        ))
    }

    pub fn transfer(&self) -> DataTransfer {
        DataTransfer::new(
            self.cache.clone(),
            self.shelves.clone(),
            self.notes.clone(),
            !self.is_online(),
        )
    }
}
