//! Remote store adapter.
//!
//! `RemoteBackend` is the raw boundary: JSON rows in three tables plus a
//! coarse change feed. `RemoteAdapter` sits on top and speaks domain types,
//! translating snake_case rows and timestamp strings.

mod adapter;
mod memory;
#[cfg(feature = "postgrest")]
mod postgrest;
#[cfg(feature = "postgrest")]
mod realtime;
mod rows;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Row;
use tokio::sync::mpsc;

pub use adapter::RemoteAdapter;
pub use memory::MemoryBackend;
#[cfg(feature = "postgrest")]
pub use postgrest::PostgrestBackend;
pub use rows::{ItemRow, NoteRow, ShelfRow};

use crate::error::RemoteError;

/// Remote tables used by the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Shelves,
    Items,
    Notes,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Shelves => "shelves",
            Table::Items => "items",
            Table::Notes => "notes",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering of `select` results by `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// "Something changed in this table." Carries no row data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotice {
    pub table: Table,
}

/// Receiving end of a table subscription.
///
/// Dropping the feed (or calling [`ChangeFeed::unsubscribe`]) releases the
/// subscription; the backend stops delivering once it notices.
#[derive(Debug)]
pub struct ChangeFeed {
    table: Table,
    rx: mpsc::UnboundedReceiver<ChangeNotice>,
}

impl ChangeFeed {
    pub fn new(table: Table, rx: mpsc::UnboundedReceiver<ChangeNotice>) -> Self {
        Self { table, rx }
    }

    /// A feed plus the sender a backend pushes notices into.
    pub fn channel(table: Table) -> (mpsc::UnboundedSender<ChangeNotice>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(table, rx))
    }

    pub fn table(&self) -> Table {
        self.table
    }

    /// Next notice; `None` once the backend side has gone away.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        self.rx.recv().await
    }

    /// Discard notices already queued. Returns how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    pub fn unsubscribe(mut self) {
        self.rx.close();
    }
}

/// Raw access to the remote tables.
///
/// Rows are JSON objects with snake_case fields. The backend assigns
/// `created_at` on insert and notifies subscribers of every write, including
/// writes made through this same backend.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn select(&self, table: Table, order: SortOrder) -> Result<Vec<Row>, RemoteError>;

    async fn insert(&self, table: Table, row: Row) -> Result<(), RemoteError>;

    /// Merge `fields` into the row with `id`.
    async fn update(&self, table: Table, id: &str, fields: Row) -> Result<(), RemoteError>;

    async fn delete(&self, table: Table, id: &str) -> Result<(), RemoteError>;

    async fn subscribe(&self, table: Table) -> Result<ChangeFeed, RemoteError>;
}
