use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use super::{ChangeFeed, ChangeNotice, RemoteBackend, SortOrder, Table};
use crate::error::RemoteError;

#[derive(Default)]
struct Tables {
    rows: HashMap<Table, Vec<Value>>,
    last_created_millis: i64,
    subscribers: Vec<(Table, mpsc::UnboundedSender<ChangeNotice>)>,
}

impl Tables {
    fn table(&self, table: Table) -> &[Value] {
        self.rows.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn table_mut(&mut self, table: Table) -> &mut Vec<Value> {
        self.rows.entry(table).or_default()
    }

    fn contains(&self, table: Table, id: &str) -> bool {
        self.table(table).iter().any(|row| row_id(row) == Some(id))
    }

    /// Strictly increasing creation timestamps, so ordering is stable.
    fn next_created_at(&mut self) -> String {
        let millis = Utc::now().timestamp_millis().max(self.last_created_millis + 1);
        self.last_created_millis = millis;
        DateTime::from_timestamp_millis(millis)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn notify(&mut self, table: Table) {
        self.subscribers.retain(|(_, tx)| !tx.is_closed());
        for (subscribed, tx) in &self.subscribers {
            if *subscribed == table {
                let _ = tx.send(ChangeNotice { table });
            }
        }
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn created_at(row: &Value) -> &str {
    row.get("created_at").and_then(Value::as_str).unwrap_or("")
}

/// In-process remote with the same constraints as the hosted schema.
///
/// Items must reference an existing shelf, deleting a shelf deletes its
/// items, and every write notifies every subscriber of the written table.
/// Faults can be queued with [`MemoryBackend::fail_next`], and writes can be
/// held at a gate with [`MemoryBackend::pause_writes`] to stage races.
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    faults: Mutex<VecDeque<RemoteError>>,
    available: AtomicBool,
    gate: watch::Sender<bool>,
    parked: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            tables: Mutex::new(Tables::default()),
            faults: Mutex::new(VecDeque::new()),
            available: AtomicBool::new(true),
            gate,
            parked: AtomicUsize::new(0),
        }
    }

    /// Fail the next write with `error`. Queued faults apply in order.
    pub fn fail_next(&self, error: RemoteError) {
        lock(&self.faults).push_back(error);
    }

    /// While unavailable every call fails with `RemoteError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Hold subsequent writes until [`MemoryBackend::resume_writes`].
    pub fn pause_writes(&self) {
        self.gate.send_replace(false);
    }

    pub fn resume_writes(&self) {
        self.gate.send_replace(true);
    }

    /// Number of writes currently waiting at the gate.
    pub fn parked_writes(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    /// Current rows of `table` in insertion order.
    pub fn rows(&self, table: Table) -> Vec<Value> {
        lock(&self.tables).table(table).to_vec()
    }

    fn check_available(&self) -> Result<(), RemoteError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("memory backend offline".into()))
        }
    }

    async fn enter_write(&self) -> Result<(), RemoteError> {
        let mut open = self.gate.subscribe();
        if !*open.borrow() {
            self.parked.fetch_add(1, Ordering::SeqCst);
            let waited = open.wait_for(|open| *open).await.map(|_| ());
            self.parked.fetch_sub(1, Ordering::SeqCst);
            waited.map_err(|_| RemoteError::Unavailable("write gate closed".into()))?;
        }
        self.check_available()?;
        match lock(&self.faults).pop_front() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn select(&self, table: Table, order: SortOrder) -> Result<Vec<Value>, RemoteError> {
        self.check_available()?;
        let mut rows = lock(&self.tables).table(table).to_vec();
        rows.sort_by(|a, b| created_at(a).cmp(created_at(b)));
        if order == SortOrder::Descending {
            rows.reverse();
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, mut row: Value) -> Result<(), RemoteError> {
        self.enter_write().await?;
        let mut tables = lock(&self.tables);

        let id = row_id(&row)
            .ok_or_else(|| RemoteError::Rejected(format!("{} row without id", table)))?
            .to_string();
        if tables.contains(table, &id) {
            return Err(RemoteError::Rejected(format!(
                "duplicate key value violates unique constraint on {}.id: {}",
                table, id
            )));
        }
        if table == Table::Items {
            let shelf_id = row.get("shelf_id").and_then(Value::as_str).unwrap_or("");
            if !tables.contains(Table::Shelves, shelf_id) {
                return Err(RemoteError::Rejected(format!(
                    "insert on items violates foreign key: shelf {} does not exist",
                    shelf_id
                )));
            }
        }

        let created_at = tables.next_created_at();
        if let Some(fields) = row.as_object_mut() {
            fields.insert("created_at".into(), Value::String(created_at));
        }
        tables.table_mut(table).push(row);
        tables.notify(table);
        Ok(())
    }

    async fn update(&self, table: Table, id: &str, fields: Value) -> Result<(), RemoteError> {
        self.enter_write().await?;
        let Value::Object(fields) = fields else {
            return Err(RemoteError::Rejected(format!("{} update is not an object", table)));
        };
        let mut tables = lock(&self.tables);
        let target = tables
            .table_mut(table)
            .iter_mut()
            .find(|row| row_id(row) == Some(id))
            .and_then(Value::as_object_mut);
        // An update that matches no row succeeds with nothing changed.
        if let Some(target) = target {
            for (key, value) in fields {
                if key != "id" && key != "created_at" {
                    target.insert(key, value);
                }
            }
        }
        tables.notify(table);
        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), RemoteError> {
        self.enter_write().await?;
        let mut tables = lock(&self.tables);
        tables.table_mut(table).retain(|row| row_id(row) != Some(id));
        tables.notify(table);
        if table == Table::Shelves {
            tables
                .table_mut(Table::Items)
                .retain(|row| row.get("shelf_id").and_then(Value::as_str) != Some(id));
            tables.notify(Table::Items);
        }
        Ok(())
    }

    async fn subscribe(&self, table: Table) -> Result<ChangeFeed, RemoteError> {
        self.check_available()?;
        let (tx, feed) = ChangeFeed::channel(table);
        lock(&self.tables).subscribers.push((table, tx));
        Ok(feed)
    }
}
