//! Backup export and import across both stores.

use std::path::{Path, PathBuf};

use warehouse_domain::{now_millis, ExportDocument, ImportDocument, NewNote};

use crate::cache::{LocalCache, SHELVES_KEY};
use crate::error::{Result, TransferError};
use crate::store::{NoteStore, ShelfStore};

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Shelves written to the local cache, `None` when the file had none.
    pub shelves: Option<usize>,
    pub notes_added: usize,
    /// Title and error of each note that could not be added.
    pub note_failures: Vec<(String, String)>,
}

pub struct DataTransfer {
    cache: LocalCache,
    shelves: ShelfStore,
    notes: NoteStore,
    offline: bool,
}

impl DataTransfer {
    pub fn new(cache: LocalCache, shelves: ShelfStore, notes: NoteStore, offline: bool) -> Self {
        Self {
            cache,
            shelves,
            notes,
            offline,
        }
    }

    /// Snapshot both collections into a backup document.
    pub fn export(&self) -> ExportDocument {
        ExportDocument::new(self.shelves.snapshot(), self.notes.snapshot(), now_millis())
    }

    /// Write a backup into `dir` under its suggested file name.
    pub fn export_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        let document = self.export();
        let json = document.to_json_pretty().map_err(TransferError::from)?;
        let path = dir.join(document.file_name());
        std::fs::write(&path, json).map_err(TransferError::from)?;
        tracing::info!(path = %path.display(), "Exported backup");
        Ok(path)
    }

    /// Import a backup.
    ///
    /// Shelves overwrite the locally cached layout wholesale; an offline shelf
    /// store is reloaded from it. Notes are appended one by one through the
    /// note store, keeping only title and content.
    pub async fn import(&self, json: &str) -> Result<ImportReport> {
        let document = ImportDocument::from_json(json).map_err(TransferError::from)?;
        let mut report = ImportReport::default();

        if let Some(shelves) = document.shelves {
            self.cache.try_save(SHELVES_KEY, &shelves)?;
            report.shelves = Some(shelves.len());
            if self.offline {
                self.shelves.reload_silent().await?;
            }
        }

        for note in document.notes.unwrap_or_default() {
            let title = note.title.clone();
            match self.notes.create(NewNote::from(note)).await {
                Ok(_) => report.notes_added += 1,
                Err(e) => {
                    tracing::warn!("Skipping imported note '{}': {}", title, e);
                    report.note_failures.push((title, e.to_string()));
                }
            }
        }

        tracing::info!(
            shelves = ?report.shelves,
            notes = report.notes_added,
            failed = report.note_failures.len(),
            "Imported backup"
        );
        Ok(report)
    }

    pub async fn import_file(&self, path: &Path) -> Result<ImportReport> {
        let json = std::fs::read_to_string(path).map_err(TransferError::from)?;
        self.import(&json).await
    }
}
