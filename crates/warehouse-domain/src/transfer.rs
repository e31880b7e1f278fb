//! Backup document exchanged by export and import.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{NewNote, Note, Shelf};

/// Format version written into every export.
pub const EXPORT_VERSION: &str = "1.0";

/// A full backup: `{shelves, notes, exportDate, version}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub shelves: Vec<Shelf>,
    pub notes: Vec<Note>,
    pub export_date: DateTime<Utc>,
    pub version: String,
}

impl ExportDocument {
    pub fn new(shelves: Vec<Shelf>, notes: Vec<Note>, export_date: DateTime<Utc>) -> Self {
        Self {
            shelves,
            notes,
            export_date,
            version: EXPORT_VERSION.to_string(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Suggested file name, e.g. `warehouse-backup-2026-10-19.json`.
    pub fn file_name(&self) -> String {
        backup_file_name(self.export_date.date_naive())
    }
}

pub fn backup_file_name(date: NaiveDate) -> String {
    format!("warehouse-backup-{}.json", date.format("%Y-%m-%d"))
}

/// The parts of a backup an import reads.
///
/// Both sections are optional so partial or hand-written files still import;
/// notes only contribute their title and content.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImportDocument {
    #[serde(default)]
    pub shelves: Option<Vec<Shelf>>,
    #[serde(default)]
    pub notes: Option<Vec<ImportedNote>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportedNote {
    pub title: String,
    pub content: String,
}

impl From<ImportedNote> for NewNote {
    fn from(note: ImportedNote) -> Self {
        NewNote::new(note.title, note.content)
    }
}

impl ImportDocument {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::now_millis;
    use crate::seed::seed_shelves;

    #[test]
    fn export_layout() {
        let note = NewNote::new("Inventario", "Contare i chiodi").into_note("n1".into(), now_millis());
        let doc = ExportDocument::new(seed_shelves(), vec![note], Utc::now());
        let json: serde_json::Value = serde_json::from_str(&doc.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["version"], "1.0");
        assert!(json["exportDate"].is_string());
        assert_eq!(json["shelves"].as_array().unwrap().len(), 3);
        assert_eq!(json["notes"][0]["title"], "Inventario");
    }

    #[test]
    fn export_reads_back_as_import() {
        let note = NewNote::new("Inventario", "Contare i chiodi").into_note("n1".into(), now_millis());
        let doc = ExportDocument::new(seed_shelves(), vec![note], Utc::now());
        let import = ImportDocument::from_json(&doc.to_json_pretty().unwrap()).unwrap();
        assert_eq!(import.shelves.unwrap(), seed_shelves());
        assert_eq!(
            import.notes.unwrap(),
            vec![ImportedNote {
                title: "Inventario".into(),
                content: "Contare i chiodi".into(),
            }]
        );
    }

    #[test]
    fn import_tolerates_missing_sections() {
        let import = ImportDocument::from_json(r#"{"notes":[{"title":"a","content":"b"}]}"#).unwrap();
        assert!(import.shelves.is_none());
        assert_eq!(import.notes.unwrap().len(), 1);
    }

    #[test]
    fn import_rejects_garbage() {
        assert!(ImportDocument::from_json("not json").is_err());
    }

    #[test]
    fn file_name_uses_date() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(backup_file_name(date), "warehouse-backup-2026-10-19.json");
    }
}
