use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flux_core::{Capsule, PipelineSnapshot, WIRE_VERSION};

use crate::error::{Result, StoreError};
use crate::store::Store;

/// Portable dump of a journal: every capsule in wire form plus the snapshot.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct JournalExport {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub snapshot: Option<PipelineSnapshot>,
    #[serde(default)]
    pub capsules: Vec<Map<String, Value>>,
}

/// Counts from an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub snapshot: bool,
}

impl Store {
    pub fn export_journal(&self) -> Result<JournalExport> {
        Ok(JournalExport {
            version: WIRE_VERSION.to_string(),
            snapshot: self.load_snapshot()?,
            capsules: self.all_capsules()?.iter().map(Capsule::encode).collect(),
        })
    }

    pub fn export_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_journal()?)?)
    }

    pub fn export_json_file(&self, path: &Path) -> Result<()> {
        let json = self.export_json_string()?;
        fs::write(path, json).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Merge an export into this journal. Capsules already present are kept
    /// as stored; a snapshot in the export replaces the current one.
    pub fn import_json_str(&self, json: &str) -> Result<ImportSummary> {
        let export: JournalExport = serde_json::from_str(json)?;
        if !export.version.is_empty() && export.version != WIRE_VERSION {
            tracing::warn!(
                version = %export.version,
                expected = WIRE_VERSION,
                "importing journal from a different wire version"
            );
        }
        let capsules: Vec<Capsule> = export.capsules.iter().map(Capsule::decode).collect();
        let inserted = self.append_all(&capsules, export.snapshot.as_ref())?;
        let summary = ImportSummary {
            inserted,
            skipped: capsules.len() - inserted,
            snapshot: export.snapshot.is_some(),
        };
        tracing::info!(
            inserted = summary.inserted,
            skipped = summary.skipped,
            "journal import"
        );
        Ok(summary)
    }

    pub fn import_json_file(&self, path: &Path) -> Result<ImportSummary> {
        let json = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.import_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_core::{Supervisor, tokenize};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn populated() -> Store {
        let store = Store::open_in_memory().unwrap();
        let mut sup = Supervisor::default();
        let mut rng = SmallRng::seed_from_u64(42);
        let mut capsules = Vec::new();
        for text in ["hello world rust", "or maybe not?"] {
            let out = sup.step(&tokenize(text), None, &mut rng);
            capsules.push(out.raw);
            capsules.push(out.capsule);
        }
        store.append_all(&capsules, Some(&sup.snapshot())).unwrap();
        store
    }

    #[test]
    fn test_export_import_roundtrip() {
        let source = populated();
        let json = source.export_json_string().unwrap();

        let target = Store::open_in_memory().unwrap();
        let summary = target.import_json_str(&json).unwrap();
        assert_eq!(summary.inserted, 4);
        assert_eq!(summary.skipped, 0);
        assert!(summary.snapshot);

        assert_eq!(target.all_capsules().unwrap(), source.all_capsules().unwrap());
        assert_eq!(target.load_snapshot().unwrap(), source.load_snapshot().unwrap());
    }

    #[test]
    fn test_reimport_skips_existing() {
        let store = populated();
        let json = store.export_json_string().unwrap();
        let summary = store.import_json_str(&json).unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.skipped, 4);
        assert_eq!(store.count().unwrap(), 4);
    }

    #[test]
    fn test_export_shape() {
        let json = populated().export_json_string().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], WIRE_VERSION);
        assert_eq!(value["capsules"].as_array().unwrap().len(), 4);
        assert!(value["capsules"][0]["signature"].is_object());
        assert!(value["snapshot"]["orchestrator"].is_object());
    }

    #[test]
    fn test_import_minimal_document() {
        let store = Store::open_in_memory().unwrap();
        let summary = store
            .import_json_str(r#"{"capsules": [{"tokens": ["lone"], "state": "flux"}]}"#)
            .unwrap();
        assert_eq!(summary.inserted, 1);
        assert!(!summary.snapshot);
        let c = &store.all_capsules().unwrap()[0];
        assert_eq!(c.tokens, vec!["lone"]);
    }

    #[test]
    fn test_import_rejects_non_json() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.import_json_str("not json"),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.json");
        let source = populated();
        source.export_json_file(&path).unwrap();

        let target = Store::open_in_memory().unwrap();
        target.import_json_file(&path).unwrap();
        assert_eq!(target.count().unwrap(), 4);
    }

    #[test]
    fn test_import_missing_file() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .import_json_file(Path::new("/nonexistent/journal.json"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
