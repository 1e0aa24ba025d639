use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::GbifGeoError;

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn dataset_path(&self) -> Utf8PathBuf {
        self.root.join("dataset").join("gbif_occurrences.csv")
    }

    pub fn taxonomy_db_path(&self) -> Utf8PathBuf {
        self.root.join("database").join("taxonomy.db")
    }

    pub fn facts_path(&self) -> Utf8PathBuf {
        self.root.join("database").join("occurrences.jsonl")
    }

    pub fn run_metadata_path(&self) -> Utf8PathBuf {
        self.root.join("metadata").join("last_run.json")
    }

    pub fn ensure_layout(&self) -> Result<(), GbifGeoError> {
        for dir in ["dataset", "database", "metadata"] {
            fs::create_dir_all(self.root.join(dir).as_std_path())
                .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn write_run_metadata(&self, metadata: &RunMetadata) -> Result<(), GbifGeoError> {
        let path = self.run_metadata_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn read_run_metadata(&self) -> Result<Option<RunMetadata>, GbifGeoError> {
        let path = self.run_metadata_path();
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
        let metadata = serde_json::from_str(&content)
            .map_err(|err| GbifGeoError::Filesystem(format!("{path}: {err}")))?;
        Ok(Some(metadata))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub source: String,
    pub country: Option<String>,
    pub records: usize,
    pub dimension_rows: BTreeMap<String, usize>,
    pub fact_documents: usize,
    pub located_documents: usize,
    pub finished_at: String,
    pub tool: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new("/data/gbif");
        assert!(store.dataset_path().ends_with("dataset/gbif_occurrences.csv"));
        assert!(store.taxonomy_db_path().ends_with("database/taxonomy.db"));
        assert!(store.facts_path().ends_with("database/occurrences.jsonl"));
        assert!(store.run_metadata_path().starts_with(store.root()));
    }

    #[test]
    fn run_metadata_round_trip_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new(root);
        assert_eq!(store.read_run_metadata().unwrap(), None);

        let metadata = RunMetadata {
            source: "gbif".to_string(),
            country: Some("BR".to_string()),
            records: 3,
            dimension_rows: BTreeMap::from([("kingdom".to_string(), 2)]),
            fact_documents: 3,
            located_documents: 2,
            finished_at: "2026-01-01T00:00:00+00:00".to_string(),
            tool: "gbif-geo/test".to_string(),
        };
        store.write_run_metadata(&metadata).unwrap();
        assert_eq!(store.read_run_metadata().unwrap(), Some(metadata));
    }
}
