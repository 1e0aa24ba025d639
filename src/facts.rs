use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::sync::{Arc, RwLock};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::GbifGeoError;
use crate::normalize::FactDocument;

pub trait FactStore: Send + Sync {
    /// Discards the whole collection and replaces it with `documents` in one
    /// step. Returns how many documents the collection now holds.
    fn replace_all(&self, documents: &[FactDocument]) -> Result<usize, GbifGeoError>;

    fn scan_located(&self) -> Result<Vec<FactDocument>, GbifGeoError>;
}

pub fn load_facts(
    store: &dyn FactStore,
    documents: &[FactDocument],
) -> Result<usize, GbifGeoError> {
    let inserted = store.replace_all(documents)?;
    tracing::info!(inserted, "fact collection reloaded");
    Ok(inserted)
}

#[derive(Debug, Clone)]
pub struct JsonlFactStore {
    path: Utf8PathBuf,
}

impl JsonlFactStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parent_dir(&self) -> &Utf8Path {
        self.path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."))
    }
}

impl FactStore for JsonlFactStore {
    fn replace_all(&self, documents: &[FactDocument]) -> Result<usize, GbifGeoError> {
        let parent = self.parent_dir();
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("gbif-geo-facts")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| GbifGeoError::FactStore(err.to_string()))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            for document in documents {
                serde_json::to_writer(&mut writer, document)
                    .map_err(|err| GbifGeoError::FactStore(err.to_string()))?;
                writer
                    .write_all(b"\n")
                    .map_err(|err| GbifGeoError::FactStore(err.to_string()))?;
            }
            writer
                .flush()
                .map_err(|err| GbifGeoError::FactStore(err.to_string()))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|err| GbifGeoError::FactStore(err.to_string()))?;
        temp.persist(self.path.as_std_path())
            .map_err(|err| GbifGeoError::FactStore(err.to_string()))?;
        Ok(documents.len())
    }

    fn scan_located(&self) -> Result<Vec<FactDocument>, GbifGeoError> {
        let file = match fs::File::open(self.path.as_std_path()) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path, "fact collection not loaded yet");
                return Ok(Vec::new());
            }
            Err(err) => return Err(GbifGeoError::FactStore(format!("open {}: {err}", self.path))),
        };

        let mut located = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|err| GbifGeoError::FactStore(err.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FactDocument>(&line) {
                Ok(document) if document.coordinates.point().is_some() => located.push(document),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(line = index + 1, %err, "skipping undecodable fact document");
                }
            }
        }
        Ok(located)
    }
}

#[derive(Default)]
pub struct MemoryFactStore {
    documents: RwLock<Arc<Vec<FactDocument>>>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Result<Arc<Vec<FactDocument>>, GbifGeoError> {
        self.documents
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| GbifGeoError::FactStore("collection lock poisoned".to_string()))
    }
}

impl FactStore for MemoryFactStore {
    fn replace_all(&self, documents: &[FactDocument]) -> Result<usize, GbifGeoError> {
        let fresh = Arc::new(documents.to_vec());
        let mut guard = self
            .documents
            .write()
            .map_err(|_| GbifGeoError::FactStore("collection lock poisoned".to_string()))?;
        *guard = fresh;
        Ok(documents.len())
    }

    fn scan_located(&self) -> Result<Vec<FactDocument>, GbifGeoError> {
        Ok(self
            .snapshot()?
            .iter()
            .filter(|document| document.coordinates.point().is_some())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Coordinates;

    fn located(name: &str, lat: f64, lon: f64) -> FactDocument {
        FactDocument {
            scientific_name: Some(name.to_string()),
            coordinates: Coordinates::new(Some(lat), Some(lon)),
            ..FactDocument::default()
        }
    }

    #[test]
    fn memory_reload_replaces_everything() {
        let store = MemoryFactStore::new();
        store
            .replace_all(&[located("A", 0.0, 0.0), located("B", 1.0, 1.0)])
            .unwrap();
        let before = store.snapshot().unwrap();

        assert_eq!(store.replace_all(&[]).unwrap(), 0);
        assert!(store.scan_located().unwrap().is_empty());
        assert_eq!(before.len(), 2);
    }

    #[test]
    fn jsonl_scan_skips_unlocated_and_broken_lines() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("facts.jsonl")).unwrap();
        let store = JsonlFactStore::new(path.clone());

        let unlocated = FactDocument {
            scientific_name: Some("Nowhere".to_string()),
            coordinates: Coordinates::new(Some(1.0), None),
            ..FactDocument::default()
        };
        store
            .replace_all(&[located("A", 0.0, 0.0), unlocated, located("B", 0.0, 1.0)])
            .unwrap();

        let mut content = fs::read_to_string(path.as_std_path()).unwrap();
        content.push_str("{\"coordinates\": \"broken\"}\n");
        fs::write(path.as_std_path(), content).unwrap();

        let names = store
            .scan_located()
            .unwrap()
            .into_iter()
            .map(|doc| doc.scientific_name.unwrap())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn jsonl_missing_collection_scans_empty() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("absent.jsonl")).unwrap();
        assert!(JsonlFactStore::new(path).scan_located().unwrap().is_empty());
    }
}
