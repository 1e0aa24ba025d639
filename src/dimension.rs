use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use camino::Utf8Path;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::domain::TaxonLevel;
use crate::error::GbifGeoError;
use crate::record::RawRecord;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DimensionRow {
    pub taxon_key: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionTables {
    tables: BTreeMap<TaxonLevel, Vec<DimensionRow>>,
}

impl DimensionTables {
    pub fn rows(&self, level: TaxonLevel) -> &[DimensionRow] {
        self.tables.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaxonLevel, &[DimensionRow])> {
        TaxonLevel::ALL
            .into_iter()
            .map(move |level| (level, self.rows(level)))
    }

    pub fn row_counts(&self) -> BTreeMap<TaxonLevel, usize> {
        self.iter().map(|(level, rows)| (level, rows.len())).collect()
    }
}

/// Projects each record onto every rank's (key, name) pair. Pairs with a
/// missing side are dropped and repeated pairs collapse. When one key shows
/// up with different names the first one seen is kept, so keys stay unique.
pub fn extract_dimensions(records: &[RawRecord]) -> DimensionTables {
    let mut tables = BTreeMap::new();
    for level in TaxonLevel::ALL {
        let mut names: HashMap<i64, String> = HashMap::new();
        let mut rows = Vec::new();
        for record in records {
            let (Some(taxon_key), Some(name)) = (
                record.get_i64(level.key_field()),
                record.get_str(level.name_field()),
            ) else {
                continue;
            };
            match names.get(&taxon_key) {
                Some(existing) if *existing == name => {}
                Some(existing) => {
                    tracing::warn!(
                        level = %level,
                        taxon_key,
                        kept = %existing,
                        ignored = %name,
                        "taxon key carries conflicting names"
                    );
                }
                None => {
                    names.insert(taxon_key, name.clone());
                    rows.push(DimensionRow { taxon_key, name });
                }
            }
        }
        tables.insert(level, rows);
    }
    DimensionTables { tables }
}

pub trait DimensionStore: Send + Sync {
    /// Replaces the whole table for `level`; readers see either the old or
    /// the new contents, never a mix.
    fn replace_table(&self, level: TaxonLevel, rows: &[DimensionRow]) -> Result<(), GbifGeoError>;
    fn load_table(&self, level: TaxonLevel) -> Result<Vec<DimensionRow>, GbifGeoError>;
}

pub fn store_dimensions(
    store: &dyn DimensionStore,
    tables: &DimensionTables,
) -> Result<(), GbifGeoError> {
    for (level, rows) in tables.iter() {
        store.replace_table(level, rows)?;
        tracing::info!(table = %level.table_name(), rows = rows.len(), "dimension table replaced");
    }
    Ok(())
}

pub struct SqliteDimensionStore {
    conn: Mutex<Connection>,
}

impl SqliteDimensionStore {
    pub fn open(path: &Utf8Path) -> Result<Self, GbifGeoError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            std::fs::create_dir_all(parent.as_std_path())
                .map_err(|err| GbifGeoError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path.as_std_path())
            .map_err(|err| GbifGeoError::DimensionStore(format!("open {path}: {err}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|err| GbifGeoError::DimensionStore(err.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, GbifGeoError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| GbifGeoError::DimensionStore(err.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, GbifGeoError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| GbifGeoError::DimensionStore("connection lock poisoned".to_string()))?;
        f(&mut *guard).map_err(|err| GbifGeoError::DimensionStore(err.to_string()))
    }
}

impl DimensionStore for SqliteDimensionStore {
    fn replace_table(&self, level: TaxonLevel, rows: &[DimensionRow]) -> Result<(), GbifGeoError> {
        let table = level.table_name();
        let key_col = level.key_field();
        let name_col = level.name_field();
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute_batch(&format!(
                "DROP TABLE IF EXISTS `{table}`;
                 CREATE TABLE `{table}` (`{key_col}` INTEGER PRIMARY KEY, `{name_col}` TEXT);"
            ))?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO `{table}` (`{key_col}`, `{name_col}`) VALUES (?1, ?2)"
                ))?;
                for row in rows {
                    stmt.execute(params![row.taxon_key, row.name])?;
                }
            }
            tx.commit()
        })
    }

    fn load_table(&self, level: TaxonLevel) -> Result<Vec<DimensionRow>, GbifGeoError> {
        let table = level.table_name();
        let key_col = level.key_field();
        let name_col = level.name_field();
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                params![table],
                |row| row.get(0),
            )?;
            if !exists {
                return Ok(Vec::new());
            }
            let mut stmt = conn.prepare(&format!(
                "SELECT `{key_col}`, `{name_col}` FROM `{table}` WHERE `{name_col}` IS NOT NULL"
            ))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(DimensionRow {
                        taxon_key: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

#[derive(Default)]
pub struct MemoryDimensionStore {
    tables: RwLock<BTreeMap<TaxonLevel, Vec<DimensionRow>>>,
}

impl MemoryDimensionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DimensionStore for MemoryDimensionStore {
    fn replace_table(&self, level: TaxonLevel, rows: &[DimensionRow]) -> Result<(), GbifGeoError> {
        let mut guard = self
            .tables
            .write()
            .map_err(|_| GbifGeoError::DimensionStore("table lock poisoned".to_string()))?;
        guard.insert(level, rows.to_vec());
        Ok(())
    }

    fn load_table(&self, level: TaxonLevel) -> Result<Vec<DimensionRow>, GbifGeoError> {
        let guard = self
            .tables
            .read()
            .map_err(|_| GbifGeoError::DimensionStore("table lock poisoned".to_string()))?;
        Ok(guard.get(&level).cloned().unwrap_or_default())
    }
}
