use std::collections::HashMap;

use serde::Serialize;

use crate::dimension::{DimensionRow, DimensionStore};
use crate::domain::TaxonLevel;
use crate::error::GbifGeoError;

#[derive(Debug, Clone, Default)]
pub struct TaxonomyIndex {
    levels: HashMap<TaxonLevel, HashMap<i64, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaxonomicLineage {
    pub kingdom: Option<String>,
    pub phylum: Option<String>,
    pub class: Option<String>,
    pub order: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
    pub species: Option<String>,
}

impl TaxonomyIndex {
    pub fn load(store: &dyn DimensionStore) -> Result<Self, GbifGeoError> {
        let mut index = Self::default();
        for level in TaxonLevel::ALL {
            let rows = store.load_table(level)?;
            index.insert_rows(level, rows);
        }
        tracing::debug!(entries = index.len(), "taxonomy index loaded");
        Ok(index)
    }

    pub fn from_rows(rows: impl IntoIterator<Item = (TaxonLevel, Vec<DimensionRow>)>) -> Self {
        let mut index = Self::default();
        for (level, level_rows) in rows {
            index.insert_rows(level, level_rows);
        }
        index
    }

    fn insert_rows(&mut self, level: TaxonLevel, rows: Vec<DimensionRow>) {
        let names = self.levels.entry(level).or_default();
        for row in rows {
            names.entry(row.taxon_key).or_insert(row.name);
        }
    }

    pub fn resolve(&self, level: TaxonLevel, key: Option<i64>) -> Option<&str> {
        let key = key?;
        self.levels
            .get(&level)
            .and_then(|names| names.get(&key))
            .map(String::as_str)
    }

    pub fn lineage(&self, key_for: impl Fn(TaxonLevel) -> Option<i64>) -> TaxonomicLineage {
        let name = |level| self.resolve(level, key_for(level)).map(str::to_string);
        TaxonomicLineage {
            kingdom: name(TaxonLevel::Kingdom),
            phylum: name(TaxonLevel::Phylum),
            class: name(TaxonLevel::Class),
            order: name(TaxonLevel::Order),
            family: name(TaxonLevel::Family),
            genus: name(TaxonLevel::Genus),
            species: name(TaxonLevel::Species),
        }
    }

    pub fn len(&self) -> usize {
        self.levels.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::MemoryDimensionStore;

    fn row(taxon_key: i64, name: &str) -> DimensionRow {
        DimensionRow {
            taxon_key,
            name: name.to_string(),
        }
    }

    #[test]
    fn resolve_known_and_unknown_keys() {
        let store = MemoryDimensionStore::new();
        store
            .replace_table(TaxonLevel::Kingdom, &[row(1, "Animalia"), row(6, "Plantae")])
            .unwrap();
        let index = TaxonomyIndex::load(&store).unwrap();

        assert_eq!(index.resolve(TaxonLevel::Kingdom, Some(6)), Some("Plantae"));
        assert_eq!(index.resolve(TaxonLevel::Kingdom, Some(99)), None);
        assert_eq!(index.resolve(TaxonLevel::Kingdom, None), None);
        assert_eq!(index.resolve(TaxonLevel::Genus, Some(1)), None);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn lineage_fills_known_ranks() {
        let index = TaxonomyIndex::from_rows([
            (TaxonLevel::Kingdom, vec![row(1, "Animalia")]),
            (TaxonLevel::Family, vec![row(9703, "Felidae")]),
        ]);
        let lineage = index.lineage(|level| match level {
            TaxonLevel::Kingdom => Some(1),
            TaxonLevel::Family => Some(9703),
            TaxonLevel::Genus => Some(2435098),
            _ => None,
        });
        assert_eq!(lineage.kingdom.as_deref(), Some("Animalia"));
        assert_eq!(lineage.family.as_deref(), Some("Felidae"));
        assert_eq!(lineage.genus, None);
    }
}
