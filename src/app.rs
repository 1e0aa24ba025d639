use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;

use crate::config::QuerySettings;
use crate::dimension::{DimensionStore, extract_dimensions, store_dimensions};
use crate::domain::{CountryCode, TaxonLevel};
use crate::error::{EtlStage, GbifGeoError};
use crate::facts::{FactStore, load_facts};
use crate::gbif::{CollectRequest, RecordSource, collect_records};
use crate::interchange;
use crate::normalize::normalize_batch;
use crate::query::{NearestRequest, QueryEngine, QueryResult};
use crate::store::{RunMetadata, Store};
use crate::taxonomy::{TaxonomicLineage, TaxonomyIndex};

pub const PREVIEW_FORMATS: [&str; 2] = ["image/jpeg", "image/png"];

#[derive(Debug, Clone, Serialize)]
pub struct CollectReport {
    pub country: String,
    pub available: u64,
    pub collected: usize,
    pub dataset_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub dataset_path: String,
    pub records: usize,
    pub dimension_rows: BTreeMap<String, usize>,
    pub fact_documents: usize,
    pub located_documents: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EtlReport {
    pub collect: CollectReport,
    pub load: LoadReport,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaxonLookup {
    pub level: TaxonLevel,
    pub key: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImagePreview {
    NoReference,
    Unsupported { format: String },
    Available { url: String, format: String },
}

impl ImagePreview {
    pub fn classify(references: Option<&str>, format: Option<&str>) -> Self {
        match (references, format) {
            (Some(url), Some(format)) if PREVIEW_FORMATS.contains(&format) => {
                ImagePreview::Available {
                    url: url.to_string(),
                    format: format.to_string(),
                }
            }
            (Some(_), Some(format)) => ImagePreview::Unsupported {
                format: format.to_string(),
            },
            _ => ImagePreview::NoReference,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedResult {
    #[serde(flatten)]
    pub result: QueryResult,
    pub lineage: TaxonomicLineage,
    pub preview: ImagePreview,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyResponse {
    pub query: NearestRequest,
    pub results: Vec<EnrichedResult>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn phase(
    sink: &dyn ProgressSink,
    stage: &str,
    message: impl Into<String>,
    started: Option<Instant>,
) {
    sink.event(ProgressEvent {
        message: format!("phase={stage}; {}", message.into()),
        elapsed: started.map(|started| started.elapsed()),
    });
}

pub struct App<S: RecordSource, D: DimensionStore, F: FactStore> {
    store: Store,
    source: S,
    dimensions: D,
    facts: F,
    query: QuerySettings,
}

impl<S: RecordSource, D: DimensionStore, F: FactStore> App<S, D, F> {
    pub fn new(store: Store, source: S, dimensions: D, facts: F, query: QuerySettings) -> Self {
        Self {
            store,
            source,
            dimensions,
            facts,
            query,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn collect(
        &self,
        request: &CollectRequest,
        sink: &dyn ProgressSink,
    ) -> Result<CollectReport, GbifGeoError> {
        let started = Instant::now();
        phase(
            sink,
            "Collect",
            format!("country {}", request.filter.country),
            None,
        );
        let batch = collect_records(&self.source, request)
            .map_err(|err| err.in_stage(EtlStage::Collect))?;
        phase(
            sink,
            "Collect",
            format!("{} of {} records", batch.records.len(), batch.available),
            Some(started),
        );

        let dataset_path = self.store.dataset_path();
        interchange::write_file(&dataset_path, &batch.records)
            .map_err(|err| err.in_stage(EtlStage::Interchange))?;
        phase(
            sink,
            "Interchange",
            format!("wrote {dataset_path}"),
            Some(started),
        );

        Ok(CollectReport {
            country: request.filter.country.to_string(),
            available: batch.available,
            collected: batch.records.len(),
            dataset_path: dataset_path.to_string(),
        })
    }

    pub fn load(
        &self,
        csv: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<LoadReport, GbifGeoError> {
        self.load_from(csv, None, sink)
    }

    pub fn run_etl(
        &self,
        request: &CollectRequest,
        sink: &dyn ProgressSink,
    ) -> Result<EtlReport, GbifGeoError> {
        let collect = self.collect(request, sink)?;
        let load = self.load_from(None, Some(&request.filter.country), sink)?;
        let finished_at = chrono::Utc::now().to_rfc3339();
        tracing::info!(
            collected = collect.collected,
            facts = load.fact_documents,
            "etl run finished"
        );
        Ok(EtlReport {
            collect,
            load,
            finished_at,
        })
    }

    fn load_from(
        &self,
        csv: Option<&Utf8Path>,
        country: Option<&CountryCode>,
        sink: &dyn ProgressSink,
    ) -> Result<LoadReport, GbifGeoError> {
        let started = Instant::now();
        let dataset_path = csv
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| self.store.dataset_path());
        if !dataset_path.as_std_path().exists() {
            return Err(GbifGeoError::MissingDataset(dataset_path.to_string()));
        }

        phase(sink, "Interchange", format!("reading {dataset_path}"), None);
        let records = interchange::read_file(&dataset_path)
            .map_err(|err| err.in_stage(EtlStage::Interchange))?;

        let tables = extract_dimensions(&records);
        store_dimensions(&self.dimensions, &tables)
            .map_err(|err| err.in_stage(EtlStage::Dimensions))?;
        let dimension_rows = tables
            .row_counts()
            .into_iter()
            .map(|(level, rows)| (level.to_string(), rows))
            .collect::<BTreeMap<_, _>>();
        phase(
            sink,
            "Dimensions",
            format!("{} rows", dimension_rows.values().sum::<usize>()),
            Some(started),
        );

        let documents = normalize_batch(&records);
        let located_documents = documents
            .iter()
            .filter(|document| document.coordinates.point().is_some())
            .count();
        phase(
            sink,
            "Normalize",
            format!("{} documents", documents.len()),
            Some(started),
        );

        let fact_documents =
            load_facts(&self.facts, &documents).map_err(|err| err.in_stage(EtlStage::Load))?;
        phase(
            sink,
            "Load",
            format!("{fact_documents} documents"),
            Some(started),
        );

        let report = LoadReport {
            dataset_path: dataset_path.to_string(),
            records: records.len(),
            dimension_rows,
            fact_documents,
            located_documents,
        };
        self.store.write_run_metadata(&RunMetadata {
            source: "gbif".to_string(),
            country: country.map(ToString::to_string),
            records: report.records,
            dimension_rows: report.dimension_rows.clone(),
            fact_documents,
            located_documents,
            finished_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("gbif-geo/{}", env!("CARGO_PKG_VERSION")),
        })?;
        Ok(report)
    }

    pub fn last_run(&self) -> Result<Option<RunMetadata>, GbifGeoError> {
        self.store.read_run_metadata()
    }

    pub fn taxonomy(&self) -> Result<TaxonomyIndex, GbifGeoError> {
        TaxonomyIndex::load(&self.dimensions)
    }

    pub fn resolve_taxon(
        &self,
        taxonomy: &TaxonomyIndex,
        level: TaxonLevel,
        key: i64,
    ) -> TaxonLookup {
        TaxonLookup {
            level,
            key,
            name: taxonomy.resolve(level, Some(key)).map(str::to_string),
        }
    }

    pub fn nearest(
        &self,
        request: &NearestRequest,
        taxonomy: &TaxonomyIndex,
    ) -> Result<NearbyResponse, GbifGeoError> {
        let engine = QueryEngine::new(&self.facts, self.query.distance_model);
        let results = engine
            .nearest_points(request)?
            .into_iter()
            .map(|result| {
                let lineage = taxonomy.lineage(|level| result.taxon_key(level));
                let preview =
                    ImagePreview::classify(result.references.as_deref(), result.format.as_deref());
                EnrichedResult {
                    result,
                    lineage,
                    preview,
                }
            })
            .collect();
        Ok(NearbyResponse {
            query: *request,
            results,
        })
    }

    pub fn default_count(&self) -> usize {
        self.query.default_count
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;
    use crate::dimension::MemoryDimensionStore;
    use crate::facts::MemoryFactStore;
    use crate::gbif::{OccurrenceFilter, OccurrencePage};
    use crate::output::JsonOutput;
    use crate::query::DistanceModel;
    use crate::record::RawRecord;

    struct MockSource {
        records: Vec<RawRecord>,
        fail: bool,
        pages: Mutex<Vec<u64>>,
    }

    impl MockSource {
        fn new(records: Vec<RawRecord>) -> Self {
            Self {
                records,
                fail: false,
                pages: Mutex::new(Vec::new()),
            }
        }
    }

    impl RecordSource for MockSource {
        fn total_count(&self, _filter: &OccurrenceFilter) -> Result<u64, GbifGeoError> {
            if self.fail {
                return Err(GbifGeoError::SourceStatus {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(self.records.len() as u64)
        }

        fn fetch_page(
            &self,
            _filter: &OccurrenceFilter,
            offset: u64,
            limit: u32,
        ) -> Result<OccurrencePage, GbifGeoError> {
            self.pages.lock().unwrap().push(offset);
            let start = (offset as usize).min(self.records.len());
            let end = (start + limit as usize).min(self.records.len());
            Ok(OccurrencePage {
                count: self.records.len() as u64,
                records: self.records[start..end].to_vec(),
                end_of_records: end == self.records.len(),
            })
        }
    }

    fn request(max_records: Option<u64>) -> CollectRequest {
        CollectRequest {
            filter: OccurrenceFilter {
                country: "BR".parse().unwrap(),
                has_coordinate: true,
            },
            page_limit: 2,
            max_records,
            page_delay: Duration::ZERO,
        }
    }

    fn occurrence(key: i64, name: &str, lat: f64, lon: f64) -> RawRecord {
        RawRecord::new()
            .with("key", key)
            .with("kingdomKey", 1)
            .with("kingdom", "Animalia")
            .with("familyKey", 9703)
            .with("family", "Felidae")
            .with("scientificName", name)
            .with("decimalLatitude", lat)
            .with("decimalLongitude", lon)
            .with("references", format!("https://example.org/{key}"))
            .with("media", "[{\"format\":\"image/jpeg\"}]")
    }

    fn app(
        temp: &tempfile::TempDir,
        source: MockSource,
    ) -> App<MockSource, MemoryDimensionStore, MemoryFactStore> {
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        App::new(
            Store::new(root),
            source,
            MemoryDimensionStore::new(),
            MemoryFactStore::new(),
            QuerySettings {
                default_count: 3,
                distance_model: DistanceModel::Ellipsoidal,
            },
        )
    }

    #[test]
    fn etl_then_nearest_enriches_results() {
        let temp = tempfile::tempdir().unwrap();
        let app = app(
            &temp,
            MockSource::new(vec![
                occurrence(1, "Puma concolor", 0.0, 0.0),
                occurrence(2, "Leopardus pardalis", 0.0, 1.0),
                occurrence(3, "Panthera onca", 10.0, 10.0),
            ]),
        );

        let report = app.run_etl(&request(None), &JsonOutput).unwrap();
        assert_eq!(report.collect.collected, 3);
        assert_eq!(report.load.fact_documents, 3);
        assert_eq!(report.load.dimension_rows["kingdom"], 1);
        assert_eq!(*app.source.pages.lock().unwrap(), vec![0, 2]);

        let taxonomy = app.taxonomy().unwrap();
        let request = NearestRequest::new(0.0, 0.0, 2).unwrap();
        let response = app.nearest(&request, &taxonomy).unwrap();
        let names = response
            .results
            .iter()
            .map(|hit| hit.result.scientific_name.as_deref().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Puma concolor", "Leopardus pardalis"]);
        assert_eq!(
            response.results[0].lineage.family.as_deref(),
            Some("Felidae")
        );
        assert_matches!(
            &response.results[0].preview,
            ImagePreview::Available { format, .. } if format == "image/jpeg"
        );

        let last = app.last_run().unwrap().unwrap();
        assert_eq!(last.country.as_deref(), Some("BR"));
        assert_eq!(last.fact_documents, 3);
    }

    #[test]
    fn source_failure_leaves_storage_untouched() {
        let temp = tempfile::tempdir().unwrap();
        let mut source = MockSource::new(vec![occurrence(1, "Puma concolor", 0.0, 0.0)]);
        source.fail = true;
        let app = app(&temp, source);

        let err = app.run_etl(&request(None), &JsonOutput).unwrap_err();
        assert_eq!(err.stage(), Some(EtlStage::Collect));
        assert_matches!(err.root(), GbifGeoError::SourceStatus { status: 503, .. });
        assert!(!app.store.dataset_path().as_std_path().exists());
        assert!(app.facts.snapshot().unwrap().is_empty());
        assert!(app.last_run().unwrap().is_none());
    }

    #[test]
    fn load_without_dataset_is_missing_input() {
        let temp = tempfile::tempdir().unwrap();
        let app = app(&temp, MockSource::new(Vec::new()));
        assert_matches!(
            app.load(None, &JsonOutput),
            Err(GbifGeoError::MissingDataset(_))
        );
    }

    #[test]
    fn resolve_unknown_taxon_is_none() {
        let temp = tempfile::tempdir().unwrap();
        let app = app(&temp, MockSource::new(vec![occurrence(1, "A", 0.0, 0.0)]));
        app.run_etl(&request(Some(1)), &JsonOutput).unwrap();
        let taxonomy = app.taxonomy().unwrap();
        assert_eq!(
            app.resolve_taxon(&taxonomy, TaxonLevel::Kingdom, 1).name.as_deref(),
            Some("Animalia")
        );
        assert_eq!(app.resolve_taxon(&taxonomy, TaxonLevel::Kingdom, 2).name, None);
    }

    #[test]
    fn preview_classification() {
        assert_matches!(
            ImagePreview::classify(None, Some("image/png")),
            ImagePreview::NoReference
        );
        assert_matches!(
            ImagePreview::classify(Some("https://example.org/1"), None),
            ImagePreview::NoReference
        );
        assert_matches!(
            ImagePreview::classify(Some("https://example.org/1"), Some("audio/mpeg")),
            ImagePreview::Unsupported { format } if format == "audio/mpeg"
        );
        assert_matches!(
            ImagePreview::classify(Some("https://example.org/1"), Some("image/png")),
            ImagePreview::Available { .. }
        );
    }
}
