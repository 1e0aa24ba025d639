use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::CountryCode;
use crate::error::GbifGeoError;
use crate::query::DistanceModel;

pub const DEFAULT_CONFIG_FILE: &str = "gbif-geo.json";
pub const DEFAULT_BASE_URL: &str = "https://api.gbif.org/v1/occurrence/search";
pub const MAX_PAGE_LIMIT: u32 = 300;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub query: QuerySection,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SourceSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub has_coordinate: Option<bool>,
    #[serde(default)]
    pub page_limit: Option<u32>,
    /// `null` collects everything the source reports.
    #[serde(default = "default_max_records_entry")]
    pub max_records: Option<u64>,
    #[serde(default)]
    pub page_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StorageSection {
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct QuerySection {
    #[serde(default)]
    pub default_count: Option<usize>,
    #[serde(default)]
    pub distance_model: Option<DistanceModel>,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub base_url: String,
    pub country: CountryCode,
    pub has_coordinate: bool,
    pub page_limit: u32,
    pub max_records: Option<u64>,
    pub page_delay_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub default_count: usize,
    pub distance_model: DistanceModel,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub source: SourceSettings,
    pub storage_root: Utf8PathBuf,
    pub query: QuerySettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, GbifGeoError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            tracing::debug!("no {DEFAULT_CONFIG_FILE} found; using defaults");
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| GbifGeoError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| GbifGeoError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, GbifGeoError> {
        let source = config.source;
        let country = source
            .country
            .as_deref()
            .unwrap_or("BR")
            .parse::<CountryCode>()?;
        let page_limit = source
            .page_limit
            .unwrap_or(MAX_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);

        let storage_root = config
            .storage
            .root
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| Utf8PathBuf::from(".gbif-geo"));

        Ok(ResolvedConfig {
            source: SourceSettings {
                base_url: source
                    .base_url
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                country,
                has_coordinate: source.has_coordinate.unwrap_or(true),
                page_limit,
                max_records: source.max_records,
                page_delay_ms: source.page_delay_ms.unwrap_or(200),
                timeout_secs: source.timeout_secs.unwrap_or(60),
            },
            storage_root,
            query: QuerySettings {
                default_count: config.query.default_count.unwrap_or(3),
                distance_model: config.query.distance_model.unwrap_or_default(),
            },
        })
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            base_url: None,
            country: None,
            has_coordinate: None,
            page_limit: None,
            max_records: default_max_records_entry(),
            page_delay_ms: None,
            timeout_secs: None,
        }
    }
}

fn default_max_records_entry() -> Option<u64> {
    Some(5_000)
}
