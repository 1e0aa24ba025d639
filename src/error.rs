use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtlStage {
    Collect,
    Interchange,
    Dimensions,
    Normalize,
    Load,
}

impl EtlStage {
    pub fn as_str(self) -> &'static str {
        match self {
            EtlStage::Collect => "collect",
            EtlStage::Interchange => "interchange",
            EtlStage::Dimensions => "dimensions",
            EtlStage::Normalize => "normalize",
            EtlStage::Load => "load",
        }
    }
}

impl fmt::Display for EtlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum GbifGeoError {
    #[error("ETL stage `{stage}` failed: {source}")]
    #[diagnostic(help("no later stage ran; re-run the pipeline once the cause is fixed"))]
    Stage {
        stage: EtlStage,
        #[source]
        source: Box<GbifGeoError>,
    },

    #[error("occurrence source request failed: {0}")]
    SourceHttp(String),

    #[error("occurrence source returned status {status}: {message}")]
    SourceStatus { status: u16, message: String },

    #[error("malformed occurrence source payload: {0}")]
    SourcePayload(String),

    #[error("occurrence interchange file error: {0}")]
    Interchange(String),

    #[error("occurrence dataset not found at {0}")]
    #[diagnostic(help("run `gbif-geo collect` first or pass --csv"))]
    MissingDataset(String),

    #[error("dimension store error: {0}")]
    DimensionStore(String),

    #[error("fact store error: {0}")]
    FactStore(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid country code: {0}")]
    InvalidCountryCode(String),

    #[error("invalid taxonomic level: {0}")]
    InvalidTaxonLevel(String),

    #[error("invalid query coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl GbifGeoError {
    pub fn in_stage(self, stage: EtlStage) -> Self {
        match self {
            GbifGeoError::Stage { .. } => self,
            other => GbifGeoError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    pub fn root(&self) -> &GbifGeoError {
        match self {
            GbifGeoError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn stage(&self) -> Option<EtlStage> {
        match self {
            GbifGeoError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn stage_wraps_once() {
        let err = GbifGeoError::FactStore("disk full".to_string())
            .in_stage(EtlStage::Load)
            .in_stage(EtlStage::Collect);
        assert_eq!(err.stage(), Some(EtlStage::Load));
        assert_matches!(err.root(), GbifGeoError::FactStore(_));
        assert!(err.to_string().contains("`load`"));
    }
}
