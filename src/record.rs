use serde_json::{Map, Value};

pub const OCCURRENCE_FIELDS: &[&str] = &[
    "key",
    "datasetKey",
    "publishingOrgKey",
    "publishingCountry",
    "protocol",
    "basisOfRecord",
    "individualCount",
    "occurrenceStatus",
    "classifications",
    "taxonKey",
    "kingdomKey",
    "phylumKey",
    "classKey",
    "orderKey",
    "familyKey",
    "genusKey",
    "speciesKey",
    "scientificName",
    "scientificNameAuthorship",
    "acceptedScientificName",
    "kingdom",
    "phylum",
    "order",
    "family",
    "genus",
    "species",
    "genericName",
    "specificEpithet",
    "taxonRank",
    "taxonomicStatus",
    "decimalLatitude",
    "decimalLongitude",
    "continent",
    "stateProvince",
    "gadm",
    "year",
    "month",
    "day",
    "eventDate",
    "startDayOfYear",
    "endDayOfYear",
    "issues",
    "modified",
    "lastInterpreted",
    "references",
    "license",
    "isSequenced",
    "identifiers",
    "media",
    "facts",
    "relations",
    "isInCluster",
    "recordedBy",
    "dnaSequenceID",
    "geodeticDatum",
    "class",
    "countryCode",
    "recordedByIDs",
    "identifiedByIDs",
    "gbifRegion",
    "country",
    "publishedByGbifRegion",
    "rightsHolder",
    "identifier",
    "locality",
    "municipality",
    "fieldNumber",
    "collectionCode",
    "occurrenceID",
    "catalogNumber",
    "institutionCode",
    "ownerInstitutionCode",
    "occurrenceRemarks",
    "collectionID",
    "elevation",
    "elevationAccuracy",
    "recordNumber",
    "dateIdentified",
    "institutionKey",
    "identifiedBy",
    "lifeStage",
    "coordinateUncertaintyInMeters",
    "samplingProtocol",
    "vernacularName",
    "habitat",
    "eventTime",
    "identificationVerificationStatus",
    "eventType",
    "datasetName",
    "http://unknown.org/nick",
    "verbatimEventDate",
    "verbatimLocality",
    "taxonID",
    "http://unknown.org/captive_cultivated",
    "identificationID",
    "dynamicProperties",
    "vitality",
    "sex",
    "infraspecificEpithet",
    "reproductiveCondition",
    "informationWithheld",
    "projectId",
    "identificationRemarks",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }

    pub fn key(&self) -> Option<i64> {
        self.get_i64("key")
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().and_then(integral_f64)),
            Value::String(text) => parse_integer(text),
            _ => None,
        }
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|value| value.is_finite())
    }

    pub fn get_structured(&self, name: &str) -> Option<Value> {
        match self.get(name)? {
            Value::String(text) => serde_json::from_str(text).ok(),
            other => Some(other.clone()),
        }
    }
}

/// Accepts `"42"` as well as `"42.0"`, which dataframe tooling writes for
/// integer columns containing gaps.
pub(crate) fn parse_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().and_then(integral_f64))
}

fn integral_f64(value: f64) -> Option<i64> {
    let in_range = value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15;
    in_range.then_some(value as i64)
}
