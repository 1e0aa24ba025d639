use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Coordinates, TaxonLevel};
use crate::record::RawRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactDocument {
    pub key: Option<i64>,
    pub kingdom_key: Option<i64>,
    pub phylum_key: Option<i64>,
    pub class_key: Option<i64>,
    pub order_key: Option<i64>,
    pub family_key: Option<i64>,
    pub genus_key: Option<i64>,
    pub species_key: Option<i64>,
    pub scientific_name: Option<String>,
    pub scientific_name_authorship: Option<String>,
    #[serde(default)]
    pub coordinates: Coordinates,
    pub continent: Option<String>,
    pub state_province: Option<String>,
    pub gadm: Option<Value>,
    pub year: Option<i32>,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub event_date: Option<String>,
    pub event_time: Option<String>,
    pub event_type: Option<String>,
    pub recorded_by: Option<String>,
    pub identified_by: Option<String>,
    pub country: Option<String>,
    pub locality: Option<String>,
    pub municipality: Option<String>,
    pub habitat: Option<String>,
    pub sex: Option<String>,
    pub references: Option<String>,
    pub format: Option<String>,
}

impl FactDocument {
    pub fn taxon_key(&self, level: TaxonLevel) -> Option<i64> {
        match level {
            TaxonLevel::Kingdom => self.kingdom_key,
            TaxonLevel::Phylum => self.phylum_key,
            TaxonLevel::Class => self.class_key,
            TaxonLevel::Order => self.order_key,
            TaxonLevel::Family => self.family_key,
            TaxonLevel::Genus => self.genus_key,
            TaxonLevel::Species => self.species_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMedia {
    Absent,
    List(Vec<Value>),
    Object(Map<String, Value>),
    Unparseable(String),
}

impl ParsedMedia {
    pub fn classify(raw: Option<&Value>) -> Self {
        match raw {
            None | Some(Value::Null) => ParsedMedia::Absent,
            Some(Value::String(text)) if text.trim().is_empty() => ParsedMedia::Absent,
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(decoded) => Self::from_structure(decoded),
                Err(err) => ParsedMedia::Unparseable(err.to_string()),
            },
            Some(other) => Self::from_structure(other.clone()),
        }
    }

    fn from_structure(value: Value) -> Self {
        match value {
            Value::Array(items) => ParsedMedia::List(items),
            Value::Object(map) => ParsedMedia::Object(map),
            Value::Null => ParsedMedia::Absent,
            other => ParsedMedia::Unparseable(format!(
                "expected a list or an object, found `{other}`"
            )),
        }
    }

    pub fn format(&self) -> Result<Option<String>, String> {
        let descriptor = match self {
            ParsedMedia::Absent => return Ok(None),
            ParsedMedia::Unparseable(reason) => return Err(reason.clone()),
            ParsedMedia::List(items) => match items.first() {
                None => return Ok(None),
                Some(Value::Object(map)) => map,
                Some(other) => {
                    return Err(format!("first media entry is not an object: `{other}`"));
                }
            },
            ParsedMedia::Object(map) => map,
        };
        match descriptor.get("format") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(format)) => Ok(Some(format.clone())),
            Some(other) => Err(format!("media format is not text: `{other}`")),
        }
    }
}

pub fn normalize(record: &RawRecord) -> FactDocument {
    let media = ParsedMedia::classify(record.get("media"));
    let format = media.format().unwrap_or_else(|reason| {
        tracing::warn!(
            key = ?record.key(),
            %reason,
            "unreadable media descriptor; format left empty"
        );
        None
    });

    FactDocument {
        key: record.key(),
        kingdom_key: record.get_i64(TaxonLevel::Kingdom.key_field()),
        phylum_key: record.get_i64(TaxonLevel::Phylum.key_field()),
        class_key: record.get_i64(TaxonLevel::Class.key_field()),
        order_key: record.get_i64(TaxonLevel::Order.key_field()),
        family_key: record.get_i64(TaxonLevel::Family.key_field()),
        genus_key: record.get_i64(TaxonLevel::Genus.key_field()),
        species_key: record.get_i64(TaxonLevel::Species.key_field()),
        scientific_name: record.get_str("scientificName"),
        scientific_name_authorship: record.get_str("scientificNameAuthorship"),
        coordinates: Coordinates::new(
            record.get_f64("decimalLatitude"),
            record.get_f64("decimalLongitude"),
        ),
        continent: record.get_str("continent"),
        state_province: record.get_str("stateProvince"),
        gadm: record.get_structured("gadm"),
        year: record
            .get_i64("year")
            .and_then(|value| i32::try_from(value).ok()),
        month: record
            .get_i64("month")
            .and_then(|value| u8::try_from(value).ok()),
        day: record
            .get_i64("day")
            .and_then(|value| u8::try_from(value).ok()),
        event_date: record.get_str("eventDate"),
        event_time: record.get_str("eventTime"),
        event_type: record.get_str("eventType"),
        recorded_by: record.get_str("recordedBy"),
        identified_by: record.get_str("identifiedBy"),
        country: record.get_str("country"),
        locality: record.get_str("locality"),
        municipality: record.get_str("municipality"),
        habitat: record.get_str("habitat"),
        sex: record.get_str("sex"),
        references: record.get_str("references"),
        format,
    }
}

pub fn normalize_batch(records: &[RawRecord]) -> Vec<FactDocument> {
    let documents = records.iter().map(normalize).collect::<Vec<_>>();
    let located = documents
        .iter()
        .filter(|doc| doc.coordinates.point().is_some())
        .count();
    tracing::info!(documents = documents.len(), located, "normalized occurrence records");
    documents
}
