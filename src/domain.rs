use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::GbifGeoError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TaxonLevel {
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl TaxonLevel {
    pub const ALL: [TaxonLevel; 7] = [
        TaxonLevel::Kingdom,
        TaxonLevel::Phylum,
        TaxonLevel::Class,
        TaxonLevel::Order,
        TaxonLevel::Family,
        TaxonLevel::Genus,
        TaxonLevel::Species,
    ];

    pub fn name_field(self) -> &'static str {
        match self {
            TaxonLevel::Kingdom => "kingdom",
            TaxonLevel::Phylum => "phylum",
            TaxonLevel::Class => "class",
            TaxonLevel::Order => "order",
            TaxonLevel::Family => "family",
            TaxonLevel::Genus => "genus",
            TaxonLevel::Species => "species",
        }
    }

    pub fn key_field(self) -> &'static str {
        match self {
            TaxonLevel::Kingdom => "kingdomKey",
            TaxonLevel::Phylum => "phylumKey",
            TaxonLevel::Class => "classKey",
            TaxonLevel::Order => "orderKey",
            TaxonLevel::Family => "familyKey",
            TaxonLevel::Genus => "genusKey",
            TaxonLevel::Species => "speciesKey",
        }
    }

    pub fn table_name(self) -> String {
        format!("dim_{}", self.name_field())
    }
}

impl fmt::Display for TaxonLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_field())
    }
}

impl FromStr for TaxonLevel {
    type Err = GbifGeoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        TaxonLevel::ALL
            .into_iter()
            .find(|level| level.name_field() == normalized)
            .ok_or_else(|| GbifGeoError::InvalidTaxonLevel(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CountryCode {
    type Err = GbifGeoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let is_valid =
            normalized.len() == 2 && normalized.chars().all(|ch| ch.is_ascii_alphabetic());
        if !is_valid {
            return Err(GbifGeoError::InvalidCountryCode(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for CountryCode {
    type Error = GbifGeoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CountryCode> for String {
    fn from(value: CountryCode) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(rename = "decimalLatitude")]
    pub decimal_latitude: Option<f64>,
    #[serde(rename = "decimalLongitude")]
    pub decimal_longitude: Option<f64>,
}

impl Coordinates {
    pub fn new(latitude: Option<f64>, longitude: Option<f64>) -> Self {
        Self {
            decimal_latitude: latitude,
            decimal_longitude: longitude,
        }
    }

    pub fn point(&self) -> Option<(f64, f64)> {
        match (self.decimal_latitude, self.decimal_longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}
