use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::TaxonLevel;
use crate::error::GbifGeoError;
use crate::facts::FactStore;
use crate::normalize::FactDocument;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const MEAN_EARTH_RADIUS_KM: f64 = 6_371.008_8;
const VINCENTY_MAX_ITERATIONS: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DistanceModel {
    #[default]
    Ellipsoidal,
    Spherical,
}

impl DistanceModel {
    pub fn distance_km(self, from: (f64, f64), to: (f64, f64)) -> f64 {
        match self {
            DistanceModel::Ellipsoidal => {
                vincenty_km(from, to)
                    .filter(|km| km.is_finite())
                    .unwrap_or_else(|| haversine_km(from, to))
            }
            DistanceModel::Spherical => haversine_km(from, to),
        }
    }
}

pub fn haversine_km((lat1, lon1): (f64, f64), (lat2, lon2): (f64, f64)) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Vincenty's inverse formula on WGS-84. `None` when the iteration does not
/// converge, which happens for nearly antipodal points.
pub fn vincenty_km((lat1, lon1): (f64, f64), (lat2, lon2): (f64, f64)) -> Option<f64> {
    let b = (1.0 - WGS84_F) * WGS84_A;
    let l = (lon2 - lon1).to_radians();
    let u1 = ((1.0 - WGS84_F) * lat1.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * lat2.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..VINCENTY_MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            return Some(0.0);
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // Equatorial lines have cos²α = 0.
        let cos_2sigma_m = if cos_sq_alpha == 0.0 {
            0.0
        } else {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
        let previous = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))));

        if (lambda - previous).abs() < 1e-12 {
            let u_sq = cos_sq_alpha * (WGS84_A.powi(2) - b.powi(2)) / b.powi(2);
            let big_a =
                1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sigma_m
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))
                            - big_b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma.powi(2))
                                * (-3.0 + 4.0 * cos_2sigma_m.powi(2))));
            return Some(b * big_a * (sigma - delta_sigma) / 1000.0);
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NearestRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub count: usize,
}

impl NearestRequest {
    pub fn new(latitude: f64, longitude: f64, count: usize) -> Result<Self, GbifGeoError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GbifGeoError::InvalidCoordinate(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() {
            return Err(GbifGeoError::InvalidCoordinate(format!(
                "longitude {longitude} is not a number"
            )));
        }
        Ok(Self {
            latitude,
            longitude: wrap_longitude(longitude),
            count,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub scientific_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "distance_km")]
    pub distance_km: f64,
    pub kingdom_key: Option<i64>,
    pub phylum_key: Option<i64>,
    pub class_key: Option<i64>,
    pub order_key: Option<i64>,
    pub family_key: Option<i64>,
    pub genus_key: Option<i64>,
    pub species_key: Option<i64>,
    pub references: Option<String>,
    pub format: Option<String>,
}

impl QueryResult {
    fn from_document(document: FactDocument, point: (f64, f64), distance_km: f64) -> Self {
        Self {
            scientific_name: document.scientific_name,
            latitude: point.0,
            longitude: point.1,
            distance_km,
            kingdom_key: document.kingdom_key,
            phylum_key: document.phylum_key,
            class_key: document.class_key,
            order_key: document.order_key,
            family_key: document.family_key,
            genus_key: document.genus_key,
            species_key: document.species_key,
            references: document.references,
            format: document.format,
        }
    }

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

pub fn rank_nearest(
    documents: impl IntoIterator<Item = FactDocument>,
    request: &NearestRequest,
    model: DistanceModel,
) -> Vec<QueryResult> {
    if request.count == 0 {
        return Vec::new();
    }
    let origin = (request.latitude, request.longitude);
    let mut ranked = documents
        .into_iter()
        .filter_map(|document| {
            let stored = document.coordinates.point()?;
            let Some(point) = on_globe(stored) else {
                tracing::debug!(key = ?document.key, point = ?stored, "skipping document with invalid coordinates");
                return None;
            };
            let distance = model.distance_km(origin, point);
            Some(QueryResult::from_document(document, point, distance))
        })
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked.truncate(request.count);
    ranked
}

/// Longitudes past the antimeridian map back into [-180, 180].
pub fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        longitude
    } else {
        (longitude + 180.0).rem_euclid(360.0) - 180.0
    }
}

fn on_globe((lat, lon): (f64, f64)) -> Option<(f64, f64)> {
    let valid = lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat);
    valid.then(|| (lat, wrap_longitude(lon)))
}

pub struct QueryEngine<'a> {
    store: &'a dyn FactStore,
    model: DistanceModel,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a dyn FactStore, model: DistanceModel) -> Self {
        Self { store, model }
    }

    pub fn nearest_points(&self, request: &NearestRequest) -> Result<Vec<QueryResult>, GbifGeoError> {
        if request.count == 0 {
            return Ok(Vec::new());
        }
        let documents = self.store.scan_located()?;
        let scanned = documents.len();
        let results = rank_nearest(documents, request, self.model);
        tracing::debug!(scanned, returned = results.len(), "nearest-neighbor query");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Coordinates;

    fn doc(name: &str, lat: Option<f64>, lon: Option<f64>) -> FactDocument {
        FactDocument {
            scientific_name: Some(name.to_string()),
            coordinates: Coordinates::new(lat, lon),
            ..FactDocument::default()
        }
    }

    fn names(results: &[QueryResult]) -> Vec<&str> {
        results
            .iter()
            .map(|result| result.scientific_name.as_deref().unwrap_or(""))
            .collect()
    }

    #[test]
    fn one_degree_along_equator() {
        let spherical = haversine_km((0.0, 0.0), (0.0, 1.0));
        let ellipsoidal = vincenty_km((0.0, 0.0), (0.0, 1.0)).unwrap();
        assert!((spherical - 111.195).abs() < 0.01, "{spherical}");
        assert!((ellipsoidal - 111.319).abs() < 0.01, "{ellipsoidal}");
    }

    #[test]
    fn known_city_distance() {
        // Brasília to São Paulo.
        let from = (-15.7939, -47.8828);
        let to = (-23.5505, -46.6333);
        let km = DistanceModel::Ellipsoidal.distance_km(from, to);
        assert!((km - 872.0).abs() < 15.0, "{km}");
    }

    #[test]
    fn nearly_antipodal_points_stay_finite() {
        let km = DistanceModel::Ellipsoidal.distance_km((0.0, 0.0), (0.5, 179.7));
        assert!(km.is_finite() && km > 19_500.0 && km < 20_100.0, "{km}");
    }

    #[test]
    fn identical_points_are_zero() {
        assert_eq!(vincenty_km((10.0, 10.0), (10.0, 10.0)), Some(0.0));
        assert_eq!(haversine_km((10.0, 10.0), (10.0, 10.0)), 0.0);
    }

    #[test]
    fn nearest_two_of_three() {
        let documents = vec![
            doc("A", Some(0.0), Some(0.0)),
            doc("B", Some(0.0), Some(1.0)),
            doc("C", Some(10.0), Some(10.0)),
        ];
        let request = NearestRequest::new(0.0, 0.0, 2).unwrap();
        let results = rank_nearest(documents, &request, DistanceModel::Ellipsoidal);
        assert_eq!(names(&results), vec!["A", "B"]);
        assert_eq!(results[0].distance_km, 0.0);
        assert!((results[1].distance_km - 111.3).abs() < 0.5);
    }

    #[test]
    fn missing_coordinates_are_excluded() {
        let documents = vec![
            doc("lat-only", Some(0.0), None),
            doc("lon-only", None, Some(0.0)),
            doc("none", None, None),
            doc("far", Some(45.0), Some(45.0)),
            doc("broken", Some(120.0), Some(0.0)),
        ];
        let request = NearestRequest::new(0.0, 0.0, 10).unwrap();
        let results = rank_nearest(documents, &request, DistanceModel::Spherical);
        assert_eq!(names(&results), vec!["far"]);
    }

    #[test]
    fn ties_keep_encounter_order() {
        let documents = vec![
            doc("east", Some(0.0), Some(1.0)),
            doc("origin", Some(0.0), Some(0.0)),
            doc("west", Some(0.0), Some(-1.0)),
        ];
        let request = NearestRequest::new(0.0, 0.0, 3).unwrap();
        let results = rank_nearest(documents, &request, DistanceModel::Spherical);
        assert_eq!(names(&results), vec!["origin", "east", "west"]);
        assert_eq!(results[1].distance_km, results[2].distance_km);
    }

    #[test]
    fn zero_count_is_empty() {
        let request = NearestRequest::new(0.0, 0.0, 0).unwrap();
        let results = rank_nearest(
            vec![doc("A", Some(0.0), Some(0.0))],
            &request,
            DistanceModel::Spherical,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn invalid_request_coordinates() {
        assert!(NearestRequest::new(91.0, 0.0, 1).is_err());
        assert!(NearestRequest::new(0.0, f64::INFINITY, 1).is_err());
        assert!(NearestRequest::new(f64::NAN, 0.0, 1).is_err());
        assert!(NearestRequest::new(-90.0, 180.0, 1).is_ok());
    }

    #[test]
    fn longitude_wraps_past_antimeridian() {
        let request = NearestRequest::new(0.0, -180.5, 1).unwrap();
        assert!((request.longitude - 179.5).abs() < 1e-9);
        assert_eq!(wrap_longitude(540.0), -180.0);
        assert!((wrap_longitude(-190.0) - 170.0).abs() < 1e-9);
        assert_eq!(wrap_longitude(-180.0), -180.0);

        let documents = vec![
            doc("east-of-line", Some(0.0), Some(181.0)),
            doc("far", Some(0.0), Some(90.0)),
        ];
        let results = rank_nearest(documents, &request, DistanceModel::Ellipsoidal);
        assert_eq!(names(&results), vec!["east-of-line"]);
        assert!((results[0].longitude + 179.0).abs() < 1e-9);
        assert!((results[0].distance_km - 166.9).abs() < 1.0, "{}", results[0].distance_km);
    }
}
