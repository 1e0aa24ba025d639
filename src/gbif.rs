use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::{MAX_PAGE_LIMIT, SourceSettings};
use crate::domain::CountryCode;
use crate::error::GbifGeoError;
use crate::record::RawRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceFilter {
    pub country: CountryCode,
    pub has_coordinate: bool,
}

#[derive(Debug, Clone)]
pub struct OccurrencePage {
    pub count: u64,
    pub records: Vec<RawRecord>,
    pub end_of_records: bool,
}

pub trait RecordSource: Send + Sync {
    fn total_count(&self, filter: &OccurrenceFilter) -> Result<u64, GbifGeoError>;
    fn fetch_page(
        &self,
        filter: &OccurrenceFilter,
        offset: u64,
        limit: u32,
    ) -> Result<OccurrencePage, GbifGeoError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    count: u64,
    #[serde(default)]
    results: Vec<Map<String, Value>>,
    #[serde(default)]
    end_of_records: bool,
}

#[derive(Clone)]
pub struct GbifHttpClient {
    client: Client,
    base_url: String,
}

impl GbifHttpClient {
    pub fn new(settings: &SourceSettings) -> Result<Self, GbifGeoError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gbif-geo/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GbifGeoError::SourceHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| GbifGeoError::SourceHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
        })
    }

    fn search(
        &self,
        filter: &OccurrenceFilter,
        offset: u64,
        limit: u32,
    ) -> Result<SearchResponse, GbifGeoError> {
        let has_coordinate = if filter.has_coordinate { "true" } else { "false" };
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("country", filter.country.as_str()),
                ("hasCoordinate", has_coordinate),
            ])
            .query(&[("limit", limit as u64), ("offset", offset)])
            .send()
            .map_err(|err| GbifGeoError::SourceHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "occurrence search failed".to_string());
            return Err(GbifGeoError::SourceStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| GbifGeoError::SourceHttp(err.to_string()))?;
        parse_search_response(&body)
    }
}

impl RecordSource for GbifHttpClient {
    fn total_count(&self, filter: &OccurrenceFilter) -> Result<u64, GbifGeoError> {
        Ok(self.search(filter, 0, 0)?.count)
    }

    fn fetch_page(
        &self,
        filter: &OccurrenceFilter,
        offset: u64,
        limit: u32,
    ) -> Result<OccurrencePage, GbifGeoError> {
        let response = self.search(filter, offset, limit)?;
        Ok(OccurrencePage {
            count: response.count,
            records: response
                .results
                .into_iter()
                .map(RawRecord::from_map)
                .collect(),
            end_of_records: response.end_of_records,
        })
    }
}

fn parse_search_response(body: &str) -> Result<SearchResponse, GbifGeoError> {
    serde_json::from_str(body).map_err(|err| GbifGeoError::SourcePayload(err.to_string()))
}

#[derive(Debug, Clone)]
pub struct CollectRequest {
    pub filter: OccurrenceFilter,
    pub page_limit: u32,
    pub max_records: Option<u64>,
    pub page_delay: Duration,
}

impl CollectRequest {
    pub fn from_settings(settings: &SourceSettings) -> Self {
        Self {
            filter: OccurrenceFilter {
                country: settings.country.clone(),
                has_coordinate: settings.has_coordinate,
            },
            page_limit: settings.page_limit,
            max_records: settings.max_records,
            page_delay: Duration::from_millis(settings.page_delay_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectedBatch {
    pub available: u64,
    pub records: Vec<RawRecord>,
}

pub fn collect_records(
    source: &dyn RecordSource,
    request: &CollectRequest,
) -> Result<CollectedBatch, GbifGeoError> {
    let available = source.total_count(&request.filter)?;
    let target = match request.max_records {
        Some(cap) => available.min(cap),
        None => available,
    };
    let page_limit = request.page_limit.clamp(1, MAX_PAGE_LIMIT);
    tracing::info!(
        country = %request.filter.country,
        available,
        target,
        "collecting occurrences"
    );

    let mut records = Vec::with_capacity(target.min(100_000) as usize);
    let mut offset = 0u64;
    while (records.len() as u64) < target {
        if offset > 0 && !request.page_delay.is_zero() {
            thread::sleep(request.page_delay);
        }
        let page = source.fetch_page(&request.filter, offset, page_limit)?;
        let received = page.records.len();
        tracing::debug!(offset, received, "fetched occurrence page");
        if received == 0 {
            tracing::warn!(
                offset,
                collected = records.len(),
                target,
                "source returned an empty page before the target was reached"
            );
            break;
        }
        let remaining = (target - records.len() as u64) as usize;
        records.extend(page.records.into_iter().take(remaining));
        offset += page_limit as u64;
        if page.end_of_records {
            break;
        }
    }

    tracing::info!(collected = records.len(), "collection finished");
    Ok(CollectedBatch { available, records })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_search_payload() {
        let body = r#"{"offset":0,"limit":2,"endOfRecords":false,"count":12,
            "results":[{"key":1,"kingdomKey":1},{"key":2,"decimalLatitude":-3.1}]}"#;
        let response = parse_search_response(body).unwrap();
        assert_eq!(response.count, 12);
        assert_eq!(response.results.len(), 2);
        assert!(!response.end_of_records);
    }

    #[test]
    fn malformed_payload_is_source_error() {
        let err = parse_search_response(r#"{"results": []}"#).err().unwrap();
        assert_matches!(err, GbifGeoError::SourcePayload(_));
        let err = parse_search_response("<html>").err().unwrap();
        assert_matches!(err, GbifGeoError::SourcePayload(_));
    }
}
