use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    CollectReport, EtlReport, ImagePreview, LoadReport, NearbyResponse, ProgressEvent,
    ProgressSink, TaxonLookup,
};
use crate::store::RunMetadata;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_etl(result: &EtlReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_collect(result: &CollectReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_load(result: &LoadReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_nearby(result: &NearbyResponse) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_taxon(result: &TaxonLookup) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_status(result: Option<&RunMetadata>) -> io::Result<()> {
        Self::print_json(&result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_etl(result: &EtlReport) {
        Self::print_collect(&result.collect);
        Self::print_load(&result.load);
        println!("finished at {}", result.finished_at);
    }

    pub fn print_collect(result: &CollectReport) {
        println!(
            "collected {} of {} occurrences for {}",
            result.collected, result.available, result.country
        );
        println!("  dataset: {}", result.dataset_path);
    }

    pub fn print_load(result: &LoadReport) {
        println!("loaded {} records from {}", result.records, result.dataset_path);
        for (level, rows) in &result.dimension_rows {
            println!("  dim_{level}: {rows} rows");
        }
        println!(
            "  facts: {} documents ({} with coordinates)",
            result.fact_documents, result.located_documents
        );
    }

    pub fn print_nearby(response: &NearbyResponse) {
        println!(
            "nearest {} to ({}, {}):",
            response.query.count, response.query.latitude, response.query.longitude
        );
        if response.results.is_empty() {
            println!("  no located occurrences");
            return;
        }
        for (rank, hit) in response.results.iter().enumerate() {
            let result = &hit.result;
            println!(
                "{}. {} ({:.3} km) at {:.5}, {:.5}",
                rank + 1,
                result.scientific_name.as_deref().unwrap_or("<unnamed>"),
                result.distance_km,
                result.latitude,
                result.longitude
            );
            let lineage = &hit.lineage;
            let ranks = [
                ("kingdom", &lineage.kingdom),
                ("phylum", &lineage.phylum),
                ("class", &lineage.class),
                ("order", &lineage.order),
                ("family", &lineage.family),
                ("genus", &lineage.genus),
                ("species", &lineage.species),
            ];
            for (label, name) in ranks {
                println!("   {label:<8} {}", name.as_deref().unwrap_or("-"));
            }
            match &hit.preview {
                ImagePreview::NoReference => println!("   image    none"),
                ImagePreview::Unsupported { format } => {
                    println!("   image    unsupported format {format}")
                }
                ImagePreview::Available { url, format } => println!("   image    {url} ({format})"),
            }
        }
    }

    pub fn print_taxon(result: &TaxonLookup) {
        match &result.name {
            Some(name) => println!("{} {}: {name}", result.level, result.key),
            None => println!("{} {}: not found", result.level, result.key),
        }
    }

    pub fn print_status(result: Option<&RunMetadata>) {
        let Some(meta) = result else {
            println!("no completed load yet");
            return;
        };
        println!("last load finished at {} ({})", meta.finished_at, meta.tool);
        if let Some(country) = &meta.country {
            println!("  country: {country}");
        }
        println!("  records: {}", meta.records);
        println!(
            "  facts: {} ({} with coordinates)",
            meta.fact_documents, meta.located_documents
        );
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} [{:.1}s]", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}
