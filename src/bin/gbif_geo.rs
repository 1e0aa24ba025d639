use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gbif_geo::app::App;
use gbif_geo::config::{ConfigLoader, ResolvedConfig};
use gbif_geo::dimension::SqliteDimensionStore;
use gbif_geo::domain::{CountryCode, TaxonLevel};
use gbif_geo::error::GbifGeoError;
use gbif_geo::facts::JsonlFactStore;
use gbif_geo::gbif::{
    CollectRequest, GbifHttpClient, OccurrenceFilter, OccurrencePage, RecordSource,
};
use gbif_geo::output::{JsonOutput, OutputMode, TextOutput};
use gbif_geo::query::{DistanceModel, NearestRequest};
use gbif_geo::store::Store;

#[derive(Parser)]
#[command(name = "gbif-geo")]
#[command(about = "Collect GBIF occurrences, build taxonomy and fact stores, query nearby records")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to ./gbif-geo.json)")]
    config: Option<String>,

    #[arg(long, global = true, help = "Workspace directory for the dataset and databases")]
    root: Option<Utf8PathBuf>,

    #[arg(long, global = true, help = "Print JSON on stdout")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Collect, write the dataset, then rebuild dimensions and facts")]
    Etl(CollectArgs),
    #[command(about = "Collect occurrences into the dataset file only")]
    Collect(CollectArgs),
    #[command(about = "Rebuild dimensions and facts from a dataset file")]
    Load(LoadArgs),
    #[command(about = "Nearest occurrences to a point")]
    Nearest(NearestArgs),
    #[command(about = "Look up a taxon name by rank and key")]
    Taxon(TaxonArgs),
    #[command(about = "Show the last completed load")]
    Status,
}

#[derive(Args, Clone)]
struct CollectArgs {
    #[arg(long)]
    country: Option<String>,

    #[arg(long, conflicts_with = "all")]
    max_records: Option<u64>,

    #[arg(long, help = "Collect every matching occurrence")]
    all: bool,
}

#[derive(Args)]
struct LoadArgs {
    #[arg(long)]
    csv: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct NearestArgs {
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    #[arg(long, allow_negative_numbers = true)]
    lon: f64,

    #[arg(short = 'n', long)]
    count: Option<usize>,

    #[arg(long)]
    model: Option<DistanceModel>,
}

#[derive(Args)]
struct TaxonArgs {
    level: TaxonLevel,
    key: i64,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<GbifGeoError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GbifGeoError) -> u8 {
    match error.root() {
        GbifGeoError::MissingDataset(_)
        | GbifGeoError::ConfigRead(_)
        | GbifGeoError::ConfigParse(_) => 2,
        GbifGeoError::SourceHttp(_)
        | GbifGeoError::SourceStatus { .. }
        | GbifGeoError::SourcePayload(_) => 3,
        GbifGeoError::Interchange(_)
        | GbifGeoError::DimensionStore(_)
        | GbifGeoError::FactStore(_)
        | GbifGeoError::Filesystem(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let mut resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        resolved.storage_root = root;
    }
    let store = Store::new(resolved.storage_root.clone());

    match cli.command {
        Commands::Etl(args) => {
            let request = collect_request(&resolved, &args)?;
            let app = build_app(&resolved, store, GbifHttpClient::new(&resolved.source)?)?;
            match output_mode {
                OutputMode::Json => {
                    let result = app.run_etl(&request, &JsonOutput)?;
                    JsonOutput::print_etl(&result).into_diagnostic()?;
                }
                OutputMode::Text => {
                    let result = app.run_etl(&request, &TextOutput)?;
                    TextOutput::print_etl(&result);
                }
            }
        }
        Commands::Collect(args) => {
            let request = collect_request(&resolved, &args)?;
            let app = build_app(&resolved, store, GbifHttpClient::new(&resolved.source)?)?;
            match output_mode {
                OutputMode::Json => {
                    let result = app.collect(&request, &JsonOutput)?;
                    JsonOutput::print_collect(&result).into_diagnostic()?;
                }
                OutputMode::Text => {
                    let result = app.collect(&request, &TextOutput)?;
                    TextOutput::print_collect(&result);
                }
            }
        }
        Commands::Load(args) => {
            let app = build_app(&resolved, store, NopSource)?;
            match output_mode {
                OutputMode::Json => {
                    let result = app.load(args.csv.as_deref(), &JsonOutput)?;
                    JsonOutput::print_load(&result).into_diagnostic()?;
                }
                OutputMode::Text => {
                    let result = app.load(args.csv.as_deref(), &TextOutput)?;
                    TextOutput::print_load(&result);
                }
            }
        }
        Commands::Nearest(args) => {
            if let Some(model) = args.model {
                resolved.query.distance_model = model;
            }
            let app = build_app(&resolved, store, NopSource)?;
            let count = args.count.unwrap_or(app.default_count());
            let request = NearestRequest::new(args.lat, args.lon, count)?;
            let taxonomy = app.taxonomy()?;
            let response = app.nearest(&request, &taxonomy)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_nearby(&response).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_nearby(&response),
            }
        }
        Commands::Taxon(args) => {
            let app = build_app(&resolved, store, NopSource)?;
            let taxonomy = app.taxonomy()?;
            let lookup = app.resolve_taxon(&taxonomy, args.level, args.key);
            match output_mode {
                OutputMode::Json => JsonOutput::print_taxon(&lookup).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_taxon(&lookup),
            }
        }
        Commands::Status => {
            let last = store.read_run_metadata()?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_status(last.as_ref()).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_status(last.as_ref()),
            }
        }
    }
    Ok(())
}

fn build_app<S: RecordSource>(
    resolved: &ResolvedConfig,
    store: Store,
    source: S,
) -> Result<App<S, SqliteDimensionStore, JsonlFactStore>, GbifGeoError> {
    store.ensure_layout()?;
    let dimensions = SqliteDimensionStore::open(&store.taxonomy_db_path())?;
    let facts = JsonlFactStore::new(store.facts_path());
    Ok(App::new(
        store,
        source,
        dimensions,
        facts,
        resolved.query.clone(),
    ))
}

fn collect_request(
    resolved: &ResolvedConfig,
    args: &CollectArgs,
) -> Result<CollectRequest, GbifGeoError> {
    let mut request = CollectRequest::from_settings(&resolved.source);
    if let Some(country) = &args.country {
        request.filter.country = country.parse::<CountryCode>()?;
    }
    if args.all {
        request.max_records = None;
    } else if let Some(max_records) = args.max_records {
        request.max_records = Some(max_records);
    }
    Ok(request)
}

struct NopSource;

impl RecordSource for NopSource {
    fn total_count(&self, _filter: &OccurrenceFilter) -> Result<u64, GbifGeoError> {
        Err(GbifGeoError::SourceHttp("source not configured".to_string()))
    }

    fn fetch_page(
        &self,
        _filter: &OccurrenceFilter,
        _offset: u64,
        _limit: u32,
    ) -> Result<OccurrencePage, GbifGeoError> {
        Err(GbifGeoError::SourceHttp("source not configured".to_string()))
    }
}
