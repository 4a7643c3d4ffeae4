//! Main application entry point

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mv_core::{observer_from_fn, CatalogProvider, Query, ViewEvent, KNOWN_CLASSIFICATIONS};
use mv_data::{
    MemorySource, MetMuseumSource, Pipeline, PipelineConfig, ProviderConfig, RecordFilter, RecordPredicate, SortKey,
    SortSpec,
};

mod output;

/// Browse the Met Museum collection from the terminal
#[derive(Debug, Parser)]
#[command(name = "metview", version, rename_all = "kebab")]
struct Args {
    /// Search text. Leave empty to list the whole collection.
    #[arg(long, short = 's', default_value = "")]
    search_term: String,

    /// Restrict the search to a classification
    #[arg(long, short = 'c')]
    classification: Option<String>,

    /// Only return objects that have images
    #[arg(long)]
    has_image: bool,

    /// Collection API base URL. Takes precedence over MET_MUSEUM_API_DOMAIN.
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Pipeline configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sort resolved records by this field
    #[arg(long, value_enum)]
    sort: Option<SortField>,

    /// Sort in descending order
    #[arg(long, requires = "sort")]
    descending: bool,

    /// Only show records whose title contains this text
    #[arg(long, value_name = "TEXT")]
    title_filter: Option<String>,

    /// Print the full summary of every record
    #[arg(long)]
    details: bool,

    /// Seconds to wait for record details
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Use the built-in offline catalog instead of the remote API
    #[arg(long)]
    demo: bool,

    /// Print the known classification names and exit
    #[arg(long)]
    classifications: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortField {
    Title,
    Artist,
    Classification,
    Medium,
    Date,
}

impl From<SortField> for SortKey {
    fn from(field: SortField) -> Self {
        match field {
            SortField::Title => SortKey::Title,
            SortField::Artist => SortKey::Artist,
            SortField::Classification => SortKey::Classification,
            SortField::Medium => SortKey::Medium,
            SortField::Date => SortKey::Date,
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_pipeline_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config = PipelineConfig::from_json(&text).with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

fn build_provider(args: &Args) -> Result<Arc<dyn CatalogProvider>> {
    if args.demo {
        info!("using the offline demo catalog");
        return Ok(Arc::new(MemorySource::demo()));
    }

    let config = ProviderConfig::resolve(args.base_url.as_deref());
    config.validate()?;
    info!(base_url = %config.base_url, "using the collection API");
    Ok(Arc::new(MetMuseumSource::new(&config)?))
}

async fn browse(pipeline: &mut Pipeline, args: &Args) -> Result<()> {
    let query = Query::new(&args.search_term)
        .with_classification(args.classification.as_deref().unwrap_or_default())
        .with_images_only(args.has_image);

    let sort = args.sort.map(|field| {
        if args.descending {
            SortSpec::descending(field.into())
        } else {
            SortSpec::ascending(field.into())
        }
    });
    let filter = args
        .title_filter
        .as_deref()
        .map(|needle| Box::new(RecordFilter::new().title_contains(needle)) as Box<dyn RecordPredicate>);
    pipeline.configure(sort, filter);

    let updates = Arc::new(AtomicUsize::new(0));
    let subscription = pipeline.subscribe(observer_from_fn({
        let updates = updates.clone();
        move |event| {
            if matches!(event, ViewEvent::RecordChanged(_)) {
                updates.fetch_add(1, Ordering::Relaxed);
            }
        }
    }));

    let identifiers = pipeline.run_query(query.clone()).await?;
    info!(%query, found = identifiers.len(), showing = pipeline.count(), "query installed");

    match tokio::time::timeout(Duration::from_secs(args.timeout), pipeline.settle()).await {
        Ok(settled) => settled?,
        Err(_) => warn!(seconds = args.timeout, "stopped waiting for record details"),
    }
    subscription.unsubscribe();

    output::print_rows(pipeline, args.details)?;

    let stats = pipeline.statistics();
    eprintln!(
        "{} found, {} shown, {} resolved, {} failed, {} pending ({} in-place updates)",
        stats.total,
        stats.visible,
        stats.resolved,
        stats.failed,
        stats.pending,
        updates.load(Ordering::Relaxed),
    );

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.classifications {
        for name in KNOWN_CLASSIFICATIONS {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = load_pipeline_config(args.config.as_deref())?;
    let provider = build_provider(&args)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start the async runtime")?;
    let mut pipeline = Pipeline::new(provider, &config, runtime.handle().clone());

    runtime.block_on(browse(&mut pipeline, &args))
}
