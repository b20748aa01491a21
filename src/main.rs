//! Boundary Reconciliation CLI
//!
//! Reconciles a per-country metric table with a country boundary layer and
//! writes a classified GeoJSON map plus a run report.
//!
//! Usage:
//!   reconcile-map --metrics data/removal_requests.csv \
//!                 --boundaries data/countries.geojson \
//!                 --disputed data/disputed_areas.geojson \
//!                 --provinces data/provinces.geojson \
//!                 --output out/removal_requests.geojson

use anyhow::{bail, Context, Result};
use boundary_reconciliation::{
    load_boundaries_geojson, load_metrics_csv, load_overlays_geojson, GeoJsonRenderer,
    MetricColumns, OverlayLayer, Pipeline, PipelineConfig, PipelineInputs, RawMetricRecord,
    Renderer,
};
use clap::{ArgGroup, Parser};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "reconcile-map",
    version,
    about = "Join a per-country metric table to reconciled country boundaries and classify it"
)]
#[command(group(ArgGroup::new("metric_source").required(true).args(["metrics", "sqlite"])))]
struct Args {
    /// Metric table as CSV
    #[arg(short, long)]
    metrics: Option<PathBuf>,

    /// Metric table from a SQLite database (see --query)
    #[arg(long)]
    sqlite: Option<PathBuf>,

    /// Query run against --sqlite
    #[arg(long, default_value = "SELECT * FROM Removal_Requests_1")]
    query: String,

    /// Column holding the entity name
    #[arg(long, default_value = "country")]
    name_column: String,

    /// Column holding the metric
    #[arg(long, default_value = "total_requests")]
    metric_column: String,

    /// Primary country boundary layer (GeoJSON)
    #[arg(short, long)]
    boundaries: PathBuf,

    /// Disputed-area overlay layer (GeoJSON)
    #[arg(long)]
    disputed: Option<PathBuf>,

    /// Province overlay layer (GeoJSON)
    #[arg(long)]
    provinces: Option<PathBuf>,

    /// Feature property naming each boundary / disputed area
    #[arg(long, default_value = "NAME")]
    boundary_name_property: String,

    /// Feature property naming each province
    #[arg(long, default_value = "name_en")]
    province_name_property: String,

    /// Pipeline configuration JSON (defaults to the removal-requests preset)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Classified GeoJSON output
    #[arg(short, long, default_value = "reconciled.geojson")]
    output: PathBuf,

    /// Run report JSON output
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Verbose output (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("{}", "=".repeat(60));
    info!("Boundary Reconciliation v{}", boundary_reconciliation::VERSION);
    info!("{}", "=".repeat(60));

    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::removal_requests(),
    };
    info!("Config fingerprint: {}", &config.fingerprint()[..12]);

    let pipeline = Pipeline::new(config)?;
    let inputs = load_inputs(&args)?;
    let output = pipeline.run(inputs)?;

    GeoJsonRenderer::new(&args.output).render(&output.records, &output.legend)?;

    if let Some(report_path) = &args.report {
        let file = File::create(report_path)
            .with_context(|| format!("Failed to create report file: {:?}", report_path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &output.report)?;
        info!("Wrote run report to {:?}", report_path);
    }

    // Summary
    info!("{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("{}", output.report.summary());
    for count in &output.report.category_counts {
        info!("  {:>14} | {}", count.label, count.count);
    }
    info!("Top entities:\n{}", output.report.top_table());

    Ok(())
}

fn load_inputs(args: &Args) -> Result<PipelineInputs> {
    let columns = MetricColumns {
        name: args.name_column.clone(),
        metric: args.metric_column.clone(),
    };

    let metrics = load_metrics(args, &columns)?;
    let boundaries = load_boundaries_geojson(&args.boundaries, &args.boundary_name_property)?;

    let mut overlays = Vec::new();
    if let Some(path) = &args.disputed {
        overlays.extend(load_overlays_geojson(
            path,
            &args.boundary_name_property,
            OverlayLayer::Disputed,
        )?);
    }
    if let Some(path) = &args.provinces {
        overlays.extend(load_overlays_geojson(
            path,
            &args.province_name_property,
            OverlayLayer::Province,
        )?);
    }

    Ok(PipelineInputs {
        metrics,
        boundaries,
        overlays,
    })
}

fn load_metrics(args: &Args, columns: &MetricColumns) -> Result<Vec<RawMetricRecord>> {
    if let Some(path) = &args.metrics {
        return load_metrics_csv(path, columns);
    }

    match &args.sqlite {
        #[cfg(feature = "sqlite")]
        Some(path) => boundary_reconciliation::load_metrics_sqlite(path, &args.query, columns),
        #[cfg(not(feature = "sqlite"))]
        Some(_) => bail!("SQLite metric source not available. Rebuild with: cargo build --features sqlite"),
        None => bail!("No metric source given (use --metrics or --sqlite)"),
    }
}
