// Boundary Reconciliation - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;      // Failure taxonomy: configuration / data integrity / geometry
pub mod crs;        // EPSG codes + 4326 ⇄ 3857 reprojection
pub mod records;    // Metric, boundary, overlay, joined and classified records
pub mod geometry;   // Boolean ops, zero-buffer repair, small-part pruning
pub mod resolver;   // Identifier Resolver
pub mod merger;     // Territory Merger
pub mod joiner;     // Joiner
pub mod classifier; // Classifier + legend
pub mod config;     // Static configuration and the removal-requests preset
pub mod sources;    // CSV / SQLite / GeoJSON loaders
pub mod report;     // Run report
pub mod render;     // Renderer hand-off
pub mod pipeline;   // Merge → Join → Classify

// Re-export commonly used types
pub use error::{Phase, PipelineError, Result};
pub use crs::{reproject, Crs};
pub use records::{
    BoundaryRecord, ClassifiedRecord, JoinedRecord, OverlayLayer, OverlayRecord, RawMetricRecord,
};
pub use resolver::IdentifierResolver;
pub use merger::{GeometrySource, MergeRule, MergedBoundaries, MergerConfig, TerritoryMerger};
pub use joiner::{JoinConfig, JoinOutput, JoinReport, Joiner, UnmatchedMetric};
pub use classifier::{
    AbsencePolicy, CategoryDefinition, CategoryScheme, ClassificationConfig, Color, Inheritance,
    LegendEntry, ZeroCategory,
};
pub use config::PipelineConfig;
pub use sources::{load_boundaries_geojson, load_metrics_csv, load_overlays_geojson, MetricColumns};
#[cfg(feature = "sqlite")]
pub use sources::load_metrics_sqlite;
pub use report::{CategoryCount, RankedEntity, RunReport};
pub use render::{GeoJsonRenderer, Renderer};
pub use pipeline::{Pipeline, PipelineInputs, PipelineOutput};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
