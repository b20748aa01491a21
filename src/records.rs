// 📦 Records - The data flowing between pipeline phases
//
// RawMetricRecord  → one row of the metric source (immutable once read)
// BoundaryRecord   → one territory of the boundary source
// OverlayRecord    → one disputed area / province, read-only input to the merger
// JoinedRecord     → boundary + optional metric, output of the joiner
// ClassifiedRecord → joined record with category and fill colour, handed to the renderer

use crate::classifier::Color;
use crate::crs::Crs;
use crate::error::{Phase, PipelineError, Result};
use geo::{Area, MultiPolygon};
use serde::{Deserialize, Serialize};

// ============================================================================
// METRIC SOURCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetricRecord {
    raw_name: String,
    metric: f64,
}

impl RawMetricRecord {
    /// Build a metric row; names must be non-empty and metrics finite and ≥ 0
    pub fn new(raw_name: impl Into<String>, metric: f64) -> Result<Self> {
        let raw_name = raw_name.into();

        if raw_name.trim().is_empty() {
            return Err(PipelineError::data_integrity(
                Phase::Load,
                raw_name,
                "metric row has an empty name",
            ));
        }

        if !metric.is_finite() || metric < 0.0 {
            return Err(PipelineError::data_integrity(
                Phase::Load,
                raw_name,
                format!("metric must be a finite number >= 0, got {}", metric),
            ));
        }

        Ok(RawMetricRecord { raw_name, metric })
    }

    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    pub fn metric(&self) -> f64 {
        self.metric
    }
}

// ============================================================================
// BOUNDARY SOURCE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRecord {
    pub canonical_name: String,
    pub geometry: MultiPolygon<f64>,
    pub crs: Crs,
}

impl BoundaryRecord {
    pub fn new(canonical_name: impl Into<String>, geometry: MultiPolygon<f64>, crs: Crs) -> Self {
        BoundaryRecord {
            canonical_name: canonical_name.into(),
            geometry,
            crs,
        }
    }

    /// Planar area in source units (square degrees for EPSG:4326)
    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayLayer {
    /// Territories with contested sovereignty (N. Cyprus, Somaliland, ...)
    Disputed,

    /// Sub-national provinces (used to carve out regions such as Crimea)
    Province,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRecord {
    pub name: String,
    pub layer: OverlayLayer,
    pub geometry: MultiPolygon<f64>,
    pub crs: Crs,
}

impl OverlayRecord {
    pub fn new(
        name: impl Into<String>,
        layer: OverlayLayer,
        geometry: MultiPolygon<f64>,
        crs: Crs,
    ) -> Self {
        OverlayRecord {
            name: name.into(),
            layer,
            geometry,
            crs,
        }
    }
}

// ============================================================================
// JOIN / CLASSIFY OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    pub canonical_name: String,
    /// None when the metric source had no row for this territory
    pub metric: Option<f64>,
    pub geometry: MultiPolygon<f64>,
    pub crs: Crs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRecord {
    pub canonical_name: String,
    pub metric: Option<f64>,
    pub geometry: MultiPolygon<f64>,
    pub crs: Crs,
    pub category: String,
    pub color: Color,
    /// Parent whose colour was copied onto this record, if any
    pub inherited_from: Option<String>,
}
