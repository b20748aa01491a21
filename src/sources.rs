// 📥 Source Loaders - Metric rows and boundary layers
//
// Thin I/O around the pipeline: CSV or SQLite for metrics, GeoJSON
// FeatureCollections for boundaries, disputed areas and provinces.

use crate::crs::Crs;
use crate::records::{BoundaryRecord, OverlayLayer, OverlayRecord, RawMetricRecord};
use anyhow::{anyhow, bail, Context, Result};
use geo::{Geometry, MultiPolygon};
use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

// ============================================================================
// METRIC SOURCE
// ============================================================================

/// Column headers holding the entity name and the metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricColumns {
    pub name: String,
    pub metric: String,
}

impl Default for MetricColumns {
    fn default() -> Self {
        MetricColumns {
            name: "country".to_string(),
            metric: "total_requests".to_string(),
        }
    }
}

pub fn load_metrics_csv(csv_path: &Path, columns: &MetricColumns) -> Result<Vec<RawMetricRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open metric CSV: {:?}", csv_path))?;

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let position = |column: &str| {
        headers
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| anyhow!("CSV {:?} has no '{}' column", csv_path, column))
    };
    let name_idx = position(&columns.name)?;
    let metric_idx = position(&columns.metric)?;

    let mut records = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        // +2: header row and 1-based numbering
        let line = line + 2;
        let row = result.with_context(|| format!("Failed to read CSV line {}", line))?;

        let name = row.get(name_idx).unwrap_or_default().trim();
        let raw_metric = row.get(metric_idx).unwrap_or_default().trim();
        let metric: f64 = raw_metric
            .parse()
            .with_context(|| format!("Line {}: metric '{}' is not a number", line, raw_metric))?;

        records.push(
            RawMetricRecord::new(name, metric).with_context(|| format!("Line {}", line))?,
        );
    }

    info!("Loaded {} metric rows from {:?}", records.len(), csv_path);
    Ok(records)
}

#[cfg(feature = "sqlite")]
pub fn load_metrics_sqlite(
    db_path: &Path,
    query: &str,
    columns: &MetricColumns,
) -> Result<Vec<RawMetricRecord>> {
    use rusqlite::{Connection, OpenFlags};

    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open metric database: {:?}", db_path))?;

    let mut stmt = conn
        .prepare(query)
        .with_context(|| format!("Failed to prepare metric query: {}", query))?;
    let name_idx = stmt
        .column_index(&columns.name)
        .with_context(|| format!("Query has no '{}' column", columns.name))?;
    let metric_idx = stmt
        .column_index(&columns.metric)
        .with_context(|| format!("Query has no '{}' column", columns.metric))?;

    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(name_idx)?, row.get::<_, f64>(metric_idx)?))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (name, metric) = row.context("Failed to read metric row")?;
        records.push(RawMetricRecord::new(name, metric)?);
    }

    info!("Loaded {} metric rows from {:?}", records.len(), db_path);
    Ok(records)
}

// ============================================================================
// BOUNDARY LAYERS
// ============================================================================

struct Layer {
    crs: Crs,
    features: Vec<(String, MultiPolygon<f64>)>,
}

/// Legacy GeoJSON `crs` member: {"type": "name", "properties": {"name": "..."}}
fn layer_crs(collection: &geojson::FeatureCollection) -> Result<Crs> {
    let Some(member) = collection
        .foreign_members
        .as_ref()
        .and_then(|m| m.get("crs"))
    else {
        return Ok(Crs::WGS84);
    };

    let name = member
        .pointer("/properties/name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Malformed 'crs' member: {}", member))?;

    Crs::parse(name).ok_or_else(|| anyhow!("Unrecognised CRS identifier '{}'", name))
}

fn read_layer(path: &Path, name_property: &str) -> Result<Layer> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read GeoJSON: {:?}", path))?;
    let geojson: GeoJson = content
        .parse()
        .with_context(|| format!("Failed to parse GeoJSON: {:?}", path))?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        bail!("{:?} is not a FeatureCollection", path);
    };

    let crs = layer_crs(&collection)?;
    let mut features = Vec::with_capacity(collection.features.len());
    let mut skipped = 0;

    for (i, feature) in collection.features.into_iter().enumerate() {
        let Some(name) = feature
            .property(name_property)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
        else {
            warn!(feature = i, property = name_property, "feature has no name; skipped");
            skipped += 1;
            continue;
        };

        let Some(raw) = feature.geometry else {
            warn!(feature = %name, "feature has no geometry; skipped");
            skipped += 1;
            continue;
        };

        let geometry = Geometry::<f64>::try_from(raw)
            .with_context(|| format!("Invalid geometry for feature '{}'", name))?;

        let polygons = match geometry {
            Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
            Geometry::MultiPolygon(mp) => mp,
            _ => {
                warn!(feature = %name, "feature is not a polygon; skipped");
                skipped += 1;
                continue;
            }
        };

        features.push((name, polygons));
    }

    info!(
        "Loaded {} features from {:?} ({} skipped, {})",
        features.len(),
        path,
        skipped,
        crs
    );

    Ok(Layer { crs, features })
}

/// Load the primary boundary layer (one record per feature)
pub fn load_boundaries_geojson(path: &Path, name_property: &str) -> Result<Vec<BoundaryRecord>> {
    let layer = read_layer(path, name_property)?;
    Ok(layer
        .features
        .into_iter()
        .map(|(name, geometry)| BoundaryRecord::new(name, geometry, layer.crs))
        .collect())
}

/// Load a disputed-area or province layer
pub fn load_overlays_geojson(
    path: &Path,
    name_property: &str,
    layer_kind: OverlayLayer,
) -> Result<Vec<OverlayRecord>> {
    let layer = read_layer(path, name_property)?;
    Ok(layer
        .features
        .into_iter()
        .map(|(name, geometry)| OverlayRecord::new(name, layer_kind, geometry, layer.crs))
        .collect())
}

// ============================================================================
// TESTS
// ============================================================================
