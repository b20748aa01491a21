// 🧩 Geometry Helpers - Boolean ops, buffering, repair, fragment pruning
//
// All geometries are MultiPolygon<f64>. Areas are planar, in the units of the
// boundary source (square degrees for EPSG:4326).

use crate::error::{Phase, PipelineError, Result};
use geo::{unary_union, Area, BooleanOps, Buffer, MultiPolygon, Polygon, Validation};

/// Empty geometry, the identity for union
pub fn empty() -> MultiPolygon<f64> {
    MultiPolygon::new(Vec::new())
}

pub fn area(geometry: &MultiPolygon<f64>) -> f64 {
    geometry.unsigned_area()
}

pub fn is_degenerate(geometry: &MultiPolygon<f64>) -> bool {
    geometry.0.is_empty() || area(geometry) <= 0.0
}

/// Union of any number of geometries
pub fn union_all<'a>(geometries: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> MultiPolygon<f64> {
    geometries
        .into_iter()
        .fold(empty(), |acc, g| acc.union(g))
}

pub fn difference(minuend: &MultiPolygon<f64>, subtrahend: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    minuend.difference(subtrahend)
}

/// Zero-distance repair: re-node the polygon set through a unary union,
/// resolving self-intersections and overlapping parts without moving edges
pub fn zero_buffer(geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    unary_union(geometry.0.iter())
}

/// Grow by `distance` then shrink by the same amount to close seam slivers
pub fn round_trip_buffer(geometry: &MultiPolygon<f64>, distance: f64) -> MultiPolygon<f64> {
    if distance <= 0.0 {
        return geometry.clone();
    }
    geometry.buffer(distance).buffer(-distance)
}

/// Repair a freshly computed geometry and check it is usable.
///
/// A result that is still invalid after the zero-buffer pass, or empty when a
/// non-empty result was expected, escalates to a configuration error.
pub fn finalize(
    geometry: MultiPolygon<f64>,
    phase: Phase,
    record: &str,
    operation: &str,
) -> Result<MultiPolygon<f64>> {
    let repaired = zero_buffer(&geometry);

    if !repaired.is_valid() {
        return Err(PipelineError::configuration(
            phase,
            record,
            format!("{} left an invalid geometry even after zero-buffer repair", operation),
        ));
    }

    if is_degenerate(&repaired) {
        return Err(PipelineError::configuration(
            phase,
            record,
            format!("{} produced an empty geometry", operation),
        ));
    }

    Ok(repaired)
}

/// Split a geometry into its connected polygon parts
pub fn explode(geometry: &MultiPolygon<f64>) -> Vec<Polygon<f64>> {
    geometry.0.clone()
}

/// Result of dropping fragments from a geometry
#[derive(Debug, Clone)]
pub struct PruneOutcome {
    pub geometry: MultiPolygon<f64>,
    pub kept_parts: usize,
    pub removed_parts: usize,
    pub removed_area: f64,
}

/// Keep only parts strictly larger than `threshold`
pub fn prune_small_parts(geometry: &MultiPolygon<f64>, threshold: f64) -> PruneOutcome {
    let (kept, removed): (Vec<Polygon<f64>>, Vec<Polygon<f64>>) = explode(geometry)
        .into_iter()
        .partition(|part| part.unsigned_area() > threshold);

    PruneOutcome {
        kept_parts: kept.len(),
        removed_parts: removed.len(),
        removed_area: removed.iter().map(|p| p.unsigned_area()).sum(),
        geometry: MultiPolygon::new(kept),
    }
}
