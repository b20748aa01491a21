// 🌐 Coordinate Reference Systems
// Boundary and overlay layers are sourced independently and may disagree.
// Boolean operations between them are only meaningful in one shared CRS.

use crate::error::{Phase, PipelineError, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Spherical radius used by EPSG:3857
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Web Mercator is undefined at the poles
const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_78;

/// Coordinate reference system, identified by EPSG code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(pub u32);

impl Crs {
    /// Geographic lon/lat (the GeoJSON default)
    pub const WGS84: Crs = Crs(4326);

    /// Spherical Web Mercator, metres
    pub const WEB_MERCATOR: Crs = Crs(3857);

    pub fn epsg(&self) -> u32 {
        self.0
    }

    /// Parse the identifiers GeoJSON and shapefile tooling emit:
    /// `EPSG:4326`, `urn:ogc:def:crs:EPSG::3857`, `urn:ogc:def:crs:OGC:1.3:CRS84`
    pub fn parse(text: &str) -> Option<Crs> {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("urn:ogc:def:crs:OGC:1.3:CRS84")
            || trimmed.eq_ignore_ascii_case("CRS84")
        {
            return Some(Crs::WGS84);
        }

        let code = trimmed.rsplit(':').next()?;
        let has_epsg = trimmed.to_ascii_uppercase().contains("EPSG");
        if !has_epsg {
            return None;
        }
        code.parse::<u32>().ok().map(Crs)
    }

    /// Whether geometries in `self` can be brought into `target`
    pub fn can_reproject_to(&self, target: Crs) -> bool {
        *self == target
            || matches!(
                (self.0, target.0),
                (4326, 3857) | (3857, 4326)
            )
    }
}

impl Default for Crs {
    fn default() -> Self {
        Crs::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

// ============================================================================
// REPROJECTION
// ============================================================================

fn to_web_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    Coord {
        x: WEB_MERCATOR_RADIUS * c.x.to_radians(),
        y: WEB_MERCATOR_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln(),
    }
}

fn from_web_mercator(c: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (c.x / WEB_MERCATOR_RADIUS).to_degrees(),
        y: (2.0 * (c.y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees(),
    }
}

/// Reproject a geometry owned by `record` from `from` into `to`
pub fn reproject(
    geometry: &MultiPolygon<f64>,
    from: Crs,
    to: Crs,
    phase: Phase,
    record: &str,
) -> Result<MultiPolygon<f64>> {
    let transform: fn(Coord<f64>) -> Coord<f64> = match (from.0, to.0) {
        (a, b) if a == b => return Ok(geometry.clone()),
        (4326, 3857) => to_web_mercator,
        (3857, 4326) => from_web_mercator,
        _ => {
            return Err(PipelineError::configuration(
                phase,
                record,
                format!("no reprojection available from {} to {}", from, to),
            ))
        }
    };

    let projected = geometry.map_coords(transform);

    let all_finite = projected
        .0
        .iter()
        .flat_map(|p| p.exterior().coords().chain(p.interiors().iter().flat_map(|r| r.coords())))
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !all_finite {
        return Err(PipelineError::geometry(
            phase,
            record,
            format!("reprojection {} -> {} produced non-finite coordinates", from, to),
        ));
    }

    Ok(projected)
}
