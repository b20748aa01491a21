// 🖌️ Renderer Hand-off
// The pipeline stops at classified records; a Renderer turns them into an
// artifact. GeoJsonRenderer writes what a map tool needs: geometry, fill colour,
// category, and the legend.

use crate::classifier::LegendEntry;
use crate::crs::Crs;
use crate::records::ClassifiedRecord;
use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde_json::json;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

pub trait Renderer {
    fn render(&self, records: &[ClassifiedRecord], legend: &[LegendEntry]) -> Result<()>;
}

pub struct GeoJsonRenderer {
    path: PathBuf,
}

impl GeoJsonRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        GeoJsonRenderer { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build the FeatureCollection without touching the filesystem
    pub fn to_geojson(records: &[ClassifiedRecord], legend: &[LegendEntry]) -> GeoJson {
        let features = records
            .iter()
            .map(|record| {
                let mut properties = JsonObject::new();
                properties.insert("name".to_string(), json!(record.canonical_name));
                properties.insert("metric".to_string(), json!(record.metric));
                properties.insert("category".to_string(), json!(record.category));
                properties.insert("fill".to_string(), json!(record.color.as_str()));
                if let Some(parent) = &record.inherited_from {
                    properties.insert("fill_inherited_from".to_string(), json!(parent));
                }

                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(&record.geometry))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        let mut foreign = JsonObject::new();
        foreign.insert("legend".to_string(), json!(legend));

        let crs = records.first().map(|r| r.crs).unwrap_or_default();
        if crs != Crs::WGS84 {
            foreign.insert(
                "crs".to_string(),
                json!({"type": "name", "properties": {"name": format!("urn:ogc:def:crs:EPSG::{}", crs.epsg())}}),
            );
        }

        GeoJson::FeatureCollection(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign),
        })
    }
}

impl Renderer for GeoJsonRenderer {
    fn render(&self, records: &[ClassifiedRecord], legend: &[LegendEntry]) -> Result<()> {
        let geojson = Self::to_geojson(records, legend);

        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create output file: {:?}", self.path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &geojson)
            .with_context(|| format!("Failed to write GeoJSON to {:?}", self.path))?;

        info!("Wrote {} features to {:?}", records.len(), self.path);
        Ok(())
    }
}
