// ⚙️ Pipeline Configuration - Everything static, nothing inferred
// Alias table, merge rules, exclusions, categories and inheritance, loaded
// from JSON the same way classification rules are.

use crate::classifier::{
    AbsencePolicy, CategoryDefinition, CategoryScheme, ClassificationConfig, Color, Inheritance,
    ZeroCategory,
};
use crate::error::Result as PipelineResult;
use crate::joiner::JoinConfig;
use crate::merger::{GeometrySource, MergeRule, MergerConfig, TerritoryMerger};
use crate::resolver::IdentifierResolver;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Raw metric-source name → boundary canonical name
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,

    #[serde(default)]
    pub merge: MergerConfig,

    #[serde(default)]
    pub join: JoinConfig,

    pub classification: ClassificationConfig,

    /// How many entities the run report ranks by metric
    #[serde(default = "default_top_n")]
    pub report_top_n: usize,
}

fn default_top_n() -> usize {
    5
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_json::from_str(content).context("Failed to parse pipeline config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Build every phase once so malformed configuration fails before any data is read
    pub fn validate(&self) -> PipelineResult<()> {
        IdentifierResolver::new(&self.aliases)?;
        TerritoryMerger::new(self.merge.clone())?;
        CategoryScheme::new(&self.classification)?;
        Ok(())
    }

    /// SHA-256 of the serialized configuration, for run provenance
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // Serializing plain data structures cannot fail
        hasher.update(serde_json::to_vec(self).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }

    // ========================================================================
    // PRESET: government removal requests world map
    // ========================================================================

    pub fn removal_requests() -> Self {
        let aliases = [
            ("Bosnia & Herzegovina", "Bosnia and Herz."),
            ("Cape Verde", "Cabo Verde"),
            ("Dominican Republic", "Dominican Rep."),
            ("Côte d’Ivoire", "Côte d'Ivoire"),
            ("Myanmar (Burma)", "Myanmar"),
            ("South Sudan", "S. Sudan"),
            ("United States", "United States of America"),
            ("St. Vincent & Grenadines", "St. Vin. and Gren."),
            ("Trinidad & Tobago", "Trinidad and Tobago"),
            ("Türkiye", "Turkey"),
        ]
        .into_iter()
        .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
        .collect();

        let boundary = |name: &str| GeometrySource::Boundary(name.to_string());
        let overlay = |name: &str| GeometrySource::Overlay(name.to_string());

        let rules = vec![
            MergeRule::Union {
                target: "Cyprus".to_string(),
                sources: vec![boundary("Cyprus"), overlay("N. Cyprus")],
                seam_buffer: Some(0.05),
            },
            MergeRule::Union {
                target: "Somalia".to_string(),
                sources: vec![boundary("Somalia"), overlay("Somaliland")],
                seam_buffer: Some(0.0),
            },
            MergeRule::Drop {
                target: "Somaliland".to_string(),
            },
            MergeRule::Transfer {
                from: "Russia".to_string(),
                to: "Ukraine".to_string(),
                region: Some(vec![GeometrySource::OverlayContains("Crimea".to_string())]),
            },
            MergeRule::PruneSmallParts {
                target: "Russia".to_string(),
                min_area: None,
            },
        ];

        let categories = vec![
            CategoryDefinition::new("1-20", 0.0, Some(20.0), "#ffffd9"),
            CategoryDefinition::new("21-100", 20.0, Some(100.0), "#d6efb3"),
            CategoryDefinition::new("101-1000", 100.0, Some(1_000.0), "#73c8bd"),
            CategoryDefinition::new("1001-10000", 1_000.0, Some(10_000.0), "#2498c1"),
            CategoryDefinition::new("10001-100000", 10_000.0, Some(100_000.0), "#234da0"),
            CategoryDefinition::new("100001+", 100_000.0, None, "#081d58"),
        ];

        PipelineConfig {
            aliases,
            merge: MergerConfig {
                reproject_overlays: true,
                seam_buffer: 0.05,
                small_part_threshold: 0.10,
                rules,
            },
            join: JoinConfig {
                excluded: vec!["Antarctica".to_string()],
            },
            classification: ClassificationConfig {
                categories,
                zero: ZeroCategory {
                    label: "zero".to_string(),
                    legend_label: "0".to_string(),
                    color: Color::new("#d3d3d3"),
                },
                absence: AbsencePolicy::AsZero,
                include_lowest: true,
                inheritance: vec![Inheritance {
                    dependent: "Greenland".to_string(),
                    parent: "Denmark".to_string(),
                }],
            },
            report_top_n: default_top_n(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::removal_requests()
    }
}
