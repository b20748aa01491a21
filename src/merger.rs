// 🗺️ Territory Merger - Rules as data for disputed and annexed territory
//
// The boundary set is consumed, adjusted by an ordered list of MergeRules, and
// returned frozen. Per-territory special cases (Cyprus, Somalia, Crimea, ...)
// live in configuration, never in code paths.
//
// Rule kinds:
//   union             - replace target geometry with the union of its sources
//   difference        - subtract sources from target
//   transfer          - move a region (or a whole record) from one target to another
//   drop              - remove a record entirely
//   prune_small_parts - discard fragments at or below an area threshold

use crate::crs::{reproject, Crs};
use crate::error::{Phase, PipelineError, Result};
use crate::geometry;
use crate::records::{BoundaryRecord, OverlayRecord};
use geo::{BooleanOps, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info};

// ============================================================================
// RULE DEFINITION
// ============================================================================

/// Where a rule takes a geometry from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometrySource {
    /// Current geometry of a record in the working boundary set
    Boundary(String),

    /// Overlay record(s) with exactly this name
    Overlay(String),

    /// All overlay records whose name contains this text (case-insensitive)
    OverlayContains(String),
}

impl fmt::Display for GeometrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometrySource::Boundary(name) => write!(f, "boundary '{}'", name),
            GeometrySource::Overlay(name) => write!(f, "overlay '{}'", name),
            GeometrySource::OverlayContains(text) => write!(f, "overlays matching '{}'", text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MergeRule {
    Union {
        target: String,
        sources: Vec<GeometrySource>,
        /// Overrides the merger-wide seam buffer; 0 disables round-trip buffering
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seam_buffer: Option<f64>,
    },
    Difference {
        target: String,
        subtract: Vec<GeometrySource>,
    },
    Transfer {
        from: String,
        to: String,
        /// None moves the whole `from` record into `to` and removes `from`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<Vec<GeometrySource>>,
    },
    Drop {
        target: String,
    },
    PruneSmallParts {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_area: Option<f64>,
    },
}

impl MergeRule {
    /// Name of the record a rule removes from the output, if any
    pub fn removes(&self) -> Option<&str> {
        match self {
            MergeRule::Drop { target } => Some(target.as_str()),
            MergeRule::Transfer { from, region: None, .. } => Some(from.as_str()),
            _ => None,
        }
    }

    /// Every boundary name the rule writes to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            MergeRule::Union { target, .. }
            | MergeRule::Difference { target, .. }
            | MergeRule::Drop { target }
            | MergeRule::PruneSmallParts { target, .. } => vec![target.as_str()],
            MergeRule::Transfer { from, to, .. } => vec![from.as_str(), to.as_str()],
        }
    }

    fn sources(&self) -> &[GeometrySource] {
        match self {
            MergeRule::Union { sources, .. } => sources.as_slice(),
            MergeRule::Difference { subtract, .. } => subtract.as_slice(),
            MergeRule::Transfer { region: Some(region), .. } => region.as_slice(),
            _ => &[],
        }
    }

    pub fn describe(&self) -> String {
        let list = |sources: &[GeometrySource]| {
            sources
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" + ")
        };

        match self {
            MergeRule::Union { target, sources, .. } => {
                format!("union {} into '{}'", list(sources), target)
            }
            MergeRule::Difference { target, subtract } => {
                format!("subtract {} from '{}'", list(subtract), target)
            }
            MergeRule::Transfer { from, to, region: Some(region) } => {
                format!("transfer {} from '{}' to '{}'", list(region), from, to)
            }
            MergeRule::Transfer { from, to, region: None } => {
                format!("dissolve '{}' into '{}'", from, to)
            }
            MergeRule::Drop { target } => format!("drop '{}'", target),
            MergeRule::PruneSmallParts { target, min_area } => match min_area {
                Some(a) => format!("prune parts of '{}' with area <= {}", target, a),
                None => format!("prune small parts of '{}'", target),
            },
        }
    }
}

// ============================================================================
// MERGER CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergerConfig {
    /// Bring overlays into the boundary CRS before any boolean operation.
    /// When false, a CRS mismatch is a configuration error.
    #[serde(default = "default_reproject")]
    pub reproject_overlays: bool,

    /// Round-trip buffer distance applied to union results
    #[serde(default = "default_seam_buffer")]
    pub seam_buffer: f64,

    /// Default area threshold for prune_small_parts
    #[serde(default = "default_small_part_threshold")]
    pub small_part_threshold: f64,

    #[serde(default)]
    pub rules: Vec<MergeRule>,
}

fn default_reproject() -> bool {
    true
}

fn default_seam_buffer() -> f64 {
    0.05
}

fn default_small_part_threshold() -> f64 {
    0.10
}

impl Default for MergerConfig {
    fn default() -> Self {
        MergerConfig {
            reproject_overlays: default_reproject(),
            seam_buffer: default_seam_buffer(),
            small_part_threshold: default_small_part_threshold(),
            rules: Vec::new(),
        }
    }
}

// ============================================================================
// MERGE OUTPUT
// ============================================================================

/// Boundary set after all rules ran. Read-only from here on.
#[derive(Debug, Clone)]
pub struct MergedBoundaries {
    records: Vec<BoundaryRecord>,
    removed: Vec<String>,
    crs: Crs,
}

impl MergedBoundaries {
    pub fn records(&self) -> &[BoundaryRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<BoundaryRecord> {
        self.records
    }

    /// Names removed by drop / dissolving transfer rules, in rule order
    pub fn removed(&self) -> &[String] {
        &self.removed
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.canonical_name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&BoundaryRecord> {
        self.records.iter().find(|r| r.canonical_name == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// TERRITORY MERGER
// ============================================================================

pub struct TerritoryMerger {
    config: MergerConfig,
}

impl TerritoryMerger {
    /// Create a merger, validating thresholds and rule shapes up front
    pub fn new(config: MergerConfig) -> Result<Self> {
        let check_distance = |value: f64, what: &str| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(PipelineError::configuration(
                    Phase::Merge,
                    what,
                    format!("{} must be a finite number >= 0, got {}", what, value),
                ))
            }
        };

        check_distance(config.seam_buffer, "seam_buffer")?;
        check_distance(config.small_part_threshold, "small_part_threshold")?;

        for rule in &config.rules {
            for target in rule.targets() {
                if target.is_empty() {
                    return Err(PipelineError::configuration(
                        Phase::Merge,
                        rule.describe(),
                        "rule names an empty target",
                    ));
                }
            }

            match rule {
                MergeRule::Union { target, sources, seam_buffer } => {
                    if sources.is_empty() {
                        return Err(PipelineError::configuration(
                            Phase::Merge,
                            target.as_str(),
                            "union rule has no sources",
                        ));
                    }
                    if let Some(d) = seam_buffer {
                        check_distance(*d, "seam_buffer")?;
                    }
                }
                MergeRule::Difference { target, subtract } if subtract.is_empty() => {
                    return Err(PipelineError::configuration(
                        Phase::Merge,
                        target.as_str(),
                        "difference rule has nothing to subtract",
                    ));
                }
                MergeRule::Transfer { from, to, region } => {
                    if from == to {
                        return Err(PipelineError::configuration(
                            Phase::Merge,
                            from.as_str(),
                            "transfer source and destination are the same record",
                        ));
                    }
                    if matches!(region, Some(r) if r.is_empty()) {
                        return Err(PipelineError::configuration(
                            Phase::Merge,
                            from.as_str(),
                            "transfer region list is empty",
                        ));
                    }
                }
                MergeRule::PruneSmallParts { min_area: Some(a), .. } => {
                    check_distance(*a, "min_area")?;
                }
                _ => {}
            }
        }

        Ok(TerritoryMerger { config })
    }

    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    /// Apply every rule, in configured order, to an owned boundary set
    pub fn merge(
        &self,
        boundaries: Vec<BoundaryRecord>,
        overlays: &[OverlayRecord],
    ) -> Result<MergedBoundaries> {
        let crs = boundary_crs(&boundaries)?;
        let overlays = self.align_overlays(overlays, crs)?;

        let mut working = WorkingSet {
            records: boundaries,
            overlays,
        };
        let mut removed = Vec::new();

        for rule in &self.config.rules {
            debug!(rule = %rule.describe(), "applying merge rule");
            self.apply(rule, &mut working, &mut removed)?;
        }

        info!(
            records = working.records.len(),
            removed = removed.len(),
            rules = self.config.rules.len(),
            "merge complete"
        );

        Ok(MergedBoundaries {
            records: working.records,
            removed,
            crs,
        })
    }

    /// Reproject (or reject) every overlay a rule refers to, before any boolean op
    fn align_overlays(&self, overlays: &[OverlayRecord], crs: Crs) -> Result<Vec<OverlayRecord>> {
        let referenced: Vec<&OverlayRecord> = overlays
            .iter()
            .filter(|o| {
                self.config
                    .rules
                    .iter()
                    .flat_map(|r| r.sources())
                    .any(|s| overlay_matches(s, &o.name))
            })
            .collect();

        referenced
            .into_iter()
            .map(|overlay| {
                if overlay.crs == crs {
                    return Ok(overlay.clone());
                }

                if !overlay.crs.can_reproject_to(crs) {
                    return Err(PipelineError::configuration(
                        Phase::Merge,
                        overlay.name.as_str(),
                        format!("no reprojection available from {} to {}", overlay.crs, crs),
                    ));
                }

                if !self.config.reproject_overlays {
                    return Err(PipelineError::configuration(
                        Phase::Merge,
                        overlay.name.as_str(),
                        format!(
                            "overlay is in {} but boundaries are in {} and reprojection is disabled",
                            overlay.crs, crs
                        ),
                    ));
                }

                let geometry = reproject(&overlay.geometry, overlay.crs, crs, Phase::Merge, &overlay.name)?;
                debug!(overlay = %overlay.name, from = %overlay.crs, to = %crs, "reprojected overlay");

                Ok(OverlayRecord {
                    geometry,
                    crs,
                    ..overlay.clone()
                })
            })
            .collect()
    }

    fn apply(
        &self,
        rule: &MergeRule,
        working: &mut WorkingSet,
        removed: &mut Vec<String>,
    ) -> Result<()> {
        match rule {
            MergeRule::Union { target, sources, seam_buffer } => {
                let idx = working.position(target)?;
                let parts = working.resolve_all(sources)?;
                let raw = geometry::union_all(&parts);
                let distance = seam_buffer.unwrap_or(self.config.seam_buffer);
                let closed = geometry::round_trip_buffer(&raw, distance);
                working.records[idx].geometry =
                    geometry::finalize(closed, Phase::Merge, target, "union")?;
            }

            MergeRule::Difference { target, subtract } => {
                let idx = working.position(target)?;
                let parts = working.resolve_all(subtract)?;
                let cut = geometry::union_all(&parts);
                let result = geometry::difference(&working.records[idx].geometry, &cut);
                working.records[idx].geometry =
                    geometry::finalize(result, Phase::Merge, target, "difference")?;
            }

            MergeRule::Transfer { from, to, region: Some(region) } => {
                let from_idx = working.position(from)?;
                let to_idx = working.position(to)?;
                let parts = working.resolve_all(region)?;
                let region = geometry::finalize(
                    geometry::union_all(&parts),
                    Phase::Merge,
                    from,
                    "transfer region union",
                )?;

                let shrunk = geometry::difference(&working.records[from_idx].geometry, &region);
                working.records[from_idx].geometry =
                    geometry::finalize(shrunk, Phase::Merge, from, "transfer difference")?;

                let grown = working.records[to_idx].geometry.union(&region);
                working.records[to_idx].geometry =
                    geometry::finalize(grown, Phase::Merge, to, "transfer union")?;
            }

            MergeRule::Transfer { from, to, region: None } => {
                let from_idx = working.position(from)?;
                working.position(to)?;

                let dissolved = working.records.remove(from_idx);
                let to_idx = working.position(to)?;
                let grown = working.records[to_idx].geometry.union(&dissolved.geometry);
                working.records[to_idx].geometry =
                    geometry::finalize(grown, Phase::Merge, to, "dissolve")?;
                removed.push(dissolved.canonical_name);
            }

            MergeRule::Drop { target } => {
                let idx = working.position(target)?;
                let dropped = working.records.remove(idx);
                removed.push(dropped.canonical_name);
            }

            MergeRule::PruneSmallParts { target, min_area } => {
                let idx = working.position(target)?;
                let threshold = min_area.unwrap_or(self.config.small_part_threshold);
                let outcome = geometry::prune_small_parts(&working.records[idx].geometry, threshold);

                if outcome.kept_parts == 0 {
                    return Err(PipelineError::configuration(
                        Phase::Merge,
                        target.as_str(),
                        format!("every part is at or below the area threshold {}", threshold),
                    ));
                }

                debug!(
                    target = %target,
                    kept = outcome.kept_parts,
                    removed = outcome.removed_parts,
                    removed_area = outcome.removed_area,
                    "pruned small parts"
                );
                working.records[idx].geometry =
                    geometry::finalize(outcome.geometry, Phase::Merge, target, "prune")?;
            }
        }

        Ok(())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

struct WorkingSet {
    records: Vec<BoundaryRecord>,
    overlays: Vec<OverlayRecord>,
}

impl WorkingSet {
    /// Index of the unique record called `name`
    fn position(&self, name: &str) -> Result<usize> {
        let mut hits = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.canonical_name == name)
            .map(|(i, _)| i);

        match (hits.next(), hits.next()) {
            (Some(i), None) => Ok(i),
            (None, _) => Err(PipelineError::configuration(
                Phase::Merge,
                name,
                "rule targets a boundary that is not in the working set",
            )),
            (Some(_), Some(_)) => Err(PipelineError::data_integrity(
                Phase::Merge,
                name,
                "rule targets a name that appears more than once in the boundary set",
            )),
        }
    }

    fn resolve_all(&self, sources: &[GeometrySource]) -> Result<Vec<MultiPolygon<f64>>> {
        sources.iter().map(|s| self.resolve(s)).collect()
    }

    fn resolve(&self, source: &GeometrySource) -> Result<MultiPolygon<f64>> {
        let (label, geometry) = match source {
            GeometrySource::Boundary(name) => {
                let idx = self.position(name)?;
                (name.as_str(), self.records[idx].geometry.clone())
            }
            GeometrySource::Overlay(name) | GeometrySource::OverlayContains(name) => {
                let matched: Vec<&MultiPolygon<f64>> = self
                    .overlays
                    .iter()
                    .filter(|o| overlay_matches(source, &o.name))
                    .map(|o| &o.geometry)
                    .collect();

                if matched.is_empty() {
                    return Err(PipelineError::configuration(
                        Phase::Merge,
                        name.as_str(),
                        format!("{} matched no overlay record", source),
                    ));
                }
                (name.as_str(), geometry::union_all(matched))
            }
        };

        if geometry::is_degenerate(&geometry) {
            return Err(PipelineError::geometry(
                Phase::Merge,
                label,
                format!("{} has an empty geometry", source),
            ));
        }

        Ok(geometry)
    }
}

fn overlay_matches(source: &GeometrySource, overlay_name: &str) -> bool {
    match source {
        GeometrySource::Boundary(_) => false,
        GeometrySource::Overlay(name) => name == overlay_name,
        GeometrySource::OverlayContains(text) => overlay_name
            .to_lowercase()
            .contains(&text.to_lowercase()),
    }
}

/// The single CRS shared by every boundary record
fn boundary_crs(boundaries: &[BoundaryRecord]) -> Result<Crs> {
    let mut seen: HashMap<Crs, &str> = HashMap::new();
    for record in boundaries {
        seen.entry(record.crs).or_insert(record.canonical_name.as_str());
    }

    match seen.len() {
        0 => Ok(Crs::default()),
        1 => Ok(boundaries[0].crs),
        _ => {
            let first = &boundaries[0];
            let other = boundaries
                .iter()
                .find(|r| r.crs != first.crs)
                .map(|r| r.canonical_name.as_str())
                .unwrap_or_default();
            Err(PipelineError::configuration(
                Phase::Merge,
                other,
                format!("boundary set mixes coordinate systems ({} distinct)", seen.len()),
            ))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::rect;
    use crate::records::OverlayLayer;

    fn boundary(name: &str, geom: MultiPolygon<f64>) -> BoundaryRecord {
        BoundaryRecord::new(name, geom, Crs::WGS84)
    }

    fn overlay(name: &str, layer: OverlayLayer, geom: MultiPolygon<f64>) -> OverlayRecord {
        OverlayRecord::new(name, layer, geom, Crs::WGS84)
    }

    fn merger(rules: Vec<MergeRule>) -> TerritoryMerger {
        TerritoryMerger::new(MergerConfig {
            seam_buffer: 0.0,
            rules,
            ..MergerConfig::default()
        })
        .unwrap()
    }

    fn names(merged: &MergedBoundaries) -> Vec<&str> {
        merged.names().into_iter().collect()
    }

    #[test]
    fn test_union_then_drop_scenario() {
        let boundaries = vec![
            boundary("X", rect(0.0, 0.0, 1.0, 1.0)),
            boundary("Y-overlay", rect(1.0, 0.0, 1.0, 1.0)),
            boundary("Z", rect(5.0, 5.0, 1.0, 1.0)),
        ];
        let overlays = vec![overlay("Y-overlay", OverlayLayer::Disputed, rect(1.0, 0.0, 1.0, 1.0))];

        let merged = merger(vec![
            MergeRule::Union {
                target: "X".to_string(),
                sources: vec![
                    GeometrySource::Boundary("X".to_string()),
                    GeometrySource::Overlay("Y-overlay".to_string()),
                ],
                seam_buffer: None,
            },
            MergeRule::Drop { target: "Y-overlay".to_string() },
        ])
        .merge(boundaries, &overlays)
        .unwrap();

        assert_eq!(names(&merged), vec!["X", "Z"]);
        assert!((merged.get("X").unwrap().area() - 2.0).abs() < 1e-9);
        assert_eq!(merged.removed(), &["Y-overlay".to_string()]);

        println!("✅ Union + drop scenario passed");
    }

    #[test]
    fn test_untargeted_records_pass_through_unchanged() {
        let z = rect(5.0, 5.0, 1.0, 1.0);
        let boundaries = vec![
            boundary("X", rect(0.0, 0.0, 1.0, 1.0)),
            boundary("Z", z.clone()),
        ];
        let merged = merger(vec![MergeRule::PruneSmallParts {
            target: "X".to_string(),
            min_area: Some(0.5),
        }])
        .merge(boundaries, &[])
        .unwrap();

        assert_eq!(merged.get("Z").unwrap().geometry, z);
    }

    #[test]
    fn test_union_with_seam_buffer_closes_gap() {
        // South and north halves with a thin sliver between them
        let boundaries = vec![boundary("Cyprus", rect(32.0, 34.5, 2.0, 0.5))];
        let overlays = vec![overlay("N. Cyprus", OverlayLayer::Disputed, rect(32.0, 35.01, 2.0, 0.5))];

        let merged = merger(vec![MergeRule::Union {
            target: "Cyprus".to_string(),
            sources: vec![
                GeometrySource::Boundary("Cyprus".to_string()),
                GeometrySource::Overlay("N. Cyprus".to_string()),
            ],
            seam_buffer: Some(0.05),
        }])
        .merge(boundaries, &overlays)
        .unwrap();

        let cyprus = merged.get("Cyprus").unwrap();
        assert_eq!(cyprus.geometry.0.len(), 1);
        assert!(cyprus.area() >= 2.0);
    }

    #[test]
    fn test_transfer_region_between_records() {
        let boundaries = vec![
            boundary("Russia", rect(30.0, 44.0, 10.0, 10.0)),
            boundary("Ukraine", rect(20.0, 44.0, 10.0, 10.0)),
        ];
        let overlays = vec![
            overlay("Autonomous Republic of Crimea", OverlayLayer::Province, rect(30.0, 44.0, 2.0, 2.0)),
            overlay("Sevastopol, Crimea", OverlayLayer::Province, rect(32.0, 44.0, 1.0, 2.0)),
            overlay("Kherson", OverlayLayer::Province, rect(25.0, 46.0, 1.0, 1.0)),
        ];

        let merged = merger(vec![MergeRule::Transfer {
            from: "Russia".to_string(),
            to: "Ukraine".to_string(),
            region: Some(vec![GeometrySource::OverlayContains("crimea".to_string())]),
        }])
        .merge(boundaries, &overlays)
        .unwrap();

        assert!((merged.get("Russia").unwrap().area() - 94.0).abs() < 1e-9);
        assert!((merged.get("Ukraine").unwrap().area() - 106.0).abs() < 1e-9);
        assert!(merged.removed().is_empty());
    }

    #[test]
    fn test_dissolving_transfer_removes_source() {
        let boundaries = vec![
            boundary("Somaliland", rect(0.0, 1.0, 1.0, 1.0)),
            boundary("Somalia", rect(0.0, 0.0, 1.0, 1.0)),
        ];
        let merged = merger(vec![MergeRule::Transfer {
            from: "Somaliland".to_string(),
            to: "Somalia".to_string(),
            region: None,
        }])
        .merge(boundaries, &[])
        .unwrap();

        assert_eq!(names(&merged), vec!["Somalia"]);
        assert!((merged.get("Somalia").unwrap().area() - 2.0).abs() < 1e-9);
        assert_eq!(merged.removed(), &["Somaliland".to_string()]);
    }

    #[test]
    fn test_difference_then_prune_removes_fragments() {
        let russia = MultiPolygon::new(vec![
            rect(30.0, 40.0, 10.0, 10.0).0.remove(0),
            rect(50.0, 40.0, 0.25, 0.25).0.remove(0),
        ]);
        let boundaries = vec![boundary("Russia", russia)];
        let overlays = vec![overlay("Crimea", OverlayLayer::Province, rect(30.0, 40.0, 2.0, 10.0))];

        let merged = merger(vec![
            MergeRule::Difference {
                target: "Russia".to_string(),
                subtract: vec![GeometrySource::Overlay("Crimea".to_string())],
            },
            MergeRule::PruneSmallParts { target: "Russia".to_string(), min_area: None },
        ])
        .merge(boundaries, &overlays)
        .unwrap();

        let russia = merged.get("Russia").unwrap();
        assert_eq!(russia.geometry.0.len(), 1);
        assert!((russia.area() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_prune_everything_is_an_error() {
        let boundaries = vec![boundary("Tiny", rect(0.0, 0.0, 0.25, 0.25))];
        let err = merger(vec![MergeRule::PruneSmallParts {
            target: "Tiny".to_string(),
            min_area: None,
        }])
        .merge(boundaries, &[])
        .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.record(), "Tiny");
    }

    #[test]
    fn test_crs_mismatch_without_reprojection_fails_fast() {
        let boundaries = vec![boundary("Somalia", rect(41.0, 0.0, 5.0, 5.0))];
        let mercator = reproject(&rect(42.0, 1.0, 2.0, 2.0), Crs::WGS84, Crs::WEB_MERCATOR, Phase::Merge, "t").unwrap();
        let overlays = vec![OverlayRecord::new("Somaliland", OverlayLayer::Disputed, mercator, Crs::WEB_MERCATOR)];

        let config = MergerConfig {
            reproject_overlays: false,
            seam_buffer: 0.0,
            rules: vec![MergeRule::Union {
                target: "Somalia".to_string(),
                sources: vec![
                    GeometrySource::Boundary("Somalia".to_string()),
                    GeometrySource::Overlay("Somaliland".to_string()),
                ],
                seam_buffer: None,
            }],
            ..MergerConfig::default()
        };

        let err = TerritoryMerger::new(config.clone())
            .unwrap()
            .merge(boundaries.clone(), &overlays)
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.record(), "Somaliland");

        // Same rules with reprojection enabled succeed
        let merged = TerritoryMerger::new(MergerConfig { reproject_overlays: true, ..config })
            .unwrap()
            .merge(boundaries, &overlays)
            .unwrap();
        assert!((merged.get("Somalia").unwrap().area() - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_unsupported_overlay_crs_rejected() {
        let boundaries = vec![boundary("Cyprus", rect(32.0, 34.5, 2.0, 0.5))];
        let overlays = vec![OverlayRecord::new(
            "N. Cyprus",
            OverlayLayer::Disputed,
            rect(500_000.0, 3_900_000.0, 1_000.0, 1_000.0),
            Crs(32636),
        )];

        let err = merger(vec![MergeRule::Union {
            target: "Cyprus".to_string(),
            sources: vec![
                GeometrySource::Boundary("Cyprus".to_string()),
                GeometrySource::Overlay("N. Cyprus".to_string()),
            ],
            seam_buffer: None,
        }])
        .merge(boundaries, &overlays)
        .unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(err.record(), "N. Cyprus");
        assert!(err.to_string().contains("EPSG:32636"));
    }

    #[test]
    fn test_zero_area_source_is_geometry_error() {
        let boundaries = vec![boundary("Russia", rect(30.0, 44.0, 10.0, 10.0))];
        // Collapsed to a line: no area
        let overlays = vec![overlay("Crimea", OverlayLayer::Province, rect(30.0, 44.0, 2.0, 0.0))];

        let err = merger(vec![MergeRule::Difference {
            target: "Russia".to_string(),
            subtract: vec![GeometrySource::Overlay("Crimea".to_string())],
        }])
        .merge(boundaries, &overlays)
        .unwrap_err();

        assert!(err.is_geometry());
        assert_eq!(err.phase(), Phase::Merge);
        assert_eq!(err.record(), "Crimea");
    }

    #[test]
    fn test_unknown_target_and_missing_overlay() {
        let boundaries = vec![boundary("X", rect(0.0, 0.0, 1.0, 1.0))];

        let err = merger(vec![MergeRule::Drop { target: "Nowhere".to_string() }])
            .merge(boundaries.clone(), &[])
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.record(), "Nowhere");

        let err = merger(vec![MergeRule::Difference {
            target: "X".to_string(),
            subtract: vec![GeometrySource::Overlay("Ghost".to_string())],
        }])
        .merge(boundaries, &[])
        .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.record(), "Ghost");
    }

    #[test]
    fn test_duplicate_target_is_data_integrity_error() {
        let boundaries = vec![
            boundary("X", rect(0.0, 0.0, 1.0, 1.0)),
            boundary("X", rect(2.0, 0.0, 1.0, 1.0)),
        ];
        let err = merger(vec![MergeRule::Drop { target: "X".to_string() }])
            .merge(boundaries, &[])
            .unwrap_err();
        assert!(err.is_data_integrity());
    }

    #[test]
    fn test_mixed_boundary_crs_rejected() {
        let boundaries = vec![
            boundary("A", rect(0.0, 0.0, 1.0, 1.0)),
            BoundaryRecord::new("B", rect(0.0, 0.0, 1.0, 1.0), Crs::WEB_MERCATOR),
        ];
        let err = merger(Vec::new()).merge(boundaries, &[]).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.record(), "B");
    }

    #[test]
    fn test_invalid_rule_shapes_rejected() {
        let bad = [
            MergeRule::Union { target: "X".to_string(), sources: vec![], seam_buffer: None },
            MergeRule::Transfer { from: "X".to_string(), to: "X".to_string(), region: None },
            MergeRule::PruneSmallParts { target: "X".to_string(), min_area: Some(-1.0) },
        ];
        for rule in bad {
            let config = MergerConfig { rules: vec![rule], ..MergerConfig::default() };
            assert!(TerritoryMerger::new(config).is_err());
        }
    }

    #[test]
    fn test_completeness_input_minus_removed() {
        let input = ["A", "B", "C", "D"];
        let boundaries: Vec<BoundaryRecord> = input
            .iter()
            .enumerate()
            .map(|(i, n)| boundary(n, rect(i as f64 * 2.0, 0.0, 1.0, 1.0)))
            .collect();

        let rules = vec![
            MergeRule::Drop { target: "B".to_string() },
            MergeRule::Transfer { from: "D".to_string(), to: "A".to_string(), region: None },
        ];
        let expected_removed: Vec<&str> = rules.iter().filter_map(|r| r.removes()).collect();

        let merged = merger(rules.clone()).merge(boundaries, &[]).unwrap();
        let expected: BTreeSet<&str> = input
            .iter()
            .copied()
            .filter(|n| !expected_removed.contains(n))
            .collect();

        assert_eq!(merged.names(), expected);
        assert_eq!(merged.len(), expected.len());
    }

    #[test]
    fn test_rules_deserialize_from_json() {
        let json = r#"[
            {"op": "union", "target": "Cyprus", "sources": [{"boundary": "Cyprus"}, {"overlay": "N. Cyprus"}], "seam_buffer": 0.05},
            {"op": "transfer", "from": "Russia", "to": "Ukraine", "region": [{"overlay_contains": "Crimea"}]},
            {"op": "drop", "target": "Somaliland"},
            {"op": "prune_small_parts", "target": "Russia"}
        ]"#;
        let rules: Vec<MergeRule> = serde_json::from_str(json).unwrap();
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[2].removes(), Some("Somaliland"));
        assert_eq!(rules[1].targets(), vec!["Russia", "Ukraine"]);
        assert!(rules[3].describe().contains("Russia"));
    }
}
