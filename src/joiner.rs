// 🔗 Joiner - Attach metrics to merged boundaries by canonical name
//
// Boundary-preserving outer join: every boundary appears once, with or without
// a metric. Metric rows that match no boundary are dropped but reported.

use crate::error::{Phase, PipelineError, Result};
use crate::merger::MergedBoundaries;
use crate::records::{JoinedRecord, RawMetricRecord};
use crate::resolver::IdentifierResolver;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

// ============================================================================
// CONFIG & REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinConfig {
    /// Boundary names outside the rendering scope (e.g. "Antarctica")
    #[serde(default)]
    pub excluded: Vec<String>,
}

/// A metric row whose resolved name matched no boundary record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedMetric {
    pub raw_name: String,
    pub canonical_name: String,
    pub metric: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinReport {
    pub unmatched_metrics: Vec<UnmatchedMetric>,
    pub boundaries_without_metric: Vec<String>,
    pub excluded: Vec<String>,
}

impl JoinReport {
    pub fn unmatched_count(&self) -> usize {
        self.unmatched_metrics.len()
    }
}

#[derive(Debug, Clone)]
pub struct JoinOutput {
    pub records: Vec<JoinedRecord>,
    pub report: JoinReport,
}

// ============================================================================
// JOINER
// ============================================================================

pub struct Joiner {
    excluded: BTreeSet<String>,
}

impl Joiner {
    pub fn new(config: &JoinConfig) -> Self {
        Joiner {
            excluded: config.excluded.iter().cloned().collect(),
        }
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(name)
    }

    pub fn join(
        &self,
        metrics: Vec<RawMetricRecord>,
        boundaries: MergedBoundaries,
        resolver: &IdentifierResolver,
    ) -> Result<JoinOutput> {
        let boundaries = boundaries.into_records();

        // Uniqueness on the boundary side
        let mut seen = BTreeSet::new();
        for record in &boundaries {
            if !seen.insert(record.canonical_name.as_str()) {
                return Err(PipelineError::data_integrity(
                    Phase::Join,
                    record.canonical_name.as_str(),
                    "boundary set contains this canonical name more than once",
                ));
            }
        }

        // Uniqueness on the metric side, keyed by resolved name
        let mut by_name: BTreeMap<String, RawMetricRecord> = BTreeMap::new();
        for row in metrics {
            let canonical = resolver.resolve(row.raw_name()).to_string();
            if let Some(previous) = by_name.get(&canonical) {
                return Err(PipelineError::data_integrity(
                    Phase::Join,
                    canonical.as_str(),
                    format!(
                        "metric rows '{}' and '{}' resolve to the same canonical name",
                        previous.raw_name(),
                        row.raw_name()
                    ),
                ));
            }
            by_name.insert(canonical, row);
        }

        let mut report = JoinReport::default();
        let mut records = Vec::with_capacity(boundaries.len());

        for boundary in boundaries {
            let matched = by_name.remove(&boundary.canonical_name);

            if self.is_excluded(&boundary.canonical_name) {
                report.excluded.push(boundary.canonical_name);
                continue;
            }

            if matched.is_none() {
                report.boundaries_without_metric.push(boundary.canonical_name.clone());
            }

            records.push(JoinedRecord {
                canonical_name: boundary.canonical_name,
                metric: matched.map(|m| m.metric()),
                geometry: boundary.geometry,
                crs: boundary.crs,
            });
        }

        for (canonical_name, row) in by_name {
            warn!(
                raw_name = %row.raw_name(),
                canonical_name = %canonical_name,
                "metric row matched no boundary record; dropped"
            );
            report.unmatched_metrics.push(UnmatchedMetric {
                raw_name: row.raw_name().to_string(),
                canonical_name,
                metric: row.metric(),
            });
        }

        info!(
            joined = records.len(),
            without_metric = report.boundaries_without_metric.len(),
            unmatched_metrics = report.unmatched_metrics.len(),
            excluded = report.excluded.len(),
            "join complete"
        );

        Ok(JoinOutput { records, report })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::geometry::tests::rect;
    use crate::merger::{MergerConfig, TerritoryMerger};
    use crate::records::BoundaryRecord;

    fn merged(names: &[&str]) -> MergedBoundaries {
        let records = names
            .iter()
            .enumerate()
            .map(|(i, n)| BoundaryRecord::new(*n, rect(i as f64 * 2.0, 0.0, 1.0, 1.0), Crs::WGS84))
            .collect();
        TerritoryMerger::new(MergerConfig::default())
            .unwrap()
            .merge(records, &[])
            .unwrap()
    }

    fn resolver() -> IdentifierResolver {
        let mut aliases = BTreeMap::new();
        aliases.insert("Türkiye".to_string(), "Turkey".to_string());
        IdentifierResolver::new(&aliases).unwrap()
    }

    fn metric(name: &str, value: f64) -> RawMetricRecord {
        RawMetricRecord::new(name, value).unwrap()
    }

    #[test]
    fn test_outer_join_keeps_every_boundary() {
        let joiner = Joiner::new(&JoinConfig::default());
        let out = joiner
            .join(
                vec![metric("Alpha", 0.0), metric("Beta", 55.0)],
                merged(&["Alpha", "Beta", "Gamma"]),
                &resolver(),
            )
            .unwrap();

        assert_eq!(out.records.len(), 3);
        let gamma = out.records.iter().find(|r| r.canonical_name == "Gamma").unwrap();
        assert_eq!(gamma.metric, None);
        let beta = out.records.iter().find(|r| r.canonical_name == "Beta").unwrap();
        assert_eq!(beta.metric, Some(55.0));
        assert_eq!(out.report.boundaries_without_metric, vec!["Gamma".to_string()]);
        assert_eq!(out.report.unmatched_count(), 0);
    }

    #[test]
    fn test_alias_resolution_and_unmatched_report() {
        let joiner = Joiner::new(&JoinConfig::default());
        let out = joiner
            .join(
                vec![metric("Türkiye", 12391.0), metric("Atlantis", 7.0)],
                merged(&["Turkey"]),
                &resolver(),
            )
            .unwrap();

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].metric, Some(12391.0));
        assert_eq!(out.report.unmatched_count(), 1);
        assert_eq!(out.report.unmatched_metrics[0].raw_name, "Atlantis");
        assert_eq!(out.report.unmatched_metrics[0].metric, 7.0);
    }

    #[test]
    fn test_excluded_names_are_filtered_even_with_metric() {
        let joiner = Joiner::new(&JoinConfig {
            excluded: vec!["Antarctica".to_string()],
        });
        let out = joiner
            .join(
                vec![metric("Antarctica", 3.0)],
                merged(&["Antarctica", "Chile"]),
                &resolver(),
            )
            .unwrap();

        let names: Vec<&str> = out.records.iter().map(|r| r.canonical_name.as_str()).collect();
        assert_eq!(names, vec!["Chile"]);
        assert_eq!(out.report.excluded, vec!["Antarctica".to_string()]);
        // Matched a boundary, so it is not reported as unmatched
        assert_eq!(out.report.unmatched_count(), 0);
    }

    #[test]
    fn test_duplicate_boundary_names_fail() {
        let joiner = Joiner::new(&JoinConfig::default());
        let err = joiner
            .join(vec![], merged(&["Cyprus", "Cyprus"]), &resolver())
            .unwrap_err();
        assert!(err.is_data_integrity());
        assert_eq!(err.phase(), Phase::Join);
        assert_eq!(err.record(), "Cyprus");
    }

    #[test]
    fn test_metric_rows_colliding_after_resolution_fail() {
        let joiner = Joiner::new(&JoinConfig::default());
        let err = joiner
            .join(
                vec![metric("Türkiye", 1.0), metric("Turkey", 2.0)],
                merged(&["Turkey"]),
                &resolver(),
            )
            .unwrap_err();
        assert!(err.is_data_integrity());
        assert_eq!(err.record(), "Turkey");
    }

    #[test]
    fn test_join_totality() {
        let names = ["A", "B", "C", "D", "E"];
        let joiner = Joiner::new(&JoinConfig {
            excluded: vec!["C".to_string()],
        });
        let out = joiner
            .join(vec![metric("B", 4.0), metric("Q", 1.0)], merged(&names), &resolver())
            .unwrap();

        let got: BTreeSet<&str> = out.records.iter().map(|r| r.canonical_name.as_str()).collect();
        let want: BTreeSet<&str> = names.iter().copied().filter(|n| *n != "C").collect();
        assert_eq!(got, want);
        assert_eq!(out.records.len(), want.len());
    }
}
