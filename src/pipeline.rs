// 🗺️ Reconciliation Pipeline - Merge → Join → Classify
//
// One strictly sequential pass: each phase consumes the previous phase's output
// and fails fast on the first error. Every phase is built from configuration up
// front, so a broken config never touches data.

use crate::classifier::{CategoryScheme, LegendEntry};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::joiner::Joiner;
use crate::merger::TerritoryMerger;
use crate::records::{BoundaryRecord, ClassifiedRecord, OverlayRecord, RawMetricRecord};
use crate::report::RunReport;
use crate::resolver::IdentifierResolver;
use tracing::info;

/// Everything one run reads
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub metrics: Vec<RawMetricRecord>,
    pub boundaries: Vec<BoundaryRecord>,
    pub overlays: Vec<OverlayRecord>,
}

/// Ready for a renderer: one record per territory, legend in display order
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub records: Vec<ClassifiedRecord>,
    pub legend: Vec<LegendEntry>,
    pub report: RunReport,
}

pub struct Pipeline {
    config: PipelineConfig,
    resolver: IdentifierResolver,
    merger: TerritoryMerger,
    joiner: Joiner,
    scheme: CategoryScheme,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let resolver = IdentifierResolver::new(&config.aliases)?;
        let merger = TerritoryMerger::new(config.merge.clone())?;
        let joiner = Joiner::new(&config.join);
        let scheme = CategoryScheme::new(&config.classification)?;

        Ok(Pipeline {
            config,
            resolver,
            merger,
            joiner,
            scheme,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn scheme(&self) -> &CategoryScheme {
        &self.scheme
    }

    pub fn run(&self, inputs: PipelineInputs) -> Result<PipelineOutput> {
        let PipelineInputs {
            metrics,
            boundaries,
            overlays,
        } = inputs;

        info!(
            metrics = metrics.len(),
            boundaries = boundaries.len(),
            overlays = overlays.len(),
            "starting reconciliation run"
        );

        let merged = self.merger.merge(boundaries, &overlays)?;
        let removed = merged.removed().to_vec();

        let joined = self.joiner.join(metrics, merged, &self.resolver)?;
        let records = self.scheme.classify(joined.records)?;

        let report = RunReport::build(
            &records,
            &self.scheme,
            joined.report,
            removed,
            self.config.fingerprint(),
            self.config.report_top_n,
        );
        info!("{}", report.summary());

        Ok(PipelineOutput {
            records,
            legend: self.scheme.legend(),
            report,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::error::Phase;
    use crate::geometry::tests::rect;
    use crate::records::OverlayLayer;
    use geo::MultiPolygon;

    fn boundary(name: &str, geom: MultiPolygon<f64>) -> BoundaryRecord {
        BoundaryRecord::new(name, geom, Crs::WGS84)
    }

    fn overlay(name: &str, layer: OverlayLayer, geom: MultiPolygon<f64>) -> OverlayRecord {
        OverlayRecord::new(name, layer, geom, Crs::WGS84)
    }

    fn metric(name: &str, value: f64) -> RawMetricRecord {
        RawMetricRecord::new(name, value).unwrap()
    }

    fn world() -> PipelineInputs {
        PipelineInputs {
            metrics: vec![
                metric("Russia", 252_989.0),
                metric("Türkiye", 12_391.0),
                metric("Denmark", 50.0),
                metric("Cyprus", 7.0),
                metric("Somalia", 0.0),
                metric("Atlantis", 3.0),
            ],
            boundaries: vec![
                boundary("Cyprus", rect(32.0, 34.5, 2.0, 0.5)),
                boundary("Somalia", rect(40.0, 0.0, 5.0, 5.0)),
                boundary("Somaliland", rect(40.0, 5.0, 5.0, 2.0)),
                boundary("Russia", rect(30.0, 44.0, 10.0, 10.0)),
                boundary("Ukraine", rect(20.0, 44.0, 10.0, 10.0)),
                boundary("Turkey", rect(26.0, 36.0, 4.0, 4.0)),
                boundary("Denmark", rect(8.0, 55.0, 2.0, 2.0)),
                boundary("Greenland", rect(-50.0, 60.0, 10.0, 10.0)),
                boundary("Antarctica", rect(-180.0, -90.0, 360.0, 10.0)),
            ],
            overlays: vec![
                overlay("N. Cyprus", OverlayLayer::Disputed, rect(32.0, 35.0, 2.0, 0.5)),
                overlay("Somaliland", OverlayLayer::Disputed, rect(40.0, 5.0, 5.0, 2.0)),
                overlay("Crimea", OverlayLayer::Province, rect(30.0, 44.0, 2.0, 2.0)),
            ],
        }
    }

    fn find<'a>(output: &'a PipelineOutput, name: &str) -> &'a ClassifiedRecord {
        output
            .records
            .iter()
            .find(|r| r.canonical_name == name)
            .unwrap_or_else(|| panic!("{} missing from output", name))
    }

    #[test]
    fn test_removal_requests_preset_end_to_end() {
        let pipeline = Pipeline::new(PipelineConfig::removal_requests()).unwrap();
        let output = pipeline.run(world()).unwrap();

        let mut names: Vec<&str> = output.records.iter().map(|r| r.canonical_name.as_str()).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["Cyprus", "Denmark", "Greenland", "Russia", "Somalia", "Turkey", "Ukraine"]
        );

        // Merge
        assert!((geo::Area::unsigned_area(&find(&output, "Somalia").geometry) - 35.0).abs() < 1e-6);
        assert_eq!(output.report.removed_by_merge, vec!["Somaliland".to_string()]);

        // Join + classify
        assert_eq!(find(&output, "Russia").category, "100001+");
        assert_eq!(find(&output, "Turkey").category, "10001-100000");
        assert_eq!(find(&output, "Cyprus").category, "1-20");
        assert_eq!(find(&output, "Somalia").category, "zero");
        assert_eq!(find(&output, "Ukraine").category, "zero");
        assert_eq!(find(&output, "Ukraine").metric, None);

        let denmark = find(&output, "Denmark");
        let greenland = find(&output, "Greenland");
        assert_eq!(denmark.category, "21-100");
        assert_eq!(greenland.color, denmark.color);
        assert_eq!(greenland.inherited_from.as_deref(), Some("Denmark"));

        // Report
        assert_eq!(output.report.excluded, vec!["Antarctica".to_string()]);
        assert_eq!(output.report.unmatched_metrics.len(), 1);
        assert_eq!(output.report.unmatched_metrics[0].raw_name, "Atlantis");
        assert_eq!(output.report.inherited, vec!["Greenland".to_string()]);
        assert_eq!(output.report.top_entities[0].name, "Russia");
        assert_eq!(output.report.config_fingerprint, pipeline.config().fingerprint());

        // Legend: bins high → low, then "0"
        assert_eq!(output.legend.len(), 7);
        assert_eq!(output.legend[0].label, "100001+");
        assert_eq!(output.legend[6].label, "0");

        println!("✅ End-to-end preset run passed");
    }

    #[test]
    fn test_crimea_moves_from_russia_to_ukraine() {
        let output = Pipeline::new(PipelineConfig::removal_requests())
            .unwrap()
            .run(world())
            .unwrap();

        let russia = find(&output, "Russia");
        let ukraine = find(&output, "Ukraine");
        assert!((geo::Area::unsigned_area(&russia.geometry) - 96.0).abs() < 1e-6);
        assert!((geo::Area::unsigned_area(&ukraine.geometry) - 104.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_rule_target_fails_in_merge_phase() {
        let mut inputs = world();
        inputs.boundaries.retain(|b| b.canonical_name != "Somaliland");

        let err = Pipeline::new(PipelineConfig::removal_requests())
            .unwrap()
            .run(inputs)
            .unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(err.phase(), Phase::Merge);
        assert_eq!(err.record(), "Somaliland");
    }

    #[test]
    fn test_colliding_aliases_fail_in_join_phase() {
        let mut inputs = world();
        inputs.metrics.push(metric("Turkey", 10.0));

        let err = Pipeline::new(PipelineConfig::removal_requests())
            .unwrap()
            .run(inputs)
            .unwrap_err();

        assert!(err.is_data_integrity());
        assert_eq!(err.phase(), Phase::Join);
        assert_eq!(err.record(), "Turkey");
    }

    #[test]
    fn test_bad_config_rejected_before_any_data() {
        let mut config = PipelineConfig::removal_requests();
        config.classification.categories.clear();
        assert!(Pipeline::new(config).is_err());
    }
}
