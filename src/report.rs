// 📊 Run Report - What happened during one pipeline invocation
//
// Category counts, top entities by metric, and the diagnostics the join would
// otherwise hide (metric rows with no boundary, boundaries with no metric).

use crate::classifier::CategoryScheme;
use crate::joiner::{JoinReport, UnmatchedMetric};
use crate::records::ClassifiedRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub name: String,
    pub metric: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub config_fingerprint: String,
    pub record_count: usize,

    /// Per-category counts in legend order (empty categories included)
    pub category_counts: Vec<CategoryCount>,

    /// Highest metrics, descending
    pub top_entities: Vec<RankedEntity>,

    /// Sum of every metric that reached the output
    pub total_metric: f64,

    pub unmatched_metrics: Vec<UnmatchedMetric>,
    pub boundaries_without_metric: Vec<String>,
    pub excluded: Vec<String>,
    pub removed_by_merge: Vec<String>,
    pub inherited: Vec<String>,
}

impl RunReport {
    pub fn build(
        records: &[ClassifiedRecord],
        scheme: &CategoryScheme,
        join: JoinReport,
        removed_by_merge: Vec<String>,
        config_fingerprint: String,
        top_n: usize,
    ) -> Self {
        let category_counts = scheme
            .labels()
            .into_iter()
            .map(|label| CategoryCount {
                label: label.to_string(),
                count: records.iter().filter(|r| r.category == label).count(),
            })
            .collect();

        let mut ranked: Vec<RankedEntity> = records
            .iter()
            .filter_map(|r| {
                r.metric.map(|metric| RankedEntity {
                    name: r.canonical_name.clone(),
                    metric,
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.metric
                .partial_cmp(&a.metric)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });

        let total_metric = ranked.iter().map(|r| r.metric).sum();
        ranked.truncate(top_n);

        RunReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            config_fingerprint,
            record_count: records.len(),
            category_counts,
            top_entities: ranked,
            total_metric,
            unmatched_metrics: join.unmatched_metrics,
            boundaries_without_metric: join.boundaries_without_metric,
            excluded: join.excluded,
            removed_by_merge,
            inherited: records
                .iter()
                .filter(|r| r.inherited_from.is_some())
                .map(|r| r.canonical_name.clone())
                .collect(),
        }
    }

    pub fn count_for(&self, label: &str) -> Option<usize> {
        self.category_counts
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.count)
    }

    pub fn summary(&self) -> String {
        format!(
            "Run {}: {} territories classified, total metric {}, {} unmatched metric rows, {} without metric, {} excluded, {} removed by merge",
            &self.run_id[..8.min(self.run_id.len())],
            self.record_count,
            self.total_metric,
            self.unmatched_metrics.len(),
            self.boundaries_without_metric.len(),
            self.excluded.len(),
            self.removed_by_merge.len()
        )
    }

    /// Fixed-width ranking table, the "top countries" annotation of a map
    pub fn top_table(&self) -> String {
        let width = self
            .top_entities
            .iter()
            .map(|e| e.name.chars().count())
            .max()
            .unwrap_or(0)
            .max("Total".len());

        let mut lines: Vec<String> = self
            .top_entities
            .iter()
            .map(|e| format!("{:<width$} | {:>10}", e.name, group_thousands(e.metric), width = width))
            .collect();
        lines.push("-".repeat(width + 13));
        lines.push(format!(
            "{:<width$} | {:>10}",
            "Total",
            group_thousands(self.total_metric),
            width = width
        ));
        lines.join("\n")
    }
}

/// 396947 → "396,947" (fractions are rounded)
fn group_thousands(value: f64) -> String {
    let digits = format!("{:.0}", value.round());
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits.as_str()),
    };

    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    format!("{}{}", sign, out)
}
