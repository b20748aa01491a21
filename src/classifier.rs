// 🎨 Classifier - Bin a metric into ordered display categories
//
// Right-closed intervals (lower, upper], looked up by binary search over the
// upper bounds. A metric of exactly 0 always lands in the reserved zero
// category. Absent metrics follow an explicit AbsencePolicy.
// Dependent territories without their own metric inherit their parent's colour
// after primary classification.

use crate::error::{Phase, PipelineError, Result};
use crate::records::{ClassifiedRecord, JoinedRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info};

// ============================================================================
// PRESENTATION VALUE
// ============================================================================

/// Fill colour handed to the renderer (hex string or CSS colour name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub String);

impl Color {
    pub fn new(value: impl Into<String>) -> Self {
        Color(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// CATEGORY DEFINITIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub label: String,
    pub lower_bound: f64,
    /// None = unbounded above
    #[serde(default)]
    pub upper_bound: Option<f64>,
    pub color: Color,
}

impl CategoryDefinition {
    pub fn new(label: &str, lower_bound: f64, upper_bound: Option<f64>, color: &str) -> Self {
        CategoryDefinition {
            label: label.to_string(),
            lower_bound,
            upper_bound,
            color: Color::new(color),
        }
    }
}

/// The reserved category for a metric of exactly zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroCategory {
    #[serde(default = "default_zero_label")]
    pub label: String,
    /// Text shown in the legend (the zero bin reads "0", not "zero")
    #[serde(default = "default_zero_legend")]
    pub legend_label: String,
    pub color: Color,
}

fn default_zero_label() -> String {
    "zero".to_string()
}

fn default_zero_legend() -> String {
    "0".to_string()
}

/// What an absent metric means
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AbsencePolicy {
    /// No row in the metric source is read as zero
    AsZero,

    /// No row gets its own category
    NoData { label: String, color: Color },
}

/// Dependent territory copying its parent's colour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inheritance {
    pub dependent: String,
    pub parent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationConfig {
    pub categories: Vec<CategoryDefinition>,
    pub zero: ZeroCategory,
    pub absence: AbsencePolicy,
    /// Make the lowest bin closed at its floor: [lower, upper]
    #[serde(default = "default_include_lowest")]
    pub include_lowest: bool,
    #[serde(default)]
    pub inheritance: Vec<Inheritance>,
}

fn default_include_lowest() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: Color,
}

// ============================================================================
// CATEGORY SCHEME
// ============================================================================

/// Validated classification setup
#[derive(Debug, Clone)]
pub struct CategoryScheme {
    categories: Vec<CategoryDefinition>,
    zero: ZeroCategory,
    absence: AbsencePolicy,
    include_lowest: bool,
    inheritance: Vec<Inheritance>,
}

impl CategoryScheme {
    pub fn new(config: &ClassificationConfig) -> Result<Self> {
        let err = |record: &str, message: String| {
            PipelineError::configuration(Phase::Classify, record, message)
        };

        if config.categories.is_empty() {
            return Err(err("categories", "at least one numeric category is required".to_string()));
        }

        let mut labels = BTreeSet::new();
        let mut reserve = |label: &str| -> Result<()> {
            if label.trim().is_empty() {
                return Err(err(label, "category label is empty".to_string()));
            }
            if !labels.insert(label.to_string()) {
                return Err(err(label, "category label is used more than once".to_string()));
            }
            Ok(())
        };

        reserve(&config.zero.label)?;
        if config.zero.legend_label.trim().is_empty() {
            return Err(err(&config.zero.label, "zero category has an empty legend label".to_string()));
        }
        if let AbsencePolicy::NoData { label, .. } = &config.absence {
            reserve(label)?;
        }

        let last = config.categories.len() - 1;
        for (i, def) in config.categories.iter().enumerate() {
            reserve(&def.label)?;

            if def.color.is_empty() {
                return Err(err(&def.label, "category has no colour".to_string()));
            }
            if !def.lower_bound.is_finite() {
                return Err(err(&def.label, format!("lower bound {} is not finite", def.lower_bound)));
            }

            match def.upper_bound {
                Some(upper) if !upper.is_finite() || upper <= def.lower_bound => {
                    return Err(err(
                        &def.label,
                        format!("upper bound {} must be finite and above lower bound {}", upper, def.lower_bound),
                    ));
                }
                None if i != last => {
                    return Err(err(&def.label, "only the last category may be unbounded".to_string()));
                }
                _ => {}
            }

            if let Some(next) = config.categories.get(i + 1) {
                // upper_bound is Some here: only the last may be None
                let upper = def.upper_bound.unwrap_or(f64::INFINITY);
                if upper > next.lower_bound {
                    return Err(err(
                        &next.label,
                        format!("overlaps '{}' ({} > {})", def.label, upper, next.lower_bound),
                    ));
                }
                if upper < next.lower_bound {
                    return Err(err(
                        &next.label,
                        format!("gap after '{}' ({} < {})", def.label, upper, next.lower_bound),
                    ));
                }
            }
        }

        if config.zero.color.is_empty() {
            return Err(err(&config.zero.label, "zero category has no colour".to_string()));
        }
        if let AbsencePolicy::NoData { label, color } = &config.absence {
            if color.is_empty() {
                return Err(err(label, "no-data category has no colour".to_string()));
            }
        }

        let dependents: BTreeSet<&str> = config
            .inheritance
            .iter()
            .map(|i| i.dependent.as_str())
            .collect();
        for link in &config.inheritance {
            if link.dependent == link.parent {
                return Err(err(&link.dependent, "territory cannot inherit from itself".to_string()));
            }
            if dependents.contains(link.parent.as_str()) {
                return Err(err(
                    &link.parent,
                    "inheritance parent is itself a dependent; chains are not supported".to_string(),
                ));
            }
        }

        Ok(CategoryScheme {
            categories: config.categories.clone(),
            zero: config.zero.clone(),
            absence: config.absence.clone(),
            include_lowest: config.include_lowest,
            inheritance: config.inheritance.clone(),
        })
    }

    pub fn categories(&self) -> &[CategoryDefinition] {
        &self.categories
    }

    pub fn zero(&self) -> &ZeroCategory {
        &self.zero
    }

    pub fn absence(&self) -> &AbsencePolicy {
        &self.absence
    }

    /// Numeric bin for a positive metric: the unique (lower, upper] containing it
    pub fn bin_for(&self, metric: f64) -> Option<&CategoryDefinition> {
        let idx = self
            .categories
            .partition_point(|c| matches!(c.upper_bound, Some(upper) if upper < metric));
        let candidate = self.categories.get(idx)?;

        let above_floor = candidate.lower_bound < metric
            || (idx == 0 && self.include_lowest && candidate.lower_bound == metric);

        above_floor.then_some(candidate)
    }

    /// Category label and colour for one metric value
    pub fn category_for(&self, metric: Option<f64>) -> Option<(&str, &Color)> {
        match metric {
            None => match &self.absence {
                AbsencePolicy::AsZero => Some((self.zero.label.as_str(), &self.zero.color)),
                AbsencePolicy::NoData { label, color } => Some((label.as_str(), color)),
            },
            Some(m) if m == 0.0 => Some((self.zero.label.as_str(), &self.zero.color)),
            Some(m) => self.bin_for(m).map(|c| (c.label.as_str(), &c.color)),
        }
    }

    /// Legend entries, highest bin first, then zero, then no-data
    pub fn legend(&self) -> Vec<LegendEntry> {
        let mut entries: Vec<LegendEntry> = self
            .categories
            .iter()
            .rev()
            .map(|c| LegendEntry {
                label: c.label.clone(),
                color: c.color.clone(),
            })
            .collect();

        entries.push(LegendEntry {
            label: self.zero.legend_label.clone(),
            color: self.zero.color.clone(),
        });

        if let AbsencePolicy::NoData { label, color } = &self.absence {
            entries.push(LegendEntry {
                label: label.clone(),
                color: color.clone(),
            });
        }

        entries
    }

    /// Every category label in legend order
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.categories.iter().rev().map(|c| c.label.as_str()).collect();
        labels.push(self.zero.label.as_str());
        if let AbsencePolicy::NoData { label, .. } = &self.absence {
            labels.push(label.as_str());
        }
        labels
    }

    // ========================================================================
    // CLASSIFICATION
    // ========================================================================

    pub fn classify(&self, records: Vec<JoinedRecord>) -> Result<Vec<ClassifiedRecord>> {
        let mut classified = Vec::with_capacity(records.len());

        for record in records {
            let (category, color) = self.category_for(record.metric).ok_or_else(|| {
                PipelineError::configuration(
                    Phase::Classify,
                    record.canonical_name.as_str(),
                    format!(
                        "metric {} falls outside every configured category",
                        record.metric.unwrap_or_default()
                    ),
                )
            })?;

            classified.push(ClassifiedRecord {
                category: category.to_string(),
                color: color.clone(),
                canonical_name: record.canonical_name,
                metric: record.metric,
                geometry: record.geometry,
                crs: record.crs,
                inherited_from: None,
            });
        }

        self.apply_inheritance(&mut classified)?;

        for record in &classified {
            if record.category.is_empty() || record.color.is_empty() {
                return Err(PipelineError::configuration(
                    Phase::Classify,
                    record.canonical_name.as_str(),
                    "record left without a category or colour",
                ));
            }
        }

        info!(records = classified.len(), "classification complete");
        Ok(classified)
    }

    /// Copy parent colours onto dependents lacking their own metric.
    /// Runs after primary classification so every parent colour is final.
    fn apply_inheritance(&self, records: &mut [ClassifiedRecord]) -> Result<()> {
        let index: HashMap<String, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.canonical_name.clone(), i))
            .collect();

        for link in &self.inheritance {
            let parent = *index.get(&link.parent).ok_or_else(|| {
                PipelineError::configuration(
                    Phase::Classify,
                    link.parent.as_str(),
                    format!("inheritance parent of '{}' is not in the classified set", link.dependent),
                )
            })?;
            let dependent = *index.get(&link.dependent).ok_or_else(|| {
                PipelineError::configuration(
                    Phase::Classify,
                    link.dependent.as_str(),
                    "dependent territory is not in the classified set",
                )
            })?;

            if records[dependent].metric.is_some() {
                continue;
            }

            let color = records[parent].color.clone();
            debug!(
                dependent = %link.dependent,
                parent = %link.parent,
                color = %color,
                "inherited colour"
            );
            records[dependent].color = color;
            records[dependent].inherited_from = Some(link.parent.clone());
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
