// 🚨 Pipeline Errors - Fail closed, name the phase and the record
//
// Three kinds of failure:
//   Configuration  - the static setup is wrong (bins, CRS, unknown targets)
//   DataIntegrity  - the input data breaks a uniqueness or range requirement
//   Geometry       - a boolean/buffer operation produced something unusable

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// PHASE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Load,
    Resolve,
    Merge,
    Join,
    Classify,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Load => "load",
            Phase::Resolve => "resolve",
            Phase::Merge => "merge",
            Phase::Join => "join",
            Phase::Classify => "classify",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// PIPELINE ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("[{phase}] configuration error at '{record}': {message}")]
    Configuration {
        phase: Phase,
        record: String,
        message: String,
    },

    #[error("[{phase}] data integrity error at '{record}': {message}")]
    DataIntegrity {
        phase: Phase,
        record: String,
        message: String,
    },

    #[error("[{phase}] geometry error at '{record}': {message}")]
    Geometry {
        phase: Phase,
        record: String,
        message: String,
    },
}

impl PipelineError {
    pub fn configuration(phase: Phase, record: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Configuration {
            phase,
            record: record.into(),
            message: message.into(),
        }
    }

    pub fn data_integrity(phase: Phase, record: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::DataIntegrity {
            phase,
            record: record.into(),
            message: message.into(),
        }
    }

    pub fn geometry(phase: Phase, record: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Geometry {
            phase,
            record: record.into(),
            message: message.into(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            PipelineError::Configuration { phase, .. }
            | PipelineError::DataIntegrity { phase, .. }
            | PipelineError::Geometry { phase, .. } => *phase,
        }
    }

    /// Name of the record that triggered the failure
    pub fn record(&self) -> &str {
        match self {
            PipelineError::Configuration { record, .. }
            | PipelineError::DataIntegrity { record, .. }
            | PipelineError::Geometry { record, .. } => record,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration { .. })
    }

    pub fn is_data_integrity(&self) -> bool {
        matches!(self, PipelineError::DataIntegrity { .. })
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self, PipelineError::Geometry { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
