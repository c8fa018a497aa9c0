//! Detected cycles and break strategies

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::StateFingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
    Repetition,
    Oscillation,
    Stagnation,
}

impl std::fmt::Display for CycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repetition => write!(f, "repetition"),
            Self::Oscillation => write!(f, "oscillation"),
            Self::Stagnation => write!(f, "stagnation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Suggested corrective action for a detected cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CycleBreakStrategy {
    /// Swap the repeating tool for a related one
    AlternativeTool { from: String, to: String },
    /// Raise sampling temperature to escape a deterministic rut
    IncreaseTemperature { delta: f32 },
    /// Drop accumulated context, keeping knowledge of these files
    ResetContext { preserve_files: Vec<PathBuf> },
    /// Ask the user or model to clarify intent
    AskClarification { question: String },
    /// Hand the decision to the user
    Escalate { reason: String },
}

/// One detected non-productive pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedCycle {
    pub kind: CycleKind,
    pub iteration_numbers: Vec<u32>,
    pub fingerprint: StateFingerprint,
    pub severity: Severity,
    pub suggested_strategy: CycleBreakStrategy,
}
