use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Evidence carried by each signal type.  Serialised with a `signal_type`
/// tag so candidate files stay self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal_type", rename_all = "snake_case")]
pub enum SignalKind {
    /// Several failing tool completions followed by a clean one.
    ErrorFixCycle {
        error_count: usize,
        tools_involved: Vec<String>,
        session: String,
    },
    /// Dense repeated references to the same files.
    LongInvestigation {
        hot_files: BTreeMap<String, usize>,
        primary_file: String,
    },
    /// Edits scattered over many directories.
    NonStandardSolution {
        edit_targets: Vec<String>,
        unique_directories: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(flatten)]
    pub kind: SignalKind,
    /// In `[0, 1]`, rounded to two decimals.
    pub signal_strength: f64,
}

impl Signal {
    pub fn new(kind: SignalKind, strength: f64) -> Self {
        Self {
            kind,
            signal_strength: round2(strength.clamp(0.0, 1.0)),
        }
    }

    pub fn signal_type(&self) -> &'static str {
        match self.kind {
            SignalKind::ErrorFixCycle { .. } => "error_fix_cycle",
            SignalKind::LongInvestigation { .. } => "long_investigation",
            SignalKind::NonStandardSolution { .. } => "non_standard_solution",
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
