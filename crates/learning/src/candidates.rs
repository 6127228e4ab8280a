use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::signal::Signal;

pub const CANDIDATE_SUGGESTION: &str =
    "Consider running /claudeception to extract this into a complete skill";

/// A signal as persisted for later promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub signal: Signal,
    pub timestamp: String,
    pub suggestion: String,
}

/// Writes one `candidate-YYYYMMDD-HHMMSS.json` per signal.
#[derive(Debug, Clone)]
pub struct CandidateSink {
    dir: PathBuf,
}

impl CandidateSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `signal` stamped with `now`.  A second candidate written in the
    /// same second replaces the first.
    pub fn write(&self, signal: &Signal, now: DateTime<Utc>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating candidate directory {}", self.dir.display()))?;

        let candidate = Candidate {
            signal: signal.clone(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, true),
            suggestion: CANDIDATE_SUGGESTION.to_string(),
        };
        let path = self
            .dir
            .join(format!("candidate-{}.json", now.format("%Y%m%d-%H%M%S")));
        let json = serde_json::to_string_pretty(&candidate)?;
        fs::write(&path, json)
            .with_context(|| format!("writing candidate {}", path.display()))?;

        info!(
            signal_type = signal.signal_type(),
            strength = signal.signal_strength,
            path = %path.display(),
            "skill candidate written"
        );
        Ok(path)
    }
}
