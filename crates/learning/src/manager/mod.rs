use std::collections::BTreeMap;

use homunculus_config::CodeNavigationConfig;
use serde::Serialize;

use crate::repository::InstinctRepository;

mod decay;
mod maintenance;
mod merge;

pub use merge::{derive_instinct_id, slugify};

/// Where newly created records say they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectContext {
    pub project: Option<String>,
    /// Short commit hash, or `unknown` outside a repository.
    pub codebase_version: String,
}

impl Default for ProjectContext {
    fn default() -> Self {
        Self {
            project: None,
            codebase_version: "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub id: String,
    pub outcome: MergeOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecayReport {
    /// Records whose confidence was lowered.
    pub decayed: usize,
    /// Records newly marked stale.
    pub marked_stale: usize,
}

impl DecayReport {
    pub fn updated(&self) -> usize {
        self.decayed + self.marked_stale
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectStats {
    pub count: usize,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstinctStats {
    pub total: usize,
    pub projects: usize,
    pub by_project: BTreeMap<String, ProjectStats>,
}

/// Lifecycle operations over code-navigation instincts: merge confirmations,
/// decay unused mappings, prune weak ones, and summarise.
pub struct InstinctManager<R> {
    repo: R,
    settings: CodeNavigationConfig,
}

impl<R: InstinctRepository> InstinctManager<R> {
    pub fn new(repo: R, settings: CodeNavigationConfig) -> Self {
        Self { repo, settings }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn settings(&self) -> &CodeNavigationConfig {
        &self.settings
    }
}
