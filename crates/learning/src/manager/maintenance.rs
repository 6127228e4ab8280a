use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::{InstinctManager, InstinctStats, ProjectStats};
use crate::record::{DOMAIN_CODE_NAVIGATION, InstinctRecord};
use crate::repository::{InstinctFilter, InstinctRepository};
use crate::signal::round2;

const UNKNOWN_PROJECT: &str = "unknown";

impl<R: InstinctRepository> InstinctManager<R> {
    // ── Cleanup ────────────────────────────────────────────────────────────

    /// Permanently delete code-navigation records with confidence below
    /// `threshold`, stale or not.  Returns the number removed.
    pub fn cleanup(&self, threshold: f64) -> Result<usize> {
        let mut removed = 0;
        for record in self.repo.list(&InstinctFilter::domain(DOMAIN_CODE_NAVIGATION))? {
            if record.confidence >= threshold {
                continue;
            }
            match self.repo.delete(&record.id) {
                Ok(true) => {
                    removed += 1;
                    debug!(id = %record.id, confidence = record.confidence, "instinct removed");
                }
                Ok(false) => {}
                Err(err) => warn!(id = %record.id, error = %err, "failed to delete instinct"),
            }
        }
        info!(removed, threshold, "cleanup pass complete");
        Ok(removed)
    }

    /// [`cleanup`](Self::cleanup) with the configured default threshold.
    pub fn cleanup_default(&self) -> Result<usize> {
        self.cleanup(self.settings.cleanup_threshold)
    }

    // ── Reporting ──────────────────────────────────────────────────────────

    pub fn statistics(&self) -> Result<InstinctStats> {
        let records = self.repo.list(&InstinctFilter::domain(DOMAIN_CODE_NAVIGATION))?;

        let mut grouped: BTreeMap<String, (usize, f64)> = BTreeMap::new();
        for record in &records {
            let project = record.project.as_deref().unwrap_or(UNKNOWN_PROJECT);
            let entry = grouped.entry(project.to_string()).or_default();
            entry.0 += 1;
            entry.1 += record.confidence;
        }

        let by_project: BTreeMap<String, ProjectStats> = grouped
            .into_iter()
            .map(|(project, (count, sum))| {
                let stats = ProjectStats {
                    count,
                    avg_confidence: round2(sum / count as f64),
                };
                (project, stats)
            })
            .collect();

        Ok(InstinctStats {
            total: records.len(),
            projects: by_project.len(),
            by_project,
        })
    }

    /// Every record tagged with `project`, regardless of domain.
    pub fn project_instincts(&self, project: &str) -> Result<Vec<InstinctRecord>> {
        self.repo.list(&InstinctFilter::default().with_project(project))
    }
}
