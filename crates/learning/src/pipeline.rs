//! Batch passes driven by [`LearningConfig`]: candidate detection over the
//! observation log, and navigation learning into the instinct store.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use homunculus_config::LearningConfig;
use tracing::info;

use crate::candidates::CandidateSink;
use crate::detectors::CANDIDATE_DETECTORS;
use crate::manager::{InstinctManager, MergeResult, ProjectContext};
use crate::navigation::NavigationDetector;
use crate::observation::{Observation, ObservationLog};
use crate::repository::InstinctRepository;
use crate::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// `enabled = false`; nothing was read.
    Disabled,
    NoObservations,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenCandidate {
    pub signal: Signal,
    pub path: PathBuf,
    /// At or above `auto_remind_threshold`.
    pub strong: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionReport {
    pub outcome: PassOutcome,
    pub observations: usize,
    pub candidates: Vec<WrittenCandidate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LearningReport {
    pub outcome: PassOutcome,
    pub observations: usize,
    pub merged: Vec<MergeResult>,
}

fn load_observations(config: &LearningConfig) -> Result<Vec<Observation>> {
    ObservationLog::new(config.observations_path()).load_recent(config.observation.max_events)
}

/// Run the three candidate detectors over the recent log and persist every
/// signal at or above `min_signal_strength`.
pub fn run_detection(config: &LearningConfig, now: DateTime<Utc>) -> Result<DetectionReport> {
    if !config.enabled {
        info!("learning disabled; detection skipped");
        return Ok(DetectionReport {
            outcome: PassOutcome::Disabled,
            observations: 0,
            candidates: Vec::new(),
        });
    }

    let observations = load_observations(config)?;
    if observations.is_empty() {
        info!("no observations; detection skipped");
        return Ok(DetectionReport {
            outcome: PassOutcome::NoObservations,
            observations: 0,
            candidates: Vec::new(),
        });
    }

    let sink = CandidateSink::new(config.candidates_dir());
    let mut candidates = Vec::new();
    for detector in CANDIDATE_DETECTORS {
        let Some(signal) = detector(&observations, &config.lexicon) else {
            continue;
        };
        if signal.signal_strength < config.min_signal_strength {
            continue;
        }
        let path = sink.write(&signal, now)?;
        let strong = signal.signal_strength >= config.auto_remind_threshold;
        candidates.push(WrittenCandidate { signal, path, strong });
    }

    info!(
        observations = observations.len(),
        candidates = candidates.len(),
        "detection pass complete"
    );
    Ok(DetectionReport {
        outcome: PassOutcome::Completed,
        observations: observations.len(),
        candidates,
    })
}

/// Detect Grep → Read → Edit confirmations in the recent log and merge each
/// into the store.
pub fn run_learning<R: InstinctRepository>(
    config: &LearningConfig,
    manager: &InstinctManager<R>,
    context: &ProjectContext,
) -> Result<LearningReport> {
    if !config.enabled {
        info!("learning disabled; navigation learning skipped");
        return Ok(LearningReport {
            outcome: PassOutcome::Disabled,
            observations: 0,
            merged: Vec::new(),
        });
    }

    let observations = load_observations(config)?;
    if observations.is_empty() {
        return Ok(LearningReport {
            outcome: PassOutcome::NoObservations,
            observations: 0,
            merged: Vec::new(),
        });
    }

    let detector = NavigationDetector::new(
        &config.lexicon,
        config.code_navigation.time_window_minutes,
    );
    let patterns = detector.detect(&observations);
    let merged = manager.merge_patterns(&patterns, context)?;

    info!(
        observations = observations.len(),
        patterns = patterns.len(),
        "navigation learning pass complete"
    );
    Ok(LearningReport {
        outcome: PassOutcome::Completed,
        observations: observations.len(),
        merged,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::store::DirectoryInstinctStore;

    fn config(dir: &TempDir) -> LearningConfig {
        let mut config = LearningConfig::default();
        config.enabled = true;
        config.observation.store_path = dir.path().join("obs.jsonl").display().to_string();
        config.candidates_path = dir.path().join("candidates").display().to_string();
        config.instincts.path = dir.path().join("instincts").display().to_string();
        config
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    fn write_log(config: &LearningConfig, lines: &[&str]) {
        fs::write(config.observations_path(), lines.join("\n")).unwrap();
    }

    #[test]
    fn disabled_config_skips_everything() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.enabled = false;
        write_log(&config, &[r#"{"event":"tool_complete","output":"Error"}"#]);

        let report = run_detection(&config, now()).unwrap();
        assert_eq!(report.outcome, PassOutcome::Disabled);
        assert!(!config.candidates_dir().exists());
    }

    #[test]
    fn missing_log_reports_no_observations() {
        let dir = TempDir::new().unwrap();
        let report = run_detection(&config(&dir), now()).unwrap();
        assert_eq!(report.outcome, PassOutcome::NoObservations);
        assert!(report.candidates.is_empty());
    }

    #[test]
    fn error_fix_cycle_becomes_a_strong_candidate() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.auto_remind_threshold = 0.8;
        write_log(
            &config,
            &[
                r#"{"event":"tool_complete","session":"s1","tool":"Bash","output":"Error: boom"}"#,
                r#"{"event":"tool_complete","session":"s1","tool":"Bash","output":"FAILED"}"#,
                r#"{"event":"tool_complete","session":"s1","tool":"Bash","output":"TypeError"}"#,
                r#"{"event":"tool_complete","session":"s1","tool":"Bash","output":"ok"}"#,
            ],
        );

        let report = run_detection(&config, now()).unwrap();
        assert_eq!(report.outcome, PassOutcome::Completed);
        assert_eq!(report.observations, 4);
        assert_eq!(report.candidates.len(), 1);
        let candidate = &report.candidates[0];
        assert_eq!(candidate.signal.signal_type(), "error_fix_cycle");
        assert!(candidate.strong);
        assert!(candidate.path.exists());
    }

    #[test]
    fn weak_signals_are_not_written() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.min_signal_strength = 0.9;
        write_log(
            &config,
            &[
                r#"{"event":"tool_complete","session":"s1","tool":"Bash","output":"Error"}"#,
                r#"{"event":"tool_complete","session":"s1","tool":"Bash","output":"Error"}"#,
                r#"{"event":"tool_complete","session":"s1","tool":"Bash","output":"Error"}"#,
                r#"{"event":"tool_complete","session":"s1","tool":"Bash","output":"ok"}"#,
            ],
        );

        let report = run_detection(&config, now()).unwrap();
        assert!(report.candidates.is_empty());
        assert!(!config.candidates_dir().exists());
    }

    #[test]
    fn learning_merges_detected_patterns() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        write_log(
            &config,
            &[
                r#"{"timestamp":"2026-04-01T08:00:00Z","event":"user_query","session":"s1","query":"find the session store"}"#,
                r#"{"timestamp":"2026-04-01T08:01:00Z","event":"tool_start","session":"s1","tool":"Grep","input":"session"}"#,
                r#"{"timestamp":"2026-04-01T08:02:00Z","event":"tool_start","session":"s1","tool":"Read","input":{"file_path":"src/session.rs"}}"#,
                r#"{"timestamp":"2026-04-01T08:03:00Z","event":"tool_start","session":"s1","tool":"Edit","input":{"old_string":"fn open(path: &Path)"}}"#,
            ],
        );
        let manager = InstinctManager::new(
            DirectoryInstinctStore::new(config.instincts_path()),
            config.code_navigation.clone(),
        );

        let report = run_learning(&config, &manager, &ProjectContext::default()).unwrap();
        assert_eq!(report.outcome, PassOutcome::Completed);
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.merged[0].id, "code-nav-find-session");
        assert!(config.instincts_path().join("code-nav-find-session.yaml").exists());
    }
}
