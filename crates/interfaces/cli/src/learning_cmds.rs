use std::env;
use std::io::{self, BufRead};
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use homunculus_config::LearningConfig;
use homunculus_learning::{
    InstinctManager, InstinctRepository, MergeOutcome, Observation, ObservationLog, PassOutcome,
    ProjectContext, open_configured, run_detection, run_learning,
};

fn open_manager(config: &LearningConfig) -> Result<InstinctManager<Box<dyn InstinctRepository>>> {
    let repo = open_configured(config)?;
    Ok(InstinctManager::new(repo, config.code_navigation.clone()))
}

// ── Project context ──────────────────────────────────────────────────────────

fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn detect_project_name() -> Option<String> {
    let from_git = git_output(&["rev-parse", "--show-toplevel"])
        .and_then(|top| dir_name(Path::new(&top)));
    from_git.or_else(|| env::current_dir().ok().as_deref().and_then(dir_name))
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().to_string())
}

fn project_context(project: Option<String>) -> ProjectContext {
    let context = ProjectContext {
        project: project.or_else(detect_project_name),
        codebase_version: git_output(&["rev-parse", "--short", "HEAD"])
            .unwrap_or_else(|| "unknown".to_string()),
    };
    debug!(project = ?context.project, version = %context.codebase_version, "project context");
    context
}

// ── Commands ─────────────────────────────────────────────────────────────────

pub(crate) fn run_detect(config: &LearningConfig, now: DateTime<Utc>) -> Result<()> {
    let report = run_detection(config, now)?;
    match report.outcome {
        PassOutcome::Disabled => {
            println!("learning is disabled; detection skipped");
            return Ok(());
        }
        PassOutcome::NoObservations => {
            println!("no observations recorded");
            return Ok(());
        }
        PassOutcome::Completed => {}
    }

    for candidate in &report.candidates {
        println!(
            "candidate: {} (strength {}) → {}",
            candidate.signal.signal_type(),
            candidate.signal.signal_strength,
            candidate.path.display()
        );
        if candidate.strong {
            println!("⚡ strong signal: consider running /claudeception now to extract the skill");
        }
    }

    if report.candidates.is_empty() {
        println!("no skill candidates detected in {} observations", report.observations);
    } else {
        println!("{} candidate(s) written", report.candidates.len());
    }
    Ok(())
}

pub(crate) fn run_learn(config: &LearningConfig, project: Option<String>) -> Result<()> {
    let manager = open_manager(config)?;
    let context = project_context(project);
    let report = run_learning(config, &manager, &context)?;

    let created = report
        .merged
        .iter()
        .filter(|m| m.outcome == MergeOutcome::Created)
        .count();
    let ids: Vec<&str> = report.merged.iter().map(|m| m.id.as_str()).collect();
    let summary = serde_json::json!({
        "enabled": report.outcome != PassOutcome::Disabled,
        "observations": report.observations,
        "created": created,
        "updated": report.merged.len() - created,
        "ids": ids,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub(crate) fn run_decay(config: &LearningConfig, now: DateTime<Utc>) -> Result<()> {
    let report = open_manager(config)?.apply_decay(now)?;
    println!(
        "decay complete: {} decayed, {} marked stale",
        report.decayed, report.marked_stale
    );
    Ok(())
}

pub(crate) fn run_cleanup(config: &LearningConfig, threshold: Option<f64>) -> Result<()> {
    let threshold = threshold.unwrap_or(config.code_navigation.cleanup_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        bail!("threshold must be within [0, 1], got {threshold}");
    }
    let removed = open_manager(config)?.cleanup(threshold)?;
    println!("cleanup complete: removed {removed} instinct(s) below {threshold}");
    Ok(())
}

pub(crate) fn run_stats(config: &LearningConfig) -> Result<()> {
    let stats = open_manager(config)?.statistics()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub(crate) async fn run_observe(config: &LearningConfig, now: DateTime<Utc>) -> Result<()> {
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading observation from stdin")?;
    let line = line.trim();
    if line.is_empty() {
        bail!("expected one JSON observation on stdin");
    }

    let mut observation: Observation =
        serde_json::from_str(line).context("parsing observation JSON")?;
    if observation.timestamp.is_empty() {
        observation.timestamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
    }
    ObservationLog::new(config.observations_path())
        .append(&observation)
        .await
}
