//! Candidate signal detectors.
//!
//! Each detector is a pure function over one window of observations and
//! shares no state with the others.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use homunculus_config::LexiconConfig;
use serde_json::Value;

use crate::observation::{EventKind, Observation};
use crate::signal::{Signal, SignalKind};

pub type Detector = fn(&[Observation], &LexiconConfig) -> Option<Signal>;

/// Detectors whose signals become skill-extraction candidates, in reporting order.
pub const CANDIDATE_DETECTORS: [Detector; 3] = [
    detect_error_fix_cycle,
    detect_long_investigation,
    detect_non_standard_solution,
];

const MIN_ERRORS_BEFORE_FIX: usize = 3;
const HOT_FILE_MIN_REFERENCES: usize = 10;
const MIN_SCATTERED_EDITS: usize = 5;
const MIN_SCATTERED_DIRECTORIES: usize = 3;
const REPORTED_EDIT_TARGETS: usize = 10;
const MAX_STRENGTH: f64 = 0.95;

// ── Error / fix cycle ─────────────────────────────────────────────────────────

/// Report the first session that failed at least three tool completions and
/// then completed one cleanly.
///
/// The failure counter resets whenever the session id changes.  A completion
/// without any output counts as clean; completions with structured output
/// are ignored.
pub fn detect_error_fix_cycle(
    observations: &[Observation],
    lexicon: &LexiconConfig,
) -> Option<Signal> {
    let mut error_count = 0usize;
    let mut error_tools = BTreeSet::new();
    let mut last_session: Option<&str> = None;

    for observation in observations {
        let session = observation.session_id.as_str();
        if matches!(last_session, Some(last) if !last.is_empty() && last != session) {
            error_count = 0;
            error_tools.clear();
        }
        last_session = Some(session);

        if observation.kind != EventKind::ToolComplete {
            continue;
        }
        let output = match &observation.output {
            None => "",
            Some(Value::String(text)) => text.as_str(),
            Some(_) => continue,
        };

        if lexicon
            .error_keywords
            .iter()
            .any(|keyword| output.contains(keyword.as_str()))
        {
            error_count += 1;
            error_tools.insert(
                observation
                    .tool_name
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            );
        } else if error_count >= MIN_ERRORS_BEFORE_FIX {
            let strength = (0.5 + 0.1 * error_count as f64).min(MAX_STRENGTH);
            return Some(Signal::new(
                SignalKind::ErrorFixCycle {
                    error_count,
                    tools_involved: error_tools.into_iter().collect(),
                    session: session.to_string(),
                },
                strength,
            ));
        }
    }

    None
}

// ── Long investigation ────────────────────────────────────────────────────────

/// Report the most referenced file when any file appears in at least ten
/// string inputs across the whole window.  Ties go to the file seen first.
pub fn detect_long_investigation(
    observations: &[Observation],
    _lexicon: &LexiconConfig,
) -> Option<Signal> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();

    for observation in observations {
        let Some(input) = observation.input_text() else {
            continue;
        };
        for segment in input.split_whitespace() {
            if !is_file_reference(segment) {
                continue;
            }
            let file = segment.trim_matches('"').trim_matches('\'');
            let count = counts.entry(file).or_insert_with(|| {
                first_seen.push(file);
                0
            });
            *count += 1;
        }
    }

    let mut primary: Option<(&str, usize)> = None;
    for &file in &first_seen {
        let count = counts[file];
        if count >= HOT_FILE_MIN_REFERENCES && primary.is_none_or(|(_, best)| count > best) {
            primary = Some((file, count));
        }
    }
    let (primary_file, count) = primary?;

    let hot_files: BTreeMap<String, usize> = counts
        .iter()
        .filter(|(_, count)| **count >= HOT_FILE_MIN_REFERENCES)
        .map(|(file, count)| (file.to_string(), *count))
        .collect();

    let strength = (0.5 + 0.03 * count as f64).min(MAX_STRENGTH);
    Some(Signal::new(
        SignalKind::LongInvestigation {
            hot_files,
            primary_file: primary_file.to_string(),
        },
        strength,
    ))
}

/// A token with a path separator whose final segment has an extension-like dot.
fn is_file_reference(token: &str) -> bool {
    token.contains('/') && token.rsplit('/').next().is_some_and(|last| last.contains('.'))
}

// ── Non-standard solution ─────────────────────────────────────────────────────

/// Report edit activity that wanders across at least three directories.
pub fn detect_non_standard_solution(
    observations: &[Observation],
    _lexicon: &LexiconConfig,
) -> Option<Signal> {
    let edit_targets: Vec<&str> = observations
        .iter()
        .filter(|observation| {
            observation.kind == EventKind::ToolStart && observation.tool() == "Edit"
        })
        .filter_map(Observation::input_text)
        .filter(|input| input.contains('/'))
        .map(|input| input.split_whitespace().next().unwrap_or_default())
        .collect();

    if edit_targets.len() < MIN_SCATTERED_EDITS {
        return None;
    }

    let unique_directories: BTreeSet<String> = edit_targets
        .iter()
        .filter_map(|target| target.rsplit_once('/'))
        .map(|(directory, _)| directory.to_string())
        .collect();

    if unique_directories.len() < MIN_SCATTERED_DIRECTORIES {
        return None;
    }

    let skip = edit_targets.len().saturating_sub(REPORTED_EDIT_TARGETS);
    Some(Signal::new(
        SignalKind::NonStandardSolution {
            edit_targets: edit_targets[skip..].iter().map(|t| t.to_string()).collect(),
            unique_directories: unique_directories.into_iter().collect(),
        },
        0.7,
    ))
}
