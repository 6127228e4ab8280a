//! Code-navigation pattern detection.
//!
//! A user query that reads like "find / where is / 我想修改 ..." followed,
//! within a short window, by Grep → Read → Edit is treated as the user
//! implicitly confirming that the query maps to the edited location.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use homunculus_config::LexiconConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::observation::{EventKind, Observation};

/// Confidence assigned to a mapping confirmed only by an observed tool sequence.
pub const IMPLICIT_CONFIRMATION_CONFIDENCE: f64 = 0.5;

const MAX_KEYWORDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationMethod {
    Implicit,
}

impl fmt::Display for ConfirmationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationMethod::Implicit => write!(f, "implicit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeLocation {
    pub file_path: String,
    pub function_name: Option<String>,
    pub confirmation_method: ConfirmationMethod,
}

/// A query → code location mapping observed once.  Not a `Signal`: these feed
/// the instinct store rather than the candidate sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationPattern {
    pub natural_language: String,
    pub keywords: Vec<String>,
    pub code_location: CodeLocation,
    pub timestamp: String,
    pub session: String,
    pub confidence: f64,
}

pub struct NavigationDetector<'a> {
    lexicon: &'a LexiconConfig,
    window: Duration,
}

impl<'a> NavigationDetector<'a> {
    pub fn new(lexicon: &'a LexiconConfig, window_minutes: i64) -> Self {
        Self {
            lexicon,
            window: Duration::minutes(window_minutes),
        }
    }

    /// One pattern per code-search query whose window contains a complete
    /// Grep → Read → Edit sequence.
    pub fn detect(&self, observations: &[Observation]) -> Vec<NavigationPattern> {
        let mut patterns = Vec::new();

        for (index, observation) in observations.iter().enumerate() {
            if observation.kind != EventKind::UserQuery {
                continue;
            }
            let query = observation.query_text.as_deref().unwrap_or_default();
            if !self.is_code_search_query(query) {
                continue;
            }
            let keywords = self.extract_keywords(query);
            if keywords.is_empty() {
                continue;
            }
            let Some(asked_at) = observation.occurred_at() else {
                debug!(timestamp = %observation.timestamp, "skipping query with unparsable timestamp");
                continue;
            };

            let following = within_window(&observations[index + 1..], asked_at + self.window);
            let Some(code_location) = match_grep_read_edit(following) else {
                continue;
            };

            let session = if observation.session_id.is_empty() {
                "unknown".to_string()
            } else {
                observation.session_id.clone()
            };
            patterns.push(NavigationPattern {
                natural_language: query.to_string(),
                keywords,
                code_location,
                timestamp: observation.timestamp.clone(),
                session,
                confidence: IMPLICIT_CONFIRMATION_CONFIDENCE,
            });
        }

        patterns
    }

    pub fn is_code_search_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.lexicon
            .code_search_phrases
            .iter()
            .any(|phrase| query.contains(&phrase.to_lowercase()))
    }

    /// Up to five lowercase word tokens, minus stopwords and one-character tokens.
    pub fn extract_keywords(&self, query: &str) -> Vec<String> {
        query
            .to_lowercase()
            .split(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
            .filter(|word| word.chars().count() > 1)
            .filter(|word| !self.lexicon.stopwords.iter().any(|stop| stop == word))
            .take(MAX_KEYWORDS)
            .map(str::to_string)
            .collect()
    }
}

/// The prefix of `rest` whose timestamps fall at or before `deadline`.  An
/// unparsable timestamp closes the window.
fn within_window(rest: &[Observation], deadline: DateTime<Utc>) -> &[Observation] {
    let end = rest
        .iter()
        .position(|observation| !observation.occurred_at().is_some_and(|at| at <= deadline))
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Find Grep, then Read, then Edit (tool-name substrings, case-insensitive),
/// each role searched only after the previous one was found.
fn match_grep_read_edit(window: &[Observation]) -> Option<CodeLocation> {
    let mut grep_seen = false;
    let mut read: Option<&Observation> = None;
    let mut edit: Option<&Observation> = None;

    for observation in window {
        let tool = observation.tool().to_lowercase();
        if tool.contains("grep") && !grep_seen {
            grep_seen = true;
        } else if tool.contains("read") && grep_seen && read.is_none() {
            read = Some(observation);
        } else if tool.contains("edit") && read.is_some() {
            edit = Some(observation);
            break;
        }
    }

    let (read, edit) = (read?, edit?);
    let file_path = read
        .input_json()?
        .get("file_path")?
        .as_str()
        .filter(|path| !path.is_empty())?
        .to_string();

    let function_name = edit
        .input_json()
        .as_ref()
        .and_then(|input| input.get("old_string"))
        .and_then(|old| old.as_str())
        .and_then(function_name_in);

    Some(CodeLocation {
        file_path,
        function_name,
        confirmation_method: ConfirmationMethod::Implicit,
    })
}

fn function_name_in(source: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"function\s+(\w+)|def\s+(\w+)|(\w+)\s*\(").expect("function-name pattern is valid")
    });
    let captures = pattern.captures(source)?;
    (1..=3)
        .find_map(|group| captures.get(group))
        .map(|name| name.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn at(minute: u32, second: u32) -> String {
        format!("2026-05-04T09:{minute:02}:{second:02}Z")
    }

    fn query(time: String, text: &str) -> Observation {
        Observation {
            timestamp: time,
            session_id: "s1".to_string(),
            kind: EventKind::UserQuery,
            query_text: Some(text.to_string()),
            ..Observation::default()
        }
    }

    fn tool(time: String, name: &str, input: Value) -> Observation {
        Observation {
            timestamp: time,
            session_id: "s1".to_string(),
            kind: EventKind::ToolStart,
            tool_name: Some(name.to_string()),
            input: Some(input),
            ..Observation::default()
        }
    }

    fn grep_read_edit(minute: u32) -> Vec<Observation> {
        vec![
            tool(at(minute, 10), "Grep", json!({"pattern": "login"})),
            tool(
                at(minute, 20),
                "Read",
                Value::String(r#"{"file_path": "src/auth/login.ts"}"#.to_string()),
            ),
            tool(
                at(minute, 30),
                "Edit",
                json!({"file_path": "src/auth/login.ts", "old_string": "function handleLogin(user) {"}),
            ),
        ]
    }

    #[test]
    fn query_followed_by_grep_read_edit_is_detected() {
        let lexicon = LexiconConfig::default();
        let mut observations = vec![query(at(0, 0), "Find the login handler")];
        observations.extend(grep_read_edit(1));

        let patterns = NavigationDetector::new(&lexicon, 5).detect(&observations);
        assert_eq!(patterns.len(), 1);
        let pattern = &patterns[0];
        assert_eq!(pattern.natural_language, "Find the login handler");
        assert_eq!(pattern.keywords, vec!["find", "login", "handler"]);
        assert_eq!(pattern.code_location.file_path, "src/auth/login.ts");
        assert_eq!(pattern.code_location.function_name.as_deref(), Some("handleLogin"));
        assert_eq!(pattern.code_location.confirmation_method, ConfirmationMethod::Implicit);
        assert_eq!(pattern.confidence, 0.5);
        assert_eq!(pattern.session, "s1");
    }

    #[test]
    fn sequence_outside_the_window_is_ignored() {
        let lexicon = LexiconConfig::default();
        let mut observations = vec![query(at(0, 0), "where is the router")];
        observations.extend(grep_read_edit(5));
        // The Edit lands at 09:05:30, past the five-minute window.
        assert!(NavigationDetector::new(&lexicon, 5).detect(&observations).is_empty());
        assert_eq!(NavigationDetector::new(&lexicon, 6).detect(&observations).len(), 1);
    }

    #[test]
    fn out_of_order_tools_do_not_match() {
        let lexicon = LexiconConfig::default();
        let mut steps = grep_read_edit(1);
        steps.swap(0, 1);
        let mut observations = vec![query(at(0, 0), "find the login code")];
        observations.extend(steps);
        assert!(NavigationDetector::new(&lexicon, 5).detect(&observations).is_empty());
    }

    #[test]
    fn read_without_file_path_does_not_match() {
        let lexicon = LexiconConfig::default();
        let mut steps = grep_read_edit(1);
        steps[1].input = Some(Value::String("cat src/auth/login.ts".to_string()));
        let mut observations = vec![query(at(0, 0), "find the login code")];
        observations.extend(steps);
        assert!(NavigationDetector::new(&lexicon, 5).detect(&observations).is_empty());
    }

    #[test]
    fn non_search_queries_are_ignored() {
        let lexicon = LexiconConfig::default();
        let mut observations = vec![query(at(0, 0), "explain ownership to me")];
        observations.extend(grep_read_edit(1));
        assert!(NavigationDetector::new(&lexicon, 5).detect(&observations).is_empty());
    }

    #[test]
    fn each_matching_query_yields_a_pattern() {
        let lexicon = LexiconConfig::default();
        let mut observations = vec![query(at(0, 0), "find login")];
        observations.extend(grep_read_edit(1));
        observations.push(query(at(2, 0), "locate login form"));
        observations.extend(grep_read_edit(3));

        let patterns = NavigationDetector::new(&lexicon, 5).detect(&observations);
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[1].keywords, vec!["locate", "login", "form"]);
    }

    #[test]
    fn keywords_drop_stopwords_and_short_tokens() {
        let lexicon = LexiconConfig::default();
        let detector = NavigationDetector::new(&lexicon, 5);
        assert_eq!(
            detector.extract_keywords("Where is the X parser, I want to change it"),
            vec!["where", "parser", "want", "to", "change"]
        );
        assert_eq!(detector.extract_keywords("我想修改 登录 的 逻辑"), vec!["我想修改", "登录", "逻辑"]);
        assert!(detector.extract_keywords("a I ?").is_empty());
    }

    #[test]
    fn search_intent_is_case_insensitive_and_multilingual() {
        let lexicon = LexiconConfig::default();
        let detector = NavigationDetector::new(&lexicon, 5);
        assert!(detector.is_code_search_query("SHOW ME the config loader"));
        assert!(detector.is_code_search_query("登录逻辑在哪"));
        assert!(!detector.is_code_search_query("thanks"));
    }

    #[test]
    fn function_names_come_from_common_definitions() {
        assert_eq!(function_name_in("def load_config(path):").as_deref(), Some("load_config"));
        assert_eq!(function_name_in("function render() {").as_deref(), Some("render"));
        assert_eq!(function_name_in("let x = compute (1, 2);").as_deref(), Some("compute"));
        assert!(function_name_in("const LIMIT = 5;").is_none());
    }
}
