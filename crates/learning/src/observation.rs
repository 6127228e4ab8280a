use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    ToolStart,
    ToolComplete,
    UserQuery,
    /// Any event name this crate does not interpret, kept verbatim so it is
    /// written back unchanged.  Empty when the event was missing.
    Other(String),
    #[default]
    Missing,
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ToolStart => "tool_start",
            EventKind::ToolComplete => "tool_complete",
            EventKind::UserQuery => "user_query",
            EventKind::Other(raw) => raw,
            EventKind::Missing => "",
        }
    }
}

impl From<String> for EventKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "tool_start" => EventKind::ToolStart,
            "tool_complete" => EventKind::ToolComplete,
            "user_query" => EventKind::UserQuery,
            "" => EventKind::Missing,
            _ => EventKind::Other(raw),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// One line of the observation log.
///
/// Every field is optional on the wire; a line only has to be a JSON object
/// to count as well-formed.  `null` or wrongly typed scalar fields read as
/// absent.  `input` and `output` are kept as raw JSON because hooks write
/// them either as plain strings or as structured tool arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,
    #[serde(rename = "session", default, deserialize_with = "lenient_string")]
    pub session_id: String,
    #[serde(
        rename = "event",
        default,
        deserialize_with = "lenient_kind",
        skip_serializing_if = "is_missing"
    )]
    pub kind: EventKind,
    #[serde(
        rename = "tool",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(
        rename = "query",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub query_text: Option<String>,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(Some(text)),
        _ => Ok(None),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_text(deserializer)?.unwrap_or_default())
}

fn lenient_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<EventKind, D::Error> {
    Ok(EventKind::from(lenient_string(deserializer)?))
}

fn is_missing(kind: &EventKind) -> bool {
    *kind == EventKind::Missing
}

impl Observation {
    /// The input payload when it was recorded as a plain string.
    pub fn input_text(&self) -> Option<&str> {
        self.input.as_ref().and_then(Value::as_str)
    }

    /// The output payload when it was recorded as a plain string.
    pub fn output_text(&self) -> Option<&str> {
        self.output.as_ref().and_then(Value::as_str)
    }

    /// The input payload as structured JSON: objects are returned as-is and
    /// strings are decoded.  `None` when a string input is not valid JSON.
    pub fn input_json(&self) -> Option<Value> {
        match self.input.as_ref()? {
            Value::String(raw) => serde_json::from_str(raw).ok(),
            other => Some(other.clone()),
        }
    }

    pub fn tool(&self) -> &str {
        self.tool_name.as_deref().unwrap_or_default()
    }

    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// Parse an ISO-8601 timestamp.  Offsets (including `Z`) are honoured; naive
/// timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

// ── Log access ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ObservationLog {
    path: PathBuf,
}

impl ObservationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one observation as a JSON line, creating the log on first use.
    pub async fn append(&self, observation: &Observation) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening observation log {}", self.path.display()))?;
        let line = serde_json::to_string(observation)?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Return the trailing `limit` well-formed observations in log order.
    ///
    /// A missing log is an empty log.  Lines that are blank, not UTF-8, or
    /// not a JSON object are skipped; only I/O failures are errors.
    pub fn load_recent(&self, limit: usize) -> Result<Vec<Observation>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "observation log absent");
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("opening observation log {}", self.path.display()))?;
        let reader = BufReader::new(file);
        let mut recent = VecDeque::with_capacity(limit.min(1024));
        let mut skipped = 0usize;

        for chunk in reader.split(b'\n') {
            let chunk = chunk?;
            let Ok(line) = String::from_utf8(chunk) else {
                skipped += 1;
                continue;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Observation>(line) {
                Ok(observation) => {
                    recent.push_back(observation);
                    if recent.len() > limit {
                        recent.pop_front();
                    }
                }
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(
                skipped,
                path = %self.path.display(),
                "observation log contained malformed lines; they were ignored"
            );
        }

        Ok(recent.into())
    }
}
