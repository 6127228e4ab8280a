//! Instinct records and their on-disk text form.
//!
//! A record is a `---` delimited header of `key: value` scalars followed by a
//! markdown body split into `## ` sections.  [`InstinctRecord::parse`] and
//! [`InstinctRecord::to_text`] are inverses for every record this crate
//! writes; foreign header keys survive in [`InstinctRecord::extra`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::observation::parse_timestamp;

pub const DOMAIN_CODE_NAVIGATION: &str = "code-navigation";
pub const SUBTYPE_SEMANTIC_MAPPING: &str = "semantic-mapping";
pub const SOURCE_SESSION_OBSERVATION: &str = "session-observation";

pub const SECTION_ACTION: &str = "Action";
pub const SECTION_CONTEXT: &str = "Context";
pub const SECTION_SYNONYMS: &str = "Synonyms";
pub const SECTION_EVIDENCE: &str = "Evidence";
pub const SECTION_METADATA: &str = "Metadata";

const FENCE: &str = "---";

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("record does not start with a `---` front matter block")]
    MissingFrontMatter,
    #[error("front matter is not closed by `---`")]
    UnterminatedFrontMatter,
    #[error("front matter has no `id`")]
    MissingId,
    #[error("field `{field}` has invalid value `{value}`")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstinctStatus {
    #[default]
    Active,
    /// Unused for 90 days or more.  Kept, but no longer decayed.
    Stale,
}

impl fmt::Display for InstinctStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstinctStatus::Active => write!(f, "active"),
            InstinctStatus::Stale => write!(f, "stale"),
        }
    }
}

impl FromStr for InstinctStatus {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(InstinctStatus::Active),
            "stale" => Ok(InstinctStatus::Stale),
            other => Err(RecordError::InvalidField {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodySection {
    pub heading: String,
    pub lines: Vec<String>,
}

/// The markdown part of a record: an optional `# ` title, free lines before
/// the first section, then `## ` sections in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstinctBody {
    pub title: Option<String>,
    pub preamble: Vec<String>,
    pub sections: Vec<BodySection>,
}

impl InstinctBody {
    pub fn section(&self, heading: &str) -> Option<&[String]> {
        self.sections
            .iter()
            .find(|section| section.heading == heading)
            .map(|section| section.lines.as_slice())
    }

    /// Replace the lines of `heading`, appending the section if it is new.
    pub fn set_section(&mut self, heading: &str, lines: Vec<String>) {
        match self.sections.iter_mut().find(|section| section.heading == heading) {
            Some(section) => section.lines = lines,
            None => self.sections.push(BodySection {
                heading: heading.to_string(),
                lines,
            }),
        }
    }

    /// The `- item` entries of a section, in order.
    pub fn list_items(&self, heading: &str) -> Vec<String> {
        self.section(heading)
            .unwrap_or_default()
            .iter()
            .filter_map(|line| line.trim().strip_prefix('-'))
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }

    /// Items are flattened with [`single_line`] so each stays one list entry.
    pub fn set_list_items(&mut self, heading: &str, items: &[String]) {
        let lines = items
            .iter()
            .map(|item| format!("- {}", single_line(item)))
            .collect();
        self.set_section(heading, lines);
    }

    pub fn synonyms(&self) -> Vec<String> {
        self.list_items(SECTION_SYNONYMS)
    }

    fn parse(text: &str) -> Self {
        let mut body = InstinctBody::default();

        for line in text.lines() {
            if let Some(heading) = line.strip_prefix("## ") {
                body.sections.push(BodySection {
                    heading: heading.trim().to_string(),
                    lines: Vec::new(),
                });
            } else if let Some(section) = body.sections.last_mut() {
                section.lines.push(line.trim_end().to_string());
            } else if let Some(title) = line.strip_prefix("# ").filter(|_| body.title.is_none()) {
                body.title = Some(title.trim().to_string());
            } else {
                body.preamble.push(line.trim_end().to_string());
            }
        }

        trim_blank_edges(&mut body.preamble);
        for section in &mut body.sections {
            trim_blank_edges(&mut section.lines);
        }
        body
    }

    fn render(&self) -> String {
        let mut blocks = Vec::new();
        if let Some(title) = &self.title {
            blocks.push(format!("# {}", single_line(title)));
        }
        if !self.preamble.is_empty() {
            blocks.push(self.preamble.join("\n"));
        }
        for section in &self.sections {
            let mut block = format!("## {}", section.heading);
            for line in &section.lines {
                block.push('\n');
                block.push_str(line);
            }
            blocks.push(block);
        }

        let mut out = blocks.join("\n\n");
        out.push('\n');
        out
    }
}

/// Collapse every run of whitespace, line breaks included, to one space.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trim_blank_edges(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|line| line.trim().is_empty()).count();
    lines.drain(..leading);
}

// ── Record ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstinctRecord {
    pub id: String,
    pub trigger: String,
    pub domain: String,
    pub subtype: String,
    pub confidence: f64,
    pub source: String,
    pub project: Option<String>,
    pub usage_count: u32,
    /// ISO-8601 timestamp of the last confirmation, as written by the producer.
    pub last_used: Option<String>,
    pub status: InstinctStatus,
    /// Decay bracket (30 or 60 days) already applied since the last
    /// confirmation.  Only maintained under the once-per-bracket policy.
    pub decayed_bracket: Option<u32>,
    pub extra: BTreeMap<String, String>,
    pub body: InstinctBody,
}

impl InstinctRecord {
    pub fn is_code_navigation(&self) -> bool {
        self.domain == DOMAIN_CODE_NAVIGATION
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used.as_deref().and_then(parse_timestamp)
    }

    pub fn parse(text: &str) -> Result<Self, RecordError> {
        let text = text.trim_start_matches('\u{feff}').trim_start();
        let rest = text
            .strip_prefix(FENCE)
            .and_then(|rest| rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")))
            .ok_or(RecordError::MissingFrontMatter)?;

        let mut header_lines = Vec::new();
        let mut body_text = None;
        let mut remaining = rest;
        while !remaining.is_empty() {
            let (line, tail) = remaining.split_once('\n').unwrap_or((remaining, ""));
            if line.trim_end() == FENCE {
                body_text = Some(tail);
                break;
            }
            header_lines.push(line);
            remaining = tail;
        }
        let body_text = body_text.ok_or(RecordError::UnterminatedFrontMatter)?;

        let mut record = InstinctRecord {
            confidence: 0.5,
            ..InstinctRecord::default()
        };
        for line in header_lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, raw)) = line.split_once(':') else {
                continue;
            };
            let value = unquote(raw.trim());
            record.set_header(key.trim(), value)?;
        }

        if record.id.is_empty() {
            return Err(RecordError::MissingId);
        }
        record.body = InstinctBody::parse(body_text);
        Ok(record)
    }

    fn set_header(&mut self, key: &str, value: String) -> Result<(), RecordError> {
        match key {
            "id" => self.id = value,
            "trigger" => self.trigger = value,
            "domain" => self.domain = value,
            "subtype" => self.subtype = value,
            "source" => self.source = value,
            "confidence" => self.confidence = parse_number("confidence", &value)?,
            "usage_count" => self.usage_count = parse_number("usage_count", &value)?,
            "project" => self.project = non_null(value),
            "last_used" => self.last_used = non_null(value),
            "status" => self.status = value.parse()?,
            "decayed_bracket" => {
                self.decayed_bracket = match non_null(value) {
                    Some(raw) => Some(parse_number("decayed_bracket", &raw)?),
                    None => None,
                }
            }
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
        Ok(())
    }

    pub fn to_text(&self) -> String {
        let mut header = vec![
            ("id", self.id.clone()),
            ("trigger", self.trigger.clone()),
            ("domain", self.domain.clone()),
            ("subtype", self.subtype.clone()),
            ("confidence", self.confidence.to_string()),
            ("source", self.source.clone()),
        ];
        if let Some(project) = &self.project {
            header.push(("project", project.clone()));
        }
        header.push(("usage_count", self.usage_count.to_string()));
        if let Some(last_used) = &self.last_used {
            header.push(("last_used", last_used.clone()));
        }
        if self.status != InstinctStatus::Active {
            header.push(("status", self.status.to_string()));
        }
        if let Some(bracket) = self.decayed_bracket {
            header.push(("decayed_bracket", bracket.to_string()));
        }

        let mut out = String::from("---\n");
        for (key, value) in header {
            out.push_str(&format!("{key}: {}\n", quote(&value)));
        }
        for (key, value) in &self.extra {
            out.push_str(&format!("{key}: {}\n", quote(value)));
        }
        out.push_str("---\n\n");
        out.push_str(&self.body.render());
        out
    }
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, RecordError> {
    value.parse().map_err(|_| RecordError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn non_null(value: String) -> Option<String> {
    match value.as_str() {
        "" | "~" | "null" => None,
        _ => Some(value),
    }
}

fn unquote(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let inner = &raw[1..raw.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                }
            } else {
                out.push(ch);
            }
        }
        out
    } else if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        raw[1..raw.len() - 1].replace("''", "'")
    } else {
        raw.to_string()
    }
}

/// Double-quote a header value when a plain scalar would be ambiguous.
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value != value.trim()
        || value.contains(": ")
        || value.contains(" #")
        || value.contains('\n')
        || value.starts_with(|ch: char| "'\"[]{}>|*&!%@#,?-:`".contains(ch));
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}
