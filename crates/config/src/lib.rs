use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

// ── Observation log ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// JSONL log of tool-use events.
    pub store_path: String,
    /// Only the trailing `max_events` well-formed lines are read per pass.
    pub max_events: usize,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            store_path: ".homunculus/observations.jsonl".to_string(),
            max_events: 200,
        }
    }
}

// ── Code navigation instincts ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceGrowth {
    /// Added to a mapping's confidence each time a Grep → Read → Edit
    /// sequence confirms it.
    pub implicit_confirmation: f64,
}

impl Default for ConfidenceGrowth {
    fn default() -> Self {
        Self {
            implicit_confirmation: 0.05,
        }
    }
}

/// Negative deltas applied by the decay pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceDecay {
    #[serde(rename = "30_days_unused")]
    pub days_30_unused: f64,
    #[serde(rename = "60_days_unused")]
    pub days_60_unused: f64,
}

impl Default for ConfidenceDecay {
    fn default() -> Self {
        Self {
            days_30_unused: -0.05,
            days_60_unused: -0.1,
        }
    }
}

/// How the decay pass treats a record that was already decayed inside the
/// same age bracket.
///
/// | Policy             | Behaviour                                                    |
/// |--------------------|--------------------------------------------------------------|
/// | `recompute`        | Every pass re-applies the bracket delta.                      |
/// | `once-per-bracket` | A `decayed_bracket` marker limits each bracket to one delta. |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecayPolicy {
    #[default]
    Recompute,
    OncePerBracket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeNavigationConfig {
    pub confidence_growth: ConfidenceGrowth,
    pub confidence_max: f64,
    pub confidence_floor: f64,
    pub confidence_decay: ConfidenceDecay,
    pub decay_policy: DecayPolicy,
    pub max_synonyms_per_mapping: usize,
    /// Trailing window after a user query in which Grep → Read → Edit must occur.
    pub time_window_minutes: i64,
    /// Default threshold used by `cleanup` when none is given explicitly.
    pub cleanup_threshold: f64,
}

impl Default for CodeNavigationConfig {
    fn default() -> Self {
        Self {
            confidence_growth: ConfidenceGrowth::default(),
            confidence_max: 0.95,
            confidence_floor: 0.1,
            confidence_decay: ConfidenceDecay::default(),
            decay_policy: DecayPolicy::Recompute,
            max_synonyms_per_mapping: 10,
            time_window_minutes: 5,
            cleanup_threshold: 0.3,
        }
    }
}

// ── Instinct store ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstinctBackend {
    /// One `<id>.yaml` file per record inside `path`.
    #[default]
    Directory,
    /// A single redb database file at `path`.
    Redb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstinctStoreConfig {
    pub backend: InstinctBackend,
    pub path: String,
}

impl Default for InstinctStoreConfig {
    fn default() -> Self {
        Self {
            backend: InstinctBackend::Directory,
            path: ".homunculus/instincts/personal".to_string(),
        }
    }
}

// ── Lexicons ──────────────────────────────────────────────────────────────────

/// Keyword tables consumed by the detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LexiconConfig {
    /// Case-sensitive substrings that mark a tool output as a failure.
    pub error_keywords: Vec<String>,
    /// Tokens dropped when extracting keywords from a user query.
    pub stopwords: Vec<String>,
    /// Case-insensitive phrases that mark a user query as a code search.
    pub code_search_phrases: Vec<String>,
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            error_keywords: owned(&[
                "error",
                "Error",
                "ERROR",
                "failed",
                "Failed",
                "FAILED",
                "exception",
                "Exception",
                "traceback",
                "TypeError",
                "SyntaxError",
                "ReferenceError",
            ]),
            stopwords: owned(&[
                "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "一个",
                "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have",
                "has", "had", "do", "does", "did", "will", "would", "should", "can", "could",
                "may", "might", "must", "i", "you", "he", "she", "it", "we", "they", "this",
                "that", "these", "those",
            ]),
            code_search_phrases: owned(&[
                "我想修改", "找到", "查找", "在哪", "哪里", "定位", "搜索", "看看", "检查", "查看",
                "打开", "编辑", "更改", "find", "locate", "where", "search", "look for",
                "show me", "open", "edit", "modify", "change", "update",
            ]),
        }
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

// ── Telemetry ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// ── Root ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Gates both detection passes (candidates and navigation learning).
    /// Decay, cleanup and statistics always run.
    pub enabled: bool,
    pub min_signal_strength: f64,
    /// Candidates at or above this strength additionally raise a
    /// strong-signal notice.
    pub auto_remind_threshold: f64,
    pub candidates_path: String,
    pub observation: ObservationConfig,
    #[serde(rename = "code-navigation")]
    pub code_navigation: CodeNavigationConfig,
    pub instincts: InstinctStoreConfig,
    pub lexicon: LexiconConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_signal_strength: 0.6,
            auto_remind_threshold: 0.8,
            candidates_path: ".homunculus/skill-candidates".to_string(),
            observation: ObservationConfig::default(),
            code_navigation: CodeNavigationConfig::default(),
            instincts: InstinctStoreConfig::default(),
            lexicon: LexiconConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl LearningConfig {
    /// Load and validate the config at `path`.
    ///
    /// A missing document is an error.  Files ending in `.json` are parsed
    /// as JSON, everything else as TOML.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading learning config {}", path.display()))?;

        let config: Self = if is_json(path) {
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing JSON config {}", path.display()))?
        } else {
            toml::from_str(&raw)
                .with_context(|| format!("parsing TOML config {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_signal_strength", self.min_signal_strength),
            ("auto_remind_threshold", self.auto_remind_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be within [0, 1], got {value}");
            }
        }

        let nav = &self.code_navigation;
        if !(0.0..1.0).contains(&nav.confidence_floor) {
            bail!(
                "code-navigation.confidence_floor must be within [0, 1), got {}",
                nav.confidence_floor
            );
        }
        if nav.confidence_max <= nav.confidence_floor || nav.confidence_max > 1.0 {
            bail!(
                "code-navigation.confidence_max must be within (confidence_floor, 1], got {}",
                nav.confidence_max
            );
        }
        if nav.confidence_growth.implicit_confirmation < 0.0 {
            bail!("code-navigation.confidence_growth.implicit_confirmation must not be negative");
        }
        if nav.confidence_decay.days_30_unused > 0.0 || nav.confidence_decay.days_60_unused > 0.0 {
            bail!("code-navigation.confidence_decay deltas must be zero or negative");
        }
        if nav.max_synonyms_per_mapping == 0 {
            bail!("code-navigation.max_synonyms_per_mapping must be at least 1");
        }
        if nav.time_window_minutes <= 0 {
            bail!("code-navigation.time_window_minutes must be positive");
        }
        if self.observation.max_events == 0 {
            bail!("observation.max_events must be at least 1");
        }
        Ok(())
    }

    pub fn observations_path(&self) -> PathBuf {
        expand_path(&self.observation.store_path)
    }

    pub fn candidates_dir(&self) -> PathBuf {
        expand_path(&self.candidates_path)
    }

    pub fn instincts_path(&self) -> PathBuf {
        expand_path(&self.instincts.path)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Expand a leading `~` to `$HOME`.  Paths without one are returned as-is.
pub fn expand_path(raw: &str) -> PathBuf {
    let home = env::var_os("HOME").filter(|home| !home.is_empty());
    match (raw, home) {
        ("~", Some(home)) => PathBuf::from(home),
        (raw, Some(home)) if raw.starts_with("~/") => PathBuf::from(home).join(&raw[2..]),
        (raw, _) => PathBuf::from(raw),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
