use anyhow::{Result, bail};
use tracing::{debug, info};

use super::{InstinctManager, MergeOutcome, MergeResult, ProjectContext};
use crate::navigation::{ConfirmationMethod, NavigationPattern};
use crate::record::{
    DOMAIN_CODE_NAVIGATION, InstinctBody, InstinctRecord, SECTION_ACTION, SECTION_CONTEXT,
    SECTION_EVIDENCE, SECTION_METADATA, SECTION_SYNONYMS, SOURCE_SESSION_OBSERVATION,
    SUBTYPE_SEMANTIC_MAPPING, single_line,
};
use crate::repository::InstinctRepository;

const ID_PREFIX: &str = "code-nav-";

/// Lowercase, drop punctuation, and join words with single hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for ch in text.to_lowercase().chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_hyphen = true;
        }
    }
    slug
}

/// Records are keyed by the first two keywords, so differently worded queries
/// that start alike land on the same instinct.
pub fn derive_instinct_id(keywords: &[String]) -> String {
    let head: Vec<&str> = keywords.iter().take(2).map(String::as_str).collect();
    format!("{ID_PREFIX}{}", slugify(&head.join("-")))
}

fn evidence_lines(
    timestamp: &str,
    usage_count: u32,
    method: ConfirmationMethod,
) -> Vec<String> {
    vec![
        format!("User confirmed this mapping on {timestamp}"),
        format!("Usage count: {usage_count}"),
        format!("Last used: {timestamp}"),
        format!("Confirmation method: {method}"),
    ]
}

impl<R: InstinctRepository> InstinctManager<R> {
    /// Fold one observed pattern into the store: create the mapping on first
    /// sight, otherwise strengthen it.
    pub fn merge_pattern(
        &self,
        pattern: &NavigationPattern,
        context: &ProjectContext,
    ) -> Result<MergeResult> {
        let id = derive_instinct_id(&pattern.keywords);
        if id.len() == ID_PREFIX.len() {
            bail!("pattern {:?} has no usable keywords", pattern.natural_language);
        }

        let outcome = match self.repo.get(&id)? {
            Some(mut record) => {
                self.reinforce(&mut record, pattern);
                self.repo.put(&record)?;
                debug!(
                    id = %record.id,
                    confidence = record.confidence,
                    usage_count = record.usage_count,
                    "instinct reinforced"
                );
                MergeOutcome::Updated
            }
            None => {
                let record = self.new_record(&id, pattern, context);
                self.repo.put(&record)?;
                info!(id = %record.id, query = %pattern.natural_language, "instinct created");
                MergeOutcome::Created
            }
        };

        Ok(MergeResult { id, outcome })
    }

    pub fn merge_patterns(
        &self,
        patterns: &[NavigationPattern],
        context: &ProjectContext,
    ) -> Result<Vec<MergeResult>> {
        patterns
            .iter()
            .map(|pattern| self.merge_pattern(pattern, context))
            .collect()
    }

    fn reinforce(&self, record: &mut InstinctRecord, pattern: &NavigationPattern) {
        let settings = &self.settings;
        record.confidence = (record.confidence + settings.confidence_growth.implicit_confirmation)
            .min(settings.confidence_max)
            .max(settings.confidence_floor);
        record.usage_count += 1;
        record.last_used = Some(pattern.timestamp.clone());
        record.decayed_bracket = None;

        let query = single_line(&pattern.natural_language);
        let mut synonyms = record.body.synonyms();
        if !synonyms.contains(&query) {
            synonyms.push(query);
        }
        let cap = settings.max_synonyms_per_mapping;
        if synonyms.len() > cap {
            synonyms.drain(..synonyms.len() - cap);
        }
        record.body.set_list_items(SECTION_SYNONYMS, &synonyms);

        let evidence = evidence_lines(
            &pattern.timestamp,
            record.usage_count,
            pattern.code_location.confirmation_method,
        );
        record.body.set_list_items(SECTION_EVIDENCE, &evidence);
    }

    fn new_record(
        &self,
        id: &str,
        pattern: &NavigationPattern,
        context: &ProjectContext,
    ) -> InstinctRecord {
        let query = &single_line(&pattern.natural_language);
        let location = &pattern.code_location;
        let function = location.function_name.as_deref().unwrap_or("unknown");
        let project = context.project.as_deref().unwrap_or("unknown");

        let mut body = InstinctBody {
            title: Some(format!("Code navigation: {query}")),
            ..InstinctBody::default()
        };
        body.set_section(
            SECTION_ACTION,
            vec![format!("Navigate to: {}:{function}()", location.file_path)],
        );
        body.set_list_items(
            SECTION_CONTEXT,
            &[
                format!("File: {}", location.file_path),
                format!("Function: {function}"),
                "Line: unknown".to_string(),
            ],
        );
        body.set_list_items(SECTION_SYNONYMS, std::slice::from_ref(query));
        body.set_list_items(
            SECTION_EVIDENCE,
            &evidence_lines(&pattern.timestamp, 1, location.confirmation_method),
        );
        body.set_list_items(
            SECTION_METADATA,
            &[
                format!("Project: {project}"),
                format!("Codebase version: {}", context.codebase_version),
            ],
        );

        InstinctRecord {
            id: id.to_string(),
            trigger: format!("when user says '{query}' or similar phrases"),
            domain: DOMAIN_CODE_NAVIGATION.to_string(),
            subtype: SUBTYPE_SEMANTIC_MAPPING.to_string(),
            confidence: pattern
                .confidence
                .clamp(self.settings.confidence_floor, self.settings.confidence_max),
            source: SOURCE_SESSION_OBSERVATION.to_string(),
            project: context.project.clone(),
            usage_count: 1,
            last_used: Some(pattern.timestamp.clone()),
            body,
            ..InstinctRecord::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use homunculus_config::CodeNavigationConfig;
    use tempfile::TempDir;

    use super::*;
    use crate::navigation::CodeLocation;
    use crate::repository::InstinctFilter;
    use crate::store::DirectoryInstinctStore;

    fn pattern(query: &str, keywords: &[&str], timestamp: &str) -> NavigationPattern {
        NavigationPattern {
            natural_language: query.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            code_location: CodeLocation {
                file_path: "src/auth/login.ts".to_string(),
                function_name: Some("handleLogin".to_string()),
                confirmation_method: ConfirmationMethod::Implicit,
            },
            timestamp: timestamp.to_string(),
            session: "s1".to_string(),
            confidence: 0.5,
        }
    }

    fn manager(dir: &TempDir) -> InstinctManager<DirectoryInstinctStore> {
        InstinctManager::new(
            DirectoryInstinctStore::new(dir.path()),
            CodeNavigationConfig::default(),
        )
    }

    fn context() -> ProjectContext {
        ProjectContext {
            project: Some("webapp".to_string()),
            codebase_version: "abc1234".to_string(),
        }
    }

    #[test]
    fn slugify_normalises_text() {
        assert_eq!(slugify("Find  Login"), "find-login");
        assert_eq!(slugify("--user_profile!!--page"), "user-profile-page");
        assert_eq!(slugify("登录-逻辑"), "登录-逻辑");
        assert_eq!(slugify("?!"), "");
    }

    #[test]
    fn id_uses_first_two_keywords() {
        let keywords = vec!["find".to_string(), "Login".to_string(), "form".to_string()];
        assert_eq!(derive_instinct_id(&keywords), "code-nav-find-login");
        assert_eq!(derive_instinct_id(&keywords[..1]), "code-nav-find");
    }

    #[test]
    fn first_sighting_creates_record() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let result = manager
            .merge_pattern(&pattern("find login form", &["find", "login", "form"], "2026-01-01T10:00:00Z"), &context())
            .unwrap();
        assert_eq!(result.outcome, MergeOutcome::Created);
        assert_eq!(result.id, "code-nav-find-login");

        let record = manager.repository().get(&result.id).unwrap().unwrap();
        assert_eq!(record.trigger, "when user says 'find login form' or similar phrases");
        assert_eq!(record.domain, DOMAIN_CODE_NAVIGATION);
        assert_eq!(record.subtype, SUBTYPE_SEMANTIC_MAPPING);
        assert_eq!(record.source, SOURCE_SESSION_OBSERVATION);
        assert_eq!(record.confidence, 0.5);
        assert_eq!(record.usage_count, 1);
        assert_eq!(record.project.as_deref(), Some("webapp"));
        assert_eq!(record.body.synonyms(), vec!["find login form"]);
        assert_eq!(
            record.body.section(SECTION_ACTION).unwrap(),
            ["Navigate to: src/auth/login.ts:handleLogin()".to_string()]
        );
        assert_eq!(
            record.body.list_items(SECTION_METADATA),
            vec!["Project: webapp", "Codebase version: abc1234"]
        );
        assert_eq!(record.body.list_items(SECTION_EVIDENCE).len(), 4);
    }

    #[test]
    fn distinct_queries_with_same_id_merge() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager
            .merge_pattern(&pattern("find login form", &["find", "login", "form"], "2026-01-01T10:00:00Z"), &context())
            .unwrap();
        let result = manager
            .merge_pattern(&pattern("find login page", &["find", "login", "page"], "2026-01-02T10:00:00Z"), &context())
            .unwrap();
        assert_eq!(result.outcome, MergeOutcome::Updated);

        let all = manager.repository().list(&InstinctFilter::default()).unwrap();
        assert_eq!(all.len(), 1);
        let record = &all[0];
        assert_eq!(record.usage_count, 2);
        assert!((record.confidence - 0.55).abs() < 1e-9);
        assert_eq!(record.last_used.as_deref(), Some("2026-01-02T10:00:00Z"));
        assert_eq!(record.body.synonyms(), vec!["find login form", "find login page"]);
        assert_eq!(
            record.body.list_items(SECTION_EVIDENCE),
            vec![
                "User confirmed this mapping on 2026-01-02T10:00:00Z",
                "Usage count: 2",
                "Last used: 2026-01-02T10:00:00Z",
                "Confirmation method: implicit",
            ]
        );
    }

    #[test]
    fn repeated_query_is_not_duplicated_and_confidence_caps() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        for day in 1..=20 {
            let ts = format!("2026-01-{day:02}T10:00:00Z");
            manager
                .merge_pattern(&pattern("find login", &["find", "login"], &ts), &context())
                .unwrap();
        }
        let record = manager.repository().get("code-nav-find-login").unwrap().unwrap();
        assert_eq!(record.usage_count, 20);
        assert_eq!(record.confidence, 0.95);
        assert_eq!(record.body.synonyms(), vec!["find login"]);
    }

    #[test]
    fn synonym_cap_keeps_most_recent() {
        let dir = TempDir::new().unwrap();
        let mut settings = CodeNavigationConfig::default();
        settings.max_synonyms_per_mapping = 3;
        let manager = InstinctManager::new(DirectoryInstinctStore::new(dir.path()), settings);

        for n in 0..6 {
            let query = format!("find login variant{n}");
            manager
                .merge_pattern(&pattern(&query, &["find", "login"], "2026-01-01T10:00:00Z"), &context())
                .unwrap();
        }
        let synonyms = manager
            .repository()
            .get("code-nav-find-login")
            .unwrap()
            .unwrap()
            .body
            .synonyms();
        assert_eq!(
            synonyms,
            vec!["find login variant3", "find login variant4", "find login variant5"]
        );
    }

    #[test]
    fn multi_line_query_is_stored_as_one_synonym() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let query = "find the login handler\nand rename it";
        for day in 1..=4 {
            let ts = format!("2026-01-{day:02}T10:00:00Z");
            manager
                .merge_pattern(&pattern(query, &["login", "handler"], &ts), &context())
                .unwrap();
        }

        let record = manager.repository().get("code-nav-login-handler").unwrap().unwrap();
        assert_eq!(record.usage_count, 4);
        assert_eq!(record.body.synonyms(), vec!["find the login handler and rename it"]);
        assert_eq!(
            record.body.title.as_deref(),
            Some("Code navigation: find the login handler and rename it")
        );
        assert!(record.body.preamble.is_empty());
        assert_eq!(
            record.trigger,
            "when user says 'find the login handler and rename it' or similar phrases"
        );
    }

    #[test]
    fn confirmation_clears_decay_marker() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let p = pattern("find login", &["find", "login"], "2026-01-01T10:00:00Z");
        manager.merge_pattern(&p, &context()).unwrap();

        let mut record = manager.repository().get("code-nav-find-login").unwrap().unwrap();
        record.decayed_bracket = Some(30);
        manager.repository().put(&record).unwrap();

        manager.merge_pattern(&p, &context()).unwrap();
        let record = manager.repository().get("code-nav-find-login").unwrap().unwrap();
        assert_eq!(record.decayed_bracket, None);
    }

    #[test]
    fn missing_project_and_function_fall_back_to_unknown() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let mut p = pattern("where is main", &["where", "main"], "2026-01-01T10:00:00Z");
        p.code_location.function_name = None;
        manager.merge_pattern(&p, &ProjectContext::default()).unwrap();

        let record = manager.repository().get("code-nav-where-main").unwrap().unwrap();
        assert_eq!(record.project, None);
        assert_eq!(
            record.body.list_items(SECTION_CONTEXT),
            vec!["File: src/auth/login.ts", "Function: unknown", "Line: unknown"]
        );
        assert_eq!(
            record.body.list_items(SECTION_METADATA),
            vec!["Project: unknown", "Codebase version: unknown"]
        );
    }

    #[test]
    fn keywordless_pattern_is_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let p = pattern("??", &[], "2026-01-01T10:00:00Z");
        assert!(manager.merge_pattern(&p, &context()).is_err());
    }
}
