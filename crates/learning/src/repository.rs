use anyhow::Result;

use crate::record::{InstinctRecord, InstinctStatus};

/// Selects records by header fields.  Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstinctFilter {
    pub domain: Option<String>,
    pub project: Option<String>,
    pub status: Option<InstinctStatus>,
}

impl InstinctFilter {
    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_status(mut self, status: InstinctStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, record: &InstinctRecord) -> bool {
        self.domain.as_ref().is_none_or(|domain| &record.domain == domain)
            && self
                .project
                .as_ref()
                .is_none_or(|project| record.project.as_ref() == Some(project))
            && self.status.is_none_or(|status| record.status == status)
    }
}

/// Storage for instinct records keyed by id.
///
/// Backends skip records they cannot decode (logging them) instead of failing
/// a listing; only storage-level failures surface as errors.
pub trait InstinctRepository: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<InstinctRecord>>;

    /// Insert or replace the record with `record.id`.
    fn put(&self, record: &InstinctRecord) -> Result<()>;

    /// All decodable records matching `filter`, ordered by id.
    fn list(&self, filter: &InstinctFilter) -> Result<Vec<InstinctRecord>>;

    /// Returns `false` when no record had that id.
    fn delete(&self, id: &str) -> Result<bool>;
}

impl<T: InstinctRepository + ?Sized> InstinctRepository for Box<T> {
    fn get(&self, id: &str) -> Result<Option<InstinctRecord>> {
        (**self).get(id)
    }

    fn put(&self, record: &InstinctRecord) -> Result<()> {
        (**self).put(record)
    }

    fn list(&self, filter: &InstinctFilter) -> Result<Vec<InstinctRecord>> {
        (**self).list(filter)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        (**self).delete(id)
    }
}
