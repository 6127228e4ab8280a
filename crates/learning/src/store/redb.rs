//! Embedded single-file backend.  Stores the same record text the directory
//! backend writes, keyed by instinct id.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::warn;

use crate::record::InstinctRecord;
use crate::repository::{InstinctFilter, InstinctRepository};

/// `id (str) → record text (str)`.
const INSTINCTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("instincts");

pub struct RedbInstinctStore {
    db: Database,
    path: PathBuf,
}

impl RedbInstinctStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&path)
            .with_context(|| format!("opening instinct database at {}", path.display()))?;

        {
            let tx = db.begin_write()?;
            tx.open_table(INSTINCTS_TABLE)?;
            tx.commit()?;
        }

        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn decode(id: &str, text: &str) -> Option<InstinctRecord> {
    match InstinctRecord::parse(text) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(id, error = %err, "malformed instinct record skipped");
            None
        }
    }
}

impl InstinctRepository for RedbInstinctStore {
    fn get(&self, id: &str) -> Result<Option<InstinctRecord>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(INSTINCTS_TABLE)?;
        Ok(table.get(id)?.and_then(|value| decode(id, value.value())))
    }

    fn put(&self, record: &InstinctRecord) -> Result<()> {
        let text = record.to_text();
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(INSTINCTS_TABLE)?;
            table.insert(record.id.as_str(), text.as_str())?;
        }
        tx.commit()?;
        Ok(())
    }

    fn list(&self, filter: &InstinctFilter) -> Result<Vec<InstinctRecord>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(INSTINCTS_TABLE)?;
        let mut records = Vec::new();
        for row in table.iter()? {
            let (key, value) = row?;
            if let Some(record) = decode(key.value(), value.value()) {
                if filter.matches(&record) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let tx = self.db.begin_write()?;
        let removed = {
            let mut table = tx.open_table(INSTINCTS_TABLE)?;
            table.remove(id)?.is_some()
        };
        tx.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::record::DOMAIN_CODE_NAVIGATION;

    fn record(id: &str, project: &str) -> InstinctRecord {
        InstinctRecord {
            id: id.to_string(),
            domain: DOMAIN_CODE_NAVIGATION.to_string(),
            project: Some(project.to_string()),
            confidence: 0.6,
            usage_count: 2,
            ..InstinctRecord::default()
        }
    }

    #[test]
    fn records_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("instincts.redb");
        {
            let store = RedbInstinctStore::open(&path).unwrap();
            store.put(&record("code-nav-b", "api")).unwrap();
            store.put(&record("code-nav-a", "webapp")).unwrap();
        }

        let store = RedbInstinctStore::open(&path).unwrap();
        assert_eq!(store.get("code-nav-a").unwrap(), Some(record("code-nav-a", "webapp")));
        let ids: Vec<_> = store
            .list(&InstinctFilter::default())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["code-nav-a", "code-nav-b"]);

        let api = store.list(&InstinctFilter::default().with_project("api")).unwrap();
        assert_eq!(api.len(), 1);
    }

    #[test]
    fn delete_reports_presence() {
        let dir = TempDir::new().unwrap();
        let store = RedbInstinctStore::open(dir.path().join("instincts.redb")).unwrap();
        store.put(&record("code-nav-a", "webapp")).unwrap();
        assert!(store.delete("code-nav-a").unwrap());
        assert!(!store.delete("code-nav-a").unwrap());
        assert!(store.get("code-nav-a").unwrap().is_none());
    }
}
