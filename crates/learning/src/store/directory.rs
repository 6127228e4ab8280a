use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::record::InstinctRecord;
use crate::repository::{InstinctFilter, InstinctRepository};

const EXTENSION: &str = "yaml";

/// One `<id>.yaml` file per record in a flat directory.
#[derive(Debug, Clone)]
pub struct DirectoryInstinctStore {
    dir: PathBuf,
}

impl DirectoryInstinctStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            bail!("invalid instinct id {id:?}");
        }
        Ok(self.dir.join(format!("{id}.{EXTENSION}")))
    }

    /// Read `path` as a record.  A record whose header `id` differs from the
    /// file stem is skipped, since writes and deletes address it by its id.
    fn read_record(path: &Path) -> Option<InstinctRecord> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable instinct record skipped");
                return None;
            }
        };
        match InstinctRecord::parse(&text) {
            Ok(record) => {
                let stem = path.file_stem().and_then(|stem| stem.to_str());
                if stem != Some(record.id.as_str()) {
                    warn!(
                        path = %path.display(),
                        id = %record.id,
                        "instinct record id does not match its file name; skipped"
                    );
                    return None;
                }
                Some(record)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "malformed instinct record skipped");
                None
            }
        }
    }
}

impl InstinctRepository for DirectoryInstinctStore {
    fn get(&self, id: &str) -> Result<Option<InstinctRecord>> {
        let path = self.record_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Self::read_record(&path))
    }

    /// The new text goes to a `.tmp` sibling, is fsync'd, then renamed over
    /// the record so readers never observe a partial file.
    fn put(&self, record: &InstinctRecord) -> Result<()> {
        let path = self.record_path(&record.id)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating instinct directory {}", self.dir.display()))?;

        let tmp_path = path.with_file_name(format!("{}.{EXTENSION}.tmp", record.id));
        let write_result: Result<()> = (|| {
            let mut file = File::create(&tmp_path)?;
            file.write_all(record.to_text().as_bytes())?;
            file.flush()?;
            file.sync_all()?;
            Ok(())
        })();

        if let Err(err) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.context(format!("writing instinct {}", tmp_path.display())));
        }
        if let Err(err) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err).with_context(|| format!("replacing instinct {}", path.display()));
        }

        debug!(id = %record.id, path = %path.display(), "instinct written");
        Ok(())
    }

    fn list(&self, filter: &InstinctFilter) -> Result<Vec<InstinctRecord>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("listing instinct directory {}", self.dir.display()));
            }
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) || !path.is_file() {
                continue;
            }
            if let Some(record) = Self::read_record(&path) {
                if filter.matches(&record) {
                    records.push(record);
                }
            }
        }

        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let path = self.record_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("deleting instinct {}", path.display())),
        }
    }
}
