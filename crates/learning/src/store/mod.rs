pub mod directory;
pub mod redb;

use anyhow::Result;
use homunculus_config::{InstinctBackend, LearningConfig};

pub use self::directory::DirectoryInstinctStore;
pub use self::redb::RedbInstinctStore;
use crate::repository::InstinctRepository;

/// Open the backend selected by `instincts.backend`.
pub fn open_configured(config: &LearningConfig) -> Result<Box<dyn InstinctRepository>> {
    let path = config.instincts_path();
    Ok(match config.instincts.backend {
        InstinctBackend::Directory => Box::new(DirectoryInstinctStore::new(path)),
        InstinctBackend::Redb => Box::new(RedbInstinctStore::open(path)?),
    })
}
