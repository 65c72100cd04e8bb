use std::io;
use std::path::{Path, PathBuf};

/// Failure of the atomic file store.
///
/// Exactly two kinds cross the store boundary: the source side could not
/// be opened, or the destination could not be created, written or
/// installed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot open {}: {source}", path.display())]
    CannotOpen { path: PathBuf, source: io::Error },

    #[error("cannot save {}: {source}", path.display())]
    CannotSave { path: PathBuf, source: io::Error },
}

impl StoreError {
    pub(crate) fn cannot_open(path: &Path, source: io::Error) -> Self {
        StoreError::CannotOpen {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn cannot_save(path: &Path, source: io::Error) -> Self {
        StoreError::CannotSave {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_cannot_open(&self) -> bool {
        matches!(self, StoreError::CannotOpen { .. })
    }

    pub fn path(&self) -> &Path {
        match self {
            StoreError::CannotOpen { path, .. } | StoreError::CannotSave { path, .. } => path,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No claimable marker right now. Not a failure: poll again later.
    #[error("nothing available in the queue")]
    NothingAvailable,

    #[error("queue I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),
}
