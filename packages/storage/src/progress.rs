//! Reading and writing the progress marker through the atomic store.

use spool_core::{Artifact, OwnerKey, Progress};

use crate::error::StoreError;
use crate::store::AtomicStore;

/// Current progress for `key`; an owner that never submitted reads as
/// [`Progress::New`].
pub fn read_progress(store: &AtomicStore, key: &OwnerKey) -> Result<Progress, StoreError> {
    match store.read_to_string(key, Artifact::Progress) {
        Ok(text) => Ok(Progress::from_marker(&text)),
        Err(StoreError::CannotOpen { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(Progress::New)
        }
        Err(e) => Err(e),
    }
}

pub fn write_progress(
    store: &AtomicStore,
    key: &OwnerKey,
    progress: &Progress,
) -> Result<(), StoreError> {
    store.write_bytes(key, Artifact::Progress, progress.to_marker().as_bytes())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn never_submitted_reads_as_new() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());
        let key = OwnerKey::parse("ffffffffffffffffffffffffffffffff")?;

        let progress = read_progress(&store, &key)?;
        assert_eq!(progress, Progress::New);
        assert_eq!(progress.percent(), Some(-1));
        Ok(())
    }

    #[test]
    fn persists_numeric_and_failure_markers() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());
        let key = OwnerKey::parse("a1b2c3d4e5f60718293a4b5c6d7e8f90")?;

        write_progress(&store, &key, &Progress::Running { percent: 37 })?;
        assert_eq!(store.read_to_string(&key, Artifact::Progress)?, "37");
        assert_eq!(read_progress(&store, &key)?, Progress::Running { percent: 37 });

        write_progress(&store, &key, &Progress::failed("Cannot read input file."))?;
        assert_eq!(
            read_progress(&store, &key)?,
            Progress::failed("Cannot read input file.")
        );
        Ok(())
    }
}
