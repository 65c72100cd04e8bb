//! Crash-safe storage of per-owner artifacts.
//!
//! Every write goes to a side-channel temporary file and is installed with
//! a single `rename`, so a reader of the final path sees either the
//! previous complete content or the new complete content, never a mix.
//!
//! Each session writes to its own `<artifact>.<session>.tmp`, created
//! exclusively, so overlapping writers of one artifact never share bytes;
//! the last commit wins. A session that ends in an error leaves its
//! temporary file behind. Later writers delete leftovers once they are
//! older than [`STALE_TMP_AGE`].

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use spool_core::{Artifact, OwnerKey};
use ulid::Ulid;

use crate::error::StoreError;
use crate::fs::{ignore_not_found, remove_if_not_regular, sync_dir};

/// Age after which a temporary file is treated as abandoned.
pub const STALE_TMP_AGE: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct AtomicStore {
    root: PathBuf,
}

impl AtomicStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn owner_dir(&self, key: &OwnerKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    pub fn artifact_path(&self, key: &OwnerKey, artifact: Artifact) -> PathBuf {
        self.owner_dir(key).join(artifact.file_name())
    }

    /// Temporary files of write sessions for `artifact`, live or abandoned.
    pub fn tmp_files(&self, key: &OwnerKey, artifact: Artifact) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.owner_dir(key);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::cannot_open(&dir, e)),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::cannot_open(&dir, e))?;
            if entry
                .file_name()
                .to_str()
                .is_some_and(|name| artifact.is_tmp_file_name(name))
            {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Open an artifact for reading.
    ///
    /// A directory or symlink left at the artifact path is deleted first,
    /// not followed. Fails with [`StoreError::CannotOpen`] if no regular
    /// file remains.
    pub fn open_for_read(&self, key: &OwnerKey, artifact: Artifact) -> Result<File, StoreError> {
        let path = self.artifact_path(key, artifact);
        remove_if_not_regular(&path).map_err(|e| StoreError::cannot_open(&path, e))?;
        File::open(&path).map_err(|e| StoreError::cannot_open(&path, e))
    }

    pub fn read_to_vec(&self, key: &OwnerKey, artifact: Artifact) -> Result<Vec<u8>, StoreError> {
        let mut file = self.open_for_read(key, artifact)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| StoreError::cannot_open(&self.artifact_path(key, artifact), e))?;
        Ok(buf)
    }

    pub fn read_to_string(&self, key: &OwnerKey, artifact: Artifact) -> Result<String, StoreError> {
        let bytes = self.read_to_vec(key, artifact)?;
        String::from_utf8(bytes).map_err(|e| {
            StoreError::cannot_open(
                &self.artifact_path(key, artifact),
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })
    }

    /// Start a write session for an artifact.
    ///
    /// Creates the owner directory when absent, clears stray non-regular
    /// entries at the final path and removes abandoned temporary files of
    /// the same artifact. The returned writer must be
    /// [committed](ArtifactWriter::commit) for the content to become
    /// visible.
    pub fn open_for_write(
        &self,
        key: &OwnerKey,
        artifact: Artifact,
    ) -> Result<ArtifactWriter, StoreError> {
        let dir = self.owner_dir(key);
        let final_path = dir.join(artifact.file_name());
        let tmp_path = dir.join(artifact.tmp_file_name(&Ulid::new().to_string()));

        fs::create_dir_all(&dir).map_err(|e| StoreError::cannot_save(&dir, e))?;
        remove_if_not_regular(&final_path).map_err(|e| StoreError::cannot_save(&final_path, e))?;
        self.remove_stale_tmp_files(key, artifact)?;

        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .map_err(|e| StoreError::cannot_save(&tmp_path, e))?;

        Ok(ArtifactWriter {
            file: Some(BufWriter::new(file)),
            dir,
            tmp_path,
            final_path,
            committed: false,
        })
    }

    fn remove_stale_tmp_files(&self, key: &OwnerKey, artifact: Artifact) -> Result<(), StoreError> {
        let now = SystemTime::now();
        for path in self.tmp_files(key, artifact)? {
            let Ok(meta) = fs::symlink_metadata(&path) else {
                continue;
            };
            if !meta.file_type().is_file() {
                remove_if_not_regular(&path).map_err(|e| StoreError::cannot_save(&path, e))?;
                continue;
            }

            let age = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age >= STALE_TMP_AGE {
                tracing::debug!("Removing abandoned write session {:?}", path);
                ignore_not_found(fs::remove_file(&path))
                    .map_err(|e| StoreError::cannot_save(&path, e))?;
            }
        }
        Ok(())
    }

    /// Scoped write: run `f` against a fresh write session and install the
    /// result only if `f` returns `Ok`.
    pub fn write_with<T, E, F>(&self, key: &OwnerKey, artifact: Artifact, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut ArtifactWriter) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut writer = self.open_for_write(key, artifact)?;
        let value = f(&mut writer)?;
        writer.commit()?;
        Ok(value)
    }

    /// Replace an artifact with `bytes`.
    pub fn write_bytes(
        &self,
        key: &OwnerKey,
        artifact: Artifact,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        self.write_with(key, artifact, |w| {
            w.write_all(bytes)
                .map_err(|e| StoreError::cannot_save(&w.tmp_path, e))
        })
    }
}

/// Write half of a store session.
///
/// Dropping the writer without calling [`commit`](Self::commit) abandons
/// the session: the final artifact is untouched and the temporary file
/// stays where it is.
#[derive(Debug)]
pub struct ArtifactWriter {
    file: Option<BufWriter<File>>,
    dir: PathBuf,
    tmp_path: PathBuf,
    final_path: PathBuf,
    committed: bool,
}

impl ArtifactWriter {
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Flush, fsync and atomically install the written content.
    pub fn commit(mut self) -> Result<(), StoreError> {
        let writer = self.file.take().ok_or_else(|| {
            StoreError::cannot_save(&self.tmp_path, io::Error::other("write session already closed"))
        })?;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::cannot_save(&self.tmp_path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| StoreError::cannot_save(&self.tmp_path, e))?;
        drop(file);

        fs::rename(&self.tmp_path, &self.final_path)
            .map_err(|e| StoreError::cannot_save(&self.final_path, e))?;
        self.committed = true;

        if let Err(e) = sync_dir(&self.dir) {
            tracing::debug!("Failed to sync {:?}: {}", self.dir, e);
        }
        Ok(())
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("write session already closed"))
    }
}

impl Write for ArtifactWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!(
                "Abandoned write session, leaving {:?} for a later writer",
                self.tmp_path
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn key() -> OwnerKey {
        OwnerKey::parse("a1b2c3d4e5f60718293a4b5c6d7e8f90").expect("valid key")
    }

    #[test]
    fn round_trip_arbitrary_bytes() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());
        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

        store.write_bytes(&key(), Artifact::Result, &content)?;
        assert_eq!(store.read_to_vec(&key(), Artifact::Result)?, content);
        Ok(())
    }

    #[test]
    fn round_trip_empty_content() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());

        store.write_bytes(&key(), Artifact::Input, b"")?;
        assert!(store.read_to_vec(&key(), Artifact::Input)?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_artifact_cannot_open() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());

        let err = store.open_for_read(&key(), Artifact::Result).err();
        assert!(matches!(err, Some(StoreError::CannotOpen { .. })));
        Ok(())
    }

    #[test]
    fn abandoned_session_keeps_previous_content() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());
        store.write_bytes(&key(), Artifact::Result, b"old complete")?;

        let mut writer = store.open_for_write(&key(), Artifact::Result)?;
        writer.write_all(b"new but unfinis")?;
        writer.flush()?;
        drop(writer);

        assert_eq!(store.read_to_vec(&key(), Artifact::Result)?, b"old complete");
        assert_eq!(store.tmp_files(&key(), Artifact::Result)?.len(), 1);
        Ok(())
    }

    #[test]
    fn abandoned_first_session_leaves_nothing_readable() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());

        let mut writer = store.open_for_write(&key(), Artifact::Result)?;
        writer.write_all(b"partial")?;
        drop(writer);

        assert!(matches!(
            store.open_for_read(&key(), Artifact::Result),
            Err(StoreError::CannotOpen { .. })
        ));
        Ok(())
    }

    #[test]
    fn next_writer_removes_stale_temp() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());

        let mut writer = store.open_for_write(&key(), Artifact::Result)?;
        writer.write_all(b"a much longer abandoned payload")?;
        writer.flush()?;
        let leftover = writer.tmp_path().to_path_buf();
        drop(writer);
        File::options()
            .write(true)
            .open(&leftover)?
            .set_modified(SystemTime::now() - STALE_TMP_AGE - Duration::from_secs(60))?;

        store.write_bytes(&key(), Artifact::Result, b"short")?;
        assert_eq!(store.read_to_vec(&key(), Artifact::Result)?, b"short");
        assert!(store.tmp_files(&key(), Artifact::Result)?.is_empty());
        Ok(())
    }

    #[test]
    fn overlapping_sessions_never_mix_bytes() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());

        let mut first = store.open_for_write(&key(), Artifact::Input)?;
        first.write_all(b"AAAAAAAAAA")?;
        first.flush()?;

        let mut second = store.open_for_write(&key(), Artifact::Input)?;
        second.write_all(b"BB")?;
        assert_ne!(first.tmp_path(), second.tmp_path());

        first.write_all(b"CCC")?;
        first.commit()?;
        assert_eq!(store.read_to_vec(&key(), Artifact::Input)?, b"AAAAAAAAAACCC");

        second.commit()?;
        assert_eq!(store.read_to_vec(&key(), Artifact::Input)?, b"BB");
        assert!(store.tmp_files(&key(), Artifact::Input)?.is_empty());
        Ok(())
    }

    #[test]
    fn recent_temp_of_another_session_is_left_alone() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());

        let mut slow = store.open_for_write(&key(), Artifact::Result)?;
        slow.write_all(b"still writing")?;
        store.write_bytes(&key(), Artifact::Result, b"quick")?;

        assert!(slow.tmp_path().exists());
        slow.commit()?;
        assert_eq!(store.read_to_vec(&key(), Artifact::Result)?, b"still writing");
        Ok(())
    }

    #[test]
    fn write_with_error_does_not_install() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());
        store.write_bytes(&key(), Artifact::Result, b"v1")?;

        let outcome: Result<(), Box<dyn std::error::Error>> =
            store.write_with(&key(), Artifact::Result, |w| {
                w.write_all(b"v2")?;
                Err("processing blew up".into())
            });

        assert!(outcome.is_err());
        assert_eq!(store.read_to_vec(&key(), Artifact::Result)?, b"v1");
        Ok(())
    }

    #[test]
    fn stray_directory_at_read_path_is_removed() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());
        let path = store.artifact_path(&key(), Artifact::Progress);
        fs::create_dir_all(path.join("junk"))?;

        assert!(store.open_for_read(&key(), Artifact::Progress).is_err());
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn stray_directory_at_write_paths_is_replaced() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());
        fs::create_dir_all(store.artifact_path(&key(), Artifact::Result))?;
        fs::create_dir_all(
            store
                .owner_dir(&key())
                .join(Artifact::Result.tmp_file_name("stray")),
        )?;

        store.write_bytes(&key(), Artifact::Result, b"fresh")?;
        assert_eq!(store.read_to_string(&key(), Artifact::Result)?, "fresh");
        assert!(store.tmp_files(&key(), Artifact::Result)?.is_empty());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlink_at_read_path_is_not_followed() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path());
        let secret = dir.path().join("secret");
        fs::write(&secret, b"do not leak")?;
        fs::create_dir_all(store.owner_dir(&key()))?;
        std::os::unix::fs::symlink(&secret, store.artifact_path(&key(), Artifact::Result))?;

        assert!(store.open_for_read(&key(), Artifact::Result).is_err());
        assert_eq!(fs::read(&secret)?, b"do not leak");
        Ok(())
    }

    #[test]
    fn owner_directory_is_created_on_first_write() -> TestResult {
        let dir = tempfile::tempdir()?;
        let store = AtomicStore::new(dir.path().join("nested/root"));
        assert!(!store.owner_dir(&key()).exists());

        store.write_bytes(&key(), Artifact::Input, b"[]")?;
        assert!(store.owner_dir(&key()).is_dir());
        Ok(())
    }
}
