//! Filesystem helpers shared by the store and the queue.

use std::fs;
use std::io;
use std::path::Path;

/// Remove whatever sits at `path` unless it is a regular file.
///
/// Directories are removed recursively; symlinks are unlinked, never
/// followed. A missing path is fine.
pub(crate) fn remove_if_not_regular(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let file_type = meta.file_type();
    let removed = if file_type.is_file() {
        return Ok(());
    } else if file_type.is_dir() {
        tracing::warn!("Removing stray directory at {:?}", path);
        fs::remove_dir_all(path)
    } else {
        tracing::warn!("Removing stray non-regular entry at {:?}", path);
        fs::remove_file(path)
    };

    ignore_not_found(removed)
}

/// Whether `path` is a regular file, without following symlinks.
pub(crate) fn is_regular_file(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_file())
}

pub(crate) fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Flush directory metadata so a completed rename survives power loss.
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_regular_files_and_ignores_missing() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("f");
        fs::write(&file, b"x")?;
        remove_if_not_regular(&file)?;
        assert!(is_regular_file(&file));
        remove_if_not_regular(&dir.path().join("missing"))?;
        Ok(())
    }

    #[test]
    fn removes_directories_recursively() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let stray = dir.path().join("stray");
        fs::create_dir_all(stray.join("nested"))?;
        fs::write(stray.join("nested/file"), b"x")?;
        remove_if_not_regular(&stray)?;
        assert!(!stray.exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn unlinks_symlinks_without_touching_target() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("target");
        fs::write(&target, b"keep me")?;
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link)?;

        remove_if_not_regular(&link)?;
        assert!(fs::symlink_metadata(&link).is_err());
        assert_eq!(fs::read(&target)?, b"keep me");
        Ok(())
    }
}
