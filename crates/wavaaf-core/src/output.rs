//! Crash-safe output files
//!
//! Everything the converter writes goes to `<name>.partial` first and is
//! renamed into place once complete. A [`TempFileGuard`] removes the partial
//! file on every path that does not reach the rename, and can also hold a
//! renamed file until the rest of its output set is in place.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Removes a file on drop unless disarmed
pub(crate) struct TempFileGuard {
    path: PathBuf,
    disarmed: bool,
}

impl TempFileGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            disarmed: false,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Prevent cleanup on drop
    pub(crate) fn disarm(&mut self) {
        self.disarmed = true;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.disarmed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                // Only warn if file exists - it's OK if it was never created
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to clean up {:?}: {}", self.path, e);
                }
            }
        }
    }
}

/// `<path>.partial`
pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// A partial file that becomes `target` on [`commit`](Self::commit)
pub(crate) struct PartialFile {
    target: PathBuf,
    guard: TempFileGuard,
}

impl PartialFile {
    /// Write `bytes` to the partial path of `target`
    pub(crate) fn write(target: &Path, bytes: &[u8]) -> std::io::Result<Self> {
        let guard = TempFileGuard::new(partial_path(target));
        let mut file = std::fs::File::create(guard.path())?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(Self {
            target: target.to_path_buf(),
            guard,
        })
    }

    pub(crate) fn target(&self) -> &Path {
        &self.target
    }

    /// Rename into place
    pub(crate) fn commit(mut self) -> std::io::Result<PathBuf> {
        std::fs::rename(self.guard.path(), &self.target)?;
        self.guard.disarm();
        Ok(self.target)
    }
}

/// Write a whole file through a partial file and rename
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
    PartialFile::write(target, bytes)?.commit()
}
