use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use fs4::FileExt;

use crate::error::{Result, SyncError};

/// File name of the writer lock inside the shared `.git` directory.
pub const LOCK_FILE_NAME: &str = "gitsync.lock";

/// Exclusive, advisory claim on a root: at most one syncer writes to it.
///
/// Released when dropped, and by the OS if the process dies.
#[derive(Debug)]
pub struct WriterLock {
    /// Open handle carrying the lock.
    file: File,
    /// Path of the lock file.
    path: PathBuf,
}

impl WriterLock {
    /// Try to take the lock in `git_dir` without waiting.
    pub fn acquire(git_dir: &Path) -> Result<Self> {
        let path = git_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(SyncError::Locked { path }),
            Err(e) => Err(SyncError::IoError(e)),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    #[allow(clippy::let_underscore_must_use)]
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
