//! Advisory single-writer lock for a queue document.
//!
//! The lock lives on a sibling `<queue>.lock` file and is released by the OS
//! when the holding process exits, so a crashed session never blocks the next
//! one.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{QueueError, Result};

/// Exclusive hold on a queue document for the lifetime of a session.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    /// Take the lock for `queue_path`, failing fast if another session holds it.
    pub fn acquire(queue_path: &Path) -> Result<Self> {
        let path = lock_path(queue_path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|err| QueueError::io("create directory", parent, err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|err| QueueError::io("open lock", &path, err))?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(QueueError::Locked { path }),
            Err(TryLockError::Error(err)) => return Err(QueueError::io("lock", &path, err)),
        }
        debug!(path = %path.display(), "session lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            debug!(path = %self.path.display(), err = %err, "session lock release failed");
        }
    }
}

/// `<queue>.lock` next to the queue document.
pub fn lock_path(queue_path: &Path) -> PathBuf {
    let mut name = queue_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
