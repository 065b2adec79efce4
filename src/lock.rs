//! Advisory lock serialising mutating operations

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::{SkillvaultError, SkillvaultResult};

pub const LOCK_FILE_NAME: &str = ".skillvault.lock";

/// Exclusive `flock` on `<dir>/.skillvault.lock`, released on drop
///
/// The file itself is left in place; removing it would race with the next
/// holder.
#[derive(Debug)]
pub struct BackupLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl BackupLock {
    /// Take the lock without waiting; contention is a `Conflict`
    pub fn acquire(dir: &Path) -> SkillvaultResult<Self> {
        fs::create_dir_all(dir).map_err(|e| SkillvaultError::from_write(e, dir.display()))?;
        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| SkillvaultError::from_write(e, path.display()))?;

        let mut lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                return Err(SkillvaultError::Conflict(format!(
                    "another skillvault process holds {}",
                    path.display()
                )));
            }
            Err((_, errno)) => {
                return Err(SkillvaultError::Io(format!(
                    "cannot lock {}: {}",
                    path.display(),
                    errno
                )));
            }
        };

        // pid is informational only
        let _ = lock
            .set_len(0)
            .and_then(|_| writeln!(lock, "{}", std::process::id()));
        tracing::debug!(path = %path.display(), "lock acquired");

        Ok(Self { _lock: lock, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
