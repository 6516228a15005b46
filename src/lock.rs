//! Run-level lock over the backup directory.
//!
//! The backup directory is the one resource touched by both orchestrators
//! and the retention pass, so a run takes an exclusive lock file before
//! doing anything else. `create_new` gives the atomicity; the file body
//! carries pid and start time so a contending operator can see who holds it.

use crate::{BrdrError, Result};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOCK_FILE: &str = ".brdr.lock";

/// Exclusive hold on a backup directory for the duration of one run.
///
/// Released on drop; a leftover lock from a crashed run must be removed by
/// the operator (its content names the dead pid).
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock, failing fast with [`BrdrError::Locked`] if another
    /// run holds it.
    pub fn acquire(backup_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(backup_dir)?;
        let path = backup_dir.join(LOCK_FILE);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let body = format!("pid={} started={}", std::process::id(), Utc::now().to_rfc3339());
                file.write_all(body.as_bytes())?;
                debug!(lock = %path.display(), "acquired backup directory lock");
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path)
                    .unwrap_or_else(|_| "unknown holder".to_string());
                Err(BrdrError::Locked { holder })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release lock file");
        }
    }
}
