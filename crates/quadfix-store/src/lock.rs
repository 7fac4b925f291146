//! Exclusive store lock: a `lock` file created with `create_new`.
//!
//! ```text
//! pid=<process id of the holder>
//! utc=<RFC 3339 time the lock was taken>
//! ```
//!
//! A lock left behind by a crashed process is never broken automatically;
//! the recorded pid is reported so an operator can decide.

use crate::error::StoreError;
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const LOCK_FILE_NAME: &str = "lock";

pub fn store_lock_path(store_dir: &Path) -> PathBuf {
    store_dir.join(LOCK_FILE_NAME)
}

/// Process id recorded in the store's lock file, if it is present and legible.
pub fn read_lock_holder(store_dir: &Path) -> Option<u32> {
    let text = fs::read_to_string(store_lock_path(store_dir)).ok()?;
    text.lines()
        .find_map(|line| line.strip_prefix("pid="))
        .and_then(|pid| pid.trim().parse().ok())
}

/// `Locked` error for `store_dir`, naming the recorded holder.
pub fn locked_error(store_dir: &Path) -> StoreError {
    StoreError::Locked {
        lock_path: store_lock_path(store_dir).display().to_string(),
        holder_pid: read_lock_holder(store_dir),
    }
}

/// Held for as long as a store is open. Dropping it removes the lock file.
#[derive(Debug)]
pub struct StoreLockGuard {
    lock_path: PathBuf,
    _file: File,
}

impl StoreLockGuard {
    pub fn acquire(store_dir: &Path) -> Result<Self, StoreError> {
        let lock_path = store_lock_path(store_dir);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "pid={}\nutc={}",
                    std::process::id(),
                    Utc::now().to_rfc3339()
                );
                Ok(Self {
                    lock_path,
                    _file: file,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let locked = locked_error(store_dir);
                warn!(store = %store_dir.display(), error = %locked, "store lock is held");
                Err(locked)
            }
            Err(err) => Err(StoreError::LockIo {
                lock_path: lock_path.display().to_string(),
                message: err.to_string(),
            }),
        }
    }
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
