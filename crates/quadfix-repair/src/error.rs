//! Probe faults and fatal repair errors.

use quadfix_store::StoreError;
use serde::Serialize;

/// Why one index ordering failed its probe.
///
/// Faults are recorded in a `RepositoryState`; they never abort an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    #[error("store not found: {path}")]
    NotFound { path: String },

    #[error("store is locked: {lock_path}")]
    Locked {
        lock_path: String,
        holder_pid: Option<u32>,
    },

    /// The store-level count and a full scan disagree.
    #[error("size of repository via store count and full scan differs: {store_count} vs. {scan_count}")]
    SizeMismatch { store_count: u64, scan_count: u64 },

    /// Opening or reading the indexes failed.
    #[error("{message}")]
    ProbeFailure { message: String },
}

impl From<StoreError> for Fault {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { path } => Self::NotFound { path },
            StoreError::Locked {
                lock_path,
                holder_pid,
            } => Self::Locked {
                lock_path,
                holder_pid,
            },
            other => Self::ProbeFailure {
                message: other.to_string(),
            },
        }
    }
}

/// Conditions that end an analysis or repair run.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("repository not found: {path}")]
    NotFound { path: String },

    #[error("repository is locked: {lock_path}")]
    Locked {
        lock_path: String,
        holder_pid: Option<u32>,
    },

    /// The path has no final component to derive `.tmp`/`.bak` siblings from.
    #[error("repository path has no directory name: {path}")]
    InvalidPath { path: String },

    #[error("database cannot be automatically recovered, all indices are corrupt")]
    AllOrderingsCorrupt,

    #[error("temporary folder for repository from incomplete recovery exists at {path}")]
    TempDirectoryExists { path: String },

    #[error("target repository already exists at {path}")]
    TargetExists { path: String },

    #[error("backup folder already exists at {path}")]
    BackupExists { path: String },

    /// Copying into the temporary store failed. The source is untouched.
    #[error("error while rebuilding repository from {source_ordering} index: {message}")]
    Rebuild {
        source_ordering: String,
        message: String,
        source_path: String,
        tmp_path: String,
    },

    #[error("failed to move {from} to {to}: {message}")]
    Swap {
        from: String,
        to: String,
        message: String,
    },

    /// The original was moved to the backup, but the rebuilt store could
    /// not be moved into its place.
    #[error("failed to move {tmp_path} to {target_path}: {message}")]
    SwapIncomplete {
        tmp_path: String,
        target_path: String,
        backup_path: String,
        message: String,
        restored: bool,
    },

    #[error("error while removing garbage contexts from {path}: {message}")]
    GhostCleanup { path: String, message: String },
}

impl RepairError {
    /// Whether another recovery source may succeed where this attempt failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rebuild { .. })
    }

    /// What the operator has to do before trying again.
    pub fn remediation(&self) -> String {
        match self {
            Self::NotFound { path } => format!("check the repository path {path}"),
            Self::Locked {
                lock_path,
                holder_pid: Some(pid),
            } => format!(
                "make sure that the repository is not accessed by any other process; the lock was taken by process {pid}, remove {lock_path} only if that process is no longer running"
            ),
            Self::Locked { .. } => {
                "make sure that the repository is not accessed by any other process".to_string()
            }
            Self::InvalidPath { path } => {
                format!("name the repository directory explicitly instead of {path}")
            }
            Self::AllOrderingsCorrupt => {
                "restore the repository from a backup; no index can serve as recovery source"
                    .to_string()
            }
            Self::TempDirectoryExists { path } => format!("remove {path} manually"),
            Self::TargetExists { path } => {
                format!("choose another target or remove {path} manually")
            }
            Self::BackupExists { path } => format!("move {path} out of the way"),
            Self::Rebuild {
                source_path,
                tmp_path,
                ..
            } => format!(
                "the original repository is still in place at {source_path}; remove temporary files from {tmp_path} manually"
            ),
            Self::Swap { from, to, .. } => {
                format!("inspect {from} and {to} and move the repository into place manually")
            }
            Self::SwapIncomplete {
                tmp_path,
                target_path,
                restored: true,
                ..
            } => format!(
                "the original repository was moved back to {target_path}; the rebuilt copy is still at {tmp_path} and must be removed before retrying"
            ),
            Self::SwapIncomplete {
                tmp_path,
                target_path,
                backup_path,
                ..
            } => format!(
                "nothing is left at {target_path}: move {backup_path} back to {target_path}, or move the rebuilt copy {tmp_path} there"
            ),
            Self::GhostCleanup { path, .. } => {
                format!("the rebuilt repository at {path} still contains garbage contexts; rerun with --cleanup --garbageCheck")
            }
        }
    }
}
