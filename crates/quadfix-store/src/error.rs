//! Error types for native store operations.

use crate::ordering::OrderingError;

/// Errors raised while opening, reading or writing a native store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store directory does not exist.
    #[error("store not found: {path}")]
    NotFound { path: String },

    /// Another process holds the store lock.
    #[error("store is locked: {lock_path}{}", holder_note(.holder_pid))]
    Locked {
        lock_path: String,
        holder_pid: Option<u32>,
    },

    #[error("failed to acquire store lock {lock_path}: {message}")]
    LockIo { lock_path: String, message: String },

    /// `create` was pointed at a directory that already holds data.
    #[error("store already exists: {path}")]
    AlreadyExists { path: String },

    /// The store has index files, but not the one this ordering needs.
    #[error("index {permutation} missing in {path}")]
    MissingIndex { permutation: String, path: String },

    /// An index file failed validation.
    #[error("corrupt index {file}: {message}")]
    Corrupt { file: String, message: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("store opened read-only: {path}")]
    ReadOnly { path: String },

    #[error(transparent)]
    InvalidOrdering(#[from] OrderingError),
}

fn holder_note(holder_pid: &Option<u32>) -> String {
    holder_pid
        .map(|pid| format!(" (held by pid {pid})"))
        .unwrap_or_default()
}

impl StoreError {
    pub(crate) fn corrupt(file: &std::path::Path, message: impl Into<String>) -> Self {
        Self::Corrupt {
            file: file.display().to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Io(format!("{}: {err}", path.display()))
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
