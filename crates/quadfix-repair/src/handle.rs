//! Scoped store access for probes and rebuilds.

use crate::error::RepairError;
use quadfix_store::{
    AccessMode, IndexOrdering, NativeStore, StoreError, locked_error, reset_index_configuration,
    store_lock_path,
};
use std::path::Path;
use tracing::debug;

/// One open store under one ordering.
///
/// Opening drops any cached index configuration first, so the store is read
/// through exactly the requested ordering. The store lock is released when
/// the handle is closed or dropped.
#[derive(Debug)]
pub struct StoreHandle {
    store: NativeStore,
}

impl StoreHandle {
    pub fn open(path: &Path, ordering: &IndexOrdering) -> Result<Self, StoreError> {
        Self::open_with(path, ordering, AccessMode::ReadOnly)
    }

    pub fn open_writable(path: &Path, ordering: &IndexOrdering) -> Result<Self, StoreError> {
        Self::open_with(path, ordering, AccessMode::ReadWrite)
    }

    fn open_with(
        path: &Path,
        ordering: &IndexOrdering,
        mode: AccessMode,
    ) -> Result<Self, StoreError> {
        if !path.is_dir() {
            return Err(StoreError::NotFound {
                path: path.display().to_string(),
            });
        }
        // A store in use keeps its configuration.
        if store_lock_path(path).exists() {
            return Err(locked_error(path));
        }
        reset_index_configuration(path)?;
        let store = NativeStore::open(path, ordering, mode)?;
        Ok(Self { store })
    }

    /// Create a fresh store directory.
    pub fn create(path: &Path, ordering: &IndexOrdering) -> Result<Self, StoreError> {
        let store = NativeStore::create(path, ordering)?;
        Ok(Self { store })
    }

    pub fn size(&self) -> u64 {
        self.store.size()
    }

    pub fn scan_count(&self) -> u64 {
        self.store.scan_count()
    }

    pub fn store(&self) -> &NativeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut NativeStore {
        &mut self.store
    }

    pub fn close(self) -> Result<(), StoreError> {
        self.store.close()
    }
}

/// Fail fast when the repository is missing or held by another process.
///
/// Other open errors are left for the probes to classify.
pub fn check_accessible(path: &Path, ordering: &IndexOrdering) -> Result<(), RepairError> {
    if !path.exists() {
        return Err(RepairError::NotFound {
            path: path.display().to_string(),
        });
    }
    match StoreHandle::open(path, ordering) {
        Ok(handle) => handle.close().or_else(|err| {
            debug!(error = %err, "accessibility probe close failed");
            Ok(())
        }),
        Err(StoreError::Locked {
            lock_path,
            holder_pid,
        }) => Err(RepairError::Locked {
            lock_path,
            holder_pid,
        }),
        Err(StoreError::NotFound { path }) => Err(RepairError::NotFound { path }),
        Err(err) => {
            debug!(error = %err, "accessibility probe failed; leaving it to classification");
            Ok(())
        }
    }
}
