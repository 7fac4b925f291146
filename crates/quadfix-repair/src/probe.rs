//! Probing one index ordering.

use crate::error::Fault;
use crate::ghost::{GhostContext, detect_ghost_contexts};
use crate::handle::StoreHandle;
use crate::progress::Progress;
use quadfix_store::IndexOrdering;
use serde::Serialize;
use std::path::Path;

/// What one probe found. Either a size or a fault, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryState {
    ordering: IndexOrdering,
    size: Option<u64>,
    corrupt_fault: Option<Fault>,
    ghosts: Vec<GhostContext>,
}

impl RepositoryState {
    pub fn healthy(ordering: IndexOrdering, size: u64, ghosts: Vec<GhostContext>) -> Self {
        Self {
            ordering,
            size: Some(size),
            corrupt_fault: None,
            ghosts,
        }
    }

    pub fn corrupt(ordering: IndexOrdering, fault: Fault) -> Self {
        Self {
            ordering,
            size: None,
            corrupt_fault: Some(fault),
            ghosts: Vec::new(),
        }
    }

    pub fn ordering(&self) -> &IndexOrdering {
        &self.ordering
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.corrupt_fault.as_ref()
    }

    pub fn is_corrupt(&self) -> bool {
        self.corrupt_fault.is_some()
    }

    pub fn ghosts(&self) -> &[GhostContext] {
        &self.ghosts
    }

    pub fn is_affected_by_ghosts(&self) -> bool {
        !self.ghosts.is_empty()
    }

    pub fn ghost_triple_count(&self) -> u64 {
        self.ghosts.iter().map(|ghost| ghost.triple_count).sum()
    }
}

/// Open the store under `ordering` and check it against itself.
///
/// The store-level count and a full scan must agree. Every failure is
/// folded into the returned state.
pub fn probe_ordering(
    path: &Path,
    ordering: &IndexOrdering,
    check_ghosts: bool,
    progress: &mut dyn Progress,
) -> RepositoryState {
    match measure(path, ordering, check_ghosts) {
        Ok((size, ghosts)) => {
            progress.line(&format!("  Size: {size}"));
            if !ghosts.is_empty() {
                progress.line(&format!("  Garbage contexts: {}", ghosts.len()));
            }
            RepositoryState::healthy(ordering.clone(), size, ghosts)
        }
        Err(fault) => {
            progress.line(&format!("  Error: {fault}"));
            RepositoryState::corrupt(ordering.clone(), fault)
        }
    }
}

fn measure(
    path: &Path,
    ordering: &IndexOrdering,
    check_ghosts: bool,
) -> Result<(u64, Vec<GhostContext>), Fault> {
    let handle = StoreHandle::open(path, ordering)?;
    let store_count = handle.size();
    let scan_count = handle.scan_count();
    if store_count != scan_count {
        return Err(Fault::SizeMismatch {
            store_count,
            scan_count,
        });
    }
    let ghosts = if check_ghosts {
        detect_ghost_contexts(handle.store())
    } else {
        Vec::new()
    };
    handle.close()?;
    Ok((store_count, ghosts))
}
