//! Physical rebuild of a store from one trusted index ordering.
//!
//! ```text
//! <source>        opened read-only under the source ordering
//! <target>.tmp    fresh store under the target ordering, filled by a full copy
//! <source>.bak    the original, after an in-place swap (never removed)
//! <target>        the rebuilt store
//! ```

use crate::error::RepairError;
use crate::handle::{StoreHandle, check_accessible};
use crate::probe::RepositoryState;
use crate::progress::Progress;
use quadfix_store::{IndexOrdering, StoreError};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Attempts per repair: the best candidate plus one fallback.
pub const MAX_RECOVERY_ATTEMPTS: usize = 2;

/// `<parent>/<name><suffix>`, next to `path` and never inside it.
fn sibling_with_suffix(path: &Path, suffix: &str) -> Result<PathBuf, RepairError> {
    let name = path.file_name().ok_or_else(|| RepairError::InvalidPath {
        path: path.display().to_string(),
    })?;
    let mut sibling: OsString = name.to_os_string();
    sibling.push(suffix);
    Ok(match path.parent() {
        Some(parent) => parent.join(sibling),
        None => PathBuf::from(sibling),
    })
}

pub fn tmp_path_for(target: &Path) -> Result<PathBuf, RepairError> {
    sibling_with_suffix(target, ".tmp")
}

pub fn backup_path_for(source: &Path) -> Result<PathBuf, RepairError> {
    sibling_with_suffix(source, ".bak")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryPlan {
    pub source_ordering: IndexOrdering,
    pub target_ordering: IndexOrdering,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
}

impl RecoveryPlan {
    pub fn in_place(&self) -> bool {
        self.source_path == self.target_path
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildOutcome {
    pub source_ordering: IndexOrdering,
    pub target_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub size_old: u64,
    pub size_new: u64,
}

impl RebuildOutcome {
    /// Source and rebuilt store differ in size; needs manual validation.
    pub fn size_drift(&self) -> bool {
        self.size_old != self.size_new
    }
}

/// A healthy individual ordering that can serve as recovery source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryCandidate {
    pub ordering: IndexOrdering,
    pub size: u64,
}

/// Fault-free orderings, largest first; equal sizes keep probe order.
pub fn recovery_candidates(states: &[RepositoryState]) -> Vec<RecoveryCandidate> {
    let mut candidates: Vec<RecoveryCandidate> = states
        .iter()
        .filter(|state| !state.is_corrupt())
        .filter_map(|state| {
            state.size().map(|size| RecoveryCandidate {
                ordering: state.ordering().clone(),
                size,
            })
        })
        .collect();
    candidates.sort_by(|a, b| b.size.cmp(&a.size));
    candidates
}

/// Try candidates in order until one rebuild succeeds.
///
/// Only failures that left the source untouched move on to the next
/// candidate; the failed attempt's temporary store is removed first.
pub fn rebuild_with_fallback<F>(
    candidates: &[RecoveryCandidate],
    progress: &mut dyn Progress,
    mut attempt: F,
) -> Result<RebuildOutcome, RepairError>
where
    F: FnMut(&IndexOrdering, &mut dyn Progress) -> Result<RebuildOutcome, RepairError>,
{
    let mut last_error = RepairError::AllOrderingsCorrupt;
    for (i, candidate) in candidates.iter().take(MAX_RECOVERY_ATTEMPTS).enumerate() {
        if i > 0 {
            progress.line(&format!(
                "Retrying with second good index: {}",
                candidate.ordering
            ));
        }
        match attempt(&candidate.ordering, &mut *progress) {
            Ok(outcome) => return Ok(outcome),
            Err(err) if err.is_retryable() => {
                if let RepairError::Rebuild { tmp_path, .. } = &err {
                    discard_failed_attempt(Path::new(tmp_path));
                }
                last_error = err;
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_error)
}

fn discard_failed_attempt(tmp_path: &Path) {
    if !tmp_path.exists() {
        return;
    }
    match fs::remove_dir_all(tmp_path) {
        Ok(()) => debug!(path = %tmp_path.display(), "removed temporary store of failed attempt"),
        Err(err) => warn!(path = %tmp_path.display(), error = %err, "failed to remove temporary store"),
    }
}

pub struct RecoveryEngine<'p> {
    progress: &'p mut dyn Progress,
}

impl<'p> RecoveryEngine<'p> {
    pub fn new(progress: &'p mut dyn Progress) -> Self {
        Self { progress }
    }

    /// Rebuild `plan.target_path` from `plan.source_path`.
    ///
    /// The source is never modified before the copy has completed; an
    /// in-place rebuild keeps the original as `<source>.bak`.
    pub fn rebuild(&mut self, plan: &RecoveryPlan) -> Result<RebuildOutcome, RepairError> {
        let tmp_path = tmp_path_for(&plan.target_path)?;
        if tmp_path.exists() {
            return Err(RepairError::TempDirectoryExists {
                path: tmp_path.display().to_string(),
            });
        }
        if !plan.in_place() && plan.target_path.exists() {
            return Err(RepairError::TargetExists {
                path: plan.target_path.display().to_string(),
            });
        }
        let backup_path = if plan.in_place() {
            Some(backup_path_for(&plan.source_path)?)
        } else {
            None
        };
        if let Some(backup) = &backup_path
            && backup.exists()
        {
            return Err(RepairError::BackupExists {
                path: backup.display().to_string(),
            });
        }

        let (size_old, size_new) = match self.copy_into(plan, &tmp_path) {
            Ok(sizes) => sizes,
            Err(err) => {
                self.progress
                    .line(&format!("Error while rebuilding repository: {err}"));
                self.progress.line(&format!(
                    "The original repository is still in place at {}. Temporary files need to be removed manually from {}",
                    plan.source_path.display(),
                    tmp_path.display()
                ));
                return Err(RepairError::Rebuild {
                    source_ordering: plan.source_ordering.to_string(),
                    message: err.to_string(),
                    source_path: plan.source_path.display().to_string(),
                    tmp_path: tmp_path.display().to_string(),
                });
            }
        };

        if size_old != size_new {
            self.progress.warning(
                "repository size of old and new repository differ, please validate manually.",
            );
        }

        swap_into_place(
            &tmp_path,
            &plan.target_path,
            backup_path.as_deref(),
            |from, to| fs::rename(from, to),
        )?;
        if let Some(backup) = &backup_path {
            self.progress.line(&format!(
                "Note: the backup of the original repository is available at {}",
                backup.display()
            ));
        }
        self.progress.line(&format!(
            "Repository successfully rebuilt to {}",
            plan.target_path.display()
        ));

        Ok(RebuildOutcome {
            source_ordering: plan.source_ordering.clone(),
            target_path: plan.target_path.clone(),
            backup_path,
            size_old,
            size_new,
        })
    }

    fn copy_into(&mut self, plan: &RecoveryPlan, tmp_path: &Path) -> Result<(u64, u64), StoreError> {
        let source = StoreHandle::open(&plan.source_path, &plan.source_ordering)?;
        let size_old = source.size();
        self.progress
            .line(&format!("Original repository size: {size_old}"));

        let mut target = StoreHandle::create(tmp_path, &plan.target_ordering)?;
        self.progress
            .line("Copying contents of repository to new store ...");
        self.progress
            .line("(Note: Depending on the triple store size this might take several minutes)");
        target
            .store_mut()
            .extend(source.store().scan().cloned())?;
        target.store_mut().commit()?;
        let size_new = target.size();
        self.progress
            .line(&format!("New repository size: {size_new}"));

        target.close()?;
        source.close()?;
        Ok((size_old, size_new))
    }

    /// Rebuild a store under its own ordering. Drops garbage left in the
    /// index files and can shrink the store.
    pub fn compact(
        &mut self,
        source: &Path,
        target: &Path,
        ordering: &IndexOrdering,
    ) -> Result<RebuildOutcome, RepairError> {
        self.progress
            .line(&format!("Cleaning up repository at {}", source.display()));
        check_accessible(source, ordering)?;
        self.rebuild(&RecoveryPlan {
            source_ordering: ordering.clone(),
            target_ordering: ordering.clone(),
            source_path: source.to_path_buf(),
            target_path: target.to_path_buf(),
        })
    }
}

/// Move the rebuilt store at `tmp_path` to `target`.
///
/// With a `backup`, `target` is first moved there. If the second move then
/// fails, the backup is moved back so `target` is never left empty.
fn swap_into_place<R>(
    tmp_path: &Path,
    target: &Path,
    backup: Option<&Path>,
    mut rename: R,
) -> Result<(), RepairError>
where
    R: FnMut(&Path, &Path) -> io::Result<()>,
{
    if let Some(backup) = backup {
        rename(target, backup).map_err(|e| RepairError::Swap {
            from: target.display().to_string(),
            to: backup.display().to_string(),
            message: e.to_string(),
        })?;
    }

    let Err(err) = rename(tmp_path, target) else {
        return Ok(());
    };
    match backup {
        None => Err(RepairError::Swap {
            from: tmp_path.display().to_string(),
            to: target.display().to_string(),
            message: err.to_string(),
        }),
        Some(backup) => {
            let restored = match rename(backup, target) {
                Ok(()) => true,
                Err(restore_err) => {
                    warn!(
                        backup = %backup.display(),
                        error = %restore_err,
                        "failed to move original repository back into place"
                    );
                    false
                }
            };
            Err(RepairError::SwapIncomplete {
                tmp_path: tmp_path.display().to_string(),
                target_path: target.display().to_string(),
                backup_path: backup.display().to_string(),
                message: err.to_string(),
                restored,
            })
        }
    }
}
