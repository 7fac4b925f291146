//! Consistency analysis across redundant index orderings, and repair.
//!
//! One run moves through these phases and never re-enters probing once
//! the store has been classified:
//!
//! ```text
//! Start → ProbingDefault → ProbingIndividual(1..n) → Classified
//!   Classified → Healthy
//!   Classified → Repairing → Repaired | Failed
//!   Classified → Unrecoverable
//! ```
//!
//! An analysis-only run of a corrupt store stops at `Classified`.

use crate::error::RepairError;
use crate::ghost::{GhostContext, remove_ghost_contexts};
use crate::handle::check_accessible;
use crate::probe::{RepositoryState, probe_ordering};
use crate::progress::Progress;
use crate::recovery::{
    RebuildOutcome, RecoveryCandidate, RecoveryEngine, RecoveryPlan, rebuild_with_fallback,
    recovery_candidates,
};
use quadfix_store::{IndexOrdering, reset_index_configuration};
use serde::Serialize;
use std::iter;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Start,
    ProbingDefault,
    ProbingIndividual(usize),
    Classified,
    Healthy,
    Repairing,
    Repaired,
    Failed,
    Unrecoverable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Classification {
    Healthy,
    /// The three findings are independent and may co-occur.
    Corrupt {
        index_fault: bool,
        out_of_sync: bool,
        ghosts: bool,
    },
    Unrecoverable,
}

impl Classification {
    pub fn classify(default_state: &RepositoryState, index_states: &[RepositoryState]) -> Self {
        if !index_states.is_empty() && index_states.iter().all(RepositoryState::is_corrupt) {
            return Self::Unrecoverable;
        }
        // The default probe only self-checks the primary index; a broken
        // secondary index shows up in its individual probe alone.
        let index_fault =
            default_state.is_corrupt() || index_states.iter().any(RepositoryState::is_corrupt);

        let all_states = || iter::once(default_state).chain(index_states);
        let sizes: Vec<u64> = all_states().filter_map(RepositoryState::size).collect();
        let out_of_sync = sizes.windows(2).any(|pair| pair[0] != pair[1]);
        let ghosts = all_states().any(RepositoryState::is_affected_by_ghosts);

        if index_fault || out_of_sync || ghosts {
            Self::Corrupt {
                index_fault,
                out_of_sync,
                ghosts,
            }
        } else {
            Self::Healthy
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub path: PathBuf,
    pub default_ordering: IndexOrdering,
    pub check_ghosts: bool,
    pub default_state: RepositoryState,
    pub index_states: Vec<RepositoryState>,
    pub classification: Classification,
}

impl AnalysisResult {
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self.classification, Classification::Unrecoverable)
    }

    pub fn ghosts_detected(&self) -> bool {
        matches!(self.classification, Classification::Corrupt { ghosts: true, .. })
    }

    /// Ghost contexts from the first probe that looked for them.
    pub fn ghost_contexts(&self) -> &[GhostContext] {
        iter::once(&self.default_state)
            .chain(&self.index_states)
            .find(|state| state.is_affected_by_ghosts())
            .map(RepositoryState::ghosts)
            .unwrap_or(&[])
    }

    pub fn candidates(&self) -> Vec<RecoveryCandidate> {
        recovery_candidates(&self.index_states)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Healthy {
        size: u64,
    },
    /// Analysis only: problems found, nothing changed.
    Corrupt {
        recovery_source: Option<IndexOrdering>,
    },
    /// Analysis only: no index can serve as recovery source.
    Unrecoverable,
    Repaired {
        rebuild: RebuildOutcome,
        ghost_cleanup_size: Option<u64>,
        final_size: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    pub analysis: AnalysisResult,
    pub outcome: AnalysisOutcome,
}

pub struct ConsistencyAnalyzer<'p> {
    progress: &'p mut dyn Progress,
    phase: RunPhase,
}

impl<'p> ConsistencyAnalyzer<'p> {
    pub fn new(progress: &'p mut dyn Progress) -> Self {
        Self {
            progress,
            phase: RunPhase::Start,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(from = ?self.phase, to = ?phase, "analysis phase");
        self.phase = phase;
    }

    /// Analyze and report; never repairs.
    pub fn analyze(
        &mut self,
        path: &Path,
        ordering: &IndexOrdering,
        check_ghosts: bool,
    ) -> Result<AnalysisReport, RepairError> {
        let analysis = self.inspect(path, ordering, check_ghosts)?;
        self.report(&analysis);
        let outcome = match analysis.classification {
            Classification::Healthy => {
                self.enter(RunPhase::Healthy);
                AnalysisOutcome::Healthy {
                    size: analysis.default_state.size().unwrap_or_default(),
                }
            }
            Classification::Unrecoverable => {
                self.enter(RunPhase::Unrecoverable);
                AnalysisOutcome::Unrecoverable
            }
            Classification::Corrupt { .. } => AnalysisOutcome::Corrupt {
                recovery_source: analysis
                    .candidates()
                    .first()
                    .map(|candidate| candidate.ordering.clone()),
            },
        };
        Ok(AnalysisReport { analysis, outcome })
    }

    /// Analyze, report, and rebuild `target` from the best surviving index
    /// when the store is not healthy.
    pub fn analyze_and_fix(
        &mut self,
        source: &Path,
        target: &Path,
        ordering: &IndexOrdering,
        check_ghosts: bool,
    ) -> Result<AnalysisReport, RepairError> {
        let analysis = self.inspect(source, ordering, check_ghosts)?;
        self.report(&analysis);
        if analysis.classification.is_healthy() {
            self.enter(RunPhase::Healthy);
            let size = analysis.default_state.size().unwrap_or_default();
            return Ok(AnalysisReport {
                analysis,
                outcome: AnalysisOutcome::Healthy { size },
            });
        }

        let outcome = self.repair(&analysis, target)?;
        Ok(AnalysisReport { analysis, outcome })
    }

    fn inspect(
        &mut self,
        path: &Path,
        ordering: &IndexOrdering,
        check_ghosts: bool,
    ) -> Result<AnalysisResult, RepairError> {
        self.progress
            .line(&format!("Analyzing repository at {}", path.display()));
        if let Err(err) = check_accessible(path, ordering) {
            if matches!(err, RepairError::Locked { .. }) {
                self.progress.line(
                    "Repository is locked. Please make sure that the repository is not accessed by any other process.",
                );
            }
            return Err(err);
        }

        self.enter(RunPhase::ProbingDefault);
        self.progress.line(&format!(
            "1) Checking repository state with default indices ({ordering})"
        ));
        let default_state = probe_ordering(path, ordering, check_ghosts, &mut *self.progress);

        self.progress
            .line("2) Checking repository state with individual indices");
        let check_individual_ghosts = default_state.is_corrupt() && check_ghosts;
        let mut index_states = Vec::with_capacity(ordering.len());
        for (i, component) in ordering.components().into_iter().enumerate() {
            self.enter(RunPhase::ProbingIndividual(i + 1));
            self.progress.line(&format!(" Checking {component} index"));
            index_states.push(probe_ordering(
                path,
                &component,
                check_individual_ghosts,
                &mut *self.progress,
            ));
        }

        if let Err(err) = reset_index_configuration(path) {
            warn!(error = %err, "failed to reset index configuration after analysis");
        }

        let classification = Classification::classify(&default_state, &index_states);
        self.enter(RunPhase::Classified);
        Ok(AnalysisResult {
            path: path.to_path_buf(),
            default_ordering: ordering.clone(),
            check_ghosts,
            default_state,
            index_states,
            classification,
        })
    }

    fn report(&mut self, analysis: &AnalysisResult) {
        self.progress.line("3) Analysis result:");
        match analysis.classification {
            Classification::Healthy => {
                let size = analysis.default_state.size().unwrap_or_default();
                if analysis.check_ghosts {
                    self.progress.line(&format!(
                        " * Repository is healthy (No garbage contexts detected, size: {size})"
                    ));
                } else {
                    self.progress.line(&format!(
                        " * Repository is healthy (No checks for garbage contexts, size: {size})"
                    ));
                }
            }
            Classification::Unrecoverable => {
                self.report_index_faults(analysis);
                self.progress.line(
                    " * All available indices are corrupt, repository cannot be repaired.",
                );
            }
            Classification::Corrupt {
                index_fault,
                out_of_sync,
                ghosts,
            } => {
                if index_fault {
                    self.report_index_faults(analysis);
                }
                if out_of_sync {
                    self.progress.line(
                        " * Repository indices are out of synch: size of at least one index configuration differs",
                    );
                }
                if ghosts {
                    let contexts = analysis.ghost_contexts();
                    let triples: u64 = contexts.iter().map(|ghost| ghost.triple_count).sum();
                    self.progress.line(&format!(
                        " * Repository is affected by inconsistent index states: {} garbage contexts ({triples} triples)",
                        contexts.len()
                    ));
                    for ghost in contexts {
                        self.progress.line(&format!(
                            "   - {} (Triples: {})",
                            ghost.context, ghost.triple_count
                        ));
                    }
                }
                if let Some(best) = analysis.candidates().first() {
                    self.progress.line(&format!(
                        " * Index {} can be used for recovery process.",
                        best.ordering
                    ));
                }
            }
        }
    }

    fn report_index_faults(&mut self, analysis: &AnalysisResult) {
        if let Some(fault) = analysis.default_state.fault() {
            self.progress
                .line(&format!(" * Repository indices are corrupt: {fault}"));
        }
        for state in &analysis.index_states {
            if let Some(fault) = state.fault() {
                self.progress.line(&format!(
                    " * {} index is corrupt: {fault}",
                    state.ordering()
                ));
            }
        }
    }

    fn repair(
        &mut self,
        analysis: &AnalysisResult,
        target: &Path,
    ) -> Result<AnalysisOutcome, RepairError> {
        self.progress.line("4) Trying to repair database");
        let candidates = analysis.candidates();
        if analysis.is_unrecoverable() || candidates.is_empty() {
            self.progress
                .line(" * Cannot recover database, all indices are corrupt.");
            self.enter(RunPhase::Unrecoverable);
            return Err(RepairError::AllOrderingsCorrupt);
        }

        self.enter(RunPhase::Repairing);
        self.progress.line(&format!(
            "Trying to recover database using {} index",
            candidates[0].ordering
        ));
        let remove_ghosts = analysis.check_ghosts && analysis.ghosts_detected();
        if remove_ghosts {
            self.progress.line(
                "(Note: garbage contexts arising through invalid data states will be removed in this process)",
            );
        }

        let source = analysis.path.as_path();
        let target_ordering = &analysis.default_ordering;
        let rebuilt = rebuild_with_fallback(&candidates, &mut *self.progress, |ordering, progress| {
            RecoveryEngine::new(progress).rebuild(&RecoveryPlan {
                source_ordering: ordering.clone(),
                target_ordering: target_ordering.clone(),
                source_path: source.to_path_buf(),
                target_path: target.to_path_buf(),
            })
        });
        let rebuild = match rebuilt {
            Ok(rebuild) => rebuild,
            Err(err) => {
                self.enter(RunPhase::Failed);
                return Err(err);
            }
        };

        let mut ghost_cleanup_size = None;
        if remove_ghosts {
            if rebuild.size_drift() {
                self.progress.warning(
                    "rebuilt repository differs in size from its source; garbage contexts were not removed. Validate the repository, then run the cleanup with garbage check.",
                );
            } else {
                match remove_ghost_contexts(target, target_ordering, &mut *self.progress) {
                    Ok(size) => ghost_cleanup_size = Some(size),
                    Err(err) => {
                        self.enter(RunPhase::Failed);
                        return Err(err);
                    }
                }
            }
        }

        self.enter(RunPhase::Repaired);
        let final_size = ghost_cleanup_size.unwrap_or(rebuild.size_new);
        match &rebuild.backup_path {
            Some(backup) => self.progress.line(&format!(
                "Repository was repaired, backup at {} (size: {final_size})",
                backup.display()
            )),
            None => self.progress.line(&format!(
                "Repository was repaired into {} (size: {final_size})",
                rebuild.target_path.display()
            )),
        }
        Ok(AnalysisOutcome::Repaired {
            rebuild,
            ghost_cleanup_size,
            final_size,
        })
    }
}
