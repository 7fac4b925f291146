//! # quadfix-repair
//!
//! Consistency analysis and repair for native quad stores.
//!
//! A store keeps the same quads under several index orderings. A crash in
//! the middle of a write can leave those indexes disagreeing with each
//! other, or leave named graphs that the context registry never heard of.
//!
//! This crate provides:
//! - `probe_ordering` (open a store under one ordering and self-check it)
//! - `ConsistencyAnalyzer` (probe every ordering, classify, optionally repair)
//! - `RecoveryEngine` (rebuild a store from one trusted ordering)
//! - ghost context detection and removal
//!
//! ## Repair flow
//!
//! ```text
//! probe default ordering ─┐
//! probe each single index ─┴→ classify → pick largest healthy index
//!     → copy into <target>.tmp → swap (<source>.bak) → remove ghosts
//! ```

pub mod analyze;
pub mod error;
pub mod ghost;
pub mod handle;
pub mod probe;
pub mod progress;
pub mod recovery;

pub use analyze::{
    AnalysisOutcome, AnalysisReport, AnalysisResult, Classification, ConsistencyAnalyzer,
    RunPhase,
};
pub use error::{Fault, RepairError};
pub use ghost::{
    CONTEXT_CLASS, GhostContext, META_CONTEXT, RDF_TYPE, VOID_CONTEXT, detect_ghost_contexts,
    remove_ghost_contexts,
};
pub use handle::{StoreHandle, check_accessible};
pub use probe::{RepositoryState, probe_ordering};
pub use progress::{ConsoleProgress, ConsoleStream, Progress, RecordedProgress};
pub use recovery::{
    MAX_RECOVERY_ATTEMPTS, RebuildOutcome, RecoveryCandidate, RecoveryEngine, RecoveryPlan,
    backup_path_for, rebuild_with_fallback, recovery_candidates, tmp_path_for,
};
