//! # quadfix-store
//!
//! Native storage for subject–predicate–object–context quads.
//!
//! A store is a directory holding one index file per permutation of the
//! quad components (`spoc`, `psoc`, ...). Every index carries the complete
//! quad set, so any single healthy index is enough to rebuild the others.
//!
//! This crate provides:
//! - `Quad`, `Term` and `QuadPattern` (the records)
//! - `IndexOrdering` and `Permutation` (validated index configurations)
//! - index file read/write with integrity checks
//! - `NativeStore` (lock-scoped open/create, scan, count, mutate, commit)
//!
//! It does not decide whether a store is healthy. That lives in
//! `quadfix-repair`.

pub mod error;
pub mod index_file;
pub mod lock;
pub mod ordering;
pub mod quad;
pub mod store;

pub use error::StoreError;
pub use index_file::{INDEX_SCHEMA, IndexHeader, LoadedIndex, read_index, write_index};
pub use lock::{LOCK_FILE_NAME, StoreLockGuard, locked_error, read_lock_holder, store_lock_path};
pub use ordering::{Component, IndexKey, IndexOrdering, OrderingError, Permutation};
pub use quad::{Quad, QuadPattern, Term};
pub use store::{
    AccessMode, MARKER_FILE_NAME, NativeStore, read_index_configuration,
    reset_index_configuration,
};
