//! The native quad store: a directory of redundant permutation indexes.
//!
//! ```text
//! <store>/
//!   triples.prop        active ordering, `triple-indexes=spoc,psoc`
//!   triples-spoc.dat    one index file per permutation
//!   triples-psoc.dat
//!   lock                present while a process has the store open
//! ```
//!
//! Every configured index holds the full quad set in its own sort order.
//! The primary (first) index answers scans and the store-level count.

use crate::error::StoreError;
use crate::index_file::{LoadedIndex, read_index, write_atomically, write_index};
use crate::lock::StoreLockGuard;
use crate::ordering::IndexOrdering;
use crate::quad::{Quad, QuadPattern, Term};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MARKER_FILE_NAME: &str = "triples.prop";
const MARKER_KEY: &str = "triple-indexes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Delete the index-configuration marker of a store, if present.
///
/// While the marker exists, `open` uses the ordering it records instead of
/// the requested one.
pub fn reset_index_configuration(store_dir: impl AsRef<Path>) -> Result<(), StoreError> {
    let marker = store_dir.as_ref().join(MARKER_FILE_NAME);
    match fs::remove_file(&marker) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StoreError::io(&marker, err)),
    }
}

/// Read the ordering recorded in the marker file, if any.
pub fn read_index_configuration(
    store_dir: impl AsRef<Path>,
) -> Result<Option<IndexOrdering>, StoreError> {
    let marker = store_dir.as_ref().join(MARKER_FILE_NAME);
    let text = match fs::read_to_string(&marker) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StoreError::io(&marker, err)),
    };
    for line in text.lines() {
        if let Some((key, value)) = line.split_once('=')
            && key.trim() == MARKER_KEY
        {
            let ordering = value
                .trim()
                .parse()
                .map_err(|e| StoreError::corrupt(&marker, format!("{e}")))?;
            return Ok(Some(ordering));
        }
    }
    Err(StoreError::corrupt(&marker, format!("missing {MARKER_KEY}")))
}

fn write_index_configuration(store_dir: &Path, ordering: &IndexOrdering) -> Result<(), StoreError> {
    let marker = store_dir.join(MARKER_FILE_NAME);
    write_atomically(&marker, |writer| writeln!(writer, "{MARKER_KEY}={ordering}"))
}

fn has_index_files(store_dir: &Path) -> Result<bool, StoreError> {
    let entries = fs::read_dir(store_dir).map_err(|e| StoreError::io(store_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(store_dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("triples-") && name.ends_with(".dat") {
            return Ok(true);
        }
    }
    Ok(false)
}

/// An open store. Holds the store lock until dropped or closed.
///
/// Writes stay in memory until `commit` or `close`; dropping a writable
/// store without closing it discards them.
#[derive(Debug)]
pub struct NativeStore {
    path: PathBuf,
    ordering: IndexOrdering,
    mode: AccessMode,
    indexes: Vec<LoadedIndex>,
    dirty: bool,
    _lock: StoreLockGuard,
}

impl NativeStore {
    /// Open an existing store directory.
    pub fn open(
        path: impl AsRef<Path>,
        requested: &IndexOrdering,
        mode: AccessMode,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(StoreError::NotFound {
                path: path.display().to_string(),
            });
        }
        let lock = StoreLockGuard::acquire(path)?;

        let ordering = match read_index_configuration(path)? {
            Some(recorded) => {
                if recorded != *requested {
                    debug!(
                        store = %path.display(),
                        %recorded,
                        %requested,
                        "index configuration marker overrides requested ordering"
                    );
                }
                recorded
            }
            None => requested.clone(),
        };

        let fresh = !has_index_files(path)?;
        let mut indexes = Vec::with_capacity(ordering.len());
        for permutation in ordering.permutations() {
            let file = path.join(permutation.file_name());
            if file.exists() {
                indexes.push(read_index(&file, *permutation)?);
            } else if fresh {
                indexes.push(LoadedIndex::empty(*permutation));
            } else {
                return Err(StoreError::MissingIndex {
                    permutation: permutation.to_string(),
                    path: path.display().to_string(),
                });
            }
        }

        if mode == AccessMode::ReadWrite {
            write_index_configuration(path, &ordering)?;
        }
        debug!(store = %path.display(), %ordering, ?mode, "opened native store");

        Ok(Self {
            path: path.to_path_buf(),
            ordering,
            mode,
            indexes,
            dirty: false,
            _lock: lock,
        })
    }

    /// Create a brand-new, empty store. The directory must not hold any files.
    pub fn create(path: impl AsRef<Path>, ordering: &IndexOrdering) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if path.exists() {
            let occupied = fs::read_dir(path)
                .map_err(|e| StoreError::io(path, e))?
                .next()
                .is_some();
            if occupied {
                return Err(StoreError::AlreadyExists {
                    path: path.display().to_string(),
                });
            }
        }
        fs::create_dir_all(path).map_err(|e| StoreError::io(path, e))?;
        let lock = StoreLockGuard::acquire(path)?;

        let mut store = Self {
            path: path.to_path_buf(),
            ordering: ordering.clone(),
            mode: AccessMode::ReadWrite,
            indexes: ordering
                .permutations()
                .iter()
                .copied()
                .map(LoadedIndex::empty)
                .collect(),
            dirty: true,
            _lock: lock,
        };
        store.commit()?;
        Ok(store)
    }

    /// The ordering actually in effect (the marker's, if one was present).
    pub fn ordering(&self) -> &IndexOrdering {
        &self.ordering
    }

    fn primary(&self) -> &LoadedIndex {
        &self.indexes[0]
    }

    /// Store-level count, as recorded by the primary index.
    pub fn size(&self) -> u64 {
        self.primary().recorded_count
    }

    /// All quads, in primary index order.
    pub fn scan(&self) -> impl Iterator<Item = &Quad> {
        self.primary().entries.values()
    }

    /// Count by walking every record of the primary index.
    pub fn scan_count(&self) -> u64 {
        self.scan().count() as u64
    }

    pub fn matching<'a>(&'a self, pattern: &'a QuadPattern) -> impl Iterator<Item = &'a Quad> {
        self.scan().filter(move |quad| pattern.matches(quad))
    }

    pub fn contains(&self, pattern: &QuadPattern) -> bool {
        self.matching(pattern).next().is_some()
    }

    /// Number of quads per named graph. The default graph is not included.
    pub fn context_counts(&self) -> BTreeMap<Term, u64> {
        let mut counts = BTreeMap::new();
        for quad in self.scan() {
            if let Some(context) = &quad.context {
                *counts.entry(context.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        match self.mode {
            AccessMode::ReadWrite => Ok(()),
            AccessMode::ReadOnly => Err(StoreError::ReadOnly {
                path: self.path.display().to_string(),
            }),
        }
    }

    /// Insert into every index. Returns whether the primary index was new to it.
    pub fn insert(&mut self, quad: Quad) -> Result<bool, StoreError> {
        self.ensure_writable()?;
        let mut added_to_primary = false;
        for (i, index) in self.indexes.iter_mut().enumerate() {
            let key = index.permutation.key(&quad);
            if index.entries.insert(key, quad.clone()).is_none() {
                index.recorded_count += 1;
                if i == 0 {
                    added_to_primary = true;
                }
            }
        }
        self.dirty = true;
        Ok(added_to_primary)
    }

    /// Insert many quads; returns how many were new.
    pub fn extend<I>(&mut self, quads: I) -> Result<u64, StoreError>
    where
        I: IntoIterator<Item = Quad>,
    {
        let mut added = 0;
        for quad in quads {
            if self.insert(quad)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Remove every quad accepted by `predicate` from all indexes.
    pub fn remove_matching<F>(&mut self, mut predicate: F) -> Result<u64, StoreError>
    where
        F: FnMut(&Quad) -> bool,
    {
        self.ensure_writable()?;
        let doomed: Vec<Quad> = self.scan().filter(|quad| predicate(quad)).cloned().collect();
        for index in &mut self.indexes {
            for quad in &doomed {
                let key = index.permutation.key(quad);
                if index.entries.remove(&key).is_some() {
                    index.recorded_count = index.recorded_count.saturating_sub(1);
                }
            }
        }
        if !doomed.is_empty() {
            self.dirty = true;
        }
        Ok(doomed.len() as u64)
    }

    /// Persist dirty indexes and the configuration marker.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_writable()?;
        if !self.dirty {
            return Ok(());
        }
        for index in &mut self.indexes {
            let file = self.path.join(index.permutation.file_name());
            index.recorded_count = write_index(&file, index.permutation, index.entries.values())?;
        }
        write_index_configuration(&self.path, &self.ordering)?;
        self.dirty = false;
        Ok(())
    }

    /// Commit (if writable) and release the lock.
    pub fn close(mut self) -> Result<(), StoreError> {
        if self.mode == AccessMode::ReadWrite {
            self.commit()?;
        }
        debug!(store = %self.path.display(), "closed native store");
        Ok(())
    }
}
