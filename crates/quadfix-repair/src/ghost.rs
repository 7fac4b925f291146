//! Ghost contexts: named graphs holding data that the context registry
//! does not know about.
//!
//! A write that updates data and the registry in two steps leaves a ghost
//! when it is interrupted in between. Ghost data is invisible to context
//! management but still counts towards the store size.
//!
//! Predicate, as SPARQL:
//!
//! ```text
//! SELECT ?context (COUNT(?s) AS ?cnt) WHERE {
//!   GRAPH ?context { ?s ?p ?o }
//!   FILTER (?context NOT IN (<MetaContext>, <VoIDContext>))
//!   FILTER (NOT EXISTS { ?context rdf:type <Context> })
//! } GROUP BY ?context
//! ```

use crate::error::RepairError;
use crate::handle::StoreHandle;
use crate::progress::Progress;
use quadfix_store::{IndexOrdering, NativeStore, Term};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, error};

pub const META_CONTEXT: &str = "http://www.fluidops.com/MetaContext";
pub const VOID_CONTEXT: &str = "http://www.fluidops.com/VoIDContext";
pub const CONTEXT_CLASS: &str = "http://www.fluidops.com/Context";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GhostContext {
    pub context: Term,
    pub triple_count: u64,
}

fn is_system_context(context: &Term) -> bool {
    matches!(context, Term::Iri { value } if value == META_CONTEXT || value == VOID_CONTEXT)
}

/// Subjects typed as registered contexts, in any graph.
fn registered_contexts(store: &NativeStore) -> BTreeSet<Term> {
    let rdf_type = Term::iri(RDF_TYPE);
    let context_class = Term::iri(CONTEXT_CLASS);
    store
        .scan()
        .filter(|quad| quad.predicate == rdf_type && quad.object == context_class)
        .map(|quad| quad.subject.clone())
        .collect()
}

/// Every named graph that fails the registry check, sorted by context.
pub fn detect_ghost_contexts(store: &NativeStore) -> Vec<GhostContext> {
    let registered = registered_contexts(store);
    store
        .context_counts()
        .into_iter()
        .filter(|(context, count)| {
            *count > 0 && !is_system_context(context) && !registered.contains(context)
        })
        .map(|(context, triple_count)| GhostContext {
            context,
            triple_count,
        })
        .collect()
}

/// Delete all ghost context data from the store at `path`; returns the new size.
///
/// Only meaningful on a store whose indexes agree with each other: on a
/// desynchronized store, registry entries may be missing from the index
/// being read and valid data would be removed.
pub fn remove_ghost_contexts(
    path: &Path,
    ordering: &IndexOrdering,
    progress: &mut dyn Progress,
) -> Result<u64, RepairError> {
    let cleanup_error = |message: String| {
        error!("error while removing garbage contexts: {message}");
        RepairError::GhostCleanup {
            path: path.display().to_string(),
            message,
        }
    };

    let mut handle =
        StoreHandle::open_writable(path, ordering).map_err(|e| cleanup_error(e.to_string()))?;

    progress.line("Deleting garbage contents from repository ...");
    progress.line("(Note: Depending on the triple store size this might take several minutes)");

    let ghosts: BTreeSet<Term> = detect_ghost_contexts(handle.store())
        .into_iter()
        .map(|ghost| ghost.context)
        .collect();
    let removed = handle
        .store_mut()
        .remove_matching(|quad| quad.context.as_ref().is_some_and(|c| ghosts.contains(c)))
        .map_err(|e| cleanup_error(e.to_string()))?;
    handle
        .store_mut()
        .commit()
        .map_err(|e| cleanup_error(e.to_string()))?;
    let size = handle.size();
    handle.close().map_err(|e| cleanup_error(e.to_string()))?;

    debug!(contexts = ghosts.len(), removed, "removed ghost contexts");
    progress.line(&format!("Repository size after cleanup: {size}"));
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadfix_store::Quad;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_store_path(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "quadfix-ghost-{prefix}-{}-{unique}",
            std::process::id()
        ))
    }

    fn data(n: usize, graph: &str) -> Quad {
        Quad::new(
            Term::iri(format!("urn:s{n}")),
            Term::iri("urn:p"),
            Term::literal(n.to_string()),
            Some(Term::iri(graph)),
        )
    }

    fn registration(graph: &str) -> Quad {
        Quad::new(
            Term::iri(graph),
            Term::iri(RDF_TYPE),
            Term::iri(CONTEXT_CLASS),
            Some(Term::iri(META_CONTEXT)),
        )
    }

    #[test]
    fn unregistered_named_graphs_are_ghosts() {
        let path = temp_store_path("detect");
        let ordering: IndexOrdering = "spoc".parse().expect("ordering");
        let mut handle = StoreHandle::create(&path, &ordering).expect("create");
        let store = handle.store_mut();
        store.insert(registration("urn:registered")).expect("insert");
        store.extend((0..3).map(|n| data(n, "urn:registered"))).expect("insert");
        store.extend((0..2).map(|n| data(n, "urn:orphan"))).expect("insert");
        store.extend((0..4).map(|n| data(n, VOID_CONTEXT))).expect("insert");
        store
            .insert(Quad::new(
                Term::iri("urn:s"),
                Term::iri("urn:p"),
                Term::iri("urn:o"),
                None,
            ))
            .expect("insert");

        let ghosts = detect_ghost_contexts(handle.store());
        assert_eq!(
            ghosts,
            vec![GhostContext {
                context: Term::iri("urn:orphan"),
                triple_count: 2,
            }]
        );

        drop(handle);
        let _ = fs::remove_dir_all(path);
    }
}
