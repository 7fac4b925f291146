//! Index orderings: which physical permutation indexes a store maintains.
//!
//! A permutation such as `spoc` or `cpso` names the sort order of one
//! physical index. An ordering is the non-empty, duplicate-free list of
//! permutations a store is opened with, written as `spoc,psoc`.

use crate::quad::{Quad, Term};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One of the four quad positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Subject,
    Predicate,
    Object,
    Context,
}

impl Component {
    fn from_char(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Subject),
            'p' => Some(Self::Predicate),
            'o' => Some(Self::Object),
            'c' => Some(Self::Context),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Subject => 's',
            Self::Predicate => 'p',
            Self::Object => 'o',
            Self::Context => 'c',
        }
    }
}

/// A validated permutation of `s`, `p`, `o`, `c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permutation([Component; 4]);

/// Sort key of one quad under a permutation.
pub type IndexKey = [Option<Term>; 4];

impl Permutation {
    pub fn components(&self) -> &[Component; 4] {
        &self.0
    }

    /// Key used to order `quad` inside this permutation's index.
    pub fn key(&self, quad: &Quad) -> IndexKey {
        self.0.map(|component| quad.component(component).cloned())
    }

    /// File name of the index file backing this permutation.
    pub fn file_name(&self) -> String {
        format!("triples-{self}.dat")
    }
}

impl FromStr for Permutation {
    type Err = OrderingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || OrderingError::InvalidPermutation(s.to_string());
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 4 {
            return Err(invalid());
        }
        let mut components = [Component::Subject; 4];
        for (slot, c) in components.iter_mut().zip(chars) {
            *slot = Component::from_char(c).ok_or_else(invalid)?;
        }
        for (i, component) in components.iter().enumerate() {
            if components[i + 1..].contains(component) {
                return Err(invalid());
            }
        }
        Ok(Self(components))
    }
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in self.0 {
            write!(f, "{}", component.as_char())?;
        }
        Ok(())
    }
}

/// Ordered, non-empty set of permutations, e.g. `spoc,psoc`.
///
/// The first permutation is the primary index: it answers full scans and the
/// store-level count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexOrdering {
    permutations: Vec<Permutation>,
}

impl IndexOrdering {
    pub fn single(permutation: Permutation) -> Self {
        Self {
            permutations: vec![permutation],
        }
    }

    pub fn permutations(&self) -> &[Permutation] {
        &self.permutations
    }

    pub fn primary(&self) -> Permutation {
        self.permutations[0]
    }

    pub fn len(&self) -> usize {
        self.permutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permutations.is_empty()
    }

    /// One single-permutation ordering per element, in declaration order.
    pub fn components(&self) -> Vec<IndexOrdering> {
        self.permutations.iter().copied().map(Self::single).collect()
    }
}

impl FromStr for IndexOrdering {
    type Err = OrderingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut permutations: Vec<Permutation> = Vec::new();
        for raw in s.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(OrderingError::Empty(s.to_string()));
            }
            let permutation: Permutation = raw.parse()?;
            if permutations.contains(&permutation) {
                return Err(OrderingError::Duplicate(raw.to_string()));
            }
            permutations.push(permutation);
        }
        Ok(Self { permutations })
    }
}

impl fmt::Display for IndexOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, permutation) in self.permutations.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{permutation}")?;
        }
        Ok(())
    }
}

impl Serialize for IndexOrdering {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Errors from parsing an index ordering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderingError {
    #[error("empty index ordering element in `{0}`")]
    Empty(String),

    #[error("`{0}` is not a permutation of s, p, o, c")]
    InvalidPermutation(String),

    #[error("duplicate permutation `{0}` in index ordering")]
    Duplicate(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders_canonical_form() {
        let ordering: IndexOrdering = " spoc , psoc".parse().expect("ordering should parse");
        assert_eq!(ordering.to_string(), "spoc,psoc");
        assert_eq!(ordering.len(), 2);
        assert_eq!(ordering.primary().to_string(), "spoc");
    }

    #[test]
    fn components_split_into_single_orderings() {
        let ordering: IndexOrdering = "cspo,cpso,cops".parse().expect("ordering should parse");
        let parts: Vec<String> = ordering
            .components()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(parts, vec!["cspo", "cpso", "cops"]);
    }

    #[test]
    fn rejects_malformed_orderings() {
        assert!(matches!(
            "".parse::<IndexOrdering>(),
            Err(OrderingError::Empty(_))
        ));
        assert!(matches!(
            "spoc,,psoc".parse::<IndexOrdering>(),
            Err(OrderingError::Empty(_))
        ));
        assert!(matches!(
            "spo".parse::<IndexOrdering>(),
            Err(OrderingError::InvalidPermutation(p)) if p == "spo"
        ));
        assert!(matches!(
            "spos".parse::<IndexOrdering>(),
            Err(OrderingError::InvalidPermutation(_))
        ));
        assert!(matches!(
            "spox".parse::<IndexOrdering>(),
            Err(OrderingError::InvalidPermutation(_))
        ));
        assert!(matches!(
            "spoc,spoc".parse::<IndexOrdering>(),
            Err(OrderingError::Duplicate(p)) if p == "spoc"
        ));
    }

    #[test]
    fn permutation_key_follows_component_order() {
        let quad = Quad::new(
            Term::iri("urn:s"),
            Term::iri("urn:p"),
            Term::literal("o"),
            Some(Term::iri("urn:c")),
        );
        let psoc: Permutation = "psoc".parse().expect("permutation should parse");
        let key = psoc.key(&quad);
        assert_eq!(key[0], Some(Term::iri("urn:p")));
        assert_eq!(key[1], Some(Term::iri("urn:s")));
        assert_eq!(key[3], Some(Term::iri("urn:c")));
        assert_eq!(psoc.file_name(), "triples-psoc.dat");
    }
}
