//! Quad model: the records every index stores.

use crate::ordering::Component;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An RDF term.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Term {
    Iri {
        value: String,
    },
    Blank {
        value: String,
    },
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri {
            value: value.into(),
        }
    }

    pub fn blank(value: impl Into<String>) -> Self {
        Self::Blank {
            value: value.into(),
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Self::Iri { .. })
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Iri { value } | Self::Blank { value } | Self::Literal { value, .. } => value,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri { value } => write!(f, "<{value}>"),
            Self::Blank { value } => write!(f, "_:{value}"),
            Self::Literal {
                value,
                datatype,
                lang,
            } => {
                write!(f, "\"{value}\"")?;
                if let Some(lang) = lang {
                    write!(f, "@{lang}")?;
                } else if let Some(datatype) = datatype {
                    write!(f, "^^<{datatype}>")?;
                }
                Ok(())
            }
        }
    }
}

/// A subject–predicate–object statement, optionally inside a named graph.
///
/// `context == None` is the default graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quad {
    #[serde(rename = "s")]
    pub subject: Term,
    #[serde(rename = "p")]
    pub predicate: Term,
    #[serde(rename = "o")]
    pub object: Term,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Term>,
}

impl Quad {
    pub fn new(subject: Term, predicate: Term, object: Term, context: Option<Term>) -> Self {
        Self {
            subject,
            predicate,
            object,
            context,
        }
    }

    pub fn component(&self, component: Component) -> Option<&Term> {
        match component {
            Component::Subject => Some(&self.subject),
            Component::Predicate => Some(&self.predicate),
            Component::Object => Some(&self.object),
            Component::Context => self.context.as_ref(),
        }
    }
}

/// A quad pattern: `None` positions match anything.
///
/// For the context position, `Some(None)` matches only the default graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuadPattern {
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
    pub context: Option<Option<Term>>,
}

impl QuadPattern {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: Term) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_predicate(mut self, predicate: Term) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_object(mut self, object: Term) -> Self {
        self.object = Some(object);
        self
    }

    pub fn in_context(mut self, context: Option<Term>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn matches(&self, quad: &Quad) -> bool {
        self.subject.as_ref().is_none_or(|s| *s == quad.subject)
            && self.predicate.as_ref().is_none_or(|p| *p == quad.predicate)
            && self.object.as_ref().is_none_or(|o| *o == quad.object)
            && self.context.as_ref().is_none_or(|c| *c == quad.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_json_omits_default_graph() {
        let quad = Quad::new(
            Term::iri("urn:s"),
            Term::iri("urn:p"),
            Term::literal("v"),
            None,
        );
        let line = serde_json::to_string(&quad).expect("quad should serialize");
        assert!(!line.contains("\"c\""));
        let back: Quad = serde_json::from_str(&line).expect("quad should parse");
        assert_eq!(back, quad);
    }

    #[test]
    fn pattern_distinguishes_default_graph_from_wildcard() {
        let in_graph = Quad::new(
            Term::iri("urn:s"),
            Term::iri("urn:p"),
            Term::iri("urn:o"),
            Some(Term::iri("urn:g")),
        );
        let default_graph = Quad {
            context: None,
            ..in_graph.clone()
        };

        let wildcard = QuadPattern::any().with_subject(Term::iri("urn:s"));
        assert!(wildcard.matches(&in_graph));
        assert!(wildcard.matches(&default_graph));

        let only_default = QuadPattern::any().in_context(None);
        assert!(!only_default.matches(&in_graph));
        assert!(only_default.matches(&default_graph));
    }

    #[test]
    fn term_display_uses_ntriples_style() {
        assert_eq!(Term::iri("urn:x").to_string(), "<urn:x>");
        assert_eq!(Term::blank("b0").to_string(), "_:b0");
        assert_eq!(Term::literal("hi").to_string(), "\"hi\"");
    }
}
