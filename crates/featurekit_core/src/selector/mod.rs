//! Selector parsing and matching.
//!
//! # Responsibility
//! - Parse CSS-like selector strings once into a reusable [`Selector`].
//! - Answer `matches` / `find_all` against the current document state.
//!
//! # Invariants
//! - Matching is pure: no caching across calls, every query walks the tree as
//!   it is now.
//! - Only element nodes ever match.

pub mod error;
pub mod matcher;
mod parser;

pub use error::{SelectorErrorKind, SelectorSyntaxError};
pub use matcher::{closest, find_all, find_inclusive, matches, query, select, FindAll};

use crate::dom::{Document, NodeId};
use parser::ComplexSelector;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<ComplexSelector>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorSyntaxError> {
        let alternatives = parser::parse_selector_list(source)?;
        Ok(Self {
            source: source.trim().to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `node` is an element matched by any alternative.
    pub fn matches(&self, document: &Document, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|complex| matcher::matches_complex(document, node, complex))
    }

    /// Lazy pre-order search below `root`, excluding `root`.
    pub fn find_all<'a>(&'a self, document: &'a Document, root: NodeId) -> FindAll<'a> {
        FindAll::new(document, self, root, false)
    }

    /// Like [`Selector::find_all`] but also yields `root` when it matches.
    pub fn find_inclusive<'a>(&'a self, document: &'a Document, root: NodeId) -> FindAll<'a> {
        FindAll::new(document, self, root, true)
    }
}

impl FromStr for Selector {
    type Err = SelectorSyntaxError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::parse(source)
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
