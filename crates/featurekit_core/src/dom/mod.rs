//! In-process host document model.
//!
//! The page DOM is the one globally shared mutable resource. Features and the
//! observer engine reach it through [`SharedDocument`], and every structural
//! edit is reported to observed roots as a [`MutationRecord`].

pub mod builder;
pub mod document;
pub mod mutation;
pub mod node;

pub use builder::{ElementSpec, NodeSpec};
pub use document::{Ancestors, Descendants, Document, DomError, SharedDocument};
pub use mutation::MutationRecord;
pub use node::{ElementData, NodeId, NodeKind};
