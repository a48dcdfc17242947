//! Node identity and payload types.

use std::fmt::{Display, Formatter};

/// Stable identity of one node inside a [`crate::dom::Document`].
///
/// Ids are allocated monotonically and never reused, so two ids compare equal
/// only when they name the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Id of the document node itself.
    pub const DOCUMENT: NodeId = NodeId(0);

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Arena slot index for this node.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Payload carried by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
}

impl NodeKind {
    /// Whether this node kind may own children.
    pub fn accepts_children(&self) -> bool {
        matches!(self, Self::Document | Self::Element(_))
    }
}

/// Element tag and attributes.
///
/// Tag and attribute names are stored lower-cased; attribute order is the
/// order of first assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    tag: String,
    attributes: Vec<(String, String)>,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.trim().to_ascii_lowercase(),
            attributes: Vec::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.attributes
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        let index = self.attributes.iter().position(|(key, _)| *key == name)?;
        Some(self.attributes.remove(index).1)
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// Whitespace-separated tokens of the `class` attribute.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attribute("class").unwrap_or_default().split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|value| value == class)
    }
}
