//! Declarative element templates.

use crate::dom::document::{Document, DomError};
use crate::dom::node::NodeId;

/// One child of an [`ElementSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSpec {
    Element(ElementSpec),
    Text(String),
}

/// Nested element template materialised with [`Document::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpec {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<NodeSpec>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }

    pub fn id(self, value: impl Into<String>) -> Self {
        self.attr("id", value)
    }

    /// Appends class tokens to the `class` attribute.
    pub fn class(mut self, value: &str) -> Self {
        match self
            .attributes
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case("class"))
        {
            Some((_, existing)) => {
                existing.push(' ');
                existing.push_str(value);
            }
            None => self.attributes.push(("class".to_string(), value.to_string())),
        }
        self
    }

    pub fn text(mut self, value: impl Into<String>) -> Self {
        self.children.push(NodeSpec::Text(value.into()));
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(NodeSpec::Element(child));
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ElementSpec>) -> Self {
        self.children
            .extend(children.into_iter().map(NodeSpec::Element));
        self
    }
}

impl Document {
    /// Creates a detached subtree from `spec` and returns its root element.
    ///
    /// Nothing is recorded: the subtree is not reachable from any observed
    /// root until it is inserted.
    pub fn build(&mut self, spec: &ElementSpec) -> NodeId {
        let element = self.create_element(&spec.tag);
        for (name, value) in &spec.attributes {
            // A freshly created node is always an element.
            let _ = self.set_attribute(element, name, value.clone());
        }
        for child in &spec.children {
            let node = match child {
                NodeSpec::Element(child_spec) => self.build(child_spec),
                NodeSpec::Text(text) => self.create_text(text.clone()),
            };
            let _ = self.link_detached(element, node);
        }
        element
    }

    /// Builds `spec` and appends it to `parent` as one recorded insertion.
    pub fn append_built(&mut self, parent: NodeId, spec: &ElementSpec) -> Result<NodeId, DomError> {
        let node = self.build(spec);
        self.append_child(parent, node)?;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::ElementSpec;
    use crate::dom::{Document, MutationRecord};

    #[test]
    fn build_creates_nested_subtree() {
        let mut doc = Document::new();
        let spec = ElementSpec::new("div")
            .class("file")
            .attr("data-path", "src/lib.rs")
            .child(ElementSpec::new("a").class("Link--primary").text("src/lib.rs"));

        let file = doc.build(&spec);

        assert_eq!(doc.tag(file), Some("div"));
        assert_eq!(doc.attribute(file, "data-path"), Some("src/lib.rs"));
        let link = doc.element_children(file).next().expect("link child");
        assert!(doc.has_class(link, "Link--primary"));
        assert_eq!(doc.text_content(file), "src/lib.rs");
        assert!(!doc.is_connected(file));
    }

    #[test]
    fn class_calls_accumulate_tokens() {
        let mut doc = Document::new();
        let node = doc.build(&ElementSpec::new("button").class("btn-link").class("dropdown-item"));

        assert_eq!(doc.attribute(node, "class"), Some("btn-link dropdown-item"));
    }

    #[test]
    fn append_built_records_one_insertion() {
        let mut doc = Document::new();
        doc.observe_root(doc.root()).expect("observe document");

        let node = doc
            .append_built(
                doc.root(),
                &ElementSpec::new("ul").children([ElementSpec::new("li"), ElementSpec::new("li")]),
            )
            .expect("append built subtree");

        assert_eq!(
            doc.take_records(doc.root()),
            vec![MutationRecord::added(doc.root(), vec![node])]
        );
    }
}
