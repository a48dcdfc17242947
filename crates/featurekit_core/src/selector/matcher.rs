//! Right-to-left selector matching over the host document.

use crate::dom::{Descendants, Document, NodeId};
use crate::selector::parser::{
    AttributeOperator, AttributeSelector, Combinator, ComplexSelector, CompoundSelector,
    PseudoClass, SimpleSelector,
};
use crate::selector::{Selector, SelectorSyntaxError};

/// Parses `selector` and tests one node against it.
pub fn matches(document: &Document, node: NodeId, selector: &str) -> Result<bool, SelectorSyntaxError> {
    Ok(Selector::parse(selector)?.matches(document, node))
}

/// Lazy pre-order search below `root` (exclusive).
pub fn find_all<'a>(document: &'a Document, root: NodeId, selector: &'a Selector) -> FindAll<'a> {
    selector.find_all(document, root)
}

/// `root` itself (when it matches) followed by its matching descendants.
pub fn find_inclusive<'a>(
    document: &'a Document,
    root: NodeId,
    selector: &'a Selector,
) -> FindAll<'a> {
    selector.find_inclusive(document, root)
}

/// Parses `selector` and collects every match below `root`.
pub fn select(document: &Document, root: NodeId, selector: &str) -> Result<Vec<NodeId>, SelectorSyntaxError> {
    let selector = Selector::parse(selector)?;
    Ok(selector.find_all(document, root).collect())
}

/// First match below `root` in document order.
pub fn query(document: &Document, root: NodeId, selector: &str) -> Result<Option<NodeId>, SelectorSyntaxError> {
    let selector = Selector::parse(selector)?;
    let first = selector.find_all(document, root).next();
    Ok(first)
}

/// Nearest inclusive ancestor of `node` matching `selector`.
pub fn closest(document: &Document, node: NodeId, selector: &Selector) -> Option<NodeId> {
    std::iter::once(node)
        .chain(document.ancestors(node))
        .find(|candidate| selector.matches(document, *candidate))
}

/// Iterator returned by [`Selector::find_all`].
///
/// Walks the tree lazily; creating a new iterator re-reads the current
/// document state.
pub struct FindAll<'a> {
    document: &'a Document,
    selector: &'a Selector,
    root: Option<NodeId>,
    walk: Descendants<'a>,
}

impl<'a> FindAll<'a> {
    pub(crate) fn new(
        document: &'a Document,
        selector: &'a Selector,
        root: NodeId,
        include_root: bool,
    ) -> Self {
        Self {
            document,
            selector,
            root: include_root.then_some(root),
            walk: document.descendants(root),
        }
    }
}

impl Iterator for FindAll<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if let Some(root) = self.root.take() {
            if self.selector.matches(self.document, root) {
                return Some(root);
            }
        }
        let document = self.document;
        let selector = self.selector;
        self.walk.find(|node| selector.matches(document, *node))
    }
}

pub(crate) fn matches_complex(document: &Document, node: NodeId, complex: &ComplexSelector) -> bool {
    matches_compound(document, node, &complex.subject)
        && matches_ancestors(document, node, &complex.ancestors)
}

fn matches_ancestors(
    document: &Document,
    node: NodeId,
    rest: &[(Combinator, CompoundSelector)],
) -> bool {
    let Some(((combinator, compound), tail)) = rest.split_first() else {
        return true;
    };
    let step = |candidate: NodeId| {
        matches_compound(document, candidate, compound)
            && matches_ancestors(document, candidate, tail)
    };
    match combinator {
        Combinator::Child => document
            .parent(node)
            .is_some_and(|parent| step(parent)),
        Combinator::Descendant => document.ancestors(node).any(step),
        Combinator::NextSibling => document
            .previous_element_sibling(node)
            .is_some_and(|sibling| step(sibling)),
        Combinator::SubsequentSibling => {
            let mut current = document.previous_element_sibling(node);
            while let Some(sibling) = current {
                if step(sibling) {
                    return true;
                }
                current = document.previous_element_sibling(sibling);
            }
            false
        }
    }
}

fn matches_compound(document: &Document, node: NodeId, compound: &CompoundSelector) -> bool {
    let Some(element) = document.element(node) else {
        return false;
    };
    if let Some(tag) = &compound.tag {
        if element.tag() != tag.as_str() {
            return false;
        }
    }
    compound.simple.iter().all(|simple| match simple {
        SimpleSelector::Id(id) => element.id() == Some(id.as_str()),
        SimpleSelector::Class(class) => element.has_class(class),
        SimpleSelector::Attribute(attribute) => {
            matches_attribute(element.attribute(&attribute.name), attribute)
        }
        SimpleSelector::Pseudo(pseudo) => matches_pseudo(document, node, pseudo),
    })
}

fn matches_attribute(actual: Option<&str>, selector: &AttributeSelector) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    let Some((operator, expected)) = &selector.value else {
        return true;
    };
    let (actual, expected) = if selector.case_insensitive {
        (actual.to_lowercase(), expected.to_lowercase())
    } else {
        (actual.to_string(), expected.clone())
    };
    match operator {
        AttributeOperator::Equals => actual == expected,
        AttributeOperator::Includes => {
            !expected.is_empty()
                && !expected.contains(char::is_whitespace)
                && actual.split_whitespace().any(|token| token == expected)
        }
        AttributeOperator::DashMatch => {
            actual == expected || actual.starts_with(&format!("{expected}-"))
        }
        AttributeOperator::Prefix => !expected.is_empty() && actual.starts_with(&expected),
        AttributeOperator::Suffix => !expected.is_empty() && actual.ends_with(&expected),
        AttributeOperator::Substring => !expected.is_empty() && actual.contains(&expected),
    }
}

fn matches_pseudo(document: &Document, node: NodeId, pseudo: &PseudoClass) -> bool {
    match pseudo {
        PseudoClass::FirstChild => {
            document.parent(node).is_some() && document.previous_element_sibling(node).is_none()
        }
        PseudoClass::LastChild => {
            document.parent(node).is_some() && document.next_element_sibling(node).is_none()
        }
        PseudoClass::OnlyChild => {
            document.parent(node).is_some()
                && document.previous_element_sibling(node).is_none()
                && document.next_element_sibling(node).is_none()
        }
        PseudoClass::Empty => document.children(node).is_empty(),
        PseudoClass::Not(inner) => !inner
            .iter()
            .any(|complex| matches_complex(document, node, complex)),
    }
}
