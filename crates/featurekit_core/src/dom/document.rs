//! Arena-backed host document.
//!
//! # Responsibility
//! - Own every node of one page and apply structural edits.
//! - Queue mutation records for roots that have live subscribers.
//!
//! # Invariants
//! - `NodeId`s are never reused; removed nodes stay addressable while detached.
//! - A node has at most one parent and appears exactly once in its child list.
//! - Records are queued only while a root has at least one subscriber, in the
//!   order the edits were applied.

use crate::dom::mutation::MutationRecord;
use crate::dom::node::{ElementData, NodeId, NodeKind};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Single-threaded shared handle to the page document.
pub type SharedDocument = Rc<RefCell<Document>>;

#[derive(Debug, Clone)]
struct NodeSlot {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl NodeSlot {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct RootSubscription {
    subscribers: usize,
    records: Vec<MutationRecord>,
}

/// Page document: node arena plus per-root mutation queues.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeSlot>,
    subscriptions: BTreeMap<NodeId, RootSubscription>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty document holding only the document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeSlot::new(NodeKind::Document)],
            subscriptions: BTreeMap::new(),
        }
    }

    pub fn into_shared(self) -> SharedDocument {
        Rc::new(RefCell::new(self))
    }

    /// The document node; root of every connected tree.
    pub fn root(&self) -> NodeId {
        NodeId::DOCUMENT
    }

    /// Number of nodes ever allocated, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeKind::Element(ElementData::new(tag)))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(NodeSlot::new(kind));
        id
    }

    fn slot(&self, node: NodeId) -> Result<&NodeSlot, DomError> {
        self.nodes
            .get(node.index())
            .ok_or(DomError::UnknownNode(node))
    }

    fn slot_mut(&mut self, node: NodeId) -> Result<&mut NodeSlot, DomError> {
        self.nodes
            .get_mut(node.index())
            .ok_or(DomError::UnknownNode(node))
    }

    pub fn exists(&self, node: NodeId) -> bool {
        node.index() < self.nodes.len()
    }

    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.nodes.get(node.index()).map(|slot| &slot.kind)
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        match self.kind(node)? {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(ElementData::tag)
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?.attribute(name)
    }

    pub fn id(&self, node: NodeId) -> Option<&str> {
        self.element(node)?.id()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node)
            .map(|element| element.has_class(class))
            .unwrap_or(false)
    }

    /// Sets one attribute. Attribute edits are not structural and queue no record.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), DomError> {
        match &mut self.slot_mut(node)?.kind {
            NodeKind::Element(data) => {
                data.set_attribute(name, value);
                Ok(())
            }
            _ => Err(DomError::NotAnElement(node)),
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<Option<String>, DomError> {
        match &mut self.slot_mut(node)?.kind {
            NodeKind::Element(data) => Ok(data.remove_attribute(name)),
            _ => Err(DomError::NotAnElement(node)),
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.index())?.parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.index())
            .map(|slot| slot.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn element_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
    }

    pub fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let siblings = self.children(self.parent(node)?);
        let index = siblings.iter().position(|child| *child == node)?;
        siblings[..index]
            .iter()
            .rev()
            .copied()
            .find(|sibling| self.is_element(*sibling))
    }

    pub fn next_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let siblings = self.children(self.parent(node)?);
        let index = siblings.iter().position(|child| *child == node)?;
        siblings[index + 1..]
            .iter()
            .copied()
            .find(|sibling| self.is_element(*sibling))
    }

    /// Ancestors of `node`, nearest first, excluding `node`.
    pub fn ancestors(&self, node: NodeId) -> Ancestors<'_> {
        Ancestors {
            document: self,
            next: self.parent(node),
        }
    }

    /// Pre-order walk of the subtree below `node`, excluding `node`.
    ///
    /// The walk is lazy and reads the current tree state each time it is
    /// created.
    pub fn descendants(&self, node: NodeId) -> Descendants<'_> {
        let stack = self.children(node).iter().rev().copied().collect();
        Descendants {
            document: self,
            stack,
        }
    }

    /// Whether `node` is `ancestor` or lies in its subtree.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if !self.exists(node) {
            return false;
        }
        node == ancestor || self.ancestors(node).any(|candidate| candidate == ancestor)
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.contains(NodeId::DOCUMENT, node)
    }

    /// Concatenated text of every text node in the inclusive subtree.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(NodeKind::Text(text)) = self.kind(node) {
            out.push_str(text);
            return out;
        }
        for descendant in self.descendants(node) {
            if let Some(NodeKind::Text(text)) = self.kind(descendant) {
                out.push_str(text);
            }
        }
        out
    }

    /// Replaces the children of an element with a single text node, or the
    /// data of a text node.
    pub fn set_text_content(&mut self, node: NodeId, text: impl Into<String>) -> Result<(), DomError> {
        let text = text.into();
        if let NodeKind::Text(data) = &mut self.slot_mut(node)?.kind {
            *data = text;
            return Ok(());
        }
        if matches!(self.slot(node)?.kind, NodeKind::Document) {
            return Err(DomError::NotAnElement(node));
        }

        let removed = std::mem::take(&mut self.slot_mut(node)?.children);
        for child in &removed {
            self.slot_mut(*child)?.parent = None;
        }
        let mut added = Vec::new();
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.link(node, text_node, None)?;
            added.push(text_node);
        }
        self.record(MutationRecord {
            target: node,
            added,
            removed,
        });
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Inserts `child` into `parent` before `reference`, or last when
    /// `reference` is `None`. An attached `child` is moved.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        if !self.slot(parent)?.kind.accepts_children() {
            return Err(DomError::NotAParent(parent));
        }
        if matches!(self.slot(child)?.kind, NodeKind::Document) {
            return Err(DomError::RootNotMovable);
        }
        if self.contains(child, parent) {
            return Err(DomError::HierarchyCycle { parent, child });
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild { parent, reference });
            }
            if reference == child {
                return Ok(());
            }
        }

        self.detach(child)?;
        self.link(parent, child, reference)?;
        self.record(MutationRecord::added(parent, vec![child]));
        Ok(())
    }

    /// Inserts `new_node` as the next sibling of `node`.
    pub fn insert_after(&mut self, node: NodeId, new_node: NodeId) -> Result<(), DomError> {
        let parent = self.parent(node).ok_or(DomError::Detached(node))?;
        if node == new_node {
            return Ok(());
        }
        let siblings = self.children(parent);
        let index = siblings
            .iter()
            .position(|child| *child == node)
            .ok_or(DomError::NotAChild {
                parent,
                reference: node,
            })?;
        let reference = siblings
            .get(index + 1)
            .copied()
            .filter(|next| *next != new_node);
        self.insert_before(parent, new_node, reference)
    }

    /// Detaches `node` from its parent. Detached nodes are left untouched.
    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        if matches!(self.slot(node)?.kind, NodeKind::Document) {
            return Err(DomError::RootNotMovable);
        }
        self.detach(node)
    }

    fn detach(&mut self, node: NodeId) -> Result<(), DomError> {
        let Some(parent) = self.slot(node)?.parent else {
            return Ok(());
        };
        self.slot_mut(parent)?.children.retain(|child| *child != node);
        self.slot_mut(node)?.parent = None;
        self.record(MutationRecord::removed(parent, vec![node]));
        Ok(())
    }

    fn link(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> Result<(), DomError> {
        let children = &mut self.slot_mut(parent)?.children;
        let index = reference
            .and_then(|reference| children.iter().position(|existing| *existing == reference))
            .unwrap_or(children.len());
        children.insert(index, child);
        self.slot_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Links a freshly built subtree without queuing records.
    pub(crate) fn link_detached(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.link(parent, child, None)
    }

    /// Child-index path from the topmost ancestor down to `node`.
    ///
    /// Lexicographic order of these paths is document order.
    pub fn tree_position(&self, node: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            let index = self
                .children(parent)
                .iter()
                .position(|child| *child == current)
                .unwrap_or(0);
            path.push(index);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Adds one subscriber to the mutation queue of `root`.
    pub fn observe_root(&mut self, root: NodeId) -> Result<(), DomError> {
        self.slot(root)?;
        self.subscriptions.entry(root).or_default().subscribers += 1;
        Ok(())
    }

    /// Drops one subscriber of `root`. Returns `true` when the last
    /// subscriber left and the queue was torn down.
    pub fn unobserve_root(&mut self, root: NodeId) -> bool {
        let Some(subscription) = self.subscriptions.get_mut(&root) else {
            return false;
        };
        subscription.subscribers = subscription.subscribers.saturating_sub(1);
        if subscription.subscribers == 0 {
            self.subscriptions.remove(&root);
            return true;
        }
        false
    }

    pub fn is_observed(&self, root: NodeId) -> bool {
        self.subscriptions.contains_key(&root)
    }

    pub fn observed_roots(&self) -> Vec<NodeId> {
        self.subscriptions.keys().copied().collect()
    }

    pub fn subscriber_count(&self, root: NodeId) -> usize {
        self.subscriptions
            .get(&root)
            .map(|subscription| subscription.subscribers)
            .unwrap_or(0)
    }

    pub fn pending_records(&self, root: NodeId) -> usize {
        self.subscriptions
            .get(&root)
            .map(|subscription| subscription.records.len())
            .unwrap_or(0)
    }

    /// Drains the queued batch of `root`.
    pub fn take_records(&mut self, root: NodeId) -> Vec<MutationRecord> {
        self.subscriptions
            .get_mut(&root)
            .map(|subscription| std::mem::take(&mut subscription.records))
            .unwrap_or_default()
    }

    fn record(&mut self, record: MutationRecord) {
        if self.subscriptions.is_empty() {
            return;
        }
        let roots: Vec<NodeId> = self
            .subscriptions
            .keys()
            .copied()
            .filter(|root| self.contains(*root, record.target))
            .collect();
        for root in roots {
            if let Some(subscription) = self.subscriptions.get_mut(&root) {
                subscription.records.push(record.clone());
            }
        }
    }
}

/// Iterator over ancestors, nearest first.
pub struct Ancestors<'a> {
    document: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.document.parent(current);
        Some(current)
    }
}

/// Lazy pre-order iterator over a subtree.
pub struct Descendants<'a> {
    document: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.stack.pop()?;
        self.stack
            .extend(self.document.children(current).iter().rev().copied());
        Some(current)
    }
}

/// Structural edit errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    UnknownNode(NodeId),
    NotAnElement(NodeId),
    NotAParent(NodeId),
    NotAChild { parent: NodeId, reference: NodeId },
    HierarchyCycle { parent: NodeId, child: NodeId },
    Detached(NodeId),
    RootNotMovable,
}

impl Display for DomError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNode(node) => write!(f, "node does not exist: {node}"),
            Self::NotAnElement(node) => write!(f, "node is not an element: {node}"),
            Self::NotAParent(node) => write!(f, "node cannot have children: {node}"),
            Self::NotAChild { parent, reference } => {
                write!(f, "node {reference} is not a child of {parent}")
            }
            Self::HierarchyCycle { parent, child } => {
                write!(f, "cannot insert {child} into its own subtree at {parent}")
            }
            Self::Detached(node) => write!(f, "node has no parent: {node}"),
            Self::RootNotMovable => write!(f, "the document node cannot be moved or removed"),
        }
    }
}

impl Error for DomError {}
