//! Structural mutation records.

use crate::dom::node::NodeId;

/// One structural change under an observed root.
///
/// `target` is the parent whose child list changed. A delivered batch is the
/// ordered list of records queued since the previous delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

impl MutationRecord {
    pub fn added(target: NodeId, nodes: Vec<NodeId>) -> Self {
        Self {
            target,
            added: nodes,
            removed: Vec::new(),
        }
    }

    pub fn removed(target: NodeId, nodes: Vec<NodeId>) -> Self {
        Self {
            target,
            added: Vec::new(),
            removed: nodes,
        }
    }
}
