//! Summary nodes and their arena ids.

use serde::{Deserialize, Serialize};

/// Index of a node inside its tree's arena.
///
/// Ids are the identity of a node: two nodes with equal ranges and equal
/// text are still different nodes if their ids differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One summary covering the inclusive token range `[start_idx, end_idx]`.
///
/// The parent link is a plain id: a node never owns its parent. Children
/// are kept in ascending `start_idx` order and tile the node's range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryNode {
    pub start_idx: usize,
    pub end_idx: usize,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,
}

impl SummaryNode {
    /// A node with no parent and its own empty child list.
    pub fn leaf(start_idx: usize, end_idx: usize, content: impl Into<String>) -> Self {
        Self {
            start_idx,
            end_idx,
            content: content.into(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether `position` falls inside the node's inclusive range.
    pub fn contains(&self, position: usize) -> bool {
        position >= self.start_idx && position <= self.end_idx
    }

    pub fn range(&self) -> (usize, usize) {
        (self.start_idx, self.end_idx)
    }

    pub fn token_count(&self) -> usize {
        self.end_idx.saturating_sub(self.start_idx) + 1
    }

    /// Value equality on range and content, ignoring links.
    ///
    /// Only meaningful for logging and tests; distinct nodes may collide.
    pub fn same_summary(&self, other: &Self) -> bool {
        self.start_idx == other.start_idx
            && self.end_idx == other.end_idx
            && self.content == other.content
    }
}

impl std::fmt::Display for SummaryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Summary[{}, {}] ({} chars)",
            self.start_idx,
            self.end_idx,
            self.content.chars().count()
        )
    }
}
