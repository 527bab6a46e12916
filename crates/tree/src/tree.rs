//! The summary tree: an arena of [`SummaryNode`]s with one root.
//!
//! Construction happens in a [`TreeArena`], the only place links are ever
//! written. [`TreeArena::finish`] validates the structure and freezes it
//! into a [`SummaryTree`], which is read-only and can be shared freely
//! between concurrent queries.

use recap_core::TreeError;
use tracing::warn;

use crate::node::{NodeId, SummaryNode};

/// Mutable construction phase of a tree.
#[derive(Debug, Default)]
pub struct TreeArena {
    nodes: Vec<SummaryNode>,
}

impl TreeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&SummaryNode> {
        self.nodes.get(id.0)
    }

    /// Add a leaf covering `[start_idx, end_idx]`.
    pub fn push_leaf(&mut self, start_idx: usize, end_idx: usize, content: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SummaryNode::leaf(start_idx, end_idx, content));
        id
    }

    /// Add a parent over `children` (in document order) and link each child
    /// back to it. The parent's range is the min start / max end of the group.
    pub fn push_parent(&mut self, children: &[NodeId], content: impl Into<String>) -> Result<NodeId, TreeError> {
        if children.is_empty() {
            return Err(TreeError::StructuralViolation(
                "a parent needs at least one child".into(),
            ));
        }

        let mut start_idx = usize::MAX;
        let mut end_idx = 0;
        for &child in children {
            let node = self.nodes.get(child.0).ok_or(TreeError::UnknownNode(child.0))?;
            if let Some(existing) = node.parent {
                return Err(TreeError::StructuralViolation(format!(
                    "node {child} already belongs to {existing}"
                )));
            }
            start_idx = start_idx.min(node.start_idx);
            end_idx = end_idx.max(node.end_idx);
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(SummaryNode {
            start_idx,
            end_idx,
            content: content.into(),
            parent: None,
            children: children.to_vec(),
        });
        for &child in children {
            self.nodes[child.0].parent = Some(id);
        }
        Ok(id)
    }

    /// Freeze the arena with `root` as the root node.
    pub fn finish(self, root: NodeId, encoding: impl Into<String>) -> Result<SummaryTree, TreeError> {
        SummaryTree::from_parts(self.nodes, root, encoding)
    }
}

/// A validated, immutable summary tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryTree {
    pub(crate) encoding: String,
    pub(crate) root: NodeId,
    pub(crate) nodes: Vec<SummaryNode>,
}

impl SummaryTree {
    /// Assemble a tree from raw nodes, checking every structural invariant.
    pub fn from_parts(
        nodes: Vec<SummaryNode>,
        root: NodeId,
        encoding: impl Into<String>,
    ) -> Result<Self, TreeError> {
        let tree = Self {
            encoding: encoding.into(),
            root,
            nodes,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Name of the tokenizer the token ranges were measured with.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &SummaryNode {
        &self.nodes[self.root.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&SummaryNode> {
        self.nodes.get(id.0)
    }

    /// Like [`node`](Self::node) but reports unknown ids as errors.
    pub fn get(&self, id: NodeId) -> Result<&SummaryNode, TreeError> {
        self.node(id).ok_or(TreeError::UnknownNode(id.0))
    }

    /// All nodes with their ids, in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SummaryNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Inclusive token range covered by the whole tree.
    pub fn range(&self) -> (usize, usize) {
        self.root_node().range()
    }

    /// Leaves in document order.
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if node.is_leaf() {
                leaves.push(id);
            } else {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        leaves
    }

    /// Number of edges from the root to the deepest leaf.
    pub fn depth(&self) -> usize {
        self.leaves()
            .into_iter()
            .map(|leaf| self.ancestors(leaf).count())
            .max()
            .unwrap_or(0)
    }

    /// Parent, grandparent, ... up to and including the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).and_then(|n| n.parent), move |p| {
            self.nodes[p.0].parent
        })
    }

    /// Deepest node covering `position`.
    ///
    /// Descends from the root into the child whose range contains the
    /// position. Positions outside the root's range are reported as
    /// [`TreeError::PositionOutOfRange`], never clamped.
    pub fn find_leaf(&self, position: usize) -> Result<NodeId, TreeError> {
        let out_of_range = || {
            let (start, end) = self.range();
            TreeError::PositionOutOfRange {
                position,
                start,
                end,
            }
        };

        if !self.root_node().contains(position) {
            return Err(out_of_range());
        }

        let mut current = self.root;
        loop {
            let node = &self.nodes[current.0];
            if node.is_leaf() {
                return Ok(current);
            }

            let mut matching = node
                .children
                .iter()
                .copied()
                .filter(|c| self.nodes[c.0].contains(position));
            let Some(child) = matching.next() else {
                return Err(out_of_range());
            };
            if let Some(other) = matching.next() {
                warn!(
                    parent = %current,
                    first = %child,
                    second = %other,
                    position,
                    "Overlapping children cover the same position, using the first"
                );
            }
            current = child;
        }
    }

    /// Completed sibling subtrees that lie entirely before `id`.
    ///
    /// Walks from `id` up to the root; at each level collects the siblings
    /// whose range ends at or before the current node's start. Neither the
    /// root nor any ancestor of `id` is ever included. Results are returned
    /// in document order.
    pub fn find_included_summaries(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        self.get(id)?;

        let mut included = Vec::new();
        let mut current = id;
        while let Some(parent) = self.nodes[current.0].parent {
            let start = self.nodes[current.0].start_idx;
            included.extend(
                self.nodes[parent.0]
                    .children
                    .iter()
                    .copied()
                    .filter(|&s| s != current && self.nodes[s.0].end_idx <= start),
            );
            current = parent;
        }

        included.sort_by_key(|s| self.nodes[s.0].start_idx);
        Ok(included)
    }

    /// Check every structural invariant.
    ///
    /// - the root exists and has no parent
    /// - every node has `start_idx <= end_idx`
    /// - children are known ids, link back to their parent and tile the
    ///   parent's range in ascending order with no gaps or overlaps
    /// - every node is reachable from the root exactly once
    pub fn validate(&self) -> Result<(), TreeError> {
        let violation = |msg: String| Err(TreeError::StructuralViolation(msg));

        let Some(root) = self.nodes.get(self.root.0) else {
            return violation(format!("root {} is not in the arena", self.root));
        };
        if let Some(parent) = root.parent {
            return violation(format!("root {} has parent {parent}", self.root));
        }

        for (id, node) in self.iter() {
            if node.start_idx > node.end_idx {
                return violation(format!(
                    "node {id} has inverted range [{}, {}]",
                    node.start_idx, node.end_idx
                ));
            }
            // A range must end before usize::MAX so its token count fits.
            let Some(node_after) = node.end_idx.checked_add(1) else {
                return violation(format!("node {id} ends at usize::MAX"));
            };
            if node.is_leaf() {
                continue;
            }

            let mut expected_start = node.start_idx;
            for &child_id in &node.children {
                let Some(child) = self.nodes.get(child_id.0) else {
                    return violation(format!("node {id} has dangling child {child_id}"));
                };
                if child.parent != Some(id) {
                    return violation(format!(
                        "child {child_id} of {id} points to {:?} as parent",
                        child.parent
                    ));
                }
                if child.start_idx != expected_start {
                    return violation(format!(
                        "children of {id} leave a gap or overlap at token {expected_start} (child {child_id} starts at {})",
                        child.start_idx
                    ));
                }
                let Some(child_after) = child.end_idx.checked_add(1) else {
                    return violation(format!("child {child_id} of {id} ends at usize::MAX"));
                };
                expected_start = child_after;
            }
            if expected_start != node_after {
                return violation(format!(
                    "children of {id} end at {} but the node ends at {}",
                    expected_start - 1,
                    node.end_idx
                ));
            }
        }

        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.0], true) {
                return violation(format!("node {id} is reachable more than once"));
            }
            stack.extend(self.nodes[id.0].children.iter().copied());
        }
        if let Some(orphan) = seen.iter().position(|s| !s) {
            return violation(format!("node #{orphan} is not reachable from the root"));
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// ```text
    ///                 [0,49]
    ///          /                 \
    ///      [0,19]               [20,49]
    ///      /    \             /    |    \
    ///  [0,9] [10,19]     [20,29] [30,39] [40,49]
    /// ```
    pub(crate) fn five_leaf_tree() -> SummaryTree {
        let mut arena = TreeArena::new();
        let a = arena.push_leaf(0, 9, "summary1_1_1");
        let b = arena.push_leaf(10, 19, "summary1_1_2");
        let c = arena.push_leaf(20, 29, "summary1_2_1");
        let d = arena.push_leaf(30, 39, "summary1_2_2");
        let e = arena.push_leaf(40, 49, "summary1_2_3");
        let left = arena.push_parent(&[a, b], "summary1_1").unwrap();
        let right = arena.push_parent(&[c, d, e], "summary1_2").unwrap();
        let root = arena.push_parent(&[left, right], "summary1").unwrap();
        arena.finish(root, "char").unwrap()
    }

    fn range_of(tree: &SummaryTree, id: NodeId) -> (usize, usize) {
        tree.node(id).unwrap().range()
    }

    fn ranges_of(tree: &SummaryTree, ids: &[NodeId]) -> Vec<(usize, usize)> {
        ids.iter().map(|&id| range_of(tree, id)).collect()
    }

    #[test]
    fn parent_range_is_union_of_children() {
        let tree = five_leaf_tree();
        assert_eq!(tree.range(), (0, 49));
        assert_eq!(tree.len(), 8);
        assert_eq!(tree.depth(), 2);
        let left = tree.root_node().children[0];
        assert_eq!(range_of(&tree, left), (0, 19));
    }

    #[test]
    fn find_leaf_descends_to_the_covering_leaf() {
        let tree = five_leaf_tree();
        let cases = [
            (0, (0, 9)),
            (10, (10, 19)),
            (19, (10, 19)),
            (20, (20, 29)),
            (25, (20, 29)),
            (30, (30, 39)),
            (39, (30, 39)),
            (45, (40, 49)),
            (49, (40, 49)),
        ];
        for (position, expected) in cases {
            let leaf = tree.find_leaf(position).unwrap();
            assert_eq!(range_of(&tree, leaf), expected, "position {position}");
            assert!(tree.node(leaf).unwrap().is_leaf());
        }
    }

    #[test]
    fn find_leaf_past_the_end_is_an_error() {
        let tree = five_leaf_tree();
        match tree.find_leaf(50) {
            Err(TreeError::PositionOutOfRange { position, start, end }) => {
                assert_eq!((position, start, end), (50, 0, 49));
            }
            other => panic!("expected PositionOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn included_summaries_for_each_leaf() {
        let tree = five_leaf_tree();
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 5);

        let expected: [&[(usize, usize)]; 5] = [
            &[],
            &[(0, 9)],
            &[(0, 19)],
            &[(0, 19), (20, 29)],
            &[(0, 19), (20, 29), (30, 39)],
        ];
        for (leaf, want) in leaves.iter().zip(expected) {
            let included = tree.find_included_summaries(*leaf).unwrap();
            assert_eq!(ranges_of(&tree, &included), want);
        }
    }

    #[test]
    fn included_summaries_never_contain_ancestors_or_self() {
        let tree = five_leaf_tree();
        for leaf in tree.leaves() {
            let included = tree.find_included_summaries(leaf).unwrap();
            assert!(!included.contains(&leaf));
            assert!(!included.contains(&tree.root()));
            for ancestor in tree.ancestors(leaf) {
                assert!(!included.contains(&ancestor));
            }
        }
    }

    #[test]
    fn identical_text_does_not_confuse_identity() {
        let mut arena = TreeArena::new();
        let a = arena.push_leaf(0, 0, "same");
        let b = arena.push_leaf(1, 1, "same");
        let root = arena.push_parent(&[a, b], "same").unwrap();
        let tree = arena.finish(root, "char").unwrap();
        assert_eq!(tree.find_included_summaries(b).unwrap(), vec![a]);
        // A single-token node never counts as preceding itself
        assert!(tree.find_included_summaries(a).unwrap().is_empty());
    }

    #[test]
    fn queries_are_idempotent() {
        let tree = five_leaf_tree();
        let first: Vec<_> = (0..50).map(|p| tree.find_leaf(p).unwrap()).collect();
        let second: Vec<_> = (0..50).map(|p| tree.find_leaf(p).unwrap()).collect();
        assert_eq!(first, second);
        let leaf = tree.find_leaf(45).unwrap();
        assert_eq!(
            tree.find_included_summaries(leaf).unwrap(),
            tree.find_included_summaries(leaf).unwrap()
        );
    }

    #[test]
    fn single_leaf_tree() {
        let mut arena = TreeArena::new();
        let only = arena.push_leaf(0, 99, "everything");
        let tree = arena.finish(only, "char").unwrap();
        assert_eq!(tree.find_leaf(42).unwrap(), only);
        assert!(tree.find_leaf(100).is_err());
        assert!(tree.find_included_summaries(only).unwrap().is_empty());
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn push_parent_rejects_adopted_children() {
        let mut arena = TreeArena::new();
        let a = arena.push_leaf(0, 4, "a");
        let b = arena.push_leaf(5, 9, "b");
        arena.push_parent(&[a, b], "ab").unwrap();
        assert!(matches!(
            arena.push_parent(&[a], "again"),
            Err(TreeError::StructuralViolation(_))
        ));
        assert!(matches!(
            arena.push_parent(&[NodeId(99)], "ghost"),
            Err(TreeError::UnknownNode(99))
        ));
        assert!(arena.push_parent(&[], "empty").is_err());
    }

    #[test]
    fn validate_catches_gaps() {
        let nodes = vec![
            SummaryNode::leaf(0, 9, "a"),
            SummaryNode::leaf(11, 19, "b"),
            SummaryNode {
                start_idx: 0,
                end_idx: 19,
                content: "root".into(),
                parent: None,
                children: vec![NodeId(0), NodeId(1)],
            },
        ];
        let mut nodes = nodes;
        nodes[0].parent = Some(NodeId(2));
        nodes[1].parent = Some(NodeId(2));
        let err = SummaryTree::from_parts(nodes, NodeId(2), "char").unwrap_err();
        assert!(err.to_string().contains("gap or overlap"));
    }

    #[test]
    fn validate_catches_overlaps() {
        let mut nodes = vec![
            SummaryNode::leaf(0, 10, "a"),
            SummaryNode::leaf(10, 19, "b"),
            SummaryNode {
                start_idx: 0,
                end_idx: 19,
                content: "root".into(),
                parent: None,
                children: vec![NodeId(0), NodeId(1)],
            },
        ];
        nodes[0].parent = Some(NodeId(2));
        nodes[1].parent = Some(NodeId(2));
        assert!(SummaryTree::from_parts(nodes, NodeId(2), "char").is_err());
    }

    #[test]
    fn validate_catches_dangling_parent_links() {
        let mut nodes = vec![
            SummaryNode::leaf(0, 9, "a"),
            SummaryNode::leaf(10, 19, "b"),
            SummaryNode {
                start_idx: 0,
                end_idx: 19,
                content: "root".into(),
                parent: None,
                children: vec![NodeId(0), NodeId(1)],
            },
        ];
        nodes[0].parent = Some(NodeId(2));
        nodes[1].parent = Some(NodeId(0));
        let err = SummaryTree::from_parts(nodes, NodeId(2), "char").unwrap_err();
        assert!(err.to_string().contains("points to"));
    }

    #[test]
    fn validate_catches_orphans_and_bad_roots() {
        let nodes = vec![SummaryNode::leaf(0, 9, "a"), SummaryNode::leaf(10, 19, "b")];
        let err = SummaryTree::from_parts(nodes.clone(), NodeId(0), "char").unwrap_err();
        assert!(err.to_string().contains("not reachable"));
        assert!(SummaryTree::from_parts(nodes, NodeId(5), "char").is_err());
        assert!(SummaryTree::from_parts(vec![], NodeId(0), "char").is_err());
    }
}
