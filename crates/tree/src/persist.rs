//! Saving and restoring built trees.
//!
//! Trees serialize to a versioned JSON envelope. The engine only deals in
//! bytes; [`SummaryTree::save`] and [`SummaryTree::load`] are a thin file
//! layer on top.

use std::path::Path;

use recap_core::TreeError;
use serde::{Deserialize, Serialize};

use crate::node::{NodeId, SummaryNode};
use crate::tree::SummaryTree;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct Envelope<'a> {
    version: u32,
    encoding: &'a str,
    root: NodeId,
    nodes: &'a [SummaryNode],
}

#[derive(Deserialize)]
struct OwnedEnvelope {
    version: u32,
    encoding: String,
    root: NodeId,
    nodes: Vec<SummaryNode>,
}

impl SummaryTree {
    pub fn to_bytes(&self) -> Result<Vec<u8>, TreeError> {
        serde_json::to_vec(&Envelope {
            version: FORMAT_VERSION,
            encoding: &self.encoding,
            root: self.root,
            nodes: &self.nodes,
        })
        .map_err(|e| TreeError::Persistence(format!("Failed to serialize tree: {e}")))
    }

    /// Restore a tree, re-checking every structural invariant.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TreeError> {
        let envelope: OwnedEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| TreeError::Persistence(format!("Failed to parse tree: {e}")))?;
        if envelope.version != FORMAT_VERSION {
            return Err(TreeError::Persistence(format!(
                "Unsupported tree format version {} (expected {FORMAT_VERSION})",
                envelope.version
            )));
        }
        Self::from_parts(envelope.nodes, envelope.root, envelope.encoding)
    }

    /// Write the tree to `path` through a temporary sibling file, so an
    /// interrupted save never leaves a truncated tree behind.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TreeError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");

        std::fs::write(&tmp, &bytes)
            .and_then(|()| std::fs::rename(&tmp, path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                TreeError::Persistence(format!("Failed to write {}: {e}", path.display()))
            })?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Saved summary tree");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TreeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            TreeError::Persistence(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::five_leaf_tree;

    #[test]
    fn bytes_round_trip_preserves_every_node() {
        let tree = five_leaf_tree();
        let restored = SummaryTree::from_bytes(&tree.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, tree);
        assert_eq!(restored.encoding(), "char");
        for ((_, a), (_, b)) in tree.iter().zip(restored.iter()) {
            assert_eq!(a.range(), b.range());
            assert_eq!(a.content, b.content);
            assert_eq!(a.parent, b.parent);
            assert_eq!(a.children, b.children);
        }
    }

    #[test]
    fn restored_tree_answers_the_same_queries() {
        let tree = five_leaf_tree();
        let restored = SummaryTree::from_bytes(&tree.to_bytes().unwrap()).unwrap();
        for p in 0..50 {
            let a = tree.find_leaf(p).unwrap();
            let b = restored.find_leaf(p).unwrap();
            assert_eq!(a, b);
            assert_eq!(
                tree.find_included_summaries(a).unwrap(),
                restored.find_included_summaries(b).unwrap()
            );
        }
    }

    #[test]
    fn save_and_load_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        let tree = five_leaf_tree();
        tree.save(&path).unwrap();
        assert!(!dir.path().join("tree.json.tmp").exists());
        assert_eq!(SummaryTree::load(&path).unwrap(), tree);
    }

    #[test]
    fn fabricated_trees_are_rejected() {
        let tree = five_leaf_tree();
        let mut value: serde_json::Value = serde_json::from_slice(&tree.to_bytes().unwrap()).unwrap();
        // Shift the second leaf so it overlaps the first
        value["nodes"][1]["start_idx"] = serde_json::json!(5);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            SummaryTree::from_bytes(&bytes),
            Err(TreeError::StructuralViolation(_))
        ));
    }

    #[test]
    fn ranges_ending_at_usize_max_are_rejected() {
        let blob = serde_json::json!({
            "version": FORMAT_VERSION,
            "encoding": "char",
            "root": 2,
            "nodes": [
                { "start_idx": 0, "end_idx": 5, "content": "a", "parent": 2 },
                { "start_idx": 6, "end_idx": usize::MAX, "content": "b", "parent": 2 },
                { "start_idx": 0, "end_idx": usize::MAX, "content": "ab", "children": [0, 1] },
            ],
        });
        let bytes = serde_json::to_vec(&blob).unwrap();
        match SummaryTree::from_bytes(&bytes) {
            Err(TreeError::StructuralViolation(msg)) => assert!(msg.contains("usize::MAX")),
            other => panic!("expected StructuralViolation, got {other:?}"),
        }
    }

    #[test]
    fn unknown_versions_and_garbage_are_rejected() {
        let tree = five_leaf_tree();
        let mut value: serde_json::Value = serde_json::from_slice(&tree.to_bytes().unwrap()).unwrap();
        value["version"] = serde_json::json!(99);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            SummaryTree::from_bytes(&bytes),
            Err(TreeError::Persistence(_))
        ));
        assert!(SummaryTree::from_bytes(b"not json").is_err());
        assert!(SummaryTree::load("/definitely/not/here.json").is_err());
    }
}
