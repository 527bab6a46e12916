//! Reader-position queries: what is already known at a token position.

use recap_core::TreeError;
use serde::Serialize;

use crate::document::Document;
use crate::node::NodeId;
use crate::tree::SummaryTree;

/// Everything a reader has covered up to `position`.
///
/// `summaries` condense the completed subtrees before the current leaf, in
/// document order. `trailing_text` is the raw text from the start of the
/// current leaf up to (not including) `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Context {
    pub leaf: NodeId,
    pub position: usize,
    pub summaries: Vec<String>,
    pub trailing_text: String,
}

impl Context {
    /// Summaries separated by blank lines, then the trailing text.
    pub fn render(&self) -> String {
        let mut parts: Vec<&str> = self.summaries.iter().map(String::as_str).collect();
        if !self.trailing_text.is_empty() {
            parts.push(&self.trailing_text);
        }
        parts.join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty() && self.trailing_text.is_empty()
    }
}

/// Assemble the known context for `position`.
///
/// Fails with [`TreeError::PositionOutOfRange`] when the tree does not cover
/// the position. The tree is only read.
pub fn get_context(
    tree: &SummaryTree,
    document: &Document,
    position: usize,
) -> Result<Context, TreeError> {
    let leaf = tree.find_leaf(position)?;
    let start = tree.get(leaf)?.start_idx;

    let summaries = tree
        .find_included_summaries(leaf)?
        .into_iter()
        .map(|id| tree.get(id).map(|n| n.content.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    let trailing_text = document.slice(start, position)?;

    tracing::debug!(
        position,
        leaf = %leaf,
        summaries = summaries.len(),
        "Assembled reader context"
    );

    Ok(Context {
        leaf,
        position,
        summaries,
        trailing_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::CharTokenizer;
    use crate::tree::tests::five_leaf_tree;
    use std::sync::Arc;

    fn fifty_chars() -> Document {
        let text: String = (0..50u8).map(|i| (b'a' + i % 26) as char).collect();
        Document::new(Arc::new(CharTokenizer), text)
    }

    #[test]
    fn context_at_last_leaf() {
        let tree = five_leaf_tree();
        let doc = fifty_chars();
        let ctx = get_context(&tree, &doc, 45).unwrap();
        assert_eq!(
            ctx.summaries,
            vec!["summary1_1", "summary1_2_1", "summary1_2_2"]
        );
        assert_eq!(ctx.trailing_text, doc.slice(40, 45).unwrap());
        assert_eq!(ctx.trailing_text.chars().count(), 5);
    }

    #[test]
    fn context_at_the_start_is_empty() {
        let tree = five_leaf_tree();
        let ctx = get_context(&tree, &fifty_chars(), 0).unwrap();
        assert!(ctx.is_empty());
        assert_eq!(ctx.render(), "");
    }

    #[test]
    fn context_on_a_leaf_boundary_has_no_trailing_text() {
        let tree = five_leaf_tree();
        let ctx = get_context(&tree, &fifty_chars(), 20).unwrap();
        assert_eq!(ctx.summaries, vec!["summary1_1"]);
        assert!(ctx.trailing_text.is_empty());
        assert_eq!(ctx.render(), "summary1_1");
    }

    #[test]
    fn render_joins_with_blank_lines() {
        let tree = five_leaf_tree();
        let ctx = get_context(&tree, &fifty_chars(), 12).unwrap();
        assert_eq!(ctx.render(), "summary1_1_1\n\nkl");
    }

    #[test]
    fn out_of_range_position_is_an_error() {
        let tree = five_leaf_tree();
        assert!(matches!(
            get_context(&tree, &fifty_chars(), 50),
            Err(TreeError::PositionOutOfRange { .. })
        ));
    }
}
