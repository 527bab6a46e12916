//! CLI subcommands.

pub mod build;
pub mod config_cmd;
pub mod context;
pub mod generate;
pub mod inspect;

use std::path::Path;
use std::sync::Arc;

use clap::Args;
use recap_config::AppConfig;
use recap_core::TreeError;
use recap_tree::{Document, SummaryTree, tokenizer};

/// Where the reader is: a fraction of the document or an exact token.
#[derive(Args, Debug, Clone, Copy)]
#[group(required = true, multiple = false)]
pub struct ReadingPosition {
    /// Fraction of the document read, from 0.0 to 1.0
    #[arg(long)]
    pub progress: Option<f64>,

    /// Token position of the reader
    #[arg(long)]
    pub position: Option<usize>,
}

impl ReadingPosition {
    /// Resolve to a token position within `document`.
    pub fn resolve(&self, document: &Document) -> Result<usize, TreeError> {
        match (self.position, self.progress) {
            (Some(position), _) => Ok(position),
            (None, Some(progress)) => document.position_for_progress(progress),
            (None, None) => Err(TreeError::InvalidProgress(f64::NAN)),
        }
    }
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load_with(path).map_err(|e| format!("Failed to load config: {e}").into())
}

/// Read `path` as a document tokenized with `encoding`.
pub(crate) fn open_document(path: &Path, encoding: &str) -> Result<Document, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let tokenizer: Arc<dyn tokenizer::Tokenizer> = Arc::from(tokenizer::from_name(encoding)?);
    Ok(Document::new(tokenizer, text))
}

/// Load a saved tree and the document it was built from.
///
/// The document is tokenized with the tree's own encoding and must cover
/// exactly the tree's range, so positions line up with the node ranges.
pub(crate) fn open(tree: &Path, document: &Path) -> Result<(SummaryTree, Document), Box<dyn std::error::Error>> {
    let tree = SummaryTree::load(tree)?;
    let document = open_document(document, tree.encoding())?;
    ensure_matches(&tree, &document)?;
    Ok((tree, document))
}

fn ensure_matches(tree: &SummaryTree, document: &Document) -> Result<(), String> {
    let (start, end) = tree.range();
    if start == 0 && end + 1 == document.token_count() {
        return Ok(());
    }
    Err(format!(
        "Document has {} tokens but the tree covers [{start}, {end}]; was it built from another file?",
        document.token_count()
    ))
}
