//! `recap context` — Show what is known at a reading position.

use std::path::Path;

use recap_tree::get_context;

use super::ReadingPosition;

pub fn run(
    tree: &Path,
    document: &Path,
    at: &ReadingPosition,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tree, document) = super::open(tree, document)?;
    let position = at.resolve(&document)?;
    let context = get_context(&tree, &document, position)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    println!(
        "📍 Token {position} of {} (leaf {}), {} summaries",
        document.token_count(),
        context.leaf,
        context.summaries.len()
    );
    println!();
    println!("{}", context.render());
    Ok(())
}
