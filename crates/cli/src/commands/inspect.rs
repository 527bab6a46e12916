//! `recap inspect` — Validate a saved tree and print its shape.

use std::path::Path;

use recap_tree::SummaryTree;

pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    // Loading validates the structure.
    let tree = SummaryTree::load(path)?;
    let (start, end) = tree.range();
    let leaves = tree.leaves();

    println!("🌳 {}", path.display());
    println!("   Encoding:  {}", tree.encoding());
    println!("   Tokens:    [{start}, {end}]");
    println!("   Nodes:     {}", tree.len());
    println!("   Leaves:    {}", leaves.len());
    println!("   Depth:     {}", tree.depth());
    println!();

    for line in outline(&tree) {
        println!("   {line}");
    }
    Ok(())
}

/// One line per node, indented by depth, in document order.
fn outline(tree: &SummaryTree) -> Vec<String> {
    let mut lines = Vec::with_capacity(tree.len());
    let mut stack = vec![(tree.root(), 0usize)];

    while let Some((id, depth)) = stack.pop() {
        let Some(node) = tree.node(id) else { continue };
        lines.push(format!(
            "{}{} [{}, {}] {}",
            "  ".repeat(depth),
            id,
            node.start_idx,
            node.end_idx,
            preview(&node.content, 60)
        ));
        stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
    }
    lines
}

/// First line of `text`, cut to `max` characters.
fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}
