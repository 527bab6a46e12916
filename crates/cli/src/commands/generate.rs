//! `recap summary` and `recap quiz` — Generation over the known context.

use std::io::Write;
use std::path::Path;

use recap_config::AppConfig;
use recap_core::provider::Provider;
use recap_providers::generate::{Generator, QuizEvent};
use recap_providers::router;
use recap_tree::get_context;

use super::ReadingPosition;

/// Rendered context at `at`, plus the generator that will consume it.
fn prepare(
    config_path: Option<&Path>,
    tree: &Path,
    document: &Path,
    at: &ReadingPosition,
) -> Result<(Generator, String), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let (tree, document) = super::open(tree, document)?;
    let position = at.resolve(&document)?;
    let context = get_context(&tree, &document, position)?;
    if context.is_empty() {
        return Err("Nothing has been read yet at this position".into());
    }

    Ok((generator(&config), context.render()))
}

/// Generator over the whole provider chain.
fn generator(config: &AppConfig) -> Generator {
    let providers = router::build_from_config(config);
    let chain = router::fallback_provider(config, &providers);
    tracing::debug!(provider = chain.name(), backends = chain.len(), "Generation chain ready");
    Generator::from_config(std::sync::Arc::new(chain), &config.default_model, config)
}

pub async fn summary(
    config_path: Option<&Path>,
    tree: &Path,
    document: &Path,
    at: &ReadingPosition,
) -> Result<(), Box<dyn std::error::Error>> {
    let (generator, context) = prepare(config_path, tree, document, at)?;

    let mut rx = generator.stream_summary(&context).await?;
    let mut stdout = std::io::stdout();
    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        if let Some(content) = &chunk.content {
            print!("{content}");
            stdout.flush()?;
        }
        if chunk.done {
            break;
        }
    }
    println!();
    Ok(())
}

pub async fn quiz(
    config_path: Option<&Path>,
    tree: &Path,
    document: &Path,
    at: &ReadingPosition,
) -> Result<(), Box<dyn std::error::Error>> {
    let (generator, context) = prepare(config_path, tree, document, at)?;

    let mut rx = generator.stream_quiz(&context).await?;
    let mut asked = 0usize;
    while let Some(event) = rx.recv().await {
        match event? {
            QuizEvent::Count(n) => println!("📝 {n} questions\n"),
            QuizEvent::Item(item) => {
                asked += 1;
                println!("{}. {}", item.number, item.question);
                println!("   → {}\n", item.answer);
            }
        }
    }

    if asked == 0 {
        return Err("The model did not produce any questions".into());
    }
    Ok(())
}
