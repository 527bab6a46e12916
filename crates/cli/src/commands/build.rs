//! `recap build` — Summarize a document into a summary tree.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use recap_config::AppConfig;
use recap_core::event::{BuildEvent, EventBus};
use recap_core::summarizer::Summarizer;
use recap_providers::router;
use recap_providers::summarizer::SwappableSummarizer;
use recap_tree::{BuildOptions, RetryPolicy, TreeBuilder};
use tokio::sync::broadcast::{self, error::RecvError};

pub async fn run(
    config_path: Option<&Path>,
    document: &Path,
    output: Option<PathBuf>,
    max_chunk_size: Option<usize>,
    concurrency: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;
    if let Some(size) = max_chunk_size {
        config.tree.max_chunk_size = size;
    }
    if let Some(n) = concurrency {
        config.tree.concurrency = n;
    }
    config.validate()?;

    if !config.has_api_key() {
        tracing::warn!("No API key configured; only keyless providers such as ollama will work");
    }

    let doc = super::open_document(document, &config.tree.encoding)?;
    let output = output.unwrap_or_else(|| default_output(document));

    println!("📚 Building summary tree for {}", document.display());
    println!(
        "   {} tokens ({}), chunks of at most {}",
        doc.token_count(),
        config.tree.encoding,
        config.tree.max_chunk_size
    );

    let (builder, sticky) = builder_from_config(&config)?;
    println!("   Summarizers: {}", builder.chain().join(" → "));

    let bus = Arc::new(EventBus::default());
    let printer = tokio::spawn(print_events(bus.subscribe(), sticky));
    let builder = builder.with_progress(bus.clone());

    let result = builder.build(&doc).await;
    drop(builder);
    drop(bus);
    let _ = printer.await;

    let tree = result?;
    tree.save(&output)?;

    println!();
    println!(
        "   ✅ {} nodes, depth {}, saved to {}",
        tree.len(),
        tree.depth(),
        output.display()
    );
    Ok(())
}

/// `<document>.tree.json` next to the document.
fn default_output(document: &Path) -> PathBuf {
    let mut name = document.as_os_str().to_owned();
    name.push(".tree.json");
    PathBuf::from(name)
}

fn build_options(config: &AppConfig) -> BuildOptions {
    BuildOptions {
        max_chunk_size: config.tree.max_chunk_size,
        group_size: config.tree.group_size,
        intermediate_threshold: config.tree.intermediate_threshold,
        concurrency: config.tree.concurrency,
        call_timeout: Some(Duration::from_secs(config.retry.timeout_secs)),
    }
}

/// Moves the primary slot onto the fallback that last served a call, so a
/// dead primary is not retried for every remaining node.
struct StickyFallback {
    slot: Arc<SwappableSummarizer>,
    backends: Vec<Arc<dyn Summarizer>>,
}

impl StickyFallback {
    /// Returns whether the slot changed.
    async fn on_fallback(&self, served_by: &str) -> bool {
        let Some(next) = self.backends.iter().find(|b| b.name() == served_by) else {
            return false;
        };
        if self.slot.current().await.name() == served_by {
            return false;
        }
        self.slot.swap(next.clone()).await;
        true
    }
}

/// The primary summarizer, behind a swappable slot, with every configured
/// fallback after it.
fn builder_from_config(
    config: &AppConfig,
) -> Result<(TreeBuilder, StickyFallback), Box<dyn std::error::Error>> {
    let providers = router::build_from_config(config);
    let backends = router::summarizer_chain(config, &providers);
    let Some((first, fallbacks)) = backends.split_first() else {
        return Err(format!("Provider '{}' is not available", config.default_provider).into());
    };
    let slot = Arc::new(SwappableSummarizer::named(first.name(), first.clone()));
    let primary: Arc<dyn Summarizer> = slot.clone();

    let retry = RetryPolicy::from_millis(
        config.retry.max_attempts,
        config.retry.base_delay_ms,
        config.retry.max_delay_ms,
    );

    let builder = fallbacks
        .iter()
        .cloned()
        .fold(TreeBuilder::new(primary), TreeBuilder::with_fallback)
        .with_retry(retry)
        .with_options(build_options(config));

    Ok((builder, StickyFallback { slot, backends }))
}

/// Print build events until the bus is dropped.
async fn print_events(mut rx: broadcast::Receiver<Arc<BuildEvent>>, sticky: StickyFallback) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Progress printer lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event.as_ref() {
            BuildEvent::BuildStarted {
                leaves,
                total_inferences,
                ..
            } => println!("   {leaves} leaves, {total_inferences} summarizer calls"),
            BuildEvent::Progress { completed, total } => {
                print!("\r   ⏳ {completed}/{total}");
                let _ = std::io::stdout().flush();
            }
            BuildEvent::RoundCompleted { round, nodes, .. } => {
                println!("\r   ✓ round {round}: {nodes} nodes remain");
            }
            BuildEvent::FallbackUsed { stage, summarizer } => {
                println!("\r   ↪ {stage} served by {summarizer}");
                if sticky.on_fallback(summarizer).await {
                    println!("   ↪ remaining calls go to {summarizer} first");
                }
            }
            BuildEvent::BuildFinished {
                rounds,
                duration_ms,
                ..
            } => println!("\r   ✓ {rounds} rounds in {:.1}s", *duration_ms as f64 / 1000.0),
            BuildEvent::BuildFailed { error_message, .. } => {
                println!("\r   ❌ Build failed: {error_message}");
            }
        }
    }
}
