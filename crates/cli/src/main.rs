//! Recap CLI — the main entry point.
//!
//! Commands:
//! - `build`    — Summarize a document into a summary tree
//! - `inspect`  — Validate a saved tree and print its shape
//! - `context`  — Show what is known at a reading position
//! - `summary`  — Summarize everything read so far
//! - `quiz`     — Quiz the reader on everything read so far
//! - `config`   — Show, locate or validate configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::ReadingPosition;

#[derive(Parser)]
#[command(
    name = "recap",
    about = "Recap — progress-aware summaries and quizzes for long documents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.recap/config.toml
    #[arg(short, long, global = true, env = "RECAP_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the summary tree for a document
    Build {
        /// Plain-text document to summarize
        document: PathBuf,

        /// Where to write the tree (defaults to <document>.tree.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override tree.max_chunk_size
        #[arg(long)]
        max_chunk_size: Option<usize>,

        /// Override tree.concurrency
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Validate a saved tree and print its shape
    Inspect {
        /// Saved summary tree
        tree: PathBuf,
    },

    /// Show the summaries and raw text known at a reading position
    Context {
        tree: PathBuf,
        document: PathBuf,

        #[command(flatten)]
        position: ReadingPosition,

        /// Print the context as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize everything read up to a reading position
    Summary {
        tree: PathBuf,
        document: PathBuf,

        #[command(flatten)]
        position: ReadingPosition,
    },

    /// Generate quiz questions on everything read up to a reading position
    Quiz {
        tree: PathBuf,
        document: PathBuf,

        #[command(flatten)]
        position: ReadingPosition,
    },

    /// Show configuration (default), its path, or validate it
    Config {
        /// Validate the configuration and report problems
        #[arg(long)]
        validate: bool,

        /// Print the config file path
        #[arg(long, conflicts_with = "validate")]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Build {
            document,
            output,
            max_chunk_size,
            concurrency,
        } => {
            commands::build::run(config_path, &document, output, max_chunk_size, concurrency)
                .await?
        }
        Commands::Inspect { tree } => commands::inspect::run(&tree)?,
        Commands::Context {
            tree,
            document,
            position,
            json,
        } => commands::context::run(&tree, &document, &position, json)?,
        Commands::Summary {
            tree,
            document,
            position,
        } => commands::generate::summary(config_path, &tree, &document, &position).await?,
        Commands::Quiz {
            tree,
            document,
            position,
        } => commands::generate::quiz(config_path, &tree, &document, &position).await?,
        Commands::Config { validate, path } => {
            if validate {
                commands::config_cmd::validate(config_path)?
            } else if path {
                commands::config_cmd::path(config_path)
            } else {
                commands::config_cmd::show(config_path)?
            }
        }
    }

    Ok(())
}
