//! # Recap Core
//!
//! Domain types, traits, and error definitions shared by every Recap crate.
//! It carries no HTTP or tokenizer dependencies; it defines the seams
//! that the tree engine, the backends and the CLI implement against.
//!
//! ## Design Philosophy
//!
//! Text generation is a capability, not a dependency. The tree engine only
//! sees the [`Summarizer`] trait; the backends crate implements it on top of
//! a [`Provider`]. This enables:
//! - Swapping backends via configuration (or mid-run)
//! - Testing the engine with scripted summarizers and no network
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod summarizer;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, TreeError};
pub use event::{BuildEvent, EventBus, NoopProgress, ProgressSink};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use summarizer::{Summarizer, SystemRole};
