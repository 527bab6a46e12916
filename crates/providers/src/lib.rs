//! Text generation backends for Recap.
//!
//! All providers implement the `recap_core::Provider` trait. The router
//! builds them from configuration; [`ProviderSummarizer`] adapts a provider
//! to the `Summarizer` the tree builder consumes, and [`Generator`] produces
//! summaries and quizzes from a reader's context.

pub mod fallback;
pub mod generate;
pub mod openai_compat;
pub mod router;
pub mod summarizer;

pub use fallback::FallbackProvider;
pub use generate::{Generator, QuizEvent, QuizItem, QuizParser, parse_quiz};
pub use openai_compat::OpenAiCompatProvider;
pub use router::{
    Backend, ProviderRouter, backend_chain, build_from_config, fallback_provider, summarizer_chain,
};
pub use summarizer::{ProviderSummarizer, RolePrompts, SwappableSummarizer};
