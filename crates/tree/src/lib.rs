//! Hierarchical summary trees for progress-aware reading.
//!
//! A document is encoded once, cut into balanced token slices, and each
//! slice is summarized. Summaries are then reduced in groups, round after
//! round, until one root remains. Every node records the inclusive token
//! range it covers, so for any reading position the tree can answer:
//! which leaf am I in, and which completed summaries come before it.
//!
//! The builder never talks to a model directly; it is driven by any
//! [`recap_core::Summarizer`].

pub mod builder;
pub mod document;
pub mod node;
pub mod partition;
pub mod persist;
pub mod query;
pub mod retry;
pub mod schedule;
pub mod tokenizer;
pub mod tree;

pub use builder::{BuildOptions, TreeBuilder};
pub use document::Document;
pub use node::{NodeId, SummaryNode};
pub use partition::{Slice, partition};
pub use persist::FORMAT_VERSION;
pub use query::{Context, get_context};
pub use retry::RetryPolicy;
pub use schedule::{inference_count, split_groups};
pub use tokenizer::{BpeTokenizer, CharTokenizer, Token, Tokenizer};
pub use tree::{SummaryTree, TreeArena};
