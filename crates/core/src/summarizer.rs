//! Summarizer trait — the capability the tree builder is driven by.
//!
//! The builder never talks to a model. It hands raw slices and groups of
//! child summaries to a `Summarizer`, tagged with the [`SystemRole`] the
//! text is being produced for.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;

/// Which pass of the reduction a summarization request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemRole {
    /// Raw document slice → leaf summary.
    Leaf,
    /// Several summaries → one summary that will be reduced again.
    Intermediate,
    /// The last few summaries → the final synthesis.
    Final,
}

impl SystemRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leaf => "leaf",
            Self::Intermediate => "intermediate",
            Self::Final => "final",
        }
    }
}

impl std::fmt::Display for SystemRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text-generation capability that condenses text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// A human-readable name, used in logs when falling back.
    fn name(&self) -> &str;

    /// Condense `text` according to `role`.
    async fn summarize(&self, text: &str, role: SystemRole) -> Result<String, ProviderError>;

    /// Condense a group of sibling summaries into one.
    ///
    /// Default implementation joins the contents in order, one per line, and
    /// summarizes the result.
    async fn reduce(&self, contents: &[String], role: SystemRole) -> Result<String, ProviderError> {
        let joined = contents.join("\n");
        self.summarize(&joined, role).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<(String, SystemRole)>>,
    }

    #[async_trait]
    impl Summarizer for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn summarize(&self, text: &str, role: SystemRole) -> Result<String, ProviderError> {
            self.seen.lock().unwrap().push((text.to_string(), role));
            Ok(format!("<{text}>"))
        }
    }

    #[tokio::test]
    async fn default_reduce_joins_in_order() {
        let rec = Recorder { seen: Mutex::new(Vec::new()) };
        let out = rec
            .reduce(&["a".into(), "b".into(), "c".into()], SystemRole::Intermediate)
            .await
            .unwrap();
        assert_eq!(out, "<a\nb\nc>");
        let seen = rec.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, SystemRole::Intermediate);
    }

    #[test]
    fn role_names() {
        assert_eq!(SystemRole::Leaf.to_string(), "leaf");
        assert_eq!(SystemRole::Final.as_str(), "final");
        let json = serde_json::to_string(&SystemRole::Intermediate).unwrap();
        assert_eq!(json, "\"intermediate\"");
    }
}
