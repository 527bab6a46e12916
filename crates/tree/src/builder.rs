//! Tree builder: the bottom-up reduction driver.
//!
//! A build runs in supersteps. The leaf round summarizes every slice; each
//! reduction round groups the previous round's nodes and condenses every
//! group into a parent. Calls within a round run concurrently (bounded by
//! `concurrency`) and a round only starts once the previous one has fully
//! finished.
//!
//! Every call goes through the summarizer chain: the primary summarizer is
//! retried with backoff on transient errors, then each fallback in order.
//! Only when the whole chain fails does the build fail, and then no tree
//! is returned at all.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use recap_core::{
    BuildEvent, NoopProgress, ProgressSink, ProviderError, Summarizer, SystemRole, TreeError,
};
use tracing::{debug, error, info, warn};

use crate::document::Document;
use crate::node::NodeId;
use crate::partition::partition_tokens;
use crate::retry::RetryPolicy;
use crate::schedule::{inference_count, split_groups};
use crate::tokenizer::Tokenizer;
use crate::tree::{SummaryTree, TreeArena};

/// Knobs for a single build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    /// Upper bound on tokens per leaf slice.
    pub max_chunk_size: usize,
    /// Target number of nodes reduced into one parent.
    pub group_size: usize,
    /// Reductions over more than this many nodes use the intermediate
    /// role; the rest use the final role.
    pub intermediate_threshold: usize,
    /// Maximum summarizer calls in flight within a round.
    pub concurrency: usize,
    /// Per-call deadline. An expired call counts as a transient timeout.
    pub call_timeout: Option<Duration>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: 3900,
            group_size: 2,
            intermediate_threshold: 3,
            concurrency: 8,
            call_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl BuildOptions {
    pub fn validate(&self) -> Result<(), TreeError> {
        if self.max_chunk_size == 0 {
            return Err(TreeError::InvalidChunkSize(self.max_chunk_size));
        }
        if self.group_size < 2 {
            return Err(TreeError::InvalidGroupSize(self.group_size));
        }
        Ok(())
    }

    /// Whether a round over `remaining` nodes is still an intermediate pass.
    pub fn is_intermediate(&self, remaining: usize) -> bool {
        remaining > self.intermediate_threshold
    }
}

/// One summarizer call, borrowed from the round that issues it.
#[derive(Clone, Copy)]
enum Request<'a> {
    Leaf(&'a str),
    Reduce(&'a [String], SystemRole),
}

struct Tally<'a> {
    sink: &'a dyn ProgressSink,
    completed: AtomicUsize,
    total: usize,
}

impl Tally<'_> {
    fn tick(&self) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        self.sink.report_progress(done, self.total);
    }
}

/// Drives summarizers to build a [`SummaryTree`] over a [`Document`].
pub struct TreeBuilder {
    summarizers: Vec<Arc<dyn Summarizer>>,
    retry: RetryPolicy,
    progress: Arc<dyn ProgressSink>,
    options: BuildOptions,
}

impl TreeBuilder {
    /// A builder backed by a single summarizer with default options.
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            summarizers: vec![summarizer],
            retry: RetryPolicy::default(),
            progress: Arc::new(NoopProgress),
            options: BuildOptions::default(),
        }
    }

    /// Append a degraded summarizer, tried after everything added before it.
    pub fn with_fallback(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizers.push(summarizer);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Names of the summarizer chain, primary first.
    pub fn chain(&self) -> Vec<&str> {
        self.summarizers.iter().map(|s| s.name()).collect()
    }

    /// Encode `text` with `tokenizer` and build its tree.
    pub async fn build_text(
        &self,
        tokenizer: Arc<dyn Tokenizer>,
        text: &str,
    ) -> Result<SummaryTree, TreeError> {
        self.build(&Document::new(tokenizer, text)).await
    }

    /// Build the full tree for `document`.
    ///
    /// Either the complete tree is returned or an error; a failed build
    /// never yields a partial tree.
    pub async fn build(&self, document: &Document) -> Result<SummaryTree, TreeError> {
        let started = Instant::now();
        match self.run(document, started).await {
            Ok(tree) => Ok(tree),
            Err(e) => {
                error!(error = %e, "Tree build failed");
                self.progress.on_event(BuildEvent::BuildFailed {
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn run(&self, document: &Document, started: Instant) -> Result<SummaryTree, TreeError> {
        self.options.validate()?;
        if document.is_empty() {
            return Err(TreeError::EmptyInput);
        }

        let tokenizer = document.tokenizer();
        let slices = partition_tokens(
            tokenizer.as_ref(),
            document.tokens(),
            self.options.max_chunk_size,
        )?;
        let total = inference_count(slices.len(), self.options.group_size);
        let tally = Tally {
            sink: self.progress.as_ref(),
            completed: AtomicUsize::new(0),
            total,
        };
        let concurrency = self.options.concurrency.max(1);

        info!(
            tokens = document.token_count(),
            leaves = slices.len(),
            total_inferences = total,
            concurrency,
            chain = ?self.chain(),
            "Starting tree build"
        );
        self.progress.on_event(BuildEvent::BuildStarted {
            leaves: slices.len(),
            total_inferences: total,
            timestamp: Utc::now(),
        });
        self.progress.report_progress(0, total);

        let tally = &tally;
        let leaf_contents: Vec<String> = stream::iter(slices.iter())
            .map(|slice| async move {
                let stage = format!("leaf [{}, {}]", slice.start_idx, slice.end_idx);
                let content = self.call(&stage, Request::Leaf(&slice.text)).await?;
                tally.tick();
                Ok::<_, TreeError>(content)
            })
            .buffered(concurrency)
            .try_collect()
            .await?;

        let mut arena = TreeArena::with_capacity(total);
        let mut level: Vec<NodeId> = slices
            .iter()
            .zip(leaf_contents)
            .map(|(slice, content)| arena.push_leaf(slice.start_idx, slice.end_idx, content))
            .collect();

        let mut round = 0;
        while level.len() > 1 {
            round += 1;
            let remaining = level.len();
            let role = if self.options.is_intermediate(remaining) {
                SystemRole::Intermediate
            } else {
                SystemRole::Final
            };
            info!(round, nodes = remaining, %role, "Starting reduction round");

            let groups: Vec<(Vec<NodeId>, Vec<String>, String)> =
                split_groups(level, self.options.group_size)
                    .into_iter()
                    .map(|group| {
                        let mut contents = Vec::with_capacity(group.len());
                        let (mut start, mut end) = (usize::MAX, 0);
                        for &id in &group {
                            let node = arena.node(id).ok_or(TreeError::UnknownNode(id.index()))?;
                            contents.push(node.content.clone());
                            start = start.min(node.start_idx);
                            end = end.max(node.end_idx);
                        }
                        let stage = format!("round {round} [{start}, {end}]");
                        Ok((group, contents, stage))
                    })
                    .collect::<Result<_, TreeError>>()?;

            let reduced: Vec<String> = stream::iter(groups.iter())
                .map(|(_, contents, stage)| async move {
                    let content = self.call(stage, Request::Reduce(contents, role)).await?;
                    tally.tick();
                    Ok::<_, TreeError>(content)
                })
                .buffered(concurrency)
                .try_collect()
                .await?;

            level = groups
                .into_iter()
                .zip(reduced)
                .map(|((children, _, _), content)| arena.push_parent(&children, content))
                .collect::<Result<_, _>>()?;

            info!(round, nodes = level.len(), "Reduction round complete");
            self.progress.on_event(BuildEvent::RoundCompleted {
                round,
                nodes: level.len(),
                timestamp: Utc::now(),
            });
        }

        let root = level.first().copied().ok_or(TreeError::EmptyInput)?;
        let tree = arena.finish(root, tokenizer.name())?;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            rounds = round,
            nodes = tree.len(),
            depth = tree.depth(),
            duration_ms,
            "Tree build complete"
        );
        self.progress.on_event(BuildEvent::BuildFinished {
            rounds: round,
            nodes: tree.len(),
            duration_ms,
            timestamp: Utc::now(),
        });
        Ok(tree)
    }

    /// Run one request through the summarizer chain.
    async fn call(&self, stage: &str, request: Request<'_>) -> Result<String, TreeError> {
        let mut last_error = ProviderError::NotConfigured("No summarizers configured".into());

        for (i, summarizer) in self.summarizers.iter().enumerate() {
            let timeout = self.options.call_timeout;
            let result = self
                .retry
                .run(stage, move || async move {
                    let call = async {
                        match request {
                            Request::Leaf(text) => {
                                summarizer.summarize(text, SystemRole::Leaf).await
                            }
                            Request::Reduce(contents, role) => {
                                summarizer.reduce(contents, role).await
                            }
                        }
                    };
                    match timeout {
                        Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(
                            |_| {
                                Err(ProviderError::Timeout(format!(
                                    "{} did not answer within {}s",
                                    summarizer.name(),
                                    limit.as_secs()
                                )))
                            },
                        ),
                        None => call.await,
                    }
                })
                .await;

            match result {
                Ok(content) => {
                    if i > 0 {
                        warn!(
                            stage,
                            summarizer = summarizer.name(),
                            "Served by fallback summarizer"
                        );
                        self.progress.on_event(BuildEvent::FallbackUsed {
                            stage: stage.to_string(),
                            summarizer: summarizer.name().to_string(),
                        });
                    }
                    debug!(stage, summarizer = summarizer.name(), chars = content.len(), "Call complete");
                    return Ok(content);
                }
                Err(e) => {
                    warn!(
                        stage,
                        summarizer = summarizer.name(),
                        error = %e,
                        "Summarizer failed, trying next in chain"
                    );
                    last_error = e;
                }
            }
        }

        Err(TreeError::Backend {
            stage: stage.to_string(),
            source: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::CharTokenizer;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Summarizer that tags its input and records every call.
    struct Scripted {
        name: String,
        calls: Mutex<Vec<(String, SystemRole)>>,
        /// Errors handed out before the first success.
        failures: Mutex<Vec<ProviderError>>,
        /// Fail every call with a clone of this error.
        always_fail: Option<ProviderError>,
    }

    impl Scripted {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(Vec::new()),
                always_fail: None,
            }
        }

        fn failing(name: &str, error: ProviderError) -> Self {
            Self {
                always_fail: Some(error),
                ..Self::new(name)
            }
        }

        fn flaky(name: &str, failures: Vec<ProviderError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                ..Self::new(name)
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn roles(&self) -> Vec<SystemRole> {
            self.calls.lock().unwrap().iter().map(|(_, r)| *r).collect()
        }
    }

    #[async_trait]
    impl Summarizer for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn summarize(&self, text: &str, role: SystemRole) -> Result<String, ProviderError> {
            self.calls.lock().unwrap().push((text.to_string(), role));
            if let Some(e) = &self.always_fail {
                return Err(e.clone());
            }
            if let Some(e) = self.failures.lock().unwrap().pop() {
                return Err(e);
            }
            Ok(format!("{}({})", role.as_str(), text.replace('\n', "|")))
        }
    }

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<(usize, usize)>>,
        events: Mutex<Vec<BuildEvent>>,
    }

    impl ProgressSink for Recorder {
        fn report_progress(&self, completed: usize, total: usize) {
            self.progress.lock().unwrap().push((completed, total));
        }

        fn on_event(&self, event: BuildEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Recorder {
        fn fallbacks(&self) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| matches!(e, BuildEvent::FallbackUsed { .. }))
                .count()
        }
    }

    fn doc(len: usize) -> Document {
        let text: String = (0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        Document::new(Arc::new(CharTokenizer), text)
    }

    fn options(max_chunk_size: usize) -> BuildOptions {
        BuildOptions {
            max_chunk_size,
            ..BuildOptions::default()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::from_millis(3, 10, 100)
    }

    #[tokio::test]
    async fn single_leaf_becomes_the_root() {
        let s = Arc::new(Scripted::new("primary"));
        let tree = TreeBuilder::new(s.clone())
            .with_options(options(100))
            .build(&doc(30))
            .await
            .unwrap();

        assert_eq!(tree.len(), 1);
        assert!(tree.root_node().is_leaf());
        assert_eq!(tree.range(), (0, 29));
        assert_eq!(s.calls(), 1);
        assert_eq!(s.roles(), vec![SystemRole::Leaf]);
    }

    #[tokio::test]
    async fn five_leaves_reduce_into_the_expected_shape() {
        let s = Arc::new(Scripted::new("primary"));
        let tree = TreeBuilder::new(s.clone())
            .with_options(options(10))
            .build(&doc(50))
            .await
            .unwrap();

        let leaves: Vec<_> = tree
            .leaves()
            .into_iter()
            .map(|id| tree.node(id).unwrap().range())
            .collect();
        assert_eq!(leaves, vec![(0, 9), (10, 19), (20, 29), (30, 39), (40, 49)]);

        let root = tree.root_node();
        let top: Vec<_> = root
            .children
            .iter()
            .map(|&c| tree.node(c).unwrap().range())
            .collect();
        assert_eq!(top, vec![(0, 19), (20, 49)]);
        assert_eq!(tree.node(root.children[1]).unwrap().children.len(), 3);
        assert_eq!(s.calls(), 8);
        tree.validate().unwrap();
    }

    #[tokio::test]
    async fn parent_content_comes_from_children_in_order() {
        let s = Arc::new(Scripted::new("primary"));
        let tree = TreeBuilder::new(s)
            .with_options(options(5))
            .build(&doc(10))
            .await
            .unwrap();
        assert_eq!(tree.root_node().content, "final(leaf(abcde)|leaf(fghij))");
    }

    #[tokio::test]
    async fn roles_follow_the_intermediate_threshold() {
        let s = Arc::new(Scripted::new("primary"));
        TreeBuilder::new(s.clone())
            .with_options(options(10))
            .build(&doc(60))
            .await
            .unwrap();

        // 6 leaves → 3 intermediate reductions → 1 final reduction
        let roles = s.roles();
        assert_eq!(roles.iter().filter(|r| **r == SystemRole::Leaf).count(), 6);
        assert_eq!(
            roles.iter().filter(|r| **r == SystemRole::Intermediate).count(),
            3
        );
        assert_eq!(roles.iter().filter(|r| **r == SystemRole::Final).count(), 1);
    }

    #[tokio::test]
    async fn threshold_is_configurable() {
        let s = Arc::new(Scripted::new("primary"));
        TreeBuilder::new(s.clone())
            .with_options(BuildOptions {
                intermediate_threshold: 0,
                ..options(10)
            })
            .build(&doc(60))
            .await
            .unwrap();
        assert!(!s.roles().contains(&SystemRole::Final));
    }

    #[tokio::test]
    async fn progress_counts_every_inference() {
        let sink = Arc::new(Recorder::default());
        let s = Arc::new(Scripted::new("primary"));
        TreeBuilder::new(s)
            .with_options(options(10))
            .with_progress(sink.clone())
            .build(&doc(60))
            .await
            .unwrap();

        let progress = sink.progress.lock().unwrap().clone();
        let expected: Vec<_> = (0..=10).map(|i| (i, 10)).collect();
        assert_eq!(progress, expected);

        let events = sink.events.lock().unwrap();
        assert!(matches!(
            events.first(),
            Some(BuildEvent::BuildStarted { leaves: 6, total_inferences: 10, .. })
        ));
        assert!(matches!(
            events.last(),
            Some(BuildEvent::BuildFinished { rounds: 2, nodes: 10, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_in_place() {
        let s = Arc::new(Scripted::flaky(
            "primary",
            vec![
                ProviderError::RateLimited { retry_after_secs: 1 },
                ProviderError::Timeout("slow".into()),
            ],
        ));
        let backup = Arc::new(Scripted::new("backup"));
        let sink = Arc::new(Recorder::default());

        let tree = TreeBuilder::new(s.clone())
            .with_fallback(backup.clone())
            .with_retry(fast_retry())
            .with_progress(sink.clone())
            .with_options(options(100))
            .build(&doc(30))
            .await
            .unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(s.calls(), 3);
        assert_eq!(backup.calls(), 0);
        assert_eq!(sink.fallbacks(), 0);
    }

    #[tokio::test]
    async fn falls_back_when_primary_is_unusable() {
        let primary = Arc::new(Scripted::failing(
            "primary",
            ProviderError::AuthenticationFailed("bad key".into()),
        ));
        let backup = Arc::new(Scripted::new("backup"));
        let sink = Arc::new(Recorder::default());

        let tree = TreeBuilder::new(primary.clone())
            .with_fallback(backup.clone())
            .with_retry(fast_retry())
            .with_progress(sink.clone())
            .with_options(options(10))
            .build(&doc(50))
            .await
            .unwrap();

        assert_eq!(tree.len(), 8);
        // Permanent errors are not retried: one attempt per call
        assert_eq!(primary.calls(), 8);
        assert_eq!(backup.calls(), 8);
        assert_eq!(sink.fallbacks(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_chain_fails_the_whole_build() {
        let primary = Arc::new(Scripted::failing(
            "primary",
            ProviderError::Network("down".into()),
        ));
        let backup = Arc::new(Scripted::failing(
            "backup",
            ProviderError::ApiError {
                status_code: 503,
                message: "overloaded".into(),
            },
        ));
        let sink = Arc::new(Recorder::default());

        let result = TreeBuilder::new(primary.clone())
            .with_fallback(backup.clone())
            .with_retry(fast_retry())
            .with_progress(sink.clone())
            .with_options(BuildOptions {
                concurrency: 1,
                ..options(100)
            })
            .build(&doc(30))
            .await;

        match result {
            Err(TreeError::Backend { stage, source }) => {
                assert_eq!(stage, "leaf [0, 29]");
                assert!(matches!(source, ProviderError::ApiError { status_code: 503, .. }));
            }
            other => panic!("expected Backend error, got {other:?}"),
        }
        assert_eq!(primary.calls(), 3);
        assert_eq!(backup.calls(), 3);
        assert!(matches!(
            sink.events.lock().unwrap().last(),
            Some(BuildEvent::BuildFailed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_calls_time_out_and_fall_back() {
        struct Hanging;

        #[async_trait]
        impl Summarizer for Hanging {
            fn name(&self) -> &str {
                "hanging"
            }

            async fn summarize(&self, _text: &str, _role: SystemRole) -> Result<String, ProviderError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }

        let backup = Arc::new(Scripted::new("backup"));
        let tree = TreeBuilder::new(Arc::new(Hanging))
            .with_fallback(backup.clone())
            .with_retry(RetryPolicy::no_retry())
            .with_options(BuildOptions {
                call_timeout: Some(Duration::from_millis(50)),
                ..options(100)
            })
            .build(&doc(10))
            .await
            .unwrap();

        assert_eq!(backup.calls(), 1);
        assert_eq!(tree.root_node().content, "leaf(abcdefghij)");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_within_a_round() {
        struct Slow {
            in_flight: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait]
        impl Summarizer for Slow {
            fn name(&self) -> &str {
                "slow"
            }

            async fn summarize(&self, text: &str, _role: SystemRole) -> Result<String, ProviderError> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(text.chars().take(3).collect())
            }
        }

        let slow = Arc::new(Slow {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        TreeBuilder::new(slow.clone())
            .with_options(BuildOptions {
                concurrency: 3,
                ..options(10)
            })
            .build(&doc(80))
            .await
            .unwrap();

        assert_eq!(slow.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let s = Arc::new(Scripted::new("primary"));
        let builder = TreeBuilder::new(s.clone()).with_options(options(10));
        assert!(matches!(builder.build(&doc(0)).await, Err(TreeError::EmptyInput)));

        let builder = TreeBuilder::new(s.clone()).with_options(BuildOptions {
            group_size: 1,
            ..options(10)
        });
        assert!(matches!(
            builder.build(&doc(20)).await,
            Err(TreeError::InvalidGroupSize(1))
        ));
        assert_eq!(s.calls(), 0);
    }
}
