//! Query-time generation: summaries and quizzes over a reader's context.
//!
//! The context is the rendered output of a tree query: the summaries of
//! everything already read plus the raw text of the current passage.
//!
//! Quizzes come back in a line format:
//!
//! ```text
//! Number of Questions: 2
//! 1Q: Who is steering the boat?
//! 1A: The correspondent.
//! 2Q: ...
//! ```
//!
//! [`QuizParser`] reads that format incrementally so questions can be
//! shown while the model is still writing.

use std::sync::Arc;

use recap_config::AppConfig;
use recap_core::error::ProviderError;
use recap_core::provider::{Provider, ProviderRequest, StreamChunk};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// One question with its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    pub number: usize,
    pub question: String,
    pub answer: String,
}

/// Incremental quiz output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum QuizEvent {
    /// The number of questions the model announced.
    Count(usize),
    /// A question whose answer is complete.
    Item(QuizItem),
}

/// Line-oriented parser for the quiz format, fed arbitrary text chunks.
#[derive(Debug, Default)]
pub struct QuizParser {
    buffer: String,
    pending: Option<(usize, String)>,
    count_seen: bool,
}

impl QuizParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk; returns events for every line it completes.
    pub fn feed(&mut self, chunk: &str) -> Vec<QuizEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=end).collect();
            events.extend(self.parse_line(&line));
        }
        events
    }

    /// Flush the unterminated last line.
    pub fn finish(&mut self) -> Vec<QuizEvent> {
        let line = std::mem::take(&mut self.buffer);
        self.parse_line(&line).into_iter().collect()
    }

    fn parse_line(&mut self, line: &str) -> Option<QuizEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(rest) = strip_prefix_ignore_case(line, "number of questions:") {
            if self.count_seen {
                return None;
            }
            let count = rest.trim().parse().ok()?;
            self.count_seen = true;
            return Some(QuizEvent::Count(count));
        }

        match numbered(line) {
            Some((number, 'Q', text)) => {
                self.pending = Some((number, text.to_string()));
                None
            }
            Some((number, 'A', text)) => match self.pending.take() {
                Some((asked, question)) if asked == number => Some(QuizEvent::Item(QuizItem {
                    number,
                    question,
                    answer: text.to_string(),
                })),
                other => {
                    trace!(number, "Answer without a matching question");
                    self.pending = other;
                    None
                }
            },
            _ => {
                // Wrapped question text
                if let Some((_, question)) = &mut self.pending {
                    question.push(' ');
                    question.push_str(line);
                }
                None
            }
        }
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &line[prefix.len()..])
}

/// Split `"12Q: text"` into `(12, 'Q', "text")`.
fn numbered(line: &str) -> Option<(usize, char, &str)> {
    let digits = line.find(|c: char| !c.is_ascii_digit())?;
    if digits == 0 {
        return None;
    }
    let number = line[..digits].parse().ok()?;
    let rest = &line[digits..];
    let kind = rest.chars().next()?.to_ascii_uppercase();
    if kind != 'Q' && kind != 'A' {
        return None;
    }
    let text = rest[1..].strip_prefix(':')?.trim();
    Some((number, kind, text))
}

/// Parse a complete quiz reply.
pub fn parse_quiz(text: &str) -> Vec<QuizItem> {
    let mut parser = QuizParser::new();
    let mut events = parser.feed(text);
    events.extend(parser.finish());
    events
        .into_iter()
        .filter_map(|e| match e {
            QuizEvent::Item(item) => Some(item),
            QuizEvent::Count(_) => None,
        })
        .collect()
}

/// Summaries and quizzes through one provider.
pub struct Generator {
    provider: Arc<dyn Provider>,
    model: String,
    summary_prompt: String,
    quiz_prompt: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl Generator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        let prompts = recap_config::PromptConfig::default();
        Self {
            provider,
            model: model.into(),
            summary_prompt: prompts.summary,
            quiz_prompt: prompts.quiz,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, model: impl Into<String>, config: &AppConfig) -> Self {
        Self {
            summary_prompt: config.prompts.summary.clone(),
            quiz_prompt: config.prompts.quiz.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            ..Self::new(provider, model)
        }
    }

    fn request(&self, system: &str, context: &str) -> ProviderRequest {
        let request = ProviderRequest::exchange(&self.model, system, context)
            .with_temperature(self.temperature);
        match self.max_tokens {
            Some(max) => request.with_max_tokens(max),
            None => request,
        }
    }

    /// Summary of everything read so far.
    pub async fn summary(&self, context: &str) -> Result<String, ProviderError> {
        let response = self
            .provider
            .complete(self.request(&self.summary_prompt, context))
            .await?;
        Ok(response.message.content.trim().to_string())
    }

    /// Stream the summary as it is generated.
    pub async fn stream_summary(
        &self,
        context: &str,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        self.provider
            .stream(self.request(&self.summary_prompt, context))
            .await
    }

    /// Generate a complete quiz.
    pub async fn quiz(&self, context: &str) -> Result<Vec<QuizItem>, ProviderError> {
        let response = self
            .provider
            .complete(self.request(&self.quiz_prompt, context))
            .await?;
        Ok(parse_quiz(&response.message.content))
    }

    /// Stream quiz events as the reply is parsed.
    ///
    /// Dropping the receiver stops the parsing task, which in turn drops
    /// the provider stream.
    pub async fn stream_quiz(
        &self,
        context: &str,
    ) -> Result<mpsc::Receiver<Result<QuizEvent, ProviderError>>, ProviderError> {
        let mut upstream = self
            .provider
            .stream(self.request(&self.quiz_prompt, context))
            .await?;
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut parser = QuizParser::new();
            while let Some(chunk) = upstream.recv().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                let events = chunk
                    .content
                    .as_deref()
                    .map(|c| parser.feed(c))
                    .unwrap_or_default();
                for event in events {
                    if tx.send(Ok(event)).await.is_err() {
                        debug!("Quiz receiver dropped, stopping generation");
                        return;
                    }
                }
                if chunk.done {
                    break;
                }
            }
            for event in parser.finish() {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}
