// Streaming Pacer Module
// Streams a fixed response at a target token rate within a wall-clock budget,
// truncating at paragraph boundaries once the budget runs out.

use crate::chunker::{chunk_text, Chunk, PARAGRAPH_SEPARATOR};
use crate::frames::{format_sse, FrameEmitter, DONE_FRAME};
use crate::openai::{ChatCompletionChunk, ChatCompletionResponse, FinishReason, Message, Usage};
use crate::tokens::estimate_tokens;
use crate::usage::calculate_usage;
use async_stream::stream;
use futures::{stream as futures_stream, Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Appended to truncated responses unless configured otherwise
pub const DEFAULT_TRUNCATION_MESSAGE: &str = "I've reached the response time limit, but I hope this information helps. Let me know if you need more details.";

/// Stream time budget unless configured otherwise
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(60);

/// Pacing parameters for one session, frozen when the session is built
#[derive(Debug, Clone, PartialEq)]
pub struct PacerSettings {
    /// Target emission rate; zero, negative or non-finite means no throttling
    pub tokens_per_second: f64,
    /// Wall-clock budget for the whole stream
    pub time_budget: Duration,
    /// When false the budget is advisory and never truncates
    pub enforce_time_limit: bool,
    /// Appended after the last paragraph of a truncated response; empty disables it
    pub truncation_message: String,
}

impl PacerSettings {
    pub fn new(tokens_per_second: f64) -> Self {
        Self {
            tokens_per_second,
            time_budget: DEFAULT_TIME_BUDGET,
            enforce_time_limit: false,
            truncation_message: DEFAULT_TRUNCATION_MESSAGE.to_string(),
        }
    }

    /// Emit everything immediately
    pub fn unthrottled() -> Self {
        Self::new(0.0)
    }

    /// Enforce the given budget
    pub fn with_time_limit(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self.enforce_time_limit = true;
        self
    }

    pub fn with_truncation_message(mut self, message: impl Into<String>) -> Self {
        self.truncation_message = message.into();
        self
    }

    pub fn is_throttled(&self) -> bool {
        self.tokens_per_second.is_finite() && self.tokens_per_second > 0.0
    }

    /// Time it takes to emit `tokens` tokens at the configured rate
    pub fn delay_for(&self, tokens: usize) -> Duration {
        if !self.is_throttled() {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(tokens as f64 / self.tokens_per_second)
            .unwrap_or(Duration::MAX)
    }

    /// Delay for a chunk, never sleeping past an enforced budget
    fn chunk_delay(&self, tokens: usize, elapsed: Duration) -> Duration {
        let delay = self.delay_for(tokens);
        if self.enforce_time_limit {
            delay.min(self.time_budget.saturating_sub(elapsed))
        } else {
            delay
        }
    }

    fn budget_exhausted(&self, elapsed: Duration) -> bool {
        self.enforce_time_limit && elapsed >= self.time_budget
    }

    /// Truncation message without any leading newlines; the pacer adds its own separator
    fn trimmed_truncation_message(&self) -> &str {
        self.truncation_message.trim_start_matches(['\r', '\n'])
    }
}

impl Default for PacerSettings {
    fn default() -> Self {
        Self::new(10.0)
    }
}

/// Outcome of a finished session, handed to the completion callback
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub finish_reason: FinishReason,
    pub usage: Usage,
    /// Per-chunk token tally used for pacing
    pub tokens_emitted: usize,
    pub elapsed: Duration,
    pub target_rate: f64,
    pub achieved_rate: f64,
}

type CompleteCallback = Box<dyn FnOnce(&SessionSummary) + Send + 'static>;
type AbortCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacerState {
    Streaming,
    Truncating,
    Done,
}

/// Transient state of one in-flight stream
struct Session {
    started: Instant,
    tokens_emitted: usize,
    emitted_text: String,
    truncated: bool,
}

impl Session {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            tokens_emitted: 0,
            emitted_text: String::new(),
            truncated: false,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn record(&mut self, text: &str, tokens: usize) {
        self.emitted_text.push_str(text);
        self.tokens_emitted += tokens;
    }

    fn achieved_rate(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.tokens_emitted as f64 / secs
        } else {
            0.0
        }
    }
}

/// Fires the abort callback if a stream is dropped before it finishes
struct AbortGuard {
    id: String,
    on_abort: Option<AbortCallback>,
    armed: bool,
}

impl AbortGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!(id = %self.id, "Stream dropped before completion, session aborted");
        if let Some(on_abort) = self.on_abort.take() {
            on_abort();
        }
    }
}

/// A paced streaming response for one request
pub struct StreamPacer {
    frames: FrameEmitter,
    content: String,
    prompt: Vec<Message>,
    settings: PacerSettings,
    on_complete: Option<CompleteCallback>,
    on_abort: Option<AbortCallback>,
}

impl StreamPacer {
    pub fn new(frames: FrameEmitter, content: String, settings: PacerSettings) -> Self {
        Self {
            frames,
            content,
            prompt: Vec::new(),
            settings,
            on_complete: None,
            on_abort: None,
        }
    }

    pub fn id(&self) -> &str {
        self.frames.id()
    }

    pub fn settings(&self) -> &PacerSettings {
        &self.settings
    }

    /// Build the whole response at once, without pacing or truncation
    pub fn materialize(self) -> ChatCompletionResponse {
        let usage = calculate_usage(&self.prompt, &self.content);
        let mut response =
            ChatCompletionResponse::new(self.frames.model().to_string(), self.content, usage);
        response.id = self.frames.id().to_string();
        response
    }

    /// Stream the response as Server-Sent Events, ending with `data: [DONE]`
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = String> + Send>> {
        let frames = self.into_chunk_stream().map(|chunk| format_sse(&chunk));
        let done = futures_stream::once(async { DONE_FRAME.to_string() });
        Box::pin(frames.chain(done))
    }

    /// Stream the response as chunk objects.
    ///
    /// Yields the role frame, the content deltas and finally the terminal
    /// frame with finish reason and usage. Dropping the stream early cancels
    /// any pending delay and fires the abort callback instead of the
    /// completion callback.
    pub fn into_chunk_stream(self) -> Pin<Box<dyn Stream<Item = ChatCompletionChunk> + Send>> {
        let StreamPacer {
            frames,
            content,
            prompt,
            settings,
            on_complete,
            on_abort,
        } = self;

        let mut guard = AbortGuard {
            id: frames.id().to_string(),
            on_abort,
            armed: true,
        };

        Box::pin(stream! {
            let chunks = chunk_text(&content, settings.tokens_per_second);
            let mut session = Session::start();

            yield frames.role();

            let mut state = PacerState::Streaming;
            let mut cursor = 0;
            let mut since_break = 0usize;

            while state != PacerState::Done {
                match state {
                    PacerState::Streaming => {
                        let Some(chunk) = chunks.get(cursor) else {
                            state = PacerState::Done;
                            continue;
                        };
                        if settings.budget_exhausted(session.elapsed()) {
                            tracing::debug!(
                                id = %frames.id(),
                                budget_secs = settings.time_budget.as_secs_f64(),
                                "Time budget exhausted, finishing current paragraph"
                            );
                            session.truncated = true;
                            state = PacerState::Truncating;
                            continue;
                        }

                        match chunk {
                            Chunk::ParagraphBreak => {
                                if since_break > 0 {
                                    yield frames.content(PARAGRAPH_SEPARATOR);
                                }
                                since_break = 0;
                            }
                            Chunk::Content(text) => {
                                let tokens = estimate_tokens(text);
                                let delay = settings.chunk_delay(tokens, session.elapsed());
                                if !delay.is_zero() {
                                    sleep(delay).await;
                                }
                                yield frames.content(text.clone());
                                session.record(text, tokens);
                                since_break += 1;
                            }
                        }
                        cursor += 1;
                    }
                    PacerState::Truncating => {
                        while let Some(Chunk::Content(text)) = chunks.get(cursor) {
                            yield frames.content(text.clone());
                            session.record(text, estimate_tokens(text));
                            cursor += 1;
                        }

                        let message = settings.trimmed_truncation_message();
                        if !message.is_empty() {
                            yield frames.content(format!("{}{}", PARAGRAPH_SEPARATOR, message));
                            session.record(message, estimate_tokens(message));
                        }
                        state = PacerState::Done;
                    }
                    PacerState::Done => {}
                }
            }

            let finish_reason = if session.truncated {
                FinishReason::Length
            } else {
                FinishReason::Stop
            };
            let elapsed = session.elapsed();
            let summary = SessionSummary {
                finish_reason,
                usage: calculate_usage(&prompt, &session.emitted_text),
                tokens_emitted: session.tokens_emitted,
                elapsed,
                target_rate: settings.tokens_per_second,
                achieved_rate: session.achieved_rate(elapsed),
            };

            if session.truncated {
                tracing::info!(
                    id = %frames.id(),
                    budget_secs = settings.time_budget.as_secs_f64(),
                    "Response truncated due to time limit"
                );
            }
            tracing::info!(
                id = %frames.id(),
                model = %frames.model(),
                target_rate = summary.target_rate,
                achieved_rate = format_args!("{:.2}", summary.achieved_rate),
                tokens = summary.tokens_emitted,
                elapsed_secs = format_args!("{:.2}", elapsed.as_secs_f64()),
                finish_reason = %finish_reason,
                "Stream finished"
            );

            guard.disarm();
            if let Some(on_complete) = on_complete {
                on_complete(&summary);
            }

            yield frames.finish(finish_reason, summary.usage);
        })
    }
}

/// Builder for creating paced streams
pub struct StreamPacerBuilder {
    id: Option<String>,
    model: String,
    content: String,
    prompt: Vec<Message>,
    settings: PacerSettings,
    on_complete: Option<CompleteCallback>,
    on_abort: Option<AbortCallback>,
}

impl StreamPacerBuilder {
    pub fn new(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            model: model.into(),
            content: content.into(),
            prompt: Vec::new(),
            settings: PacerSettings::default(),
            on_complete: None,
            on_abort: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn settings(mut self, settings: PacerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Prompt messages, used for usage accounting
    pub fn prompt(mut self, messages: Vec<Message>) -> Self {
        self.prompt = messages;
        self
    }

    /// Called once the terminal frame is about to be emitted
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&SessionSummary) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Called if the stream is dropped before it finishes
    pub fn on_abort<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_abort = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> StreamPacer {
        let frames = match self.id {
            Some(id) => FrameEmitter::new(id, self.model, chrono::Utc::now().timestamp()),
            None => FrameEmitter::for_model(self.model),
        };

        let mut pacer = StreamPacer::new(frames, self.content, self.settings);
        pacer.prompt = self.prompt;
        pacer.on_complete = self.on_complete;
        pacer.on_abort = self.on_abort;
        pacer
    }
}
