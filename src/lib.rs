//! # Stream Mocker - Chat Completion Streaming Mock Server
//!
//! A mock of the OpenAI chat-completions API that streams canned responses
//! at a configurable token rate, so clients can be tested against slow and
//! fast models without running one.
//!
//! ## Features
//!
//! - Token-rate pacing with paragraph-aware chunking
//! - Optional wall-clock budget that truncates at a paragraph boundary
//! - Usage that reflects what was actually delivered
//! - Per-model rates, adjustable at runtime without affecting running streams
//! - Server-Sent Events framing compatible with OpenAI clients
//!
//! ## Usage
//!
//! ### As a CLI
//!
//! ```bash
//! stream-mocker serve --port 8000 --config config.example.yaml
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use stream_mocker::{openai::Message, PacerSettings, StreamPacerBuilder};
//!
//! # async fn demo() {
//! let pacer = StreamPacerBuilder::new("gpt-4", "Hello there.\n\nHow are you?")
//!     .settings(PacerSettings::new(20.0))
//!     .prompt(vec![Message::user("Hi")])
//!     .build();
//!
//! let mut frames = pacer.into_stream();
//! while let Some(frame) = frames.next().await {
//!     print!("{}", frame);
//! }
//! # }
//! ```

// Core library modules
pub mod chunker;
pub mod frames;
pub mod generator;
pub mod openai;
pub mod pacer;
pub mod speed;
pub mod stats;
pub mod tokens;
pub mod usage;

// CLI module (for `stream-mocker serve` command)
pub mod cli;

// Re-export commonly used types
pub use chunker::{chunk_text, Chunk};
pub use frames::{format_sse, FrameEmitter, DONE_FRAME};
pub use generator::{fit_to_duration, ResponseLibrary, ResponsePreview, MAX_FITTED_CHARS};
pub use pacer::{PacerSettings, SessionSummary, StreamPacer, StreamPacerBuilder};
pub use speed::{auto_response_length, estimate_speed_from_parameters, AutoResponseLength};
pub use stats::{new_shared_stats, SharedStats, Stats, StatsSnapshot};
pub use tokens::estimate_tokens;
pub use usage::calculate_usage;
