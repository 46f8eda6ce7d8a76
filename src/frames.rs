// Frame Emitter Module
// Wraps deltas and terminal states into the chat.completion.chunk envelope
// and renders them as Server-Sent Events.

use crate::openai::{ChatCompletionChunk, FinishReason, Usage};

/// End-of-stream sentinel, always the last frame of a completed stream
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Builds the frames of one streamed response.
///
/// Every frame carries the same response id, creation time and model name.
#[derive(Debug, Clone)]
pub struct FrameEmitter {
    id: String,
    model: String,
    created: i64,
}

impl FrameEmitter {
    pub fn new(id: impl Into<String>, model: impl Into<String>, created: i64) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created,
        }
    }

    /// Emitter with a fresh response id, created now
    pub fn for_model(model: impl Into<String>) -> Self {
        Self::new(
            format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            model,
            chrono::Utc::now().timestamp(),
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn envelope(&self) -> ChatCompletionChunk {
        ChatCompletionChunk::new(self.id.clone(), self.model.clone(), self.created)
    }

    pub fn role(&self) -> ChatCompletionChunk {
        self.envelope().with_role()
    }

    pub fn content(&self, text: impl Into<String>) -> ChatCompletionChunk {
        self.envelope().with_content(text.into())
    }

    pub fn finish(&self, reason: FinishReason, usage: Usage) -> ChatCompletionChunk {
        self.envelope().with_finish(reason).with_usage(usage)
    }
}

/// Format a chunk as Server-Sent Event
pub fn format_sse(chunk: &ChatCompletionChunk) -> String {
    let json = serde_json::to_string(chunk).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", json)
}
