// Chunker Module
// Splits response text into paced units while keeping paragraph boundaries.

/// Separator streamed between paragraphs
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Chunk size, in characters, at or below the batching rate
const BASE_CHUNK_CHARS: f64 = 10.0;
/// Rates above this get coarser chunks
const BATCHING_RATE: f64 = 50.0;
/// Tokens per second per unit of size factor once batching kicks in
const RATE_PER_SIZE_STEP: f64 = 30.0;
const MAX_SIZE_FACTOR: f64 = 3.0;

/// One schedulable unit of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Text to stream as a single content delta
    Content(String),
    /// Boundary between two paragraphs
    ParagraphBreak,
}

impl Chunk {
    pub fn text(&self) -> Option<&str> {
        match self {
            Chunk::Content(text) => Some(text),
            Chunk::ParagraphBreak => None,
        }
    }

    pub fn is_break(&self) -> bool {
        matches!(self, Chunk::ParagraphBreak)
    }
}

/// Chunk size multiplier for a given rate.
///
/// Fast models stream coarser chunks so that per-chunk scheduling overhead
/// does not drag the effective rate below the configured one.
pub fn size_factor(tokens_per_second: f64) -> f64 {
    if !(tokens_per_second > BATCHING_RATE) {
        return 1.0;
    }
    (tokens_per_second / RATE_PER_SIZE_STEP).min(MAX_SIZE_FACTOR)
}

/// Character count at which a chunk buffer is flushed
pub fn target_chunk_chars(tokens_per_second: f64) -> f64 {
    BASE_CHUNK_CHARS * size_factor(tokens_per_second)
}

/// Split text into paragraphs on runs of two or more newlines.
///
/// Carriage returns inside a newline run are ignored so CRLF text splits the
/// same way as LF text. Paragraphs without any words are dropped.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut paragraphs = Vec::new();
    let mut start = 0;
    let mut run_start: Option<usize> = None;
    let mut newlines = 0;

    for (i, ch) in text.char_indices() {
        match ch {
            '\n' | '\r' => {
                run_start.get_or_insert(i);
                if ch == '\n' {
                    newlines += 1;
                }
            }
            _ => {
                if let (true, Some(end)) = (newlines >= 2, run_start) {
                    paragraphs.push(&text[start..end]);
                    start = i;
                }
                newlines = 0;
                run_start = None;
            }
        }
    }
    paragraphs.push(&text[start..]);

    paragraphs
        .into_iter()
        .filter(|p| p.split_whitespace().next().is_some())
        .collect()
}

/// Split text into an ordered sequence of chunks sized for the given rate.
///
/// Words are grouped until the group reaches the target size. Every chunk
/// after the first one of a paragraph starts with the space that separated
/// it from the previous word, so concatenating the content of a paragraph
/// gives back its words joined by single spaces. A `ParagraphBreak` sits
/// between consecutive paragraphs, never after the last one.
pub fn chunk_text(text: &str, tokens_per_second: f64) -> Vec<Chunk> {
    let target = target_chunk_chars(tokens_per_second);
    let mut chunks = Vec::new();

    for (index, paragraph) in split_paragraphs(text).into_iter().enumerate() {
        if index > 0 {
            chunks.push(Chunk::ParagraphBreak);
        }

        let mut buffer = String::new();
        let mut buffered_chars = 0usize;
        let mut first_in_paragraph = true;

        for word in paragraph.split_whitespace() {
            if buffered_chars > 0 {
                buffer.push(' ');
                buffered_chars += 1;
            }
            buffer.push_str(word);
            buffered_chars += word.chars().count();

            if buffered_chars as f64 >= target {
                chunks.push(flush(&mut buffer, first_in_paragraph));
                buffered_chars = 0;
                first_in_paragraph = false;
            }
        }

        if buffered_chars > 0 {
            chunks.push(flush(&mut buffer, first_in_paragraph));
        }
    }

    chunks
}

fn flush(buffer: &mut String, first_in_paragraph: bool) -> Chunk {
    let words = std::mem::take(buffer);
    if first_in_paragraph {
        Chunk::Content(words)
    } else {
        Chunk::Content(format!(" {}", words))
    }
}
