// OpenAI API Module
// Chat Completions request, response and streaming chunk types.

mod types;

pub use types::*;
