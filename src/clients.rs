pub mod chat_completion;

pub use chat_completion::{ChatCompletionClassifier, ChatCompletionConfig};

const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

/// Long upstream error bodies are cut before they reach logs.
pub(crate) fn truncate_error_message(msg: &str) -> String {
    let char_count = msg.chars().count();
    if char_count <= MAX_ERROR_MESSAGE_LENGTH {
        return msg.to_string();
    }
    let truncated: String = msg.chars().take(MAX_ERROR_MESSAGE_LENGTH).collect();
    format!("{truncated}... (truncated, {char_count} chars)")
}
