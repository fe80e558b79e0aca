//! 分類器レスポンスの JSON Schema。
use std::sync::LazyLock;

use serde_json::{Value, json};

/// `{"sentiments": ["Positive", ...]}`. Label spelling is checked later, not here,
/// so that a single odd label does not discard the whole chunk.
pub(crate) static SENTIMENT_RESPONSE_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "Sentiment Batch Response",
        "type": "object",
        "properties": {
            "sentiments": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["sentiments"]
    })
});
