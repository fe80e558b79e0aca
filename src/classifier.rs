//! 外部テキスト分類器との境界。
//!
//! The batch engine only sees [`SentimentClassifier`]; the HTTP implementation lives in
//! `clients::chat_completion`.
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One chunk of texts submitted together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationRequest {
    pub topic: String,
    pub items: Vec<String>,
}

impl ClassificationRequest {
    pub fn new(topic: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            topic: topic.into(),
            items,
        }
    }

    /// Items tagged with their 1-based position, one per line.
    #[must_use]
    pub fn numbered_items(&self) -> String {
        self.items
            .iter()
            .enumerate()
            .map(|(idx, text)| format!("{}. {}", idx + 1, text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Labels in submission order. Length is whatever the classifier returned.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassificationResponse {
    pub labels: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to build classifier request: {0}")]
    Build(String),
    #[error("classifier transport error")]
    Transport(#[source] reqwest::Error),
    #[error("classifier returned error status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("classifier returned an empty response")]
    EmptyResponse,
    #[error("classifier response was malformed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    /// Classifies every item of `request` in one call. No retries.
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResponse, ClassifierError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_items_are_one_based() {
        let request = ClassificationRequest::new(
            "nuclear power",
            vec!["first post".to_string(), "second post".to_string()],
        );

        assert_eq!(request.numbered_items(), "1. first post\n2. second post");
        assert_eq!(request.len(), 2);
    }
}
