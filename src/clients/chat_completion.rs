//! Azure OpenAI 互換の Chat Completions API を使った感情分類クライアント。
//!
//! 1 リクエスト = 1 チャンク。再試行は行わない（失敗はバッチエンジン側でフォールバック）。
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::truncate_error_message;
use crate::classifier::{
    ClassificationRequest, ClassificationResponse, ClassifierError, SentimentClassifier,
};
use crate::schema::{sentiment::SENTIMENT_RESPONSE_SCHEMA, validate_json};
use crate::util::redact::redact;

#[derive(Clone)]
pub struct ChatCompletionConfig {
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct ChatCompletionClassifier {
    client: Client,
    url: Url,
    api_key: String,
    deployment: String,
}

impl fmt::Debug for ChatCompletionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionConfig")
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("api_key", &redact(&self.api_key))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl fmt::Debug for ChatCompletionClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionClassifier")
            .field("url", &self.url.as_str())
            .field("api_key", &redact(&self.api_key))
            .field("deployment", &self.deployment)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentimentPayload {
    sentiments: Vec<String>,
}

impl ChatCompletionClassifier {
    /// # Errors
    /// Returns [`ClassifierError::Build`] for an unparseable endpoint or a client that
    /// cannot be constructed.
    pub fn new(config: ChatCompletionConfig) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::Build(format!("failed to build HTTP client: {e}")))?;

        let url = chat_completions_url(&config.endpoint, &config.deployment, &config.api_version)?;

        Ok(Self {
            client,
            url,
            api_key: config.api_key,
            deployment: config.deployment,
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

fn chat_completions_url(
    endpoint: &str,
    deployment: &str,
    api_version: &str,
) -> Result<Url, ClassifierError> {
    let mut base = endpoint.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let mut url = Url::parse(&base)
        .and_then(|base| base.join(&format!("openai/deployments/{deployment}/chat/completions")))
        .map_err(|e| ClassifierError::Build(format!("invalid classifier endpoint {endpoint}: {e}")))?;
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url)
}

/// System prompt naming the topic and the JSON contract.
#[must_use]
pub fn system_prompt(topic: &str) -> String {
    format!(
        "You are a helpful assistant that classifies social media posts into Positive, Negative, \
         or Neutral sentiment toward {topic}. You must output ONLY a valid JSON object in the \
         following format:\n{{\"sentiments\": [\"Positive\", \"Negative\", \"Neutral\", ...]}}\n\
         Ensure the number of sentiments matches the number of posts. Each sentiment corresponds \
         exactly to one post in the order they are presented."
    )
}

#[must_use]
pub fn user_prompt(request: &ClassificationRequest) -> String {
    format!(
        "Classify the sentiment of these social media posts (Positive, Negative, or Neutral):\n{}\n\n\
         Return ONLY the JSON object without any extra text, and make sure the number of labels \
         corresponds exactly to {}!",
        request.numbered_items(),
        request.len()
    )
}

/// Extracts the label array from the assistant message content.
fn parse_sentiments(content: Option<&str>) -> Result<Vec<String>, ClassifierError> {
    let content = content.map(str::trim).unwrap_or_default();
    if content.is_empty() {
        return Err(ClassifierError::EmptyResponse);
    }

    let value: Value = serde_json::from_str(content)
        .map_err(|e| ClassifierError::Malformed(format!("content is not JSON: {e}")))?;

    let validation = validate_json(&SENTIMENT_RESPONSE_SCHEMA, &value);
    if !validation.valid {
        return Err(ClassifierError::Malformed(format!(
            "content failed schema validation: {}",
            validation.errors.join("; ")
        )));
    }

    serde_json::from_value::<SentimentPayload>(value)
        .map(|payload| payload.sentiments)
        .map_err(|e| ClassifierError::Malformed(e.to_string()))
}

#[async_trait]
impl SentimentClassifier for ChatCompletionClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResponse, ClassifierError> {
        let system = system_prompt(&request.topic);
        let user = user_prompt(request);
        let body = ChatCompletionRequest {
            model: &self.deployment,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!(
            deployment = %self.deployment,
            item_count = request.len(),
            "sending sentiment classification request"
        );

        let response = self
            .client
            .post(self.url.clone())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ClassifierError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated = truncate_error_message(&body);
            warn!(http_status = %status, error_body = %truncated, "classifier returned error status");
            return Err(ClassifierError::Status {
                status,
                body: truncated,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(format!("unexpected completion body: {e}")))?;

        let content = completion
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref());
        let labels = parse_sentiments(content)?;

        debug!(
            requested = request.len(),
            returned = labels.len(),
            "received sentiment labels"
        );

        Ok(ClassificationResponse { labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn classifier_for(server: &MockServer) -> ChatCompletionClassifier {
        ChatCompletionClassifier::new(ChatCompletionConfig {
            endpoint: server.uri(),
            deployment: "o4-mini".to_string(),
            api_version: "2025-01-01-preview".to_string(),
            api_key: "test-key".to_string(),
            timeout: Duration::from_secs(5),
        })
        .expect("client builds")
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": content } }
            ]
        })
    }

    fn request(items: &[&str]) -> ClassificationRequest {
        ClassificationRequest::new(
            "nuclear power",
            items.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    #[test]
    fn url_includes_deployment_and_api_version() {
        let url = chat_completions_url("https://example.openai.azure.com", "o4-mini", "2025-01-01")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://example.openai.azure.com/openai/deployments/o4-mini/chat/completions?api-version=2025-01-01"
        );
    }

    #[test]
    fn invalid_endpoint_is_a_build_error() {
        let error = chat_completions_url("not a url", "d", "v").expect_err("invalid");
        assert!(matches!(error, ClassifierError::Build(_)));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = ChatCompletionConfig {
            endpoint: "https://example.openai.azure.com".to_string(),
            deployment: "o4-mini".to_string(),
            api_version: "2025-01-01-preview".to_string(),
            api_key: "sk-live-secret-value".to_string(),
            timeout: Duration::from_secs(5),
        };
        let classifier = ChatCompletionClassifier::new(config.clone()).expect("client builds");

        for rendered in [format!("{config:?}"), format!("{classifier:?}")] {
            assert!(!rendered.contains("sk-live-secret-value"), "{rendered}");
            assert!(rendered.contains("sk-l***"), "{rendered}");
        }
    }

    #[test]
    fn prompts_mention_topic_and_count() {
        let req = request(&["a", "b", "c"]);
        assert!(system_prompt(&req.topic).contains("toward nuclear power"));
        let user = user_prompt(&req);
        assert!(user.contains("1. a\n2. b\n3. c"));
        assert!(user.contains("exactly to 3"));
    }

    #[tokio::test]
    async fn classify_returns_labels_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/o4-mini/chat/completions"))
            .and(query_param("api-version", "2025-01-01-preview"))
            .and(header("api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "response_format": { "type": "json_object" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"sentiments": ["Positive", "Negative"]}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let response = classifier_for(&server)
            .classify(&request(&["great", "awful"]))
            .await
            .expect("classification succeeds");

        assert_eq!(response.labels, vec!["Positive", "Negative"]);
    }

    #[tokio::test]
    async fn classify_passes_through_count_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion(r#"{"sentiments": ["Neutral"]}"#)),
            )
            .mount(&server)
            .await;

        let response = classifier_for(&server)
            .classify(&request(&["a", "b", "c"]))
            .await
            .expect("classification succeeds");

        assert_eq!(response.labels.len(), 1);
    }

    #[tokio::test]
    async fn error_status_is_reported_with_truncated_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("y".repeat(800)))
            .mount(&server)
            .await;

        let error = classifier_for(&server)
            .classify(&request(&["a"]))
            .await
            .expect_err("429 should fail");

        match error {
            ClassifierError::Status { status, body } => {
                assert_eq!(status.as_u16(), 429);
                assert!(body.contains("truncated, 800 chars"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Positive, Negative")))
            .mount(&server)
            .await;

        let error = classifier_for(&server)
            .classify(&request(&["a", "b"]))
            .await
            .expect_err("not json");
        assert!(matches!(error, ClassifierError::Malformed(_)));
    }

    #[tokio::test]
    async fn empty_content_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
            .mount(&server)
            .await;

        let error = classifier_for(&server)
            .classify(&request(&["a"]))
            .await
            .expect_err("empty");
        assert!(matches!(error, ClassifierError::EmptyResponse));
    }

    #[tokio::test]
    async fn missing_sentiments_key_fails_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion(r#"{"labels": ["Positive"]}"#)),
            )
            .mount(&server)
            .await;

        let error = classifier_for(&server)
            .classify(&request(&["a"]))
            .await
            .expect_err("schema");
        assert!(matches!(error, ClassifierError::Malformed(ref msg) if msg.contains("schema")));
        assert!(matches!(error, ClassifierError::Malformed(ref msg) if msg.contains("sentiments")));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let classifier = ChatCompletionClassifier::new(ChatCompletionConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            deployment: "o4-mini".to_string(),
            api_version: "2025-01-01-preview".to_string(),
            api_key: "k".to_string(),
            timeout: Duration::from_secs(2),
        })
        .expect("client builds");

        let error = classifier
            .classify(&request(&["a"]))
            .await
            .expect_err("connection refused");
        assert!(matches!(error, ClassifierError::Transport(_)));
    }
}
