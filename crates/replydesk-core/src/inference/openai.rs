//! OpenAI-compatible chat-completion client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionProvider, InferenceError};

/// Default API base.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const ERROR_BODY_MAX_LEN: usize = 300;

/// Chat-completion client. One request per call, no caching.
#[derive(Clone)]
pub struct ChatCompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionClient {
    /// Creates a client against `base_url` (e.g. [`OPENAI_API_BASE`]).
    #[must_use]
    pub fn new(base_url: &str, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Model name sent with each request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionClient {
    async fn complete(&self, instruction: &str, max_tokens: u32) -> Result<String, InferenceError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: instruction,
            }],
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_MAX_LEN).collect(),
            });
        }

        let text = first_choice_text(&body)?;
        debug!(model = %self.model, chars = text.len(), "Completion received");
        Ok(text)
    }
}

/// Extracts the first choice's message text, trimmed.
fn first_choice_text(body: &str) -> Result<String, InferenceError> {
    let parsed: ChatResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(InferenceError::Empty)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: DEFAULT_MODEL,
            messages: vec![ChatMessage {
                role: "user",
                content: "Classify this",
            }],
            max_tokens: 10,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 10);
    }

    #[test]
    fn test_first_choice_is_trimmed() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"  returns \n"}},{"index":1,"message":{"role":"assistant","content":"shipping"}}]}"#;
        assert_eq!(first_choice_text(body).unwrap(), "returns");
    }

    #[test]
    fn test_empty_or_missing_choices() {
        assert!(matches!(first_choice_text(r#"{"choices":[]}"#), Err(InferenceError::Empty)));
        assert!(matches!(
            first_choice_text(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(InferenceError::Empty)
        ));
        assert!(matches!(first_choice_text("not json"), Err(InferenceError::Decode(_))));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = ChatCompletionClient::new(OPENAI_API_BASE, "sk-secret", DEFAULT_MODEL);
        assert!(!format!("{client:?}").contains("sk-secret"));
        assert_eq!(client.model(), DEFAULT_MODEL);
    }
}
