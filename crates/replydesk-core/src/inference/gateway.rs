//! Inference gateway: prompts, token limits and label validation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Category, CompletionProvider, Sentiment};
use crate::error::{ServiceError, ServiceResult};

/// Tone used when neither the caller nor a brand voice supplies one.
pub const DEFAULT_TONE: &str = "professional";

/// Maximum completion tokens per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceLimits {
    /// Classification answer.
    pub classify: u32,
    /// Sentiment answer.
    pub sentiment: u32,
    /// Drafted reply.
    pub reply: u32,
}

impl Default for InferenceLimits {
    fn default() -> Self {
        Self {
            classify: 10,
            sentiment: 10,
            reply: 150,
        }
    }
}

/// Style guidance for a drafted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneHint {
    /// Tone, e.g. "friendly".
    pub tone: String,
    /// Phrases the brand likes to use, if any.
    pub common_phrases: Option<String>,
}

impl ToneHint {
    /// A bare tone with no phrases.
    #[must_use]
    pub fn new(tone: impl Into<String>) -> Self {
        Self {
            tone: tone.into(),
            common_phrases: None,
        }
    }

    /// Adds brand phrases. Blank input is ignored.
    #[must_use]
    pub fn with_phrases(mut self, phrases: impl Into<String>) -> Self {
        let phrases = phrases.into();
        self.common_phrases = (!phrases.trim().is_empty()).then_some(phrases);
        self
    }
}

impl Default for ToneHint {
    fn default() -> Self {
        Self::new(DEFAULT_TONE)
    }
}

/// Mediates every call to the language model.
///
/// Stateless apart from configuration; one provider call per operation.
#[derive(Clone)]
pub struct InferenceGateway {
    provider: Arc<dyn CompletionProvider>,
    limits: InferenceLimits,
    timeout: Duration,
}

impl InferenceGateway {
    /// Creates a gateway.
    #[must_use]
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        limits: InferenceLimits,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            limits,
            timeout,
        }
    }

    /// Assigns one of the fixed categories to an email body.
    ///
    /// An answer outside the label set yields [`Category::Unclassified`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Inference`] on provider failure or timeout.
    pub async fn classify(&self, content: &str) -> ServiceResult<Category> {
        let raw = self
            .complete("classify", &classify_prompt(content), self.limits.classify)
            .await?;
        let category = Category::from_model_output(&raw);
        if category == Category::Unclassified {
            warn!("Unrecognized category from model: {raw:?}");
        }
        Ok(category)
    }

    /// Scores the sentiment of an email body.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Inference`] on provider failure or timeout.
    pub async fn analyze_sentiment(&self, content: &str) -> ServiceResult<Sentiment> {
        let raw = self
            .complete("sentiment", &sentiment_prompt(content), self.limits.sentiment)
            .await?;
        let sentiment = Sentiment::from_model_output(&raw);
        if sentiment == Sentiment::Unclassified {
            warn!("Unrecognized sentiment from model: {raw:?}");
        }
        Ok(sentiment)
    }

    /// Drafts a reply to an email body in the given tone.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Inference`] on provider failure or timeout.
    pub async fn generate_reply(&self, content: &str, hint: &ToneHint) -> ServiceResult<String> {
        self.complete("reply", &reply_prompt(content, hint), self.limits.reply)
            .await
    }

    async fn complete(
        &self,
        operation: &str,
        instruction: &str,
        max_tokens: u32,
    ) -> ServiceResult<String> {
        debug!(operation, max_tokens, "Sending completion request");
        match tokio::time::timeout(self.timeout, self.provider.complete(instruction, max_tokens))
            .await
        {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                warn!("Inference {operation} failed: {e}");
                Err(ServiceError::Inference(e.to_string()))
            }
            Err(_) => {
                warn!("Inference {operation} timed out after {:?}", self.timeout);
                Err(ServiceError::Inference(format!(
                    "{operation} timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

impl std::fmt::Debug for InferenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceGateway")
            .field("limits", &self.limits)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn classify_prompt(content: &str) -> String {
    let labels: Vec<&str> = Category::PROMPT_LABELS
        .iter()
        .map(|label| label.as_str())
        .collect();
    format!(
        "Classify this email into one of the following categories: {}. Email: {content}",
        labels.join(", ")
    )
}

fn sentiment_prompt(content: &str) -> String {
    format!(
        "Analyze the sentiment of this email: {content}. Respond with \"positive\", \"neutral\", or \"negative\"."
    )
}

fn reply_prompt(content: &str, hint: &ToneHint) -> String {
    let mut prompt = format!(
        "Generate a response to this email in a {} tone.",
        hint.tone.trim()
    );
    if let Some(phrases) = &hint.common_phrases {
        prompt.push_str(&format!(" Where natural, use these phrases: {}.", phrases.trim()));
    }
    prompt.push_str(&format!(" Email: {content}"));
    prompt
}
