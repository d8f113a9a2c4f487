//! Language-model access for classifying, scoring and drafting replies.

mod gateway;
mod labels;
mod openai;

pub use gateway::{DEFAULT_TONE, InferenceGateway, InferenceLimits, ToneHint};
pub use labels::{Category, Sentiment};
pub use openai::{ChatCompletionClient, DEFAULT_MODEL, OPENAI_API_BASE};

use async_trait::async_trait;

/// Errors returned by a completion provider.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status (rate limit, auth, ...).
    #[error("Completion API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Response body could not be decoded.
    #[error("Malformed completion response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Response decoded but carried no text.
    #[error("Completion response contained no text")]
    Empty,
}

/// A chat-completion style model endpoint.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Sends one instruction and returns the first choice's text, trimmed.
    ///
    /// # Errors
    ///
    /// Returns an [`InferenceError`] on transport, provider or decoding failure.
    async fn complete(&self, instruction: &str, max_tokens: u32) -> Result<String, InferenceError>;
}
