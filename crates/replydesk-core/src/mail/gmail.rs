//! Gmail REST API client.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use replydesk_oauth::Token;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{MailError, MailMessage, MailProvider, MessageHeader, OutgoingMessage, SentMessage};

/// Gmail API base URL.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Headers requested when listing messages.
const METADATA_HEADERS: [&str; 4] = ["From", "To", "Subject", "Date"];

const ERROR_BODY_MAX_LEN: usize = 300;

/// Stateless Gmail API client. The access token is supplied per call.
#[derive(Debug, Clone)]
pub struct GmailClient {
    client: Client,
    base_url: String,
    max_results: u32,
}

impl GmailClient {
    /// Creates a client against the public Gmail API.
    #[must_use]
    pub fn new(max_results: u32) -> Self {
        Self::with_base_url(GMAIL_API_BASE, max_results)
    }

    /// Creates a client with a custom base URL.
    #[must_use]
    pub fn with_base_url(base_url: &str, max_results: u32) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_results: max_results.max(1),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{path}", self.base_url)
    }

    async fn message_metadata(
        &self,
        credential: &Token,
        message_id: &str,
    ) -> Result<MailMessage, MailError> {
        let mut query: Vec<(&str, &str)> = vec![("format", "metadata")];
        query.extend(METADATA_HEADERS.iter().map(|h| ("metadataHeaders", *h)));

        let response = self
            .client
            .get(self.url(&format!("messages/{message_id}")))
            .bearer_auth(&credential.access_token)
            .query(&query)
            .send()
            .await?;

        let raw: GmailMessageResponse = decode(response).await?;
        Ok(raw.into())
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_messages(&self, credential: &Token) -> Result<Vec<MailMessage>, MailError> {
        let response = self
            .client
            .get(self.url("messages"))
            .bearer_auth(&credential.access_token)
            .query(&[("maxResults", self.max_results.to_string())])
            .send()
            .await?;

        let list: GmailListResponse = decode(response).await?;
        let refs = list.messages.unwrap_or_default();
        debug!("Gmail returned {} message ids", refs.len());

        let mut messages = Vec::with_capacity(refs.len());
        for msg_ref in &refs {
            messages.push(self.message_metadata(credential, &msg_ref.id).await?);
        }
        Ok(messages)
    }

    async fn send_message(
        &self,
        credential: &Token,
        message: &OutgoingMessage,
    ) -> Result<SentMessage, MailError> {
        message.validate()?;
        let encoded = URL_SAFE_NO_PAD.encode(message.to_rfc5322().as_bytes());

        let response = self
            .client
            .post(self.url("messages/send"))
            .bearer_auth(&credential.access_token)
            .json(&serde_json::json!({ "raw": encoded }))
            .send()
            .await?;

        let sent: GmailSendResponse = decode(response).await?;
        debug!("Sent Gmail message, id={}", sent.id);
        Ok(SentMessage {
            id: sent.id,
            thread_id: sent.thread_id.unwrap_or_default(),
        })
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, MailError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(MailError::Api {
            status: status.as_u16(),
            body: truncate(&body, ERROR_BODY_MAX_LEN).to_string(),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailListResponse {
    messages: Option<Vec<GmailMessageRef>>,
}

#[derive(Debug, Deserialize)]
struct GmailMessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessageResponse {
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    label_ids: Vec<String>,
    #[serde(default)]
    snippet: String,
    payload: Option<GmailPayload>,
}

#[derive(Debug, Deserialize)]
struct GmailPayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailSendResponse {
    id: String,
    thread_id: Option<String>,
}

impl From<GmailMessageResponse> for MailMessage {
    fn from(raw: GmailMessageResponse) -> Self {
        Self {
            id: raw.id,
            thread_id: raw.thread_id,
            snippet: raw.snippet,
            headers: raw.payload.map(|p| p.headers).unwrap_or_default(),
            label_ids: raw.label_ids,
        }
    }
}
