//! Mail provider access.
//!
//! [`MailProvider`] is the raw provider API; it is handed an access token
//! on every call and keeps no per-user state. [`MailGateway`] wraps it with
//! timeouts, consent/exchange handling and error mapping.

mod gateway;
mod gmail;

pub use gateway::MailGateway;
pub use gmail::{GMAIL_API_BASE, GmailClient};

use async_trait::async_trait;
use replydesk_oauth::Token;
use serde::{Deserialize, Serialize};

/// Errors returned by a mail provider.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("Gmail API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Response body could not be decoded.
    #[error("Unexpected Gmail response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Message rejected before sending.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// A message header as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// A message in the connected mailbox. Provider data, passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Provider message id.
    pub id: String,
    /// Provider thread id.
    pub thread_id: String,
    /// Short body preview.
    pub snippet: String,
    /// Selected headers (From, To, Subject, Date).
    pub headers: Vec<MessageHeader>,
    /// Provider labels.
    pub label_ids: Vec<String>,
}

impl MailMessage {
    /// Looks up a header value, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// An outgoing plain-text message. The sender is always the connected
/// account, so there is no `from` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl OutgoingMessage {
    /// Creates an outgoing message.
    #[must_use]
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Checks the recipient looks like a single mailbox address.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::InvalidMessage`] describing the problem.
    pub fn validate(&self) -> Result<(), MailError> {
        let to = self.to.trim();
        let Some((local, domain)) = to.split_once('@') else {
            return Err(MailError::InvalidMessage(format!(
                "recipient is not an email address: {to:?}"
            )));
        };
        if local.is_empty() || domain.is_empty() || !domain.contains('.') {
            return Err(MailError::InvalidMessage(format!(
                "recipient is not an email address: {to:?}"
            )));
        }
        if to.chars().any(|c| c.is_whitespace() || c.is_control() || c == ',' || c == ';') {
            return Err(MailError::InvalidMessage(
                "recipient must be a single address".into(),
            ));
        }
        Ok(())
    }

    /// Renders the message as RFC 5322 text.
    ///
    /// CR and LF are stripped from header values so input cannot add headers.
    #[must_use]
    pub fn to_rfc5322(&self) -> String {
        let to = strip_line_breaks(self.to.trim());
        let subject = strip_line_breaks(&self.subject);
        let body = self.body.replace("\r\n", "\n").replace('\n', "\r\n");
        format!(
            "To: {to}\r\nSubject: {subject}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{body}"
        )
    }
}

fn strip_line_breaks(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Provider acknowledgement of a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    /// Provider message id.
    pub id: String,
    /// Provider thread id.
    pub thread_id: String,
}

/// The mail provider's message API.
///
/// Implementations must not keep credentials between calls.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Lists recent messages in the mailbox the credential belongs to.
    ///
    /// # Errors
    ///
    /// Returns a [`MailError`] on transport or provider failure.
    async fn list_messages(&self, credential: &Token) -> Result<Vec<MailMessage>, MailError>;

    /// Sends a message as the mailbox the credential belongs to.
    ///
    /// # Errors
    ///
    /// Returns a [`MailError`] on transport or provider failure.
    async fn send_message(
        &self,
        credential: &Token,
        message: &OutgoingMessage,
    ) -> Result<SentMessage, MailError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_recipient() {
        assert!(OutgoingMessage::new("buyer@example.com", "s", "b").validate().is_ok());
        assert!(OutgoingMessage::new("  buyer@example.com ", "s", "b").validate().is_ok());
        for bad in [
            "buyer",
            "@example.com",
            "buyer@",
            "buyer@localhost",
            "a@b.com, c@d.com",
            "a@b.com\r\nBcc: evil@x.com",
        ] {
            assert!(
                OutgoingMessage::new(bad, "s", "b").validate().is_err(),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_rfc5322_strips_header_injection() {
        let message = OutgoingMessage::new(
            "buyer@example.com",
            "Your order\r\nBcc: attacker@example.com",
            "Line one\nLine two",
        );
        let raw = message.to_rfc5322();
        assert!(raw.starts_with("To: buyer@example.com\r\n"));
        assert!(raw.contains("Subject: Your order  Bcc: attacker@example.com\r\n"));
        assert!(!raw.contains("\r\nBcc:"));
        assert!(!raw.to_lowercase().contains("\r\nfrom:"));
        assert!(raw.ends_with("\r\n\r\nLine one\r\nLine two"));
    }

    #[test]
    fn test_header_lookup() {
        let message = MailMessage {
            id: "1".into(),
            thread_id: "t".into(),
            snippet: String::new(),
            headers: vec![MessageHeader {
                name: "Subject".into(),
                value: "Where is my order?".into(),
            }],
            label_ids: vec![],
        };
        assert_eq!(message.header("subject"), Some("Where is my order?"));
        assert_eq!(message.header("From"), None);
    }
}
