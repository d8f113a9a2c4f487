//! Stored record types.

use chrono::{DateTime, Utc};
use replydesk_oauth::Token;
use serde::{Deserialize, Serialize};

/// Unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl UserId {
    /// Create a new user ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered business account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: UserId,
    /// Login email address.
    pub email: String,
    /// Password hash, opaque to this crate.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Company display name.
    pub company_name: String,
    /// Connected Gmail credential, if any.
    #[serde(skip_serializing)]
    pub credential: Option<Token>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether a Gmail account is connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.credential.is_some()
    }
}

/// Fields required to register a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login email address.
    pub email: String,
    /// Password hash produced by the authentication layer.
    pub password_hash: String,
    /// Company display name.
    pub company_name: String,
}

/// Unique identifier for a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub i64);

impl TemplateId {
    /// Create a new template ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A saved reply template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Unique identifier.
    pub id: TemplateId,
    /// Owner.
    pub user_id: UserId,
    /// Template name.
    pub name: String,
    /// Template body.
    pub content: String,
    /// Variable names referenced by the body.
    pub variables: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Editable template fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDraft {
    /// Template name.
    pub name: String,
    /// Template body.
    pub content: String,
    /// Variable names referenced by the body.
    #[serde(default)]
    pub variables: Vec<String>,
}

/// How a business wants its replies to sound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandVoice {
    /// Owner.
    pub user_id: UserId,
    /// Tone, e.g. "friendly" or "formal".
    pub tone: String,
    /// Phrases the business likes to use.
    pub common_phrases: String,
}

/// Unique identifier for a stored email record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailId(pub i64);

impl EmailId {
    /// Create a new email ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a customer email has been answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    /// Waiting for a reply.
    #[default]
    Pending,
    /// A reply was sent.
    Responded,
}

impl EmailStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "responded" => Some(Self::Responded),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
        }
    }
}

impl std::str::FromStr for EmailStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown status '{s}' (pending, responded)"))
    }
}

/// How urgently a customer email needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailPriority {
    /// Can wait.
    Low,
    /// Normal queue.
    #[default]
    Medium,
    /// Answer first.
    High,
}

impl EmailPriority {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for EmailPriority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown priority '{s}' (low, medium, high)"))
    }
}

/// A customer email recorded for follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Unique identifier.
    pub id: EmailId,
    /// Owner.
    pub user_id: UserId,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Reply status.
    pub status: EmailStatus,
    /// Priority.
    pub priority: EmailPriority,
    /// When the email arrived.
    pub received_at: DateTime<Utc>,
}

/// Fields required to record an email. Status starts as pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmail {
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Priority.
    pub priority: EmailPriority,
    /// Arrival time; now if absent.
    pub received_at: Option<DateTime<Utc>>,
}

impl NewEmail {
    /// A medium-priority email received now.
    #[must_use]
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            priority: EmailPriority::default(),
            received_at: None,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: EmailPriority) -> Self {
        self.priority = priority;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_email_defaults() {
        let email = NewEmail::new("Order #1001", "Where is it?");
        assert_eq!(email.priority, EmailPriority::Medium);
        assert_eq!(EmailStatus::default(), EmailStatus::Pending);
    }

    #[test]
    fn test_status_and_priority_strings() {
        for status in [EmailStatus::Pending, EmailStatus::Responded] {
            assert_eq!(EmailStatus::parse(status.as_str()), Some(status));
        }
        for priority in [EmailPriority::Low, EmailPriority::Medium, EmailPriority::High] {
            assert_eq!(priority.as_str().parse::<EmailPriority>(), Ok(priority));
        }
        assert_eq!(EmailPriority::parse(" HIGH "), Some(EmailPriority::High));
        assert!("urgent".parse::<EmailPriority>().is_err());
        assert_eq!(
            serde_json::to_value(EmailStatus::Responded).unwrap(),
            serde_json::json!("responded")
        );
    }
}
