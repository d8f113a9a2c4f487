//! Persistence: users with their embedded delegated credential, email
//! records, templates and brand voices, all in one `SQLite` database.

mod brand_voice;
mod emails;
mod model;
mod templates;
mod users;

pub use brand_voice::BrandVoiceRepository;
pub use emails::EmailRepository;
pub use model::{
    BrandVoice, EmailId, EmailPriority, EmailRecord, EmailStatus, NewEmail, NewUser, Template,
    TemplateDraft, TemplateId, User, UserId,
};
pub use templates::TemplateRepository;
pub use users::UserRepository;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use replydesk_oauth::Token;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::{Error, Result};

/// Persists a single delegated credential per user.
///
/// Implementations do no locking of their own; concurrent writers for the
/// same user are serialized by [`crate::TokenRefresher`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the user's credential.
    ///
    /// Returns `Ok(None)` when the user exists but never connected.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UserNotFound`] for unknown users, or a
    /// storage error.
    async fn load(&self, user: UserId) -> Result<Option<Token>>;

    /// Replaces the user's credential in a single write.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UserNotFound`] for unknown users, or a
    /// storage error.
    async fn put(&self, user: UserId, credential: &Token) -> Result<()>;

    /// Removes the user's credential.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UserNotFound`] for unknown users, or a
    /// storage error.
    async fn clear(&self, user: UserId) -> Result<()>;
}

/// Shared connection pool with the schema applied.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn open(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Create an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        // A single connection that never recycles, or the data disappears.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                company_name TEXT NOT NULL,
                gmail_access_token TEXT,
                gmail_refresh_token TEXT,
                gmail_token_type TEXT,
                gmail_expires_at TEXT,
                gmail_scope TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                priority TEXT NOT NULL DEFAULT 'medium',
                received_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_emails_user ON emails(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                content TEXT NOT NULL,
                variables TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_templates_user ON templates(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS brand_voices (
                user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                tone TEXT NOT NULL,
                common_phrases TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// User and credential repository.
    #[must_use]
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    /// Email record repository.
    #[must_use]
    pub fn emails(&self) -> EmailRepository {
        EmailRepository::new(self.pool.clone())
    }

    /// Template repository.
    #[must_use]
    pub fn templates(&self) -> TemplateRepository {
        TemplateRepository::new(self.pool.clone())
    }

    /// Brand voice repository.
    #[must_use]
    pub fn brand_voices(&self) -> BrandVoiceRepository {
        BrandVoiceRepository::new(self.pool.clone())
    }
}

/// Timestamps are stored as RFC 3339 text with nanosecond precision so a
/// credential reads back exactly as it was written.
pub(crate) fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_time(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt(format!("{column}: {e}")))
}
