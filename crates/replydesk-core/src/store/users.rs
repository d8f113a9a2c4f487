//! User storage and the credential store backed by it.

use async_trait::async_trait;
use chrono::Utc;
use replydesk_oauth::Token;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::debug;

use super::model::{NewUser, User, UserId};
use super::{CredentialStore, decode_time, encode_time};
use crate::{Error, Result};

const USER_COLUMNS: &str = r"
    id, email, password_hash, company_name,
    gmail_access_token, gmail_refresh_token, gmail_token_type,
    gmail_expires_at, gmail_scope, created_at
";

/// Repository for users and their embedded Gmail credential.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a repository over an initialized pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Registers a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is already taken or the query fails.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r"
            INSERT INTO users (email, password_hash, company_name, created_at)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.company_name)
        .bind(encode_time(created_at))
        .execute(&self.pool)
        .await?;

        let id = UserId::new(result.last_insert_rowid());
        debug!("Registered user {id}");

        Ok(User {
            id,
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            company_name: new_user.company_name.clone(),
            credential: None,
            created_at,
        })
    }

    /// Get user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    /// Get user by login email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }
}

#[async_trait]
impl CredentialStore for UserRepository {
    async fn load(&self, user: UserId) -> Result<Option<Token>> {
        self.get(user)
            .await?
            .map(|u| u.credential)
            .ok_or(Error::UserNotFound(user))
    }

    async fn put(&self, user: UserId, credential: &Token) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE users SET
                gmail_access_token = ?,
                gmail_refresh_token = ?,
                gmail_token_type = ?,
                gmail_expires_at = ?,
                gmail_scope = ?
            WHERE id = ?
            ",
        )
        .bind(&credential.access_token)
        .bind(credential.refresh_token.as_deref())
        .bind(&credential.token_type)
        .bind(encode_time(credential.expires_at))
        .bind(credential.scope.as_deref())
        .bind(user.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(user));
        }
        debug!("Stored Gmail credential for user {user}");
        Ok(())
    }

    async fn clear(&self, user: UserId) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE users SET
                gmail_access_token = NULL,
                gmail_refresh_token = NULL,
                gmail_token_type = NULL,
                gmail_expires_at = NULL,
                gmail_scope = NULL
            WHERE id = ?
            ",
        )
        .bind(user.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(user));
        }
        debug!("Cleared Gmail credential for user {user}");
        Ok(())
    }
}

/// Convert a database row to a User.
fn row_to_user(row: &SqliteRow) -> Result<User> {
    let created_at: String = row.try_get("created_at")?;

    Ok(User {
        id: UserId::new(row.try_get("id")?),
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        company_name: row.try_get("company_name")?,
        credential: row_to_credential(row)?,
        created_at: decode_time("created_at", &created_at)?,
    })
}

/// A credential exists only when both the access token and its expiry are set.
fn row_to_credential(row: &SqliteRow) -> Result<Option<Token>> {
    let access_token: Option<String> = row.try_get("gmail_access_token")?;
    let Some(access_token) = access_token else {
        return Ok(None);
    };

    let expires_at: Option<String> = row.try_get("gmail_expires_at")?;
    let expires_at = expires_at
        .ok_or_else(|| Error::Corrupt("gmail_expires_at missing for stored token".into()))?;

    let mut token = Token::new(access_token, decode_time("gmail_expires_at", &expires_at)?);
    if let Some(token_type) = row.try_get::<Option<String>, _>("gmail_token_type")? {
        token.token_type = token_type;
    }
    token.refresh_token = row
        .try_get::<Option<String>, _>("gmail_refresh_token")?
        .filter(|t| !t.is_empty());
    token.scope = row.try_get("gmail_scope")?;
    Ok(Some(token))
}
