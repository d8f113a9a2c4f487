//! Customer email records kept for follow-up.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::debug;

use super::model::{EmailId, EmailPriority, EmailRecord, EmailStatus, NewEmail, UserId};
use super::{decode_time, encode_time};
use crate::{Error, Result};

const EMAIL_COLUMNS: &str = "id, user_id, subject, body, status, priority, received_at";

/// Repository for per-user email records.
#[derive(Debug, Clone)]
pub struct EmailRepository {
    pool: SqlitePool,
}

impl EmailRepository {
    /// Creates a repository over an initialized pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record an email for `user`. Status starts as pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for an empty subject or body,
    /// [`Error::UserNotFound`] if the user does not exist, or a query error.
    pub async fn create(&self, user: UserId, email: &NewEmail) -> Result<EmailRecord> {
        if email.subject.trim().is_empty() {
            return Err(Error::InvalidRecord("subject is empty".into()));
        }
        if email.body.trim().is_empty() {
            return Err(Error::InvalidRecord("body is empty".into()));
        }

        let received_at = email.received_at.unwrap_or_else(Utc::now);
        let status = EmailStatus::default();
        let result = sqlx::query(
            r"
            INSERT INTO emails (user_id, subject, body, status, priority, received_at)
            SELECT id, ?, ?, ?, ?, ? FROM users WHERE id = ?
            ",
        )
        .bind(&email.subject)
        .bind(&email.body)
        .bind(status.as_str())
        .bind(email.priority.as_str())
        .bind(encode_time(received_at))
        .bind(user.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(user));
        }

        let id = EmailId::new(result.last_insert_rowid());
        debug!("Recorded email {id} for user {user}");
        Ok(EmailRecord {
            id,
            user_id: user,
            subject: email.subject.clone(),
            body: email.body.clone(),
            status,
            priority: email.priority,
            received_at,
        })
    }

    /// List a user's emails, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a row is corrupt.
    pub async fn list_for_user(&self, user: UserId) -> Result<Vec<EmailRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE user_id = ? ORDER BY received_at DESC, id DESC"
        ))
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_email).collect()
    }

    /// Change the reply status of an email owned by `user`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmailNotFound`] if no email with that id belongs to
    /// `user`.
    pub async fn set_status(
        &self,
        user: UserId,
        id: EmailId,
        status: EmailStatus,
    ) -> Result<EmailRecord> {
        let row = sqlx::query(&format!(
            "UPDATE emails SET status = ? WHERE id = ? AND user_id = ? RETURNING {EMAIL_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(id.0)
        .bind(user.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(row_to_email)
            .transpose()?
            .ok_or(Error::EmailNotFound(id))
    }
}

fn row_to_email(row: &SqliteRow) -> Result<EmailRecord> {
    let status: String = row.try_get("status")?;
    let priority: String = row.try_get("priority")?;
    let received_at: String = row.try_get("received_at")?;

    Ok(EmailRecord {
        id: EmailId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        status: EmailStatus::parse(&status)
            .ok_or_else(|| Error::Corrupt(format!("unknown email status '{status}'")))?,
        priority: EmailPriority::parse(&priority)
            .ok_or_else(|| Error::Corrupt(format!("unknown email priority '{priority}'")))?,
        received_at: decode_time("received_at", &received_at)?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{Database, NewUser};
    use chrono::Duration;

    async fn setup() -> (Database, UserId, UserId) {
        let db = Database::in_memory().await.unwrap();
        let users = db.users();
        let mut ids = Vec::new();
        for email in ["one@shop.test", "two@shop.test"] {
            let user = users
                .create(&NewUser {
                    email: email.to_string(),
                    password_hash: "hash".to_string(),
                    company_name: "Shop".to_string(),
                })
                .await
                .unwrap();
            ids.push(user.id);
        }
        (db, ids[0], ids[1])
    }

    #[tokio::test]
    async fn test_create_defaults_and_list_newest_first() {
        let (db, owner, other) = setup().await;
        let repo = db.emails();
        let earlier = Utc::now() - Duration::hours(2);

        let mut old = NewEmail::new("Sizing", "Does the M run small?");
        old.received_at = Some(earlier);
        let old = repo.create(owner, &old).await.unwrap();
        let recent = repo
            .create(
                owner,
                &NewEmail::new("Refund", "I want a refund").with_priority(EmailPriority::High),
            )
            .await
            .unwrap();
        repo.create(other, &NewEmail::new("Other", "Not yours"))
            .await
            .unwrap();

        assert_eq!(old.status, EmailStatus::Pending);
        assert_eq!(old.priority, EmailPriority::Medium);

        let listed = repo.list_for_user(owner).await.unwrap();
        assert_eq!(listed, vec![recent, old]);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_fields_and_unknown_user() {
        let (db, owner, _) = setup().await;
        let repo = db.emails();

        assert!(matches!(
            repo.create(owner, &NewEmail::new("  ", "body")).await,
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(
            repo.create(owner, &NewEmail::new("subject", "")).await,
            Err(Error::InvalidRecord(_))
        ));
        assert!(matches!(
            repo.create(UserId::new(999), &NewEmail::new("s", "b")).await,
            Err(Error::UserNotFound(_))
        ));
        assert!(repo.list_for_user(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_status_is_owner_scoped() {
        let (db, owner, other) = setup().await;
        let repo = db.emails();
        let created = repo
            .create(owner, &NewEmail::new("Shipping", "Where is my parcel?"))
            .await
            .unwrap();

        assert!(matches!(
            repo.set_status(other, created.id, EmailStatus::Responded).await,
            Err(Error::EmailNotFound(_))
        ));

        let updated = repo
            .set_status(owner, created.id, EmailStatus::Responded)
            .await
            .unwrap();
        assert_eq!(updated.status, EmailStatus::Responded);
        assert_eq!(updated.received_at, created.received_at);
    }
}
