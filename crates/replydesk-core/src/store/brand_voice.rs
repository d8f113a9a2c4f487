//! Brand voice storage, one record per user.

use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use super::model::{BrandVoice, UserId};
use crate::{Error, Result};

/// Repository for per-user brand voice settings.
#[derive(Debug, Clone)]
pub struct BrandVoiceRepository {
    pool: SqlitePool,
}

impl BrandVoiceRepository {
    /// Creates a repository over an initialized pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the user's brand voice.
    ///
    /// # Errors
    ///
    /// Returns an error if the user does not exist or the query fails.
    pub async fn save(&self, voice: &BrandVoice) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO brand_voices (user_id, tone, common_phrases)
            SELECT id, ?, ? FROM users WHERE id = ?
            ON CONFLICT(user_id) DO UPDATE SET
                tone = excluded.tone,
                common_phrases = excluded.common_phrases
            ",
        )
        .bind(&voice.tone)
        .bind(&voice.common_phrases)
        .bind(voice.user_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(voice.user_id));
        }
        Ok(())
    }

    /// Get the user's brand voice.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, user: UserId) -> Result<Option<BrandVoice>> {
        let row = sqlx::query(
            "SELECT user_id, tone, common_phrases FROM brand_voices WHERE user_id = ?",
        )
        .bind(user.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<BrandVoice> {
            Ok(BrandVoice {
                user_id: UserId::new(row.try_get("user_id")?),
                tone: row.try_get("tone")?,
                common_phrases: row.try_get("common_phrases")?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{Database, NewUser};

    #[tokio::test]
    async fn test_save_and_replace() {
        let db = Database::in_memory().await.unwrap();
        let user = db
            .users()
            .create(&NewUser {
                email: "voice@shop.test".to_string(),
                password_hash: "hash".to_string(),
                company_name: "Shop".to_string(),
            })
            .await
            .unwrap();
        let repo = db.brand_voices();
        assert!(repo.get(user.id).await.unwrap().is_none());

        let mut voice = BrandVoice {
            user_id: user.id,
            tone: "friendly".to_string(),
            common_phrases: "Thanks a bunch!".to_string(),
        };
        repo.save(&voice).await.unwrap();
        voice.tone = "formal".to_string();
        repo.save(&voice).await.unwrap();

        assert_eq!(repo.get(user.id).await.unwrap(), Some(voice));
    }

    #[tokio::test]
    async fn test_save_for_unknown_user() {
        let db = Database::in_memory().await.unwrap();
        let voice = BrandVoice {
            user_id: UserId::new(12),
            tone: "friendly".to_string(),
            common_phrases: String::new(),
        };
        assert!(matches!(
            db.brand_voices().save(&voice).await,
            Err(Error::UserNotFound(_))
        ));
    }
}
