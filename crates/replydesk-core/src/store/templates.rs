//! Reply template storage.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

use super::model::{Template, TemplateDraft, TemplateId, UserId};
use super::{decode_time, encode_time};
use crate::{Error, Result};

/// Repository for per-user reply templates.
#[derive(Debug, Clone)]
pub struct TemplateRepository {
    pool: SqlitePool,
}

impl TemplateRepository {
    /// Creates a repository over an initialized pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Save a new template for `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if the user does not exist or the query fails.
    pub async fn create(&self, user: UserId, draft: &TemplateDraft) -> Result<Template> {
        let created_at = Utc::now();
        let variables = serde_json::to_string(&draft.variables)?;

        let result = sqlx::query(
            r"
            INSERT INTO templates (user_id, name, content, variables, created_at)
            SELECT id, ?, ?, ?, ? FROM users WHERE id = ?
            ",
        )
        .bind(&draft.name)
        .bind(&draft.content)
        .bind(&variables)
        .bind(encode_time(created_at))
        .bind(user.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(user));
        }

        Ok(Template {
            id: TemplateId::new(result.last_insert_rowid()),
            user_id: user,
            name: draft.name.clone(),
            content: draft.content.clone(),
            variables: draft.variables.clone(),
            created_at,
        })
    }

    /// List a user's templates, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for_user(&self, user: UserId) -> Result<Vec<Template>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, name, content, variables, created_at
            FROM templates
            WHERE user_id = ?
            ORDER BY id ASC
            ",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_template).collect()
    }

    /// Replace a template's editable fields.
    ///
    /// Only the owner can update a template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateNotFound`] if no template with that id belongs
    /// to `user`.
    pub async fn update(
        &self,
        user: UserId,
        id: TemplateId,
        draft: &TemplateDraft,
    ) -> Result<Template> {
        let variables = serde_json::to_string(&draft.variables)?;
        let row = sqlx::query(
            r"
            UPDATE templates SET name = ?, content = ?, variables = ?
            WHERE id = ? AND user_id = ?
            RETURNING id, user_id, name, content, variables, created_at
            ",
        )
        .bind(&draft.name)
        .bind(&draft.content)
        .bind(&variables)
        .bind(id.0)
        .bind(user.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(row_to_template)
            .transpose()?
            .ok_or(Error::TemplateNotFound(id))
    }

    /// Delete a template owned by `user`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateNotFound`] if no template with that id belongs
    /// to `user`.
    pub async fn delete(&self, user: UserId, id: TemplateId) -> Result<()> {
        let result = sqlx::query("DELETE FROM templates WHERE id = ? AND user_id = ?")
            .bind(id.0)
            .bind(user.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::TemplateNotFound(id));
        }
        Ok(())
    }
}

fn row_to_template(row: &SqliteRow) -> Result<Template> {
    let variables: String = row.try_get("variables")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Template {
        id: TemplateId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        name: row.try_get("name")?,
        content: row.try_get("content")?,
        variables: serde_json::from_str(&variables)?,
        created_at: decode_time("created_at", &created_at)?,
    })
}
