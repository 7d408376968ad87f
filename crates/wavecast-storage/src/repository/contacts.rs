//! Contact directory, read-only
//!
//! Contact and group management belongs to an external collaborator; the
//! engine only reads group membership when resolving a campaign audience.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Contact;

/// Read-only view over the contact directory
#[derive(Clone)]
pub struct ContactRepository {
    pool: PgPool,
}

impl ContactRepository {
    /// Create a new contact repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Whether a contact group exists
    pub async fn group_exists(&self, group_id: Uuid) -> Result<bool, sqlx::Error> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM contact_groups WHERE id = $1")
                .bind(group_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// All members of a contact group
    pub async fn group_members(&self, group_id: Uuid) -> Result<Vec<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            r#"
            SELECT * FROM contacts
            WHERE group_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
    }
}
