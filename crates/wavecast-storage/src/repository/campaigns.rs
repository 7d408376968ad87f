//! Campaign repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Campaign, CampaignStatus, CreateCampaign, NewRecipient};

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    pool: PgPool,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a campaign together with its resolved recipient set.
    ///
    /// Campaign row and recipient rows are written in one transaction and
    /// `total_audience` is frozen to the recipient count; no recipient can
    /// be added afterwards.
    pub async fn create_with_recipients(
        &self,
        input: CreateCampaign,
        recipients: &[NewRecipient],
    ) -> Result<Campaign, sqlx::Error> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, name, campaign_type, template_name, template_language,
                status, scheduled_at, total_audience
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(input.campaign_type.to_string())
        .bind(&input.template_name)
        .bind(&input.template_language)
        .bind(input.status.to_string())
        .bind(input.scheduled_at)
        .bind(recipients.len() as i32)
        .fetch_one(&mut *tx)
        .await?;

        for recipient in recipients {
            let variables = serde_json::Value::Array(
                recipient
                    .dynamic_variables
                    .iter()
                    .map(|v| serde_json::Value::String(v.clone()))
                    .collect(),
            );

            sqlx::query(
                r#"
                INSERT INTO recipients (id, campaign_id, mobile_number, dynamic_variables, status)
                VALUES ($1, $2, $3, $4, 'pending')
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(&recipient.mobile_number)
            .bind(&variables)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(campaign)
    }

    /// Get a campaign by ID, excluding soft-deleted ones
    pub async fn get(&self, id: Uuid) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get a campaign by ID, including soft-deleted ones
    pub async fn get_any(&self, id: Uuid) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List active campaigns, newest first
    pub async fn list(
        &self,
        status: Option<CampaignStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE deleted_at IS NULL AND status = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE deleted_at IS NULL
                ORDER BY created_at DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Count active campaigns
    pub async fn count(&self, status: Option<CampaignStatus>) -> Result<i64, sqlx::Error> {
        let count: (i64,) = if let Some(status) = status {
            sqlx::query_as(
                "SELECT COUNT(*) FROM campaigns WHERE deleted_at IS NULL AND status = $1",
            )
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM campaigns WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count.0)
    }

    /// Atomically claim a campaign for execution.
    ///
    /// The conditional update succeeds for exactly one caller; a second
    /// claim (racing scheduler tick or manual trigger) gets `None`.
    pub async fn claim(&self, id: Uuid) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = 'executing',
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND status IN ('draft', 'scheduled')
              AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Claim all scheduled campaigns whose scheduled time has passed
    pub async fn claim_due(&self) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                status = 'executing',
                started_at = NOW(),
                updated_at = NOW()
            WHERE status = 'scheduled'
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= NOW()
              AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// List campaigns currently executing
    pub async fn list_executing(&self) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE status = 'executing' AND deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Campaigns left executing with pending recipients, e.g. after a crash
    pub async fn list_stalled_executing(&self) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT c.* FROM campaigns c
            WHERE c.status = 'executing'
              AND c.deleted_at IS NULL
              AND EXISTS (
                  SELECT 1 FROM recipients r
                  WHERE r.campaign_id = c.id AND r.status = 'pending'
              )
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Move an executing campaign to completed
    pub async fn mark_completed(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = 'completed',
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'executing'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move an executing campaign to failed
    pub async fn mark_failed(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = 'failed',
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'executing'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Soft-delete a campaign. Executing campaigns are guarded at the
    /// lifecycle layer and additionally here.
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                deleted_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status <> 'executing' AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Restore a soft-deleted campaign; prior status and recipients are
    /// untouched
    pub async fn restore(&self, id: Uuid) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                deleted_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Permanently delete a campaign; recipients cascade
    pub async fn purge(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
