//! Recipient repository
//!
//! All status writes are single-row conditional updates: a write succeeds
//! only if the current status is an allowed predecessor of the new one.
//! Recipients are independent, so no locking spans more than one row.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{DeliveryStatus, Recipient, StatusCounts};

/// Result of a conditional status advance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The transition was applied; carries the owning campaign
    Applied { campaign_id: Uuid },
    /// The row exists but its status rank is not below the target
    Stale,
    /// No recipient matches the gateway message id
    NotFound,
}

/// Recipient repository
#[derive(Clone)]
pub struct RecipientRepository {
    pool: PgPool,
}

impl RecipientRepository {
    /// Create a new recipient repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a recipient by ID
    pub async fn get(&self, id: Uuid) -> Result<Option<Recipient>, sqlx::Error> {
        sqlx::query_as::<_, Recipient>("SELECT * FROM recipients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List recipients for a campaign, optionally filtered by status
    pub async fn list_by_campaign(
        &self,
        campaign_id: Uuid,
        status: Option<DeliveryStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Recipient>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, Recipient>(
                r#"
                SELECT * FROM recipients
                WHERE campaign_id = $1 AND status = $2
                ORDER BY created_at ASC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(campaign_id)
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Recipient>(
                r#"
                SELECT * FROM recipients
                WHERE campaign_id = $1
                ORDER BY created_at ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(campaign_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Count recipients for a campaign, optionally filtered by status
    pub async fn count_by_campaign(
        &self,
        campaign_id: Uuid,
        status: Option<DeliveryStatus>,
    ) -> Result<i64, sqlx::Error> {
        let count: (i64,) = if let Some(status) = status {
            sqlx::query_as(
                "SELECT COUNT(*) FROM recipients WHERE campaign_id = $1 AND status = $2",
            )
            .bind(campaign_id)
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM recipients WHERE campaign_id = $1")
                .bind(campaign_id)
                .fetch_one(&self.pool)
                .await?
        };
        Ok(count.0)
    }

    /// All recipients of a campaign still waiting to be dispatched
    pub async fn list_pending(&self, campaign_id: Uuid) -> Result<Vec<Recipient>, sqlx::Error> {
        sqlx::query_as::<_, Recipient>(
            r#"
            SELECT * FROM recipients
            WHERE campaign_id = $1 AND status = 'pending'
            ORDER BY created_at ASC
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Record a successful send attempt: `pending -> sent` with the
    /// gateway-assigned message id. A no-op if the recipient already left
    /// `pending`, which makes retries after a crash safe.
    pub async fn mark_sent(
        &self,
        id: Uuid,
        meta_message_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE recipients SET
                status = 'sent',
                meta_message_id = $2,
                sent_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(meta_message_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a recipient to terminal `failed` with a reason code.
    /// A no-op if the recipient is already terminal.
    pub async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, sqlx::Error> {
        let allowed = predecessor_strings(DeliveryStatus::Failed);
        let result = sqlx::query(
            r#"
            UPDATE recipients SET
                status = 'failed',
                failure_reason = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(&allowed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply a delivery event by gateway message id.
    ///
    /// The compare-and-set condition encodes the rank rule: the write
    /// succeeds only from an allowed predecessor status, so stale and
    /// duplicate events fall through to [`AdvanceOutcome::Stale`].
    pub async fn advance_by_message(
        &self,
        meta_message_id: &str,
        new_status: DeliveryStatus,
        failure_reason: Option<&str>,
    ) -> Result<AdvanceOutcome, sqlx::Error> {
        let allowed = predecessor_strings(new_status);

        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE recipients SET
                status = $2,
                failure_reason = COALESCE($3, failure_reason),
                updated_at = NOW()
            WHERE meta_message_id = $1 AND status = ANY($4)
            RETURNING campaign_id
            "#,
        )
        .bind(meta_message_id)
        .bind(new_status.to_string())
        .bind(failure_reason)
        .bind(&allowed)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((campaign_id,)) = row {
            return Ok(AdvanceOutcome::Applied { campaign_id });
        }

        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM recipients WHERE meta_message_id = $1")
                .bind(meta_message_id)
                .fetch_optional(&self.pool)
                .await?;

        if exists.is_some() {
            Ok(AdvanceOutcome::Stale)
        } else {
            Ok(AdvanceOutcome::NotFound)
        }
    }

    /// Record a reply for the recipient owning a gateway message id.
    /// Idempotent: only the first reply sets the timestamp.
    pub async fn mark_replied(
        &self,
        meta_message_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE recipients SET
                replied_at = NOW(),
                updated_at = NOW()
            WHERE meta_message_id = $1 AND replied_at IS NULL
            RETURNING campaign_id
            "#,
        )
        .bind(meta_message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(campaign_id,)| campaign_id))
    }

    /// Aggregate per-status counts for one campaign in a single scan
    pub async fn status_counts(&self, campaign_id: Uuid) -> Result<StatusCounts, sqlx::Error> {
        sqlx::query_as::<_, StatusCounts>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending')   AS pending,
                COUNT(*) FILTER (WHERE status = 'sent')      AS sent,
                COUNT(*) FILTER (WHERE status = 'delivered') AS delivered,
                COUNT(*) FILTER (WHERE status = 'read')      AS "read",
                COUNT(*) FILTER (WHERE status = 'failed')    AS failed,
                COUNT(*) FILTER (WHERE replied_at IS NOT NULL) AS replied
            FROM recipients
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await
    }
}

fn predecessor_strings(status: DeliveryStatus) -> Vec<String> {
    status
        .allowed_predecessors()
        .iter()
        .map(|s| s.to_string())
        .collect()
}
