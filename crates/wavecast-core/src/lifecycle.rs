//! Campaign lifecycle
//!
//! The lifecycle manager is the write path for campaigns: creation with
//! a frozen audience, execution admission, completion evaluation, and
//! the soft-delete / restore / purge sequence. Status moves through
//! `draft | scheduled -> executing -> completed | failed`; soft deletion
//! is orthogonal and preserves whatever status the campaign had.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;
use wavecast_storage::models::{
    Campaign, CampaignStatus, CampaignType, CreateCampaign, DeliveryStatus,
};
use wavecast_storage::repository::{CampaignRepository, RecipientRepository};

use crate::gateway::{ChannelGateway, GatewayError};
use crate::resolver::{AudienceSpec, RecipientResolver, ResolveError, ResolvedAudience};

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Audience resolved to zero recipients")]
    EmptyAudience,

    #[error("Contact group not found: {0}")]
    GroupNotFound(Uuid),

    #[error("Template not found at the gateway: {0}")]
    TemplateNotFound(String),

    #[error("Invalid campaign state: {0}")]
    InvalidState(String),

    #[error("Cannot delete an executing campaign")]
    DeleteWhileExecuting,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ResolveError> for CampaignError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::GroupNotFound(id) => CampaignError::GroupNotFound(id),
            ResolveError::EmptyAudience => CampaignError::EmptyAudience,
            ResolveError::Database(e) => CampaignError::Database(e),
        }
    }
}

/// Request to create a campaign
#[derive(Debug, Clone)]
pub struct CreateCampaignInput {
    pub name: String,
    pub campaign_type: CampaignType,
    pub template_name: String,
    pub template_language: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub audience: AudienceSpec,
}

/// A freshly created campaign plus what audience resolution dropped
#[derive(Debug, Clone)]
pub struct CampaignCreated {
    pub campaign: Campaign,
    pub resolution: ResolvedAudience,
}

/// Campaign lifecycle manager
pub struct LifecycleManager {
    campaigns: CampaignRepository,
    recipients: RecipientRepository,
    resolver: RecipientResolver,
    gateway: Arc<dyn ChannelGateway>,
    settle_timeout_secs: u64,
}

impl LifecycleManager {
    pub fn new(
        campaigns: CampaignRepository,
        recipients: RecipientRepository,
        resolver: RecipientResolver,
        gateway: Arc<dyn ChannelGateway>,
        settle_timeout_secs: u64,
    ) -> Self {
        Self {
            campaigns,
            recipients,
            resolver,
            gateway,
            settle_timeout_secs,
        }
    }

    /// Create a campaign with its audience resolved and frozen.
    ///
    /// The template must exist at the gateway; the audience must resolve
    /// to at least one valid recipient. Immediate campaigns are stored as
    /// scheduled-for-now so a crash between creation and trigger leaves
    /// them claimable by the scheduler.
    pub async fn create_campaign(
        &self,
        input: CreateCampaignInput,
    ) -> Result<CampaignCreated, CampaignError> {
        if !self.gateway.template_exists(&input.template_name).await? {
            return Err(CampaignError::TemplateNotFound(input.template_name));
        }

        let resolution = self.resolver.resolve(&input.audience).await?;

        let (status, scheduled_at) = match (input.campaign_type, input.scheduled_at) {
            (CampaignType::Immediate, _) => (CampaignStatus::Scheduled, Some(Utc::now())),
            (_, Some(at)) => (CampaignStatus::Scheduled, Some(at)),
            (_, None) => (CampaignStatus::Draft, None),
        };

        let campaign = self
            .campaigns
            .create_with_recipients(
                CreateCampaign {
                    name: input.name,
                    campaign_type: input.campaign_type,
                    template_name: input.template_name,
                    template_language: input.template_language,
                    status,
                    scheduled_at,
                },
                &resolution.recipients,
            )
            .await?;

        info!(
            campaign_id = %campaign.id,
            audience = campaign.total_audience,
            invalid = resolution.invalid.len(),
            duplicates = resolution.duplicates.len(),
            status = %campaign.status,
            "Campaign created"
        );

        Ok(CampaignCreated {
            campaign,
            resolution,
        })
    }

    /// Get an active campaign
    pub async fn get_campaign(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        self.campaigns.get(id).await?.ok_or(CampaignError::NotFound)
    }

    /// Claim a campaign for execution.
    ///
    /// Exactly one caller wins the claim; a concurrent trigger or
    /// scheduler tick observes the conflict instead of double-sending.
    pub async fn claim_for_execution(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        if let Some(campaign) = self.campaigns.claim(id).await? {
            info!(campaign_id = %campaign.id, "Campaign claimed for execution");
            return Ok(campaign);
        }

        match self.campaigns.get_any(id).await? {
            Some(existing) if !existing.is_deleted() => Err(CampaignError::InvalidState(format!(
                "Campaign is {}, expected draft or scheduled",
                existing.status
            ))),
            _ => Err(CampaignError::NotFound),
        }
    }

    /// Evaluate whether an executing campaign can close.
    ///
    /// It closes once no recipient is pending and either every recipient
    /// is terminal, or the settle timeout since `started_at` has elapsed
    /// with some recipients stuck in `sent`/`delivered`. Returns whether
    /// the campaign was closed by this call.
    pub async fn evaluate_completion(&self, campaign: &Campaign) -> Result<bool, CampaignError> {
        if campaign.status_enum() != Some(CampaignStatus::Executing) {
            return Ok(false);
        }

        let counts = self.recipients.status_counts(campaign.id).await?;
        if counts.pending > 0 {
            return Ok(false);
        }

        let all_terminal = counts.terminal() == counts.total();
        let settled = campaign
            .started_at
            .map(|started| {
                Utc::now() - started >= ChronoDuration::seconds(self.settle_timeout_secs as i64)
            })
            .unwrap_or(false);

        if !all_terminal && !settled {
            return Ok(false);
        }

        let closed = self.campaigns.mark_completed(campaign.id).await?;
        if closed {
            if all_terminal {
                info!(campaign_id = %campaign.id, "Campaign completed");
            } else {
                let open = counts.sent + counts.delivered;
                warn!(
                    campaign_id = %campaign.id,
                    unsettled = open,
                    "Campaign force-closed after settle timeout"
                );
            }
        }
        Ok(closed)
    }

    /// React to one recipient reaching a new status.
    ///
    /// Only terminal transitions can complete a campaign, so everything
    /// else is a no-op.
    pub async fn on_recipient_status_changed(
        &self,
        campaign_id: Uuid,
        new_status: DeliveryStatus,
    ) -> Result<(), CampaignError> {
        if !new_status.is_terminal() {
            return Ok(());
        }

        if let Some(campaign) = self.campaigns.get(campaign_id).await? {
            self.evaluate_completion(&campaign).await?;
        }
        Ok(())
    }

    /// Move an executing campaign to failed
    pub async fn mark_failed(&self, campaign_id: Uuid) -> Result<(), CampaignError> {
        if self.campaigns.mark_failed(campaign_id).await? {
            warn!(campaign_id = %campaign_id, "Campaign marked failed");
        }
        Ok(())
    }

    /// Soft-delete a campaign; executing campaigns cannot be deleted
    pub async fn soft_delete(&self, id: Uuid) -> Result<(), CampaignError> {
        let campaign = self.campaigns.get(id).await?.ok_or(CampaignError::NotFound)?;

        if campaign.status_enum() == Some(CampaignStatus::Executing) {
            return Err(CampaignError::DeleteWhileExecuting);
        }

        if self.campaigns.soft_delete(id).await? {
            info!(campaign_id = %id, "Campaign soft-deleted");
            Ok(())
        } else {
            Err(CampaignError::NotFound)
        }
    }

    /// Restore a soft-deleted campaign with its prior status intact
    pub async fn restore(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        let campaign = self
            .campaigns
            .restore(id)
            .await?
            .ok_or(CampaignError::NotFound)?;
        info!(campaign_id = %id, status = %campaign.status, "Campaign restored");
        Ok(campaign)
    }

    /// Permanently delete a soft-deleted campaign and its recipients
    pub async fn purge(&self, id: Uuid) -> Result<(), CampaignError> {
        let campaign = self
            .campaigns
            .get_any(id)
            .await?
            .ok_or(CampaignError::NotFound)?;

        if !campaign.is_deleted() {
            return Err(CampaignError::InvalidState(
                "Campaign must be soft-deleted before permanent deletion".to_string(),
            ));
        }

        if self.campaigns.purge(id).await? {
            info!(campaign_id = %id, "Campaign permanently deleted");
            Ok(())
        } else {
            Err(CampaignError::NotFound)
        }
    }
}
