//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use wavecast_core::resolver::AudienceSpec;
use wavecast_core::{CampaignError, CampaignStatistics, CreateCampaignInput};
use wavecast_storage::models::{
    Campaign, CampaignStatus, CampaignType, DeliveryStatus, Recipient,
};

use crate::state::AppState;

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(e: CampaignError) -> ApiError {
    let (status, code) = match &e {
        CampaignError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        CampaignError::TemplateNotFound(_) => (StatusCode::NOT_FOUND, "template_not_found"),
        CampaignError::EmptyAudience => (StatusCode::BAD_REQUEST, "empty_audience"),
        CampaignError::GroupNotFound(_) => (StatusCode::BAD_REQUEST, "group_not_found"),
        CampaignError::InvalidState(_) => (StatusCode::CONFLICT, "invalid_state"),
        CampaignError::DeleteWhileExecuting => (StatusCode::CONFLICT, "campaign_executing"),
        CampaignError::Gateway(_) => (StatusCode::BAD_GATEWAY, "gateway_error"),
        CampaignError::Database(_) | CampaignError::Internal(_) => {
            error!("Campaign operation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: e.to_string(),
        }),
    )
}

fn validation_error(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "validation_error".to_string(),
            message: message.to_string(),
        }),
    )
}

fn internal_error(context: &str, e: impl std::fmt::Display) -> ApiError {
    error!("{}: {}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal_error".to_string(),
            message: context.to_string(),
        }),
    )
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    50
}

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// Campaign response
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub name: String,
    pub campaign_type: String,
    pub template_name: String,
    pub template_language: String,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub total_audience: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<CampaignStatistics>,
}

impl CampaignResponse {
    fn from_campaign(c: Campaign, statistics: Option<CampaignStatistics>) -> Self {
        Self {
            id: c.id,
            name: c.name,
            campaign_type: c.campaign_type,
            template_name: c.template_name,
            template_language: c.template_language,
            status: c.status,
            scheduled_at: c.scheduled_at,
            total_audience: c.total_audience,
            started_at: c.started_at,
            completed_at: c.completed_at,
            created_at: c.created_at,
            updated_at: c.updated_at,
            statistics,
        }
    }
}

/// Campaign list response
#[derive(Debug, Serialize)]
pub struct CampaignListResponse {
    pub data: Vec<CampaignResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub campaign_type: CampaignType,
    pub template_name: String,
    #[serde(default = "default_language")]
    pub template_language: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub audience: AudienceSpec,
}

fn default_language() -> String {
    "en".to_string()
}

/// Response for campaign creation, including what audience resolution
/// dropped
#[derive(Debug, Serialize)]
pub struct CreateCampaignResponse {
    #[serde(flatten)]
    pub campaign: CampaignResponse,
    pub invalid_numbers: Vec<String>,
    pub duplicate_numbers: Vec<String>,
}

/// List campaigns with current statistics
///
/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<CampaignListResponse>, ApiError> {
    let status = match &query.status {
        Some(s) => Some(
            s.parse::<CampaignStatus>()
                .map_err(|e| validation_error(&e))?,
        ),
        None => None,
    };

    let limit = query.limit.clamp(1, 200);
    let page = query.page.max(1);
    let offset = (page - 1) * limit;

    let campaigns = state
        .campaigns
        .list(status, limit, offset)
        .await
        .map_err(|e| internal_error("Failed to list campaigns", e))?;

    let total = state
        .campaigns
        .count(status)
        .await
        .map_err(|e| internal_error("Failed to count campaigns", e))?;

    let mut data = Vec::with_capacity(campaigns.len());
    for campaign in campaigns {
        let stats = state
            .stats
            .for_campaign(campaign.id)
            .await
            .map_err(|e| internal_error("Failed to compute statistics", e))?;
        data.push(CampaignResponse::from_campaign(campaign, Some(stats)));
    }

    Ok(Json(CampaignListResponse {
        data,
        total,
        page,
        limit,
    }))
}

/// Create a campaign
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CreateCampaignResponse>), ApiError> {
    if input.name.trim().is_empty() {
        return Err(validation_error("Campaign name is required"));
    }
    if input.template_name.trim().is_empty() {
        return Err(validation_error("Template name is required"));
    }
    if input.campaign_type != CampaignType::Immediate {
        if let Some(at) = input.scheduled_at {
            if at <= Utc::now() {
                return Err(validation_error("scheduled_at must be in the future"));
            }
        }
    }

    let campaign_type = input.campaign_type;
    let created = state
        .lifecycle
        .create_campaign(CreateCampaignInput {
            name: input.name,
            campaign_type,
            template_name: input.template_name,
            template_language: input.template_language,
            scheduled_at: input.scheduled_at,
            audience: input.audience,
        })
        .await
        .map_err(error_response)?;

    let campaign = created.campaign;

    // Immediate campaigns skip the scheduler tick; claimed and dispatched
    // right away. The stored scheduled-for-now row covers a crash between
    // creation and this point.
    if campaign_type == CampaignType::Immediate {
        trigger_execution(&state, campaign.id).await;
    }

    Ok((
        StatusCode::CREATED,
        Json(CreateCampaignResponse {
            campaign: CampaignResponse::from_campaign(campaign, None),
            invalid_numbers: created.resolution.invalid,
            duplicate_numbers: created.resolution.duplicates,
        }),
    ))
}

/// Query parameters for the campaign detail view
#[derive(Debug, Deserialize)]
pub struct CampaignDetailQuery {
    pub recipient_status: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// Recipient response
#[derive(Debug, Serialize)]
pub struct RecipientResponse {
    pub id: Uuid,
    pub mobile_number: String,
    pub dynamic_variables: serde_json::Value,
    pub status: String,
    pub meta_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Recipient> for RecipientResponse {
    fn from(r: Recipient) -> Self {
        Self {
            id: r.id,
            mobile_number: r.mobile_number,
            dynamic_variables: r.dynamic_variables,
            status: r.status,
            meta_message_id: r.meta_message_id,
            sent_at: r.sent_at,
            replied_at: r.replied_at,
            failure_reason: r.failure_reason,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Recipient list response
#[derive(Debug, Serialize)]
pub struct RecipientListResponse {
    pub data: Vec<RecipientResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Campaign detail response: the campaign, derived statistics, and a
/// filterable recipient page
#[derive(Debug, Serialize)]
pub struct CampaignDetailResponse {
    #[serde(flatten)]
    pub campaign: CampaignResponse,
    pub recipients: RecipientListResponse,
}

/// Get a campaign with statistics and a filterable recipient page
///
/// GET /api/v1/campaigns/:campaign_id?recipient_status=&page=&limit=
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<CampaignDetailQuery>,
) -> Result<Json<CampaignDetailResponse>, ApiError> {
    let campaign = state
        .lifecycle
        .get_campaign(campaign_id)
        .await
        .map_err(error_response)?;

    let stats = state
        .stats
        .for_campaign(campaign.id)
        .await
        .map_err(|e| internal_error("Failed to compute statistics", e))?;

    let status = match &query.recipient_status {
        Some(s) => Some(
            s.parse::<DeliveryStatus>()
                .map_err(|e| validation_error(&e))?,
        ),
        None => None,
    };

    let limit = query.limit.clamp(1, 500);
    let page = query.page.max(1);
    let offset = (page - 1) * limit;

    let recipients = state
        .recipients
        .list_by_campaign(campaign_id, status, limit, offset)
        .await
        .map_err(|e| internal_error("Failed to list recipients", e))?;

    let total = state
        .recipients
        .count_by_campaign(campaign_id, status)
        .await
        .map_err(|e| internal_error("Failed to count recipients", e))?;

    Ok(Json(CampaignDetailResponse {
        campaign: CampaignResponse::from_campaign(campaign, Some(stats)),
        recipients: RecipientListResponse {
            data: recipients.into_iter().map(RecipientResponse::from).collect(),
            total,
            page,
            limit,
        },
    }))
}

/// Get campaign statistics
///
/// GET /api/v1/campaigns/:campaign_id/stats
pub async fn get_campaign_stats(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignStatistics>, ApiError> {
    state
        .lifecycle
        .get_campaign(campaign_id)
        .await
        .map_err(error_response)?;

    let stats = state
        .stats
        .for_campaign(campaign_id)
        .await
        .map_err(|e| internal_error("Failed to compute statistics", e))?;

    Ok(Json(stats))
}

/// Trigger execution of a draft or scheduled campaign
///
/// POST /api/v1/campaigns/:campaign_id/execute
pub async fn execute_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<(StatusCode, Json<CampaignResponse>), ApiError> {
    let campaign = state
        .lifecycle
        .claim_for_execution(campaign_id)
        .await
        .map_err(error_response)?;

    let dispatcher = state.dispatcher.clone();
    let spawned = campaign.clone();
    tokio::spawn(async move {
        if let Err(e) = dispatcher.run(&spawned).await {
            error!(campaign_id = %spawned.id, error = %e, "Dispatch failed");
        }
    });

    info!(campaign_id = %campaign_id, "Campaign execution triggered");

    Ok((
        StatusCode::ACCEPTED,
        Json(CampaignResponse::from_campaign(campaign, None)),
    ))
}

/// Soft-delete a campaign
///
/// DELETE /api/v1/campaigns/:campaign_id/soft
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .lifecycle
        .soft_delete(campaign_id)
        .await
        .map_err(error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Restore a soft-deleted campaign
///
/// POST /api/v1/campaigns/:campaign_id/restore
pub async fn restore_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .lifecycle
        .restore(campaign_id)
        .await
        .map_err(error_response)?;

    Ok(Json(CampaignResponse::from_campaign(campaign, None)))
}

/// Permanently delete a soft-deleted campaign
///
/// DELETE /api/v1/campaigns/:campaign_id/permanent
pub async fn purge_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .lifecycle
        .purge(campaign_id)
        .await
        .map_err(error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

async fn trigger_execution(state: &Arc<AppState>, campaign_id: Uuid) {
    match state.lifecycle.claim_for_execution(campaign_id).await {
        Ok(claimed) => {
            let dispatcher = state.dispatcher.clone();
            tokio::spawn(async move {
                if let Err(e) = dispatcher.run(&claimed).await {
                    error!(campaign_id = %claimed.id, error = %e, "Dispatch failed");
                }
            });
        }
        // The scheduler will pick the campaign up on its next tick
        Err(e) => error!(campaign_id = %campaign_id, error = %e, "Immediate claim failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_response_claim_conflict_is_409() {
        // A lost execution claim (campaign already executing or completed)
        // surfaces as a state conflict
        let (status, body) = error_response(CampaignError::InvalidState(
            "Campaign is executing, expected draft or scheduled".to_string(),
        ));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error, "invalid_state");

        let (status, body) = error_response(CampaignError::DeleteWhileExecuting);
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error, "campaign_executing");
    }

    #[test]
    fn test_error_response_not_found_is_404() {
        let (status, body) = error_response(CampaignError::NotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "not_found");

        let (status, body) =
            error_response(CampaignError::TemplateNotFound("welcome".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "template_not_found");
    }

    #[test]
    fn test_error_response_bad_audience_is_400() {
        let (status, body) = error_response(CampaignError::EmptyAudience);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "empty_audience");

        let (status, body) = error_response(CampaignError::GroupNotFound(Uuid::nil()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "group_not_found");
    }

    #[test]
    fn test_error_response_gateway_is_502() {
        let (status, body) = error_response(CampaignError::Gateway(
            wavecast_core::GatewayError::Unavailable("upstream down".to_string()),
        ));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.error, "gateway_error");
    }
}
