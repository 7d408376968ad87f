//! Durable models for the campaign engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use wavecast_common::types::CampaignId;

/// Campaign type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    Broadcast,
    Api,
    Scheduled,
    Immediate,
}

impl std::fmt::Display for CampaignType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignType::Broadcast => write!(f, "broadcast"),
            CampaignType::Api => write!(f, "api"),
            CampaignType::Scheduled => write!(f, "scheduled"),
            CampaignType::Immediate => write!(f, "immediate"),
        }
    }
}

impl std::str::FromStr for CampaignType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(CampaignType::Broadcast),
            "api" => Ok(CampaignType::Api),
            "scheduled" => Ok(CampaignType::Scheduled),
            "immediate" => Ok(CampaignType::Immediate),
            _ => Err(format!("Invalid campaign type: {}", s)),
        }
    }
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Executing,
    Completed,
    Failed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Executing => write!(f, "executing"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "executing" => Ok(CampaignStatus::Executing),
            "completed" => Ok(CampaignStatus::Completed),
            "failed" => Ok(CampaignStatus::Failed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Per-recipient delivery status.
///
/// Status only moves forward along `pending -> sent -> delivered -> read`,
/// or to `failed` from any non-terminal state. `read` and `failed` are
/// terminal. The total order is what makes out-of-order and duplicate
/// delivery events safe to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    /// Position in the forward-only progression
    pub fn rank(&self) -> u8 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Delivered => 2,
            DeliveryStatus::Read => 3,
            DeliveryStatus::Failed => 4,
        }
    }

    /// Whether no further transition can occur from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Read | DeliveryStatus::Failed)
    }

    /// The statuses a row may currently hold for a transition into `self`
    /// to be applied. `failed` overrides any non-terminal status; every
    /// other target requires a strictly lower rank.
    pub fn allowed_predecessors(&self) -> &'static [DeliveryStatus] {
        match self {
            DeliveryStatus::Pending => &[],
            DeliveryStatus::Sent => &[DeliveryStatus::Pending],
            DeliveryStatus::Delivered => &[DeliveryStatus::Pending, DeliveryStatus::Sent],
            DeliveryStatus::Read | DeliveryStatus::Failed => &[
                DeliveryStatus::Pending,
                DeliveryStatus::Sent,
                DeliveryStatus::Delivered,
            ],
        }
    }

    /// Whether a transition from `current` into `self` should be applied
    pub fn applies_from(&self, current: DeliveryStatus) -> bool {
        self.allowed_predecessors().contains(&current)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Read => write!(f, "read"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "read" => Ok(DeliveryStatus::Read),
            "failed" => Ok(DeliveryStatus::Failed),
            _ => Err(format!("Invalid delivery status: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub campaign_type: String,
    pub template_name: String,
    pub template_language: String,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub total_audience: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Get type enum
    pub fn type_enum(&self) -> Option<CampaignType> {
        self.campaign_type.parse().ok()
    }

    /// Whether the campaign is soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Create campaign input
#[derive(Debug, Clone)]
pub struct CreateCampaign {
    pub name: String,
    pub campaign_type: CampaignType,
    pub template_name: String,
    pub template_language: String,
    pub status: CampaignStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Recipient model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Recipient {
    pub id: uuid::Uuid,
    pub campaign_id: CampaignId,
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

impl Recipient {
    /// Get status enum
    pub fn status_enum(&self) -> Option<DeliveryStatus> {
        self.status.parse().ok()
    }

    /// The ordered template-fill values, positional and 1-indexed.
    /// Non-string scalars are stringified; null slots render empty.
    pub fn variables(&self) -> Vec<String> {
        match &self.dynamic_variables {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Input for bulk recipient creation at audience-resolution time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecipient {
    pub mobile_number: String,
    pub dynamic_variables: Vec<String>,
}

/// Raw per-status recipient counts for one campaign
#[derive(Debug, Clone, Copy, Default, FromRow)]
pub struct StatusCounts {
    pub pending: i64,
    pub sent: i64,
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
    pub replied: i64,
}

impl StatusCounts {
    /// Number of recipients in a terminal status
    pub fn terminal(&self) -> i64 {
        self.read + self.failed
    }

    /// Total recipients covered by the counts
    pub fn total(&self) -> i64 {
        self.pending + self.sent + self.delivered + self.read + self.failed
    }
}

/// Contact row, read from the externally-managed contact directory
#[derive(Debug, Clone, FromRow)]
pub struct Contact {
    pub id: uuid::Uuid,
    pub group_id: uuid::Uuid,
    pub mobile_number: String,
    pub dynamic_variables: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_ranks_are_ordered() {
        assert!(DeliveryStatus::Pending.rank() < DeliveryStatus::Sent.rank());
        assert!(DeliveryStatus::Sent.rank() < DeliveryStatus::Delivered.rank());
        assert!(DeliveryStatus::Delivered.rank() < DeliveryStatus::Read.rank());
    }

    #[test]
    fn test_forward_transitions_apply() {
        assert!(DeliveryStatus::Sent.applies_from(DeliveryStatus::Pending));
        assert!(DeliveryStatus::Delivered.applies_from(DeliveryStatus::Sent));
        assert!(DeliveryStatus::Read.applies_from(DeliveryStatus::Delivered));
        // Skipping intermediate states is allowed (out-of-order events)
        assert!(DeliveryStatus::Read.applies_from(DeliveryStatus::Sent));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!DeliveryStatus::Sent.applies_from(DeliveryStatus::Delivered));
        assert!(!DeliveryStatus::Delivered.applies_from(DeliveryStatus::Read));
        // Duplicates are no-ops, not transitions
        assert!(!DeliveryStatus::Delivered.applies_from(DeliveryStatus::Delivered));
    }

    #[test]
    fn test_failed_overrides_non_terminal_only() {
        assert!(DeliveryStatus::Failed.applies_from(DeliveryStatus::Pending));
        assert!(DeliveryStatus::Failed.applies_from(DeliveryStatus::Sent));
        assert!(DeliveryStatus::Failed.applies_from(DeliveryStatus::Delivered));
        // Terminal states are never overridden
        assert!(!DeliveryStatus::Failed.applies_from(DeliveryStatus::Read));
        assert!(!DeliveryStatus::Failed.applies_from(DeliveryStatus::Failed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(DeliveryStatus::Read.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Delivered.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
    }

    #[test]
    fn test_recipient_variables_coercion() {
        let recipient = Recipient {
            id: uuid::Uuid::new_v4(),
            campaign_id: uuid::Uuid::new_v4(),
            mobile_number: "+15550102345".to_string(),
            dynamic_variables: serde_json::json!(["Alice", 42, null]),
            status: "pending".to_string(),
            meta_message_id: None,
            sent_at: None,
            replied_at: None,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(recipient.variables(), vec!["Alice", "42", ""]);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in ["pending", "sent", "delivered", "read", "failed"] {
            let parsed: DeliveryStatus = status.parse().unwrap();
            assert_eq!(parsed.to_string(), status);
        }
        assert!("bounced".parse::<DeliveryStatus>().is_err());
    }
}
