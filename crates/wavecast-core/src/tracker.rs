//! Delivery event tracking
//!
//! Webhook events arrive at-least-once and in any order. The tracker
//! maps them onto conditional status advances keyed by the gateway
//! message id; stale, duplicate, and unknown events are dropped with a
//! debug log rather than failing the webhook.

use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use wavecast_storage::models::DeliveryStatus;
use wavecast_storage::repository::{AdvanceOutcome, RecipientRepository};

use crate::lifecycle::{CampaignError, LifecycleManager};

/// A delivery event reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryEvent {
    Sent,
    Delivered,
    Read,
    Failed,
    Replied,
}

impl DeliveryEvent {
    /// The recipient status this event advances to, if it is a status
    /// event at all (`Replied` is a flag, not a status)
    pub fn target_status(&self) -> Option<DeliveryStatus> {
        match self {
            DeliveryEvent::Sent => Some(DeliveryStatus::Sent),
            DeliveryEvent::Delivered => Some(DeliveryStatus::Delivered),
            DeliveryEvent::Read => Some(DeliveryStatus::Read),
            DeliveryEvent::Failed => Some(DeliveryStatus::Failed),
            DeliveryEvent::Replied => None,
        }
    }
}

impl std::fmt::Display for DeliveryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryEvent::Sent => write!(f, "sent"),
            DeliveryEvent::Delivered => write!(f, "delivered"),
            DeliveryEvent::Read => write!(f, "read"),
            DeliveryEvent::Failed => write!(f, "failed"),
            DeliveryEvent::Replied => write!(f, "replied"),
        }
    }
}

impl FromStr for DeliveryEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryEvent::Sent),
            "delivered" => Ok(DeliveryEvent::Delivered),
            "read" => Ok(DeliveryEvent::Read),
            "failed" => Ok(DeliveryEvent::Failed),
            "replied" => Ok(DeliveryEvent::Replied),
            _ => Err(format!("Unknown delivery event: {}", s)),
        }
    }
}

/// Applies gateway delivery events to recipient state
pub struct StatusTracker {
    recipients: RecipientRepository,
    lifecycle: Arc<LifecycleManager>,
}

impl StatusTracker {
    pub fn new(recipients: RecipientRepository, lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            recipients,
            lifecycle,
        }
    }

    /// Apply one event for the message id the gateway assigned at send
    /// time. Idempotent: replays and out-of-order deliveries resolve to
    /// no-ops through the conditional update.
    pub async fn apply_event(
        &self,
        meta_message_id: &str,
        event: DeliveryEvent,
        failure_reason: Option<&str>,
    ) -> Result<(), CampaignError> {
        let Some(target) = event.target_status() else {
            match self.recipients.mark_replied(meta_message_id).await? {
                Some(campaign_id) => {
                    debug!(meta_message_id, %campaign_id, "Reply recorded");
                }
                None => {
                    debug!(meta_message_id, "Reply event ignored (unknown or duplicate)");
                }
            }
            return Ok(());
        };

        let outcome = self
            .recipients
            .advance_by_message(meta_message_id, target, failure_reason)
            .await?;

        match outcome {
            AdvanceOutcome::Applied { campaign_id } => {
                debug!(meta_message_id, status = %target, %campaign_id, "Delivery event applied");
                self.lifecycle
                    .on_recipient_status_changed(campaign_id, target)
                    .await?;
            }
            AdvanceOutcome::Stale => {
                debug!(meta_message_id, status = %target, "Stale delivery event dropped");
            }
            AdvanceOutcome::NotFound => {
                debug!(meta_message_id, status = %target, "Event for unknown message dropped");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_parse_roundtrip() {
        for name in ["sent", "delivered", "read", "failed", "replied"] {
            let event: DeliveryEvent = name.parse().unwrap();
            assert_eq!(event.to_string(), name);
        }
        assert!("bounced".parse::<DeliveryEvent>().is_err());
    }

    #[test]
    fn test_status_events_map_to_statuses() {
        assert_eq!(
            DeliveryEvent::Delivered.target_status(),
            Some(DeliveryStatus::Delivered)
        );
        assert_eq!(
            DeliveryEvent::Failed.target_status(),
            Some(DeliveryStatus::Failed)
        );
        assert_eq!(DeliveryEvent::Replied.target_status(), None);
    }
}
