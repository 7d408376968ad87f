//! Campaign delivery statistics
//!
//! Statistics are derived from recipient rows on every read instead of
//! being maintained as counters, so they can never drift from the
//! underlying delivery states.

use serde::Serialize;
use uuid::Uuid;
use wavecast_storage::models::StatusCounts;
use wavecast_storage::repository::RecipientRepository;

/// Aggregate delivery statistics for one campaign.
///
/// Counts are cumulative over the status progression: a `read` recipient
/// counts as sent and delivered too.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CampaignStatistics {
    pub total_audience: i64,
    pub pending_count: i64,
    pub sent_count: i64,
    pub delivered_count: i64,
    pub read_count: i64,
    pub failed_count: i64,
    pub replied_count: i64,
    pub sent_pct: u8,
    pub delivered_pct: u8,
    pub read_pct: u8,
    pub failed_pct: u8,
    pub replied_pct: u8,
}

impl CampaignStatistics {
    /// Derive statistics from raw per-status counts
    pub fn from_counts(counts: &StatusCounts) -> Self {
        let total = counts.total();
        let sent = counts.sent + counts.delivered + counts.read;
        let delivered = counts.delivered + counts.read;

        Self {
            total_audience: total,
            pending_count: counts.pending,
            sent_count: sent,
            delivered_count: delivered,
            read_count: counts.read,
            failed_count: counts.failed,
            replied_count: counts.replied,
            sent_pct: percentage(sent, total),
            delivered_pct: percentage(delivered, total),
            read_pct: percentage(counts.read, total),
            failed_pct: percentage(counts.failed, total),
            replied_pct: percentage(counts.replied, total),
        }
    }
}

/// Integer percentage, rounded half up; 0 when the total is 0
pub fn percentage(count: i64, total: i64) -> u8 {
    if total <= 0 {
        return 0;
    }
    ((count * 200 + total) / (2 * total)) as u8
}

/// Computes campaign statistics from recipient rows
#[derive(Clone)]
pub struct StatisticsAggregator {
    recipients: RecipientRepository,
}

impl StatisticsAggregator {
    pub fn new(recipients: RecipientRepository) -> Self {
        Self { recipients }
    }

    /// Current statistics for one campaign
    pub async fn for_campaign(&self, campaign_id: Uuid) -> Result<CampaignStatistics, sqlx::Error> {
        let counts = self.recipients.status_counts(campaign_id).await?;
        Ok(CampaignStatistics::from_counts(&counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_percentage_rounds_half_up() {
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(0, 5), 0);
        assert_eq!(percentage(5, 5), 100);
    }

    #[test]
    fn test_percentage_zero_total() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(3, 0), 0);
    }

    #[test]
    fn test_counts_are_cumulative() {
        let counts = StatusCounts {
            pending: 1,
            sent: 2,
            delivered: 3,
            read: 4,
            failed: 0,
            replied: 2,
        };

        let stats = CampaignStatistics::from_counts(&counts);
        assert_eq!(stats.total_audience, 10);
        assert_eq!(stats.sent_count, 9);
        assert_eq!(stats.delivered_count, 7);
        assert_eq!(stats.read_count, 4);
        assert_eq!(stats.sent_pct, 90);
        assert_eq!(stats.delivered_pct, 70);
        assert_eq!(stats.read_pct, 40);
        assert_eq!(stats.replied_pct, 20);
    }

    #[test]
    fn test_empty_campaign() {
        let stats = CampaignStatistics::from_counts(&StatusCounts::default());
        assert_eq!(stats.total_audience, 0);
        assert_eq!(stats.sent_pct, 0);
        assert_eq!(stats.delivered_pct, 0);
    }
}
