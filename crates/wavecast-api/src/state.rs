//! Shared handler state

use std::sync::Arc;
use wavecast_core::{Dispatcher, LifecycleManager, StatisticsAggregator, StatusTracker};
use wavecast_storage::repository::{CampaignRepository, RecipientRepository};
use wavecast_storage::DatabasePool;

/// State shared by every handler
pub struct AppState {
    pub db_pool: DatabasePool,
    pub campaigns: CampaignRepository,
    pub recipients: RecipientRepository,
    pub lifecycle: Arc<LifecycleManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub tracker: Arc<StatusTracker>,
    pub stats: StatisticsAggregator,
    /// Token echoed back on webhook subscription verification
    pub webhook_verify_token: Option<String>,
    /// Secret for webhook payload signature verification
    pub app_secret: Option<String>,
}
