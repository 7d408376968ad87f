//! Wavecast Core - Campaign broadcast and delivery-tracking engine
//!
//! This crate implements the engine proper: audience resolution, scheduled
//! and manual dispatch admission, rate-limited batch sending through the
//! channel gateway, out-of-order-safe delivery event tracking, derived
//! statistics, and the campaign lifecycle state machine.

pub mod dispatch;
pub mod gateway;
pub mod lifecycle;
pub mod resolver;
pub mod stats;
pub mod tracker;

pub use dispatch::{DispatchScheduler, Dispatcher, RateLimiter};
pub use gateway::{ChannelGateway, CloudGateway, GatewayError, SendRequest};
pub use lifecycle::{CampaignCreated, CampaignError, CreateCampaignInput, LifecycleManager};
pub use resolver::{AudienceSpec, RecipientResolver, ResolvedAudience, UploadedRow};
pub use stats::{CampaignStatistics, StatisticsAggregator};
pub use tracker::{DeliveryEvent, StatusTracker};
