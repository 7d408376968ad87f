//! Wavecast - Campaign broadcast engine entry point

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wavecast_api::AppState;
use wavecast_common::config::Config;
use wavecast_core::{
    CloudGateway, DispatchScheduler, Dispatcher, LifecycleManager, RateLimiter, RecipientResolver,
    StatisticsAggregator, StatusTracker,
};
use wavecast_storage::db::DatabasePool;
use wavecast_storage::repository::{CampaignRepository, ContactRepository, RecipientRepository};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so logging can honor the configured filter
    let config = Config::load()?;
    init_logging(&config.logging.level);

    info!("Starting Wavecast campaign engine...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.migrate().await?;

    let campaigns = CampaignRepository::new(db_pool.pool().clone());
    let recipients = RecipientRepository::new(db_pool.pool().clone());
    let contacts = ContactRepository::new(db_pool.pool().clone());

    // Channel gateway and the global send-rate limiter
    let gateway = Arc::new(CloudGateway::new(config.gateway.clone()));
    let limiter = Arc::new(RateLimiter::new(config.dispatch.rate_limit_per_second));

    // Engine components
    let resolver = RecipientResolver::new(contacts);
    let lifecycle = Arc::new(LifecycleManager::new(
        campaigns.clone(),
        recipients.clone(),
        resolver,
        gateway.clone(),
        config.scheduler.settle_timeout_secs,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        gateway,
        limiter,
        recipients.clone(),
        lifecycle.clone(),
        &config.dispatch,
    ));
    let tracker = Arc::new(StatusTracker::new(recipients.clone(), lifecycle.clone()));
    let stats = StatisticsAggregator::new(recipients.clone());

    // Start the dispatch scheduler
    let scheduler = DispatchScheduler::new(
        campaigns.clone(),
        dispatcher.clone(),
        lifecycle.clone(),
        &config.scheduler,
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    // Start the API server
    let state = Arc::new(AppState {
        db_pool,
        campaigns,
        recipients,
        lifecycle,
        dispatcher,
        tracker,
        stats,
        webhook_verify_token: config.gateway.webhook_verify_token.clone(),
        app_secret: config.gateway.app_secret.clone(),
    });

    let app = wavecast_api::create_router(state);
    let bind = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Starting API server on {}", bind);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    info!("Wavecast started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler_handle.abort();
    api_handle.abort();

    info!("Wavecast shutdown complete");

    Ok(())
}

fn init_logging(configured: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configured.to_string()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
