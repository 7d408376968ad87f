//! Scheduled dispatch loop
//!
//! A single background task that, every tick, claims due scheduled
//! campaigns and hands them to the dispatcher, resumes executing
//! campaigns that still have pending recipients (crash or aborted
//! dispatch recovery), and sweeps executing campaigns so settle-timeout
//! completion fires even when no further delivery events arrive.

use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};
use wavecast_common::config::SchedulerConfig;
use wavecast_storage::repository::CampaignRepository;

use crate::dispatch::Dispatcher;
use crate::lifecycle::LifecycleManager;

/// Background scheduler driving campaign dispatch
pub struct DispatchScheduler {
    campaigns: CampaignRepository,
    dispatcher: Arc<Dispatcher>,
    lifecycle: Arc<LifecycleManager>,
    poll_interval: Duration,
}

impl DispatchScheduler {
    pub fn new(
        campaigns: CampaignRepository,
        dispatcher: Arc<Dispatcher>,
        lifecycle: Arc<LifecycleManager>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            campaigns,
            dispatcher,
            lifecycle,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        }
    }

    /// Run the scheduler until the task is aborted
    pub async fn run(self) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "Dispatch scheduler started"
        );

        // The first tick fires immediately, so startup recovery of stalled
        // campaigns needs no separate pass
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One scheduler tick: claim what is due, resume what stalled, then
    /// sweep for completion
    async fn tick(&self) {
        match self.campaigns.claim_due().await {
            Ok(claimed) => {
                for campaign in claimed {
                    info!(campaign_id = %campaign.id, "Scheduled campaign due");
                    let dispatcher = self.dispatcher.clone();
                    tokio::spawn(async move {
                        if let Err(e) = dispatcher.run(&campaign).await {
                            error!(campaign_id = %campaign.id, error = %e, "Dispatch failed");
                        }
                    });
                }
            }
            Err(e) => error!(error = %e, "Failed to claim due campaigns"),
        }

        self.resume_stalled().await;

        match self.campaigns.list_executing().await {
            Ok(executing) => {
                for campaign in executing {
                    if let Err(e) = self.lifecycle.evaluate_completion(&campaign).await {
                        error!(campaign_id = %campaign.id, error = %e, "Completion sweep failed");
                    }
                }
            }
            Err(e) => error!(error = %e, "Failed to list executing campaigns"),
        }
    }

    /// Resume campaigns left executing with pending recipients, whether
    /// from a crash or a dispatch run that aborted on a database error.
    /// The dispatcher's in-flight registry refuses the resume while a run
    /// is still active, and conditional status updates keep re-sends out.
    async fn resume_stalled(&self) {
        let stalled = match self.campaigns.list_stalled_executing().await {
            Ok(stalled) => stalled,
            Err(e) => {
                error!(error = %e, "Failed to scan for stalled campaigns");
                return;
            }
        };

        for campaign in stalled {
            info!(campaign_id = %campaign.id, "Resuming stalled campaign");
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                if let Err(e) = dispatcher.run(&campaign).await {
                    error!(campaign_id = %campaign.id, error = %e, "Resume dispatch failed");
                }
            });
        }
    }
}
