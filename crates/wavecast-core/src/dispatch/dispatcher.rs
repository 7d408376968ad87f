//! Recipient fan-out for one executing campaign

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wavecast_common::config::DispatchConfig;
use wavecast_storage::models::{Campaign, Recipient};
use wavecast_storage::repository::RecipientRepository;

use crate::gateway::{ChannelGateway, GatewayError, SendRequest};
use crate::lifecycle::{CampaignError, LifecycleManager};
use crate::RateLimiter;

/// Retry schedule for transient gateway errors
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per recipient, including the first
    pub max_attempts: u32,
    /// Base delay, doubled per attempt
    pub base: Duration,
}

impl RetryPolicy {
    const MAX_DELAY: Duration = Duration::from_secs(60);

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: Duration::from_secs(config.retry_base_secs.max(1)),
        }
    }

    /// Delay before retrying after the given zero-based failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        self.base
            .checked_mul(factor as u32)
            .map(|d| d.min(Self::MAX_DELAY))
            .unwrap_or(Self::MAX_DELAY)
    }
}

/// Send one templated message, retrying transient failures with backoff.
///
/// Permanent errors (invalid recipient, rejected template) return
/// immediately; transient ones are retried up to the policy's attempt
/// budget, and the last error is returned when the budget runs out.
pub async fn send_with_retry(
    gateway: &dyn ChannelGateway,
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    request: &SendRequest,
) -> Result<String, GatewayError> {
    let mut attempt = 0u32;
    loop {
        limiter.acquire().await;

        match gateway.send_template(request).await {
            Ok(message_id) => return Ok(message_id),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay(attempt);
                debug!(
                    to = %request.to,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    %err,
                    "Transient send failure, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Outcome of dispatching one campaign's pending recipients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub accepted: usize,
    pub failed: usize,
    /// Failures caused by the gateway itself rather than the recipient
    pub systemic_failures: usize,
}

/// Campaigns currently being dispatched by this process. Keeps a stalled
/// campaign's periodic resume from overlapping an API-triggered run, which
/// would double-send to recipients both runs listed as pending.
#[derive(Default)]
struct InFlight(Mutex<HashSet<Uuid>>);

impl InFlight {
    /// Register a campaign; `false` means a run is already underway
    fn begin(&self, campaign_id: Uuid) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(campaign_id)
    }

    fn finish(&self, campaign_id: Uuid) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&campaign_id);
    }
}

/// Sends a campaign's pending recipients through the gateway
pub struct Dispatcher {
    gateway: Arc<dyn ChannelGateway>,
    limiter: Arc<RateLimiter>,
    recipients: RecipientRepository,
    lifecycle: Arc<LifecycleManager>,
    policy: RetryPolicy,
    concurrency: usize,
    in_flight: InFlight,
}

enum SendOutcome {
    Accepted,
    Failed { systemic: bool },
}

impl Dispatcher {
    pub fn new(
        gateway: Arc<dyn ChannelGateway>,
        limiter: Arc<RateLimiter>,
        recipients: RecipientRepository,
        lifecycle: Arc<LifecycleManager>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            gateway,
            limiter,
            recipients,
            lifecycle,
            policy: RetryPolicy::from_config(config),
            concurrency: config.send_concurrency.max(1),
            in_flight: InFlight::default(),
        }
    }

    /// Dispatch every pending recipient of an already-claimed campaign.
    ///
    /// Safe to call again after a crash: `mark_sent` only moves rows out
    /// of `pending`, so recipients handled before the crash are skipped.
    /// At most one run per campaign is active in this process; a second
    /// call while one is underway returns an empty summary. A run where
    /// every send fails systemically marks the campaign failed; otherwise
    /// completion is evaluated once the fan-out drains.
    pub async fn run(&self, campaign: &Campaign) -> Result<DispatchSummary, CampaignError> {
        if !self.in_flight.begin(campaign.id) {
            debug!(campaign_id = %campaign.id, "Dispatch already in flight, skipping");
            return Ok(DispatchSummary::default());
        }

        let result = self.run_inner(campaign).await;
        self.in_flight.finish(campaign.id);
        result
    }

    async fn run_inner(&self, campaign: &Campaign) -> Result<DispatchSummary, CampaignError> {
        let pending = self.recipients.list_pending(campaign.id).await?;
        info!(
            campaign_id = %campaign.id,
            pending = pending.len(),
            "Dispatching campaign"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<Result<SendOutcome, sqlx::Error>> = JoinSet::new();

        for recipient in pending {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| CampaignError::Internal(anyhow::anyhow!(e)))?;

            let gateway = self.gateway.clone();
            let limiter = self.limiter.clone();
            let repo = self.recipients.clone();
            let policy = self.policy;
            let request = send_request(campaign, &recipient);

            tasks.spawn(async move {
                let _permit = permit;
                match send_with_retry(gateway.as_ref(), &limiter, &policy, &request).await {
                    Ok(message_id) => {
                        repo.mark_sent(recipient.id, &message_id).await?;
                        Ok(SendOutcome::Accepted)
                    }
                    Err(err) => {
                        warn!(
                            recipient_id = %recipient.id,
                            to = %request.to,
                            %err,
                            "Send failed"
                        );
                        repo.mark_failed(recipient.id, &err.to_string()).await?;
                        Ok(SendOutcome::Failed {
                            systemic: err.is_systemic(),
                        })
                    }
                }
            });
        }

        let mut summary = DispatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(SendOutcome::Accepted)) => summary.accepted += 1,
                Ok(Ok(SendOutcome::Failed { systemic })) => {
                    summary.failed += 1;
                    if systemic {
                        summary.systemic_failures += 1;
                    }
                }
                Ok(Err(db_err)) => return Err(db_err.into()),
                Err(join_err) => {
                    error!(%join_err, "Send worker panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            campaign_id = %campaign.id,
            accepted = summary.accepted,
            failed = summary.failed,
            "Dispatch finished"
        );

        if summary.accepted == 0 && summary.failed > 0 && summary.systemic_failures == summary.failed
        {
            self.lifecycle.mark_failed(campaign.id).await?;
        } else {
            self.lifecycle.evaluate_completion(campaign).await?;
        }

        Ok(summary)
    }
}

fn send_request(campaign: &Campaign, recipient: &Recipient) -> SendRequest {
    SendRequest {
        to: recipient.mobile_number.clone(),
        template_name: campaign.template_name.clone(),
        language: campaign.template_language.clone(),
        variables: recipient.variables(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct MockGateway {
        responses: Mutex<VecDeque<Result<String, GatewayError>>>,
        calls: AtomicU32,
    }

    impl MockGateway {
        fn new(responses: Vec<Result<String, GatewayError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChannelGateway for MockGateway {
        async fn send_template(&self, _request: &SendRequest) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GatewayError::Unavailable("exhausted".to_string())))
        }

        async fn template_exists(&self, _template_name: &str) -> Result<bool, GatewayError> {
            Ok(true)
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base: Duration::from_secs(1),
        }
    }

    fn request() -> SendRequest {
        SendRequest {
            to: "+15550102345".to_string(),
            template_name: "order_update".to_string(),
            language: "en".to_string(),
            variables: vec![],
        }
    }

    #[test]
    fn test_in_flight_dedupes_until_finished() {
        let in_flight = InFlight::default();
        let campaign_id = Uuid::new_v4();
        let other_id = Uuid::new_v4();

        assert!(in_flight.begin(campaign_id));
        // Second run of the same campaign is refused while the first holds it
        assert!(!in_flight.begin(campaign_id));
        // Other campaigns are unaffected
        assert!(in_flight.begin(other_id));

        in_flight.finish(campaign_id);
        assert!(in_flight.begin(campaign_id));
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(5), Duration::from_secs(32));
        assert_eq!(policy.delay(6), Duration::from_secs(60));
        assert_eq!(policy.delay(30), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let gateway = MockGateway::new(vec![
            Err(GatewayError::RateLimited),
            Err(GatewayError::Timeout),
            Ok("wamid.OK".to_string()),
        ]);
        let limiter = RateLimiter::new(1000);

        let id = send_with_retry(&gateway, &limiter, &policy(), &request())
            .await
            .unwrap();
        assert_eq!(id, "wamid.OK");
        assert_eq!(gateway.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let gateway = MockGateway::new(vec![
            Err(GatewayError::InvalidRecipient("unreachable".to_string())),
            Ok("wamid.NEVER".to_string()),
        ]);
        let limiter = RateLimiter::new(1000);

        let err = send_with_retry(&gateway, &limiter, &policy(), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRecipient(_)));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_exhausted() {
        let gateway = MockGateway::new(vec![
            Err(GatewayError::Unavailable("down".to_string())),
            Err(GatewayError::Unavailable("down".to_string())),
            Err(GatewayError::Unavailable("down".to_string())),
            Err(GatewayError::Unavailable("down".to_string())),
            Err(GatewayError::Unavailable("down".to_string())),
        ]);
        let limiter = RateLimiter::new(1000);

        let err = send_with_retry(&gateway, &limiter, &policy(), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert_eq!(gateway.calls(), 5);
    }
}
