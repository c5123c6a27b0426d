//! IntentPoller - bounded retry loop over the side-channel intent
//! lookup.
//!
//! Used when the processor could not return a usable client secret
//! synchronously: the processor's async flow lands the secret in the
//! side channel, and this poller waits for it. The loop is bounded by
//! an explicit timeout and cancellable through a watch flag, so a
//! closed checkout UI stops polling immediately instead of leaking
//! background work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::domain::billing::BillingError;
use crate::ports::IntentLookup;

/// Default poll interval.
const POLL_INTERVAL: Duration = Duration::from_millis(800);

/// Default overall timeout.
const POLL_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of one poll run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A client secret appeared in the side channel.
    Found(String),
    /// The timeout elapsed without a secret. Recoverable; callers
    /// should let the user retry.
    TimedOut,
    /// The caller cancelled the poll.
    Cancelled,
}

pub struct IntentPoller {
    lookup: Arc<dyn IntentLookup>,
    interval: Duration,
    timeout: Duration,
}

impl IntentPoller {
    pub fn new(lookup: Arc<dyn IntentLookup>) -> Self {
        Self {
            lookup,
            interval: POLL_INTERVAL,
            timeout: POLL_TIMEOUT,
        }
    }

    /// Override timing (tests, alternate deployments).
    pub fn with_timing(mut self, interval: Duration, timeout: Duration) -> Self {
        self.interval = interval;
        self.timeout = timeout;
        self
    }

    /// Poll the side channel until a secret appears, the timeout
    /// elapses, or `cancel` flips to true.
    ///
    /// Dropping the cancel sender also ends the poll: the caller going
    /// away is a cancellation.
    pub async fn poll_for_secret(
        &self,
        customer_id: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<PollOutcome, BillingError> {
        if *cancel.borrow() {
            return Ok(PollOutcome::Cancelled);
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempts: u32 = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    attempts += 1;
                    let latest = self
                        .lookup
                        .latest_for_customer(customer_id)
                        .await
                        .map_err(BillingError::from)?;

                    if let Some(secret) = latest.and_then(|r| r.client_secret) {
                        tracing::info!(
                            customer_id = %customer_id,
                            attempts,
                            "Client secret found in side channel"
                        );
                        return Ok(PollOutcome::Found(secret));
                    }

                    if tokio::time::Instant::now() >= deadline {
                        tracing::warn!(
                            customer_id = %customer_id,
                            attempts,
                            "Gave up polling for client secret"
                        );
                        return Ok(PollOutcome::TimedOut);
                    }
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::debug!(
                            customer_id = %customer_id,
                            attempts,
                            "Intent poll cancelled"
                        );
                        return Ok(PollOutcome::Cancelled);
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        customer_id = %customer_id,
                        attempts,
                        "Gave up polling for client secret"
                    );
                    return Ok(PollOutcome::TimedOut);
                }
            }
        }
    }
}
