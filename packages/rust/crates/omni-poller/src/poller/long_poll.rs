use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Poller, send_or_stop};
use crate::error::{FetchError, PollError, Result};
use crate::retry::RetryPolicy;
use crate::source::UpdateSource;
use crate::update::Update;

/// Default long-poll timeout handed to the source.
pub const DEFAULT_LONG_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Classic long poller: fetch everything newer than the last delivered
/// update, forward it in order, repeat.
#[derive(Debug, Clone)]
pub struct LongPoller {
    timeout: Duration,
    retry: RetryPolicy,
    interruptible: bool,
}

impl Default for LongPoller {
    fn default() -> Self {
        Self::new(DEFAULT_LONG_POLL_TIMEOUT)
    }
}

impl LongPoller {
    /// Long poller with the given fetch timeout, unlimited immediate retries,
    /// and stop checks only between fetches.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            retry: RetryPolicy::unlimited(),
            interruptible: false,
        }
    }

    /// Replace the retry policy for failed fetches.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// When enabled, a stop signal aborts an in-flight fetch instead of
    /// waiting for it to return.
    #[must_use]
    pub fn interruptible(mut self, enabled: bool) -> Self {
        self.interruptible = enabled;
        self
    }

    /// Long-poll timeout handed to the source on every fetch.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Policy applied to failed fetches.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Whether a stop signal aborts an in-flight fetch.
    #[must_use]
    pub fn is_interruptible(&self) -> bool {
        self.interruptible
    }

    /// `None` means stop fired while an interruptible fetch was in flight.
    async fn fetch(
        &self,
        source: &dyn UpdateSource,
        since_id: i64,
        stop: &CancellationToken,
    ) -> Option<std::result::Result<Vec<Update>, FetchError>> {
        let request = source.fetch_updates(since_id, self.timeout);
        if !self.interruptible {
            return Some(request.await);
        }
        tokio::select! {
            biased;
            () = stop.cancelled() => None,
            result = request => Some(result),
        }
    }

    /// Sleep out the backoff delay. Returns `false` if stopped meanwhile.
    async fn wait_before_retry(&self, consecutive_failures: u32, stop: &CancellationToken) -> bool {
        let delay = self.retry.delay_for(consecutive_failures);
        if delay.is_zero() {
            // A source may fail without ever suspending; yield so the task
            // raising the stop signal gets to run.
            tokio::task::yield_now().await;
            return !stop.is_cancelled();
        }
        tokio::select! {
            biased;
            () = stop.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

#[async_trait]
impl Poller for LongPoller {
    async fn poll(
        &self,
        source: Arc<dyn UpdateSource>,
        destination: mpsc::Sender<Update>,
        stop: CancellationToken,
    ) -> Result<()> {
        let mut latest_update_id: i64 = 0;
        let mut consecutive_failures: u32 = 0;
        tracing::debug!(
            source = source.name(),
            timeout_secs = self.timeout.as_secs_f64(),
            interruptible = self.interruptible,
            "long poller started"
        );

        loop {
            if stop.is_cancelled() {
                tracing::debug!(source = source.name(), "long poller stopped");
                return Ok(());
            }

            let Some(result) = self
                .fetch(source.as_ref(), latest_update_id.saturating_add(1), &stop)
                .await
            else {
                tracing::debug!(source = source.name(), "long poller stopped mid-fetch");
                return Ok(());
            };

            let updates = match result {
                Ok(updates) => {
                    consecutive_failures = 0;
                    updates
                }
                Err(error) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    tracing::warn!(
                        source = source.name(),
                        error = %error,
                        consecutive_failures,
                        "getUpdates() failed"
                    );
                    if self.retry.is_exhausted(consecutive_failures) {
                        return Err(PollError::RetryLimitExceeded {
                            attempts: consecutive_failures,
                            last_error: error.to_string(),
                        });
                    }
                    if !self.wait_before_retry(consecutive_failures, &stop).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            for update in updates {
                // Cursor moves before delivery and never backwards.
                latest_update_id = latest_update_id.max(update.id);
                if !send_or_stop(&destination, update, &stop).await? {
                    tracing::debug!(source = source.name(), "long poller stopped mid-batch");
                    return Ok(());
                }
            }
        }
    }
}
