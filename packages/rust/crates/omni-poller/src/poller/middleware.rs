use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Poller, send_or_stop};
use crate::error::{PollError, Result};
use crate::source::UpdateSource;
use crate::update::Update;

/// Relay buffer size used unless widened with [`MiddlewarePoller::with_capacity`].
pub const DEFAULT_MIDDLEWARE_CAPACITY: usize = 1;

/// Predicate deciding whether an update passes a middleware layer.
pub type UpdateFilter = Arc<dyn Fn(&Update) -> bool + Send + Sync>;

/// Filter layer wrapped around another poller.
///
/// Useful for spam handling, banning and similar sieves. The wrapped poller
/// runs on its own task and writes into a relay channel; only updates
/// accepted by the filter reach the outer destination. For heavy filters,
/// widen the relay with [`with_capacity`](Self::with_capacity).
///
/// On stop, the inner poller is cancelled but not awaited unless
/// [`with_shutdown_grace`](Self::with_shutdown_grace) is set.
pub struct MiddlewarePoller {
    inner: Arc<dyn Poller>,
    filter: UpdateFilter,
    capacity: usize,
    shutdown_grace: Option<Duration>,
}

/// Wrap `inner` with `filter`.
pub fn middleware<P, F>(inner: P, filter: F) -> MiddlewarePoller
where
    P: Poller + 'static,
    F: Fn(&Update) -> bool + Send + Sync + 'static,
{
    MiddlewarePoller::new(inner, filter)
}

impl MiddlewarePoller {
    /// Wrap `inner` with `filter`, using the default relay capacity.
    pub fn new<P, F>(inner: P, filter: F) -> Self
    where
        P: Poller + 'static,
        F: Fn(&Update) -> bool + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(inner),
            filter: Arc::new(filter),
            capacity: DEFAULT_MIDDLEWARE_CAPACITY,
            shutdown_grace: None,
        }
    }

    /// Relay buffer size between the inner poller and this layer. Values
    /// below 1 are raised to 1.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Wait up to `grace` for the inner poller to exit after a stop.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    /// Relay buffer size between the inner poller and this layer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn finish_inner(&self, mut inner_task: JoinHandle<Result<()>>) {
        let Some(grace) = self.shutdown_grace else {
            return;
        };
        match tokio::time::timeout(grace, &mut inner_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(error))) => {
                tracing::debug!(error = %error, "inner poller ended with error after stop");
            }
            Ok(Err(error)) => {
                tracing::warn!(error = %error, "inner poller task failed after stop");
            }
            Err(_) => {
                tracing::warn!(
                    grace_ms = grace.as_millis(),
                    "inner poller did not exit within shutdown grace; detaching"
                );
            }
        }
    }
}

impl fmt::Debug for MiddlewarePoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewarePoller")
            .field("capacity", &self.capacity)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Poller for MiddlewarePoller {
    async fn poll(
        &self,
        source: Arc<dyn UpdateSource>,
        destination: mpsc::Sender<Update>,
        stop: CancellationToken,
    ) -> Result<()> {
        let (relay_tx, mut relay_rx) = mpsc::channel::<Update>(self.capacity);
        let inner_stop = CancellationToken::new();
        // Cancels the inner poller on every exit path, including this future
        // being dropped.
        let _inner_stop_guard = inner_stop.clone().drop_guard();

        let inner = Arc::clone(&self.inner);
        let inner_token = inner_stop.clone();
        let inner_task =
            tokio::spawn(async move { inner.poll(source, relay_tx, inner_token).await });

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                relayed = relay_rx.recv() => {
                    let Some(update) = relayed else {
                        // Inner poller finished on its own; surface its outcome.
                        return match inner_task.await {
                            Ok(result) => result,
                            Err(error) => Err(PollError::InnerTask(error.to_string())),
                        };
                    };
                    if !(self.filter)(&update) {
                        tracing::trace!(update_id = update.id, "middleware dropped update");
                        continue;
                    }
                    if !send_or_stop(&destination, update, &stop).await? {
                        break;
                    }
                }
            }
        }

        inner_stop.cancel();
        drop(relay_rx);
        self.finish_inner(inner_task).await;
        tracing::debug!("middleware poller stopped");
        Ok(())
    }
}
