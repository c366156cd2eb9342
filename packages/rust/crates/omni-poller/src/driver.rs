//! Run a poller on its own task and hand back the receiving end.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{PollError, Result};
use crate::poller::Poller;
use crate::source::UpdateSource;
use crate::update::Update;

/// Control handle for a spawned poller.
#[derive(Debug)]
pub struct PollerHandle {
    stop: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl PollerHandle {
    /// Clone of the stop token driving the poller.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Raise the stop signal. Idempotent.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Whether the poller task has already returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the poller task to end and return its outcome.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(error) => Err(PollError::InnerTask(error.to_string())),
        }
    }

    /// Stop, then wait for the poller task.
    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.join().await
    }
}

/// Spawn `poller` against `source`, delivering into a channel of `capacity`
/// (at least 1).
pub fn spawn_poller<P>(
    poller: P,
    source: Arc<dyn UpdateSource>,
    capacity: usize,
) -> (mpsc::Receiver<Update>, PollerHandle)
where
    P: Poller + 'static,
{
    let (tx, rx) = mpsc::channel::<Update>(capacity.max(1));
    let stop = CancellationToken::new();
    let token = stop.clone();
    let task = tokio::spawn(async move {
        let result = poller.poll(source, tx, token).await;
        if let Err(error) = &result {
            tracing::error!(error = %error, "poller exited with error");
        }
        result
    });
    (rx, PollerHandle { stop, task })
}
