//! Test doubles for integration tests: a scripted update source and a
//! replaying poller.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, Result};
use crate::poller::{Poller, send_or_stop};
use crate::source::UpdateSource;
use crate::update::Update;

/// Updates with the given ids and empty payloads.
pub fn updates(ids: &[i64]) -> Vec<Update> {
    ids.iter().copied().map(Update::new).collect()
}

/// One scripted response of [`ScriptedSource`].
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return these updates.
    Batch(Vec<Update>),
    /// Fail with `FetchError::Other`.
    Fail(String),
    /// Never return.
    Hang,
}

/// Update source replaying a fixed script.
///
/// Once the script runs out, each fetch sleeps for its timeout and returns an
/// empty batch, like an idle long poll.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<ScriptStep>>,
    requests: Mutex<Vec<i64>>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    /// Source that plays `steps` in order, then idles.
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// `since_id` of every fetch so far, in call order.
    pub fn requested_since_ids(&self) -> Vec<i64> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of fetches so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn fetch_updates(
        &self,
        since_id: i64,
        timeout: Duration,
    ) -> std::result::Result<Vec<Update>, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(since_id);
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match step {
            Some(ScriptStep::Batch(batch)) => Ok(batch),
            Some(ScriptStep::Fail(message)) => Err(FetchError::Other(message)),
            Some(ScriptStep::Hang) => std::future::pending().await,
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Poller that emits a fixed list of updates, then idles until stopped.
#[derive(Debug, Default)]
pub struct ReplayPoller {
    updates: Vec<Update>,
    stopped: Arc<AtomicBool>,
}

impl ReplayPoller {
    /// Poller that emits `updates` once.
    pub fn new(updates: Vec<Update>) -> Self {
        Self {
            updates,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set once `poll` has returned.
    pub fn stopped_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }

    async fn replay(
        &self,
        destination: &mpsc::Sender<Update>,
        stop: &CancellationToken,
    ) -> Result<()> {
        for update in self.updates.iter().cloned() {
            if !send_or_stop(destination, update, stop).await? {
                return Ok(());
            }
        }
        stop.cancelled().await;
        Ok(())
    }
}

#[async_trait]
impl Poller for ReplayPoller {
    async fn poll(
        &self,
        _source: Arc<dyn UpdateSource>,
        destination: mpsc::Sender<Update>,
        stop: CancellationToken,
    ) -> Result<()> {
        let result = self.replay(&destination, &stop).await;
        self.stopped.store(true, Ordering::SeqCst);
        result
    }
}
