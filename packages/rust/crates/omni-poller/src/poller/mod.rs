//! Poller contract and its implementations.
//!
//! A poller is driven with an [`UpdateSource`], a destination channel and a
//! stop token. It keeps producing updates until the token is cancelled:
//!
//! ```text
//! driver ──stop──► MiddlewarePoller ──derived stop──► MiddlewarePoller ──derived stop──► LongPoller
//! destination ◄──── filter ◄──────── relay ◄──────── filter ◄──────── relay ◄──────── getUpdates
//! ```

mod long_poll;
mod middleware;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::source::UpdateSource;
use crate::update::Update;

pub use long_poll::{DEFAULT_LONG_POLL_TIMEOUT, LongPoller};
pub use middleware::{DEFAULT_MIDDLEWARE_CAPACITY, MiddlewarePoller, UpdateFilter, middleware};

/// Something that can be driven to produce updates until told to stop.
#[async_trait]
pub trait Poller: Send + Sync {
    /// Produce updates into `destination` until `stop` is cancelled.
    ///
    /// Returns `Ok(())` once stop has been observed. Returns early with an
    /// error only when polling cannot continue (closed destination, exhausted
    /// retry budget, failed inner task). Nothing is written to `destination`
    /// after stop has been observed.
    async fn poll(
        &self,
        source: Arc<dyn UpdateSource>,
        destination: mpsc::Sender<Update>,
        stop: CancellationToken,
    ) -> Result<()>;
}

#[async_trait]
impl<P: Poller + ?Sized> Poller for Arc<P> {
    async fn poll(
        &self,
        source: Arc<dyn UpdateSource>,
        destination: mpsc::Sender<Update>,
        stop: CancellationToken,
    ) -> Result<()> {
        (**self).poll(source, destination, stop).await
    }
}

#[async_trait]
impl<P: Poller + ?Sized> Poller for Box<P> {
    async fn poll(
        &self,
        source: Arc<dyn UpdateSource>,
        destination: mpsc::Sender<Update>,
        stop: CancellationToken,
    ) -> Result<()> {
        (**self).poll(source, destination, stop).await
    }
}

/// Send `update`, giving up if `stop` fires first.
///
/// Returns `Ok(false)` when stopped, `Ok(true)` when delivered.
pub(crate) async fn send_or_stop(
    destination: &mpsc::Sender<Update>,
    update: Update,
    stop: &CancellationToken,
) -> Result<bool> {
    tokio::select! {
        biased;
        () = stop.cancelled() => Ok(false),
        sent = destination.send(update) => match sent {
            Ok(()) => Ok(true),
            Err(_) => Err(crate::error::PollError::DestinationClosed),
        },
    }
}
