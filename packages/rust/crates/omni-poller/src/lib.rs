//! Update acquisition for chat bots.
//!
//! - **[`LongPoller`]**: repeatedly long-polls an [`UpdateSource`] from the last
//!   delivered `update_id` and forwards updates in order.
//! - **[`MiddlewarePoller`]**: wraps any [`Poller`], relays its output through a
//!   buffered channel, and drops updates rejected by a filter.
//! - **[`spawn_poller`]**: drive a poller on its own task with a stop handle.
//!
//! Shutdown is signalled with a [`CancellationToken`]. Each middleware layer
//! owns a separate token for the poller it wraps.

mod config;
mod driver;
mod error;
mod poller;
mod retry;
mod source;
mod telegram;
#[doc(hidden)]
pub mod test_support;
mod update;

pub use config::{PollerRuntimeConfig, PollerSettings, load_poller_settings};
pub use driver::{PollerHandle, spawn_poller};
pub use error::{FetchError, PollError, Result};
pub use poller::{
    DEFAULT_LONG_POLL_TIMEOUT, DEFAULT_MIDDLEWARE_CAPACITY, LongPoller, MiddlewarePoller, Poller,
    UpdateFilter, middleware,
};
pub use retry::{Backoff, RetryPolicy};
pub use source::UpdateSource;
pub use telegram::TelegramSource;
pub use tokio_util::sync::CancellationToken;
pub use update::Update;
