use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::update::Update;

/// Remote message source consumed by pollers.
///
/// `fetch_updates` returns updates with `update_id >= since_id`, waiting up to
/// `timeout` for at least one to arrive.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Long-poll the remote API for new updates.
    async fn fetch_updates(
        &self,
        since_id: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, FetchError>;

    /// Short label used in logs.
    fn name(&self) -> &str {
        "source"
    }
}
