pub(super) const TELEGRAM_DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub(super) const TELEGRAM_API_BASE_ENV: &str = "OMNI_POLLER_TELEGRAM_API_BASE";
pub(super) const TELEGRAM_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Added on top of the long-poll timeout for the HTTP request deadline.
pub(super) const TELEGRAM_HTTP_TIMEOUT_GRACE_SECS: u64 = 10;
