use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::constants::{
    TELEGRAM_API_BASE_ENV, TELEGRAM_DEFAULT_API_BASE, TELEGRAM_HTTP_CONNECT_TIMEOUT_SECS,
    TELEGRAM_HTTP_TIMEOUT_GRACE_SECS,
};
use crate::config::PollerSettings;
use crate::error::FetchError;
use crate::source::UpdateSource;
use crate::update::Update;

/// `getUpdates` over HTTPS against the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramSource {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    allowed_updates: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: Option<bool>,
    result: Option<Vec<Update>>,
    error_code: Option<i64>,
    description: Option<String>,
}

impl TelegramSource {
    fn resolve_api_base_url(configured: Option<&str>) -> String {
        std::env::var(TELEGRAM_API_BASE_ENV)
            .ok()
            .or_else(|| configured.map(str::to_string))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| TELEGRAM_DEFAULT_API_BASE.to_string())
    }

    /// Source for `bot_token` against the default (or env-overridden) API base.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::new_with_base_url(bot_token, Self::resolve_api_base_url(None))
    }

    /// Source whose API base comes from the environment, then `settings`,
    /// then the public Bot API.
    pub fn from_settings(bot_token: impl Into<String>, settings: &PollerSettings) -> Self {
        Self::new_with_base_url(
            bot_token,
            Self::resolve_api_base_url(settings.telegram_api_base.as_deref()),
        )
    }

    /// Source against an explicit API base, e.g. a local Bot API server.
    pub fn new_with_base_url(bot_token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: build_telegram_http_client(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            allowed_updates: Vec::new(),
        }
    }

    /// Restrict the update kinds Telegram sends (`message`, `callback_query`, ...).
    #[must_use]
    pub fn with_allowed_updates(mut self, allowed_updates: Vec<String>) -> Self {
        self.allowed_updates = allowed_updates;
        self
    }

    /// Bot API base URL requests are sent to.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }
}

impl std::fmt::Debug for TelegramSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSource")
            .field("api_base", &self.api_base)
            .field("bot_token", &"<redacted>")
            .field("allowed_updates", &self.allowed_updates)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl UpdateSource for TelegramSource {
    async fn fetch_updates(
        &self,
        since_id: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, FetchError> {
        let mut body = serde_json::json!({
            "offset": since_id,
            "timeout": timeout.as_secs(),
        });
        if !self.allowed_updates.is_empty() {
            body["allowed_updates"] = serde_json::json!(self.allowed_updates);
        }

        let response = self
            .client
            .post(self.api_url("getUpdates"))
            .timeout(timeout + Duration::from_secs(TELEGRAM_HTTP_TIMEOUT_GRACE_SECS))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let body_text = response.text().await?;

        let parsed = match serde_json::from_str::<GetUpdatesResponse>(&body_text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(FetchError::Api {
                    code: i64::from(status.as_u16()),
                    description: body_text,
                });
            }
            Err(error) => return Err(FetchError::Decode(error)),
        };

        if !status.is_success() || !parsed.ok.unwrap_or(true) {
            return Err(FetchError::Api {
                code: parsed
                    .error_code
                    .unwrap_or_else(|| i64::from(status.as_u16())),
                description: parsed
                    .description
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "unknown Telegram API error".to_string()),
            });
        }

        Ok(parsed.result.unwrap_or_default())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

fn build_telegram_http_client() -> reqwest::Client {
    match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(TELEGRAM_HTTP_CONNECT_TIMEOUT_SECS))
        .build()
    {
        Ok(client) => client,
        Err(error) => {
            tracing::warn!(
                error = %error,
                "Failed to build Telegram HTTP client with timeouts; falling back to default client"
            );
            reqwest::Client::new()
        }
    }
}
