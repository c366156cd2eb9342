//! Poller runtime configuration (timeouts, queue sizes, retry policy).
//!
//! Values resolve as: environment variable, then settings file, then default.
//! Invalid values are logged and skipped.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::poller::{DEFAULT_LONG_POLL_TIMEOUT, DEFAULT_MIDDLEWARE_CAPACITY, LongPoller};
use crate::retry::{Backoff, RetryPolicy};

const DEFAULT_QUEUE_CAPACITY: usize = 100;
const DEFAULT_RETRY_MAX_MS: u64 = 60_000;

const ENV_TIMEOUT_SECS: &str = "OMNI_POLLER_TIMEOUT_SECS";
const ENV_QUEUE_CAPACITY: &str = "OMNI_POLLER_QUEUE_CAPACITY";
const ENV_MIDDLEWARE_CAPACITY: &str = "OMNI_POLLER_MIDDLEWARE_CAPACITY";
const ENV_RETRY_MAX_ATTEMPTS: &str = "OMNI_POLLER_RETRY_MAX_ATTEMPTS";
const ENV_RETRY_BASE_MS: &str = "OMNI_POLLER_RETRY_BASE_MS";
const ENV_RETRY_MAX_MS: &str = "OMNI_POLLER_RETRY_MAX_MS";
const ENV_INTERRUPTIBLE: &str = "OMNI_POLLER_INTERRUPTIBLE";

/// Settings file contents (`settings.yaml`). Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollerSettings {
    /// Long-poll timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Capacity of the destination channel.
    pub queue_capacity: Option<usize>,
    /// Relay capacity of each middleware layer.
    pub middleware_capacity: Option<usize>,
    /// Consecutive failed fetches tolerated; `0` means unlimited.
    pub retry_max_attempts: Option<u32>,
    /// First backoff delay in milliseconds; `0` retries immediately.
    pub retry_base_ms: Option<u64>,
    /// Upper bound on the backoff delay in milliseconds.
    pub retry_max_ms: Option<u64>,
    /// Abort in-flight fetches on stop.
    pub interruptible: Option<bool>,
    /// Bot API base URL override.
    pub telegram_api_base: Option<String>,
}

/// Load settings from a YAML file. Missing or malformed files yield defaults.
pub fn load_poller_settings(path: &Path) -> PollerSettings {
    if !path.exists() {
        return PollerSettings::default();
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to read poller settings file; ignoring"
            );
            return PollerSettings::default();
        }
    };
    match serde_yaml::from_str::<PollerSettings>(&raw) {
        Ok(settings) => settings,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to parse poller settings yaml; ignoring file"
            );
            PollerSettings::default()
        }
    }
}

/// Resolved poller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerRuntimeConfig {
    /// Long-poll timeout.
    pub timeout: Duration,
    /// Destination channel capacity.
    pub queue_capacity: usize,
    /// Relay capacity of each middleware layer.
    pub middleware_capacity: usize,
    /// Policy for failed fetches.
    pub retry: RetryPolicy,
    /// Abort in-flight fetches on stop.
    pub interruptible: bool,
}

impl Default for PollerRuntimeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LONG_POLL_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            middleware_capacity: DEFAULT_MIDDLEWARE_CAPACITY,
            retry: RetryPolicy::unlimited(),
            interruptible: false,
        }
    }
}

impl PollerRuntimeConfig {
    /// Resolve from process environment and optional settings.
    pub fn from_env(settings: Option<&PollerSettings>) -> Self {
        Self::from_lookup(|name| std::env::var(name).ok(), settings)
    }

    #[doc(hidden)]
    pub fn from_lookup_for_test<F>(lookup: F, settings: Option<&PollerSettings>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup(lookup, settings)
    }

    fn from_lookup<F>(lookup: F, settings: Option<&PollerSettings>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let positive_u64 = |value: &u64| *value > 0;
        let positive_usize = |value: &usize| *value > 0;

        let timeout_secs = resolve(
            &lookup,
            ENV_TIMEOUT_SECS,
            settings.and_then(|s| s.timeout_secs),
            defaults.timeout.as_secs(),
            positive_u64,
        );
        let retry_max_attempts = resolve_optional(
            &lookup,
            ENV_RETRY_MAX_ATTEMPTS,
            settings.and_then(|s| s.retry_max_attempts),
            |value: &u32| *value > 0,
        );
        let retry_base_ms = resolve(
            &lookup,
            ENV_RETRY_BASE_MS,
            settings.and_then(|s| s.retry_base_ms),
            0,
            |_: &u64| true,
        );
        let retry_max_ms = resolve(
            &lookup,
            ENV_RETRY_MAX_MS,
            settings.and_then(|s| s.retry_max_ms),
            DEFAULT_RETRY_MAX_MS,
            positive_u64,
        );

        let mut retry = RetryPolicy::unlimited();
        if let Some(max_attempts) = retry_max_attempts {
            retry = retry.with_max_attempts(max_attempts);
        }
        if retry_base_ms > 0 {
            retry = retry.with_backoff(Backoff::Exponential {
                base: Duration::from_millis(retry_base_ms),
                max: Duration::from_millis(retry_max_ms.max(retry_base_ms)),
            });
        }

        Self {
            timeout: Duration::from_secs(timeout_secs),
            queue_capacity: resolve(
                &lookup,
                ENV_QUEUE_CAPACITY,
                settings.and_then(|s| s.queue_capacity),
                defaults.queue_capacity,
                positive_usize,
            ),
            middleware_capacity: resolve(
                &lookup,
                ENV_MIDDLEWARE_CAPACITY,
                settings.and_then(|s| s.middleware_capacity),
                defaults.middleware_capacity,
                positive_usize,
            ),
            retry,
            interruptible: resolve_bool(
                &lookup,
                ENV_INTERRUPTIBLE,
                settings.and_then(|s| s.interruptible),
                defaults.interruptible,
            ),
        }
    }

    /// Build the leaf poller described by this configuration.
    pub fn long_poller(&self) -> LongPoller {
        LongPoller::new(self.timeout)
            .with_retry_policy(self.retry)
            .interruptible(self.interruptible)
    }
}

fn resolve<F, T>(
    lookup: &F,
    name: &str,
    setting_value: Option<T>,
    default: T,
    is_valid: impl Fn(&T) -> bool,
) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy,
{
    resolve_optional(lookup, name, setting_value, is_valid).unwrap_or(default)
}

fn resolve_optional<F, T>(
    lookup: &F,
    name: &str,
    setting_value: Option<T>,
    is_valid: impl Fn(&T) -> bool,
) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy,
{
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<T>() {
            Ok(value) if is_valid(&value) => return Some(value),
            _ => tracing::warn!(
                env_var = %name,
                value = %raw,
                "invalid poller config env value; using settings/default"
            ),
        }
    }
    match setting_value {
        Some(value) if is_valid(&value) => Some(value),
        Some(value) => {
            tracing::warn!(
                setting = %name,
                value = %value,
                "invalid poller config settings value; using default"
            );
            None
        }
        None => None,
    }
}

fn resolve_bool<F>(lookup: &F, name: &str, setting_value: Option<bool>, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => return true,
            "0" | "false" | "no" | "off" => return false,
            _ => tracing::warn!(
                env_var = %name,
                value = %raw,
                "invalid poller config env value; using settings/default"
            ),
        }
    }
    setting_value.unwrap_or(default)
}
