//! omni-poller CLI: long polling with optional filter layers.
//!
//! Logging: set `RUST_LOG=omni_poller=debug` to see poller lifecycle logs on stderr.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use omni_poller::{
    MiddlewarePoller, Poller, PollerRuntimeConfig, TelegramSource, load_poller_settings,
    spawn_poller,
};

use crate::cli::Cli;

const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "omni_poller=debug"
        } else {
            "omni_poller=info"
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let settings = cli
        .config
        .as_deref()
        .map(load_poller_settings)
        .unwrap_or_default();
    let runtime_config = PollerRuntimeConfig::from_env(Some(&settings));
    let poller = build_poller(&cli, &runtime_config);
    let source = Arc::new(TelegramSource::from_settings(cli.token.clone(), &settings));

    tracing::info!(
        timeout_secs = runtime_config.timeout.as_secs(),
        queue_capacity = runtime_config.queue_capacity,
        filters = cli.kinds.len() + usize::from(cli.min_id.is_some()),
        "polling Telegram updates (Ctrl+C to stop)"
    );
    let (mut updates, handle) = spawn_poller(poller, source, runtime_config.queue_capacity);

    loop {
        tokio::select! {
            maybe_update = updates.recv() => {
                let Some(update) = maybe_update else {
                    break;
                };
                println!("{}", serde_json::to_string(&update)?);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    handle.stop();
    drop(updates);
    match tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, handle.join()).await {
        Ok(result) => result?,
        Err(_) => tracing::warn!("poller still inside a fetch at exit; detaching"),
    }
    Ok(())
}

fn build_poller(cli: &Cli, runtime_config: &PollerRuntimeConfig) -> Box<dyn Poller> {
    let mut poller: Box<dyn Poller> = Box::new(runtime_config.long_poller());

    if !cli.kinds.is_empty() {
        let kinds = cli.kinds.clone();
        poller = Box::new(
            MiddlewarePoller::new(poller, move |update| {
                kinds.iter().any(|kind| update.has_field(kind))
            })
            .with_capacity(runtime_config.middleware_capacity),
        );
    }

    if let Some(min_id) = cli.min_id {
        poller = Box::new(
            MiddlewarePoller::new(poller, move |update| update.id >= min_id)
                .with_capacity(runtime_config.middleware_capacity),
        );
    }

    poller
}
