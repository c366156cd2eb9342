use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "omni-poller")]
#[command(about = "Long-poll a Telegram bot and print incoming updates as JSON lines.")]
pub(crate) struct Cli {
    /// Bot token issued by @BotFather.
    #[arg(long, env = "OMNI_POLLER_TELEGRAM_TOKEN", hide_env_values = true)]
    pub(crate) token: String,

    /// Path to settings.yaml (timeouts, queue sizes, retry policy).
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,

    /// Only pass updates carrying this field (repeatable), e.g. `--kind message`.
    #[arg(long = "kind")]
    pub(crate) kinds: Vec<String>,

    /// Only pass updates with `update_id >= N`.
    #[arg(long)]
    pub(crate) min_id: Option<i64>,

    /// Debug logging (ignored when RUST_LOG is set).
    #[arg(long, short)]
    pub(crate) verbose: bool,
}
