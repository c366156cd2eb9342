//! Telegram Bot API update source (`getUpdates`).

mod constants;
mod source;

pub use source::TelegramSource;
