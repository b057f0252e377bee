//! Telegram side of the bot.
//!
//! - [`BotClient`]: the Bot API calls the bot needs (long polling, messages,
//!   file lookup and streamed download)
//! - [`media`]: maps incoming media messages to transfer objects
//! - [`TelegramSource`]: opens Telegram files as transfer sources

pub mod client;
pub mod error;
pub mod media;
pub mod source;
pub mod types;

pub use client::BotClient;
pub use error::TelegramError;
pub use media::object_ref;
pub use source::TelegramSource;
pub use types::{Chat, File, Message, Update, User};
