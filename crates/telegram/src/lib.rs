//! Telegram user-session transport for the registra relay.
//!
//! With the `mtproto` feature, [`MtprotoConnector`] logs in as a regular user
//! through grammers so the relay can read the target bot's replies from the
//! shared chat history, something the Bot API does not allow.

#[cfg(feature = "mtproto")]
pub mod client;
pub mod config;
pub mod error;
#[cfg(feature = "mtproto")]
pub mod login;
pub mod media;
pub mod rpc;

#[cfg(feature = "mtproto")]
pub use {
    client::{MtprotoConnector, MtprotoTransport},
    login::{LoginOutcome, LoginPrompt, login},
};
pub use {
    config::TelegramCredentials,
    error::{Error, Result},
    rpc::classify_rpc,
};
