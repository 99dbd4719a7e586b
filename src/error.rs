//! Error taxonomy for the bot.
//!
//! Every failure the ingestion loop can see maps onto one of these variants.
//! Transport and API errors are recoverable (logged, backed off, retried);
//! only storage unavailability at startup is allowed to be fatal.

use thiserror::Error;

/// Failures surfaced by transport, persistence, and decoding layers.
#[derive(Debug, Error)]
pub enum BotError {
    /// Network-level failure talking to VK. Recoverable: the polling loop
    /// backs off and re-bootstraps; send paths log and degrade.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// VK API returned an explicit error object.
    #[error("VK API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
