//! Lead-magnet delivery bot for a VK community.
//!
//! Gates a catalog of downloadable materials behind a community-subscription
//! check, tracks referral attribution, and gives administrators a multi-step
//! conversational console for catalog management and broadcasts.
//!
//! The core is a single sequential ingestion loop: long-poll events are
//! classified into [`bot::router::Interaction`]s and routed either into the
//! per-user admin workflow engine ([`bot::workflow`]) or into the catalog
//! delivery flow ([`bot::catalog`]). All persisted state lives in SQLite
//! ([`storage::Db`]); all outbound sends go through the responder in
//! [`bot::BotService`].

pub mod bot;
pub mod config;
pub mod error;
pub mod storage;
pub mod testing;
pub mod vk;

pub use config::Settings;
pub use error::BotError;
pub use storage::Db;
