//! Configuration and settings management.
//!
//! Loads settings from environment variables (optionally via `.env`) and a
//! `config/` directory. All values are fixed at process start.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;

/// Application settings loaded from environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// VK community (group) identifier.
    pub vk_group_id: i64,

    /// VK community access token.
    pub vk_token: String,

    /// VK API version string.
    #[serde(default = "default_api_version")]
    pub vk_api_version: String,

    /// Comma-separated list of admin user IDs.
    #[serde(rename = "admin_ids")]
    pub admin_ids_str: Option<String>,

    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Long-poll wait window in seconds.
    #[serde(default = "default_longpoll_wait")]
    pub longpoll_wait: u64,

    /// Catalog page size for the user-facing listing.
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_api_version() -> String {
    "5.199".to_string()
}

fn default_db_path() -> String {
    "./bot.db".to_string()
}

const fn default_longpoll_wait() -> u64 {
    25
}

const fn default_page_size() -> i64 {
    8
}

impl Settings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or if `VK_GROUP_ID` /
    /// `VK_TOKEN` are missing.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to
            // snake_case; ignore_empty treats empty env vars as unset.
            .add_source(
                Environment::default()
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = s.try_deserialize()?;

        if settings.vk_group_id <= 0 || settings.vk_token.is_empty() {
            return Err(ConfigError::Message(
                "VK_GROUP_ID and VK_TOKEN are required".to_string(),
            ));
        }

        Ok(settings)
    }

    /// Returns the set of user IDs allowed to use the admin console.
    #[must_use]
    pub fn admin_ids(&self) -> HashSet<i64> {
        self.admin_ids_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> Settings {
        Settings {
            vk_group_id: 1,
            vk_token: "t".to_string(),
            vk_api_version: default_api_version(),
            admin_ids_str: None,
            db_path: default_db_path(),
            longpoll_wait: default_longpoll_wait(),
            page_size: default_page_size(),
        }
    }

    #[test]
    fn admin_list_parsing() {
        let mut settings = base_settings();

        settings.admin_ids_str = Some("123,456".to_string());
        let admins = settings.admin_ids();
        assert!(admins.contains(&123));
        assert!(admins.contains(&456));
        assert_eq!(admins.len(), 2);

        settings.admin_ids_str = Some("333; 444, 555".to_string());
        let admins = settings.admin_ids();
        assert_eq!(admins.len(), 3);

        // Bad tokens are skipped, not fatal.
        settings.admin_ids_str = Some("abc, 777".to_string());
        let admins = settings.admin_ids();
        assert!(admins.contains(&777));
        assert_eq!(admins.len(), 1);
    }

    #[test]
    fn admin_list_empty_when_unset() {
        let settings = base_settings();
        assert!(settings.admin_ids().is_empty());
    }
}
