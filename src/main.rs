use std::sync::Arc;

use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

use vk_magnet_bot::bot::BotService;
use vk_magnet_bot::config::Settings;
use vk_magnet_bot::storage::Db;
use vk_magnet_bot::vk::VkApi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenv().ok();

    init_logging();

    info!("Starting VK lead-magnet bot...");

    let settings = init_settings();
    let db = init_db(&settings);
    let vk = init_vk(&settings);

    let service = BotService::new(settings, db, vk);

    info!("Bot is running...");
    service.run().await?;

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_db(settings: &Settings) -> Arc<Db> {
    match Db::open(&settings.db_path) {
        Ok(db) => {
            info!("Database ready at {}.", settings.db_path);
            Arc::new(db)
        }
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_vk(settings: &Arc<Settings>) -> Arc<VkApi> {
    match VkApi::new(settings) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            error!("Failed to build VK API client: {}", e);
            std::process::exit(1);
        }
    }
}
