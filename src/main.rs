//! Fishing bot entry point.

use std::sync::Arc;

use tracing::{error, info};

use fishing_discord::bot;
use fishing_discord::commands::Fishery;
use fishing_discord::config::BotConfig;
use fishing_discord::store::SqliteStore;

#[tokio::main]
async fn main() {
    // Respects RUST_LOG, defaults to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenv::dotenv().ok();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };
    info!(db = %config.db_path.display(), scope = ?config.command_scope, "starting fishing bot");

    let store = match SqliteStore::open(&config.db_path) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, path = %config.db_path.display(), "failed to open player store");
            std::process::exit(1);
        }
    };
    let fishery = Arc::new(Fishery::with_entropy(store));

    if let Err(e) = bot::run(config, fishery).await {
        error!(error = %e, "bot stopped");
        std::process::exit(1);
    }
}
