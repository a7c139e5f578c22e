use dotenv::dotenv;
use serenity::all::Http;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod channels;
mod config;
mod contest;
mod db;
mod error;
mod models;
mod scheduler;

use channels::{ContestHandler, DiscordItemStore, HttpContentProbe};
use config::Config;
use contest::{ContestEvents, CycleRunner};
use db::Database;
use scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env()?;
    log::info!("Using config directory: {:?}", config.config_dir);

    log::info!("Loading contest modules from config directory");
    let registry = Arc::new(config::load_modules(&config.config_dir)?);
    if registry.is_empty() {
        log::warn!("No usable contest modules configured");
    }

    log::info!("Initializing database at {}", config.database_url);
    let db = Arc::new(Database::new(&config.database_url)?);

    let http = Arc::new(Http::new(&config.discord_token));
    let store = Arc::new(DiscordItemStore::new(http));

    log::info!("Initializing contest engine");
    let events = Arc::new(ContestEvents::new(
        registry.clone(),
        db.clone(),
        store.clone(),
        Arc::new(HttpContentProbe::new()),
        store.clone(),
    ));
    let runner = Arc::new(CycleRunner::new(db.clone(), store.clone()));

    log::info!("Starting scheduler");
    let scheduler = Scheduler::new(registry.clone(), runner);
    let timers = scheduler.start();

    let shutdown = CancellationToken::new();
    let listener = {
        let token = config.discord_token.clone();
        let handler = ContestHandler::new(events, store);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            channels::start_discord_listener(&token, handler, shutdown).await
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received shutdown signal");
        }
        result = listener => {
            match result {
                Ok(Ok(())) => log::info!("Discord listener exited"),
                Ok(Err(e)) => log::error!("Discord listener error: {}", e),
                Err(e) => log::error!("Discord listener task failed: {}", e),
            }
        }
    }

    shutdown.cancel();
    scheduler.stop();
    for timer in timers {
        let _ = timer.await;
    }
    log::info!("Contest bot stopped");
    Ok(())
}
