use anyhow::{Context, Result};
use log::{error, info, warn};
use std::env;
use std::sync::Arc;
use tokio::sync::mpsc;

use chatwatch::config::DEFAULT_CONFIG_PATH;
use chatwatch::prelude::*;

const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("Starting chatwatch v{}", chatwatch::VERSION);

    // Config path: first argument, then CHATWATCH_CONFIG, then the default
    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var("CHATWATCH_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config_manager = ConfigurationManager::new(&config_path);
    if let Err(e) = config_manager.initialize().await {
        error!("Failed to initialize configuration from {}: {:#}", config_path, e);
        return Err(e);
    }
    let config = config_manager.get_config().await;

    let classifier = OpenAiClassifier::new(&config.classifier, &config.core)
        .context("Failed to set up the classifier")?;
    let watcher = Arc::new(ChatWatcher::new(&config, Arc::new(classifier))?);

    let platforms = build_enabled(&config).context("Failed to build platform adapters")?;
    if platforms.is_empty() {
        warn!("No platform adapters were built; nothing will be posted");
    }
    for platform in platforms {
        watcher.add_platform(platform).await;
    }
    info!("Platforms registered: {:?}", watcher.router().platforms().await);

    // Feed -> dispatcher -> watcher
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let feed = OneCommeClient::new(config.core.websocket_url.clone()).spawn(event_tx);
    let dispatcher = watcher.spawn_dispatcher(event_rx);
    let tasks = watcher.start();

    let shutdown_manager = Arc::new(GracefulShutdown::default());
    shutdown_manager.register_component(Box::new(feed)).await;
    shutdown_manager.register_component(Box::new(dispatcher)).await;
    for task in tasks {
        shutdown_manager.register_component(Box::new(task)).await;
    }
    shutdown_manager.start_signal_handlers();

    info!("Watching {} (Ctrl+C to stop)", config.core.websocket_url);
    shutdown_manager.wait_for_shutdown().await?;

    let stats = shutdown_manager.get_stats().await;
    if !stats.failed.is_empty() {
        warn!("Components that failed to stop: {:?}", stats.failed);
    }
    info!("chatwatch stopped");
    Ok(())
}
