use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use emote_wall::{
    config::EmoteWallConfig,
    engine::Engine,
    events::EngineEvent,
    providers::load_catalog,
    workers::{ChatWorker, ChatWorkerConfig},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (config, config_path) = EmoteWallConfig::load_or_create()?;
    info!(path = %config_path.display(), channel = %config.channel, "config loaded");

    let catalog = load_catalog(&config).await;
    if catalog.is_empty() {
        warn!("no emotes loaded; only native chat emotes can be shown");
    }

    let (tx, rx) = mpsc::unbounded_channel::<EngineEvent>();
    let mut chat = ChatWorker::default();
    match ChatWorkerConfig::from_config(&config) {
        Some(chat_config) => {
            chat.start(chat_config, tx.clone());
        }
        None => info!("chat ingestion disabled"),
    }
    if config.test_mode && tx.send(EngineEvent::StartTestMode).is_err() {
        error!("engine queue closed before start");
    }

    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received");
                shutdown_tx.send(EngineEvent::Shutdown).ok();
            }
            Err(err) => warn!(?err, "failed listening for ctrl-c"),
        }
    });
    drop(tx);

    let mut engine = Engine::new(config, catalog);
    engine.run(rx).await;

    chat.stop();
    let stats = engine.snapshot();
    info!(?stats, "emote wall stopped");
    Ok(())
}
