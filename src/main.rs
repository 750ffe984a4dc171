use color_eyre::{eyre::eyre, Result};
use nativebridge::bridge::Coordinator;
use nativebridge::config::BridgeConfig;
use nativebridge::console::DebugConsole;
use nativebridge::controller::{CollectorHandle, InputRouter, RumbleHaptics};
use nativebridge::engine::{EngineController, EngineHandle};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = load_config().await?;
    let console = Arc::new(DebugConsole::new(config.console.capacity));
    let shutdown = CancellationToken::new();

    let engine = EngineController::from_config(config.engine.clone(), console.clone());
    let (engine_handle, engine_worker) = EngineHandle::spawn(engine, shutdown.clone());

    let (input_tx, input_rx) = mpsc::channel(256);
    let (haptic_tx, haptic_rx) = mpsc::channel(16);
    // Keeps the coordinator alive when no collector is running
    let _input_keepalive = input_tx.clone();

    info!("Starting gamepad collector");
    let collector = match CollectorHandle::spawn(
        Some(config.input.clone()),
        input_tx,
        haptic_rx,
        shutdown.clone(),
    )
    .await
    {
        Ok(collector) => Some(collector),
        Err(e) => {
            warn!("Running without gamepad input: {}", e);
            None
        }
    };

    let haptics = Arc::new(RumbleHaptics::new(haptic_tx, config.input.rumble_duration_ms));
    let router = InputRouter::new(config.input.clone(), haptics, console.clone());
    let coordinator = Coordinator::new(router, engine_handle.clone(), console.clone(), &config);
    let coordinator_task = tokio::spawn(coordinator.run(input_rx, shutdown.clone()));

    if config.engine.auto_connect {
        info!("Auto-connecting engine");
        if let Err(e) = engine_handle.initialize().await {
            warn!("Auto-connect failed: {}", e);
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    if let Err(e) = engine_handle.shutdown_engine().await {
        warn!("Engine shutdown failed: {}", e);
    }
    shutdown.cancel();

    coordinator_task
        .await
        .map_err(|e| eyre!("Coordinator task failed: {}", e))?;
    engine_worker
        .await
        .map_err(|e| eyre!("Engine worker failed: {}", e))?;
    if let Some(collector) = collector {
        tokio::task::spawn_blocking(move || collector.join()).await?;
    }

    debug!("{} console lines at exit", console.len());
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn load_config() -> Result<BridgeConfig> {
    let path = BridgeConfig::default_path()?;
    let config = BridgeConfig::load_or_create(&path).await?;
    info!(
        "Using {:?} backend with content root {}",
        config.engine.backend,
        config.engine.content_root.display()
    );
    Ok(config)
}
