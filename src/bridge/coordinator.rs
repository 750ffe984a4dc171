use crate::config::BridgeConfig;
use crate::console::{ConsoleKind, LogSink};
use crate::controller::{InputRouter, NavigationAction, NavigationSelection, RawInput};
use crate::engine::{EngineHandle, EngineStatus, PackSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What activating a dashboard ring does in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingAction {
    ConnectEngine,
    ShutdownEngine,
    LoadPack,
    HapticTest,
    TestBridge,
    InspectStructure,
    Nothing,
}

/// Ring activation table. Rings whose precondition does not hold do nothing.
pub fn ring_action(
    index: usize,
    status: &EngineStatus,
    pack_loaded: bool,
    controller_connected: bool,
) -> RingAction {
    let connected = status.is_connected();
    match index {
        0 if !connected => RingAction::ConnectEngine,
        1 if connected => RingAction::ShutdownEngine,
        2 if connected && !pack_loaded => RingAction::LoadPack,
        3 if controller_connected => RingAction::HapticTest,
        4 if connected => RingAction::TestBridge,
        5 if pack_loaded => RingAction::InspectStructure,
        _ => RingAction::Nothing,
    }
}

/// The one place where controller input meets the engine.
///
/// Owns the [`InputRouter`], so every hardware input is applied in arrival
/// order by a single task. Engine calls triggered by activations run as
/// child tasks and never block input handling.
pub struct Coordinator {
    router: InputRouter,
    engine: EngineHandle,
    console: Arc<dyn LogSink>,
    hooks: broadcast::Sender<NavigationAction>,
    tasks: JoinSet<()>,
    haptic_test_intensity: f32,
    metrics_interval: Duration,
}

impl Coordinator {
    pub fn new(
        router: InputRouter,
        engine: EngineHandle,
        console: Arc<dyn LogSink>,
        settings: &BridgeConfig,
    ) -> Self {
        let (hooks, _) = broadcast::channel(64);
        Self {
            router,
            engine,
            console,
            hooks,
            tasks: JoinSet::new(),
            haptic_test_intensity: settings.input.haptics.test,
            metrics_interval: Duration::from_millis(settings.metrics.refresh_interval_ms.max(1)),
        }
    }

    /// Every navigation action, for UI hooks (cancel, menu, selection moves).
    pub fn subscribe_hooks(&self) -> broadcast::Receiver<NavigationAction> {
        self.hooks.subscribe()
    }

    pub fn subscribe_selection(&self) -> watch::Receiver<NavigationSelection> {
        self.router.subscribe()
    }

    pub fn router(&self) -> &InputRouter {
        &self.router
    }

    pub fn handle_input(&mut self, input: RawInput) {
        for action in self.router.dispatch(input) {
            // No subscribers is fine
            let _ = self.hooks.send(action);
            if let NavigationAction::Activate(index) = action {
                self.activate(index);
            }
        }
    }

    pub fn activate(&mut self, index: usize) -> RingAction {
        let status = self.engine.status();
        let action = ring_action(
            index,
            &status,
            self.engine.pack_state().is_loaded(),
            self.router.is_controller_connected(),
        );
        info!("Ring {} activated ({}): {:?}", index, status, action);

        let engine = self.engine.clone();
        match action {
            RingAction::ConnectEngine => {
                self.tasks.spawn(async move {
                    if let Err(e) = engine.initialize().await {
                        warn!("Engine connect failed: {}", e);
                    }
                });
            }
            RingAction::ShutdownEngine => {
                self.tasks.spawn(async move {
                    if let Err(e) = engine.shutdown_engine().await {
                        warn!("Engine shutdown failed: {}", e);
                    }
                });
            }
            RingAction::LoadPack => {
                self.tasks.spawn(async move {
                    match engine.load_pack(PackSource::Discover).await {
                        Ok(state) => info!("Pack ready with {} files", state.contents.len()),
                        Err(e) => warn!("Pack load ended: {}", e),
                    }
                });
            }
            RingAction::HapticTest => {
                self.console
                    .append_log_line(ConsoleKind::Controller, "Controller haptic test");
                self.router.pulse_primary(self.haptic_test_intensity);
            }
            RingAction::TestBridge => {
                self.tasks.spawn(async move {
                    match engine.test_bridge().await {
                        Ok(latency) => debug!("Bridge latency {:?}", latency),
                        Err(e) => warn!("Bridge test failed: {}", e),
                    }
                });
            }
            RingAction::InspectStructure => {
                self.tasks.spawn(async move {
                    match engine.inspect_structure().await {
                        Ok(summary) => info!("Project structure: {}", summary),
                        Err(e) => warn!("Structure inspection failed: {}", e),
                    }
                });
            }
            RingAction::Nothing => debug!("Ring {} has nothing to do right now", index),
        }
        action
    }

    /// Waits for every engine call started by an activation.
    pub async fn wait_idle(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!("Activation task failed: {}", e);
            }
        }
    }

    pub fn log_metrics(&self) {
        let engine = self.engine.metrics();
        let battery = self.router.battery_level();
        info!(
            "Metrics: engine {} (up {}s), packs loaded {}, last load {:?} ({} files), bridge latency {:?}, input events {}, last input {}, battery {:.0}%",
            self.engine.status(),
            engine.uptime().map(|d| d.num_seconds()).unwrap_or(0),
            engine.packs_loaded,
            engine.last_load_duration,
            engine.last_file_count,
            engine.last_bridge_latency,
            self.router.events_recorded(),
            self.router
                .last_input_time()
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string()),
            battery * 100.0
        );
    }

    /// Runs until `shutdown` is cancelled or the input channel closes.
    pub async fn run(mut self, mut inputs: mpsc::Receiver<RawInput>, shutdown: CancellationToken) {
        info!("Coordinator started");
        let mut metrics = tokio::time::interval(self.metrics_interval);
        metrics.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Coordinator shutting down");
                    break;
                }
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => {
                        warn!("Input channel closed");
                        break;
                    }
                },
                Some(result) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = result {
                        error!("Activation task failed: {}", e);
                    }
                }
                _ = metrics.tick() => self.log_metrics(),
            }
        }

        self.tasks.abort_all();
    }
}
