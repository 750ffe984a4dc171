use crate::config::{EngineConfig, StorageBackend};
use crate::console::{ConsoleKind, LogSink};
use crate::engine::enumerator::{PckIndexEnumerator, ProjectFileEnumerator, SimulatedProjectEnumerator};
use crate::engine::error::EngineError;
use crate::engine::pipeline::{PackPipeline, Probing};
use crate::engine::status::{EngineMetrics, EngineStatus, PackLoadState, PackSource};
use crate::engine::storage::{FsStorage, MemoryStorage, StorageProbe};
use crate::engine::structure::ProjectStructureSummary;
use chrono::Local;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Size reported for the pack file of the simulated backend.
const SIMULATED_PACK_SIZE: u64 = 4 * 1024 * 1024;

/// Owns engine status, pack state and metrics.
///
/// Every operation takes `&mut self`, so at most one runs at a time. State is
/// published through watch channels; observers only ever see snapshots.
pub struct EngineController {
    settings: EngineConfig,
    storage: Arc<dyn StorageProbe>,
    enumerator: Arc<dyn ProjectFileEnumerator>,
    console: Arc<dyn LogSink>,
    status: Arc<watch::Sender<EngineStatus>>,
    pack_state: Arc<watch::Sender<PackLoadState>>,
    metrics: watch::Sender<EngineMetrics>,
}

impl EngineController {
    pub fn new(
        settings: EngineConfig,
        storage: Arc<dyn StorageProbe>,
        enumerator: Arc<dyn ProjectFileEnumerator>,
        console: Arc<dyn LogSink>,
    ) -> Self {
        let (status, _) = watch::channel(EngineStatus::default());
        let (pack_state, _) = watch::channel(PackLoadState::default());
        let (metrics, _) = watch::channel(EngineMetrics::default());

        Self {
            settings,
            storage,
            enumerator,
            console,
            status: Arc::new(status),
            pack_state: Arc::new(pack_state),
            metrics,
        }
    }

    /// Wires the storage probe and enumerator named by `settings.backend`.
    pub fn from_config(settings: EngineConfig, console: Arc<dyn LogSink>) -> Self {
        let (storage, enumerator): (Arc<dyn StorageProbe>, Arc<dyn ProjectFileEnumerator>) =
            match settings.backend {
                StorageBackend::Filesystem => (Arc::new(FsStorage), Arc::new(PckIndexEnumerator)),
                StorageBackend::Simulated => {
                    let folder = settings
                        .candidate_folders
                        .first()
                        .cloned()
                        .unwrap_or_default();
                    let pack = settings
                        .content_root
                        .join(folder)
                        .join(&settings.pack_file_name);
                    (
                        Arc::new(MemoryStorage::new().with_file(pack, SIMULATED_PACK_SIZE)),
                        Arc::new(SimulatedProjectEnumerator),
                    )
                }
            };
        info!("Engine controller using {:?} backend", settings.backend);
        Self::new(settings, storage, enumerator, console)
    }

    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    pub fn pack_state(&self) -> PackLoadState {
        self.pack_state.borrow().clone()
    }

    pub fn metrics(&self) -> EngineMetrics {
        self.metrics.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_pack_state(&self) -> watch::Receiver<PackLoadState> {
        self.pack_state.subscribe()
    }

    pub fn subscribe_metrics(&self) -> watch::Receiver<EngineMetrics> {
        self.metrics.subscribe()
    }

    fn set_status(&self, status: EngineStatus) {
        info!("Engine status: {}", status);
        let kind = match &status {
            EngineStatus::Error(_) => ConsoleKind::Error,
            EngineStatus::Connected | EngineStatus::PackLoaded => ConsoleKind::Success,
            _ => ConsoleKind::Info,
        };
        self.console
            .append_log_line(kind, &format!("Engine status: {}", status));
        self.status.send_replace(status);
    }

    fn reject(&self, err: EngineError) -> EngineError {
        warn!("Engine operation rejected: {}", err);
        self.console.append_log_line(ConsoleKind::Warning, &err.to_string());
        err
    }

    /// Brings the engine up. A no-op apart from one log line when it is
    /// already up or coming up.
    pub async fn initialize_engine(&mut self) -> Result<(), EngineError> {
        match self.status() {
            EngineStatus::Initializing
            | EngineStatus::Connected
            | EngineStatus::LoadingPack
            | EngineStatus::PackLoaded => {
                info!("Engine already initialized");
                self.console
                    .append_log_line(ConsoleKind::Info, "Engine already initialized");
                return Ok(());
            }
            EngineStatus::Error(cause) => {
                info!("Reinitializing engine after error: {}", cause);
                self.pack_state.send_replace(PackLoadState::default());
            }
            EngineStatus::Disconnected => {}
        }

        self.set_status(EngineStatus::Initializing);
        tokio::time::sleep(Duration::from_millis(self.settings.init_delay_ms)).await;
        self.metrics
            .send_modify(|metrics| metrics.connected_since = Some(Local::now()));
        self.set_status(EngineStatus::Connected);
        Ok(())
    }

    /// Locates, validates and enumerates a pack.
    ///
    /// Accepted while `Connected` or `PackLoaded`. A failed step leaves the
    /// engine in a sticky `Error`; cancellation through `cancel`, or dropping
    /// the returned future, puts it back to `Connected` with no pack.
    pub async fn load_pack(
        &mut self,
        source: PackSource,
        cancel: CancellationToken,
    ) -> Result<PackLoadState, EngineError> {
        match self.status() {
            EngineStatus::Connected | EngineStatus::PackLoaded => {}
            EngineStatus::LoadingPack => return Err(self.reject(EngineError::Busy)),
            _ => return Err(self.reject(EngineError::EngineNotReady)),
        }

        info!("Loading pack from {:?}", source);
        let started = Instant::now();
        let guard = LoadGuard {
            status: self.status.clone(),
            pack_state: self.pack_state.clone(),
            console: self.console.clone(),
            armed: true,
        };
        self.set_status(EngineStatus::LoadingPack);

        let pipeline = PackPipeline::<Probing>::start(
            self.storage.clone(),
            self.enumerator.clone(),
            self.settings.clone(),
            self.pack_state.clone(),
            cancel,
        );
        let result = async {
            pipeline
                .locate(&source)
                .await?
                .stage()
                .await?
                .validate()
                .await?
                .enumerate()
                .await
        }
        .await;

        match result {
            Ok(state) => {
                guard.disarm();
                let elapsed = started.elapsed();
                self.metrics.send_modify(|metrics| {
                    metrics.packs_loaded += 1;
                    metrics.last_load_duration = Some(elapsed);
                    metrics.last_file_count = state.contents.len();
                });
                self.console.append_log_line(
                    ConsoleKind::Success,
                    &format!(
                        "Pack loaded: {} files in {} ms",
                        state.contents.len(),
                        elapsed.as_millis()
                    ),
                );
                self.set_status(EngineStatus::PackLoaded);
                Ok(state)
            }
            Err(EngineError::Cancelled) => {
                // The guard restores the released state
                drop(guard);
                Err(EngineError::Cancelled)
            }
            Err(err) if err.is_step_failure() => {
                guard.disarm();
                error!("{}", err);
                let cause = match &err {
                    EngineError::PackDiscovery { cause } | EngineError::PackLoad { cause } => {
                        cause.clone()
                    }
                    other => other.to_string(),
                };
                self.set_status(EngineStatus::Error(cause));
                Err(err)
            }
            Err(err) => {
                guard.disarm();
                self.pack_state.send_replace(PackLoadState::default());
                self.set_status(EngineStatus::Connected);
                Err(self.reject(err))
            }
        }
    }

    /// Groups the loaded pack's files by category.
    pub fn inspect_structure(&self) -> Result<ProjectStructureSummary, EngineError> {
        let state = self.pack_state.borrow().clone();
        if !state.is_loaded() {
            return Err(self.reject(EngineError::NoPackLoaded));
        }

        let summary = ProjectStructureSummary::from_paths(&state.contents);
        debug!(
            "Structure of {} files: {} classified, {} unclassified",
            state.contents.len(),
            summary.total_classified(),
            summary.unclassified
        );
        self.console
            .append_log_line(ConsoleKind::Info, &format!("Project structure: {}", summary));
        Ok(summary)
    }

    /// Simulated round trip over the bridge; returns the measured latency.
    pub async fn test_bridge(&mut self) -> Result<Duration, EngineError> {
        if !matches!(
            self.status(),
            EngineStatus::Connected | EngineStatus::PackLoaded
        ) {
            return Err(self.reject(EngineError::EngineNotReady));
        }

        self.console
            .append_log_line(ConsoleKind::Info, "Sending bridge test message");
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(self.settings.test_message_delay_ms)).await;
        let latency = started.elapsed();

        self.metrics
            .send_modify(|metrics| metrics.last_bridge_latency = Some(latency));
        self.console.append_log_line(
            ConsoleKind::Success,
            &format!("Bridge test message answered in {} ms", latency.as_millis()),
        );
        Ok(latency)
    }

    /// Back to initial state, from any state.
    pub fn shutdown(&mut self) {
        self.pack_state.send_replace(PackLoadState::default());
        self.metrics
            .send_modify(|metrics| metrics.connected_since = None);
        self.set_status(EngineStatus::Disconnected);
    }
}

// Releases the engine if a load ends without reaching a verdict
struct LoadGuard {
    status: Arc<watch::Sender<EngineStatus>>,
    pack_state: Arc<watch::Sender<PackLoadState>>,
    console: Arc<dyn LogSink>,
    armed: bool,
}

impl LoadGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Pack load abandoned, releasing engine");
        self.console
            .append_log_line(ConsoleKind::Warning, "Pack load cancelled");
        self.pack_state.send_replace(PackLoadState::default());
        self.status.send_replace(EngineStatus::Connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::DebugConsole;
    use crate::engine::status::PackStatus;
    use std::path::PathBuf;

    fn settings() -> EngineConfig {
        EngineConfig {
            content_root: PathBuf::from("/content"),
            init_delay_ms: 0,
            checkpoint_delay_ms: 0,
            test_message_delay_ms: 0,
            ..Default::default()
        }
    }

    fn controller(storage: MemoryStorage) -> (EngineController, Arc<DebugConsole>) {
        let console = Arc::new(DebugConsole::new(100));
        let controller = EngineController::new(
            settings(),
            Arc::new(storage),
            Arc::new(SimulatedProjectEnumerator),
            console.clone(),
        );
        (controller, console)
    }

    fn with_pack() -> MemoryStorage {
        MemoryStorage::new().with_file("/content/GameContent/game.pck", 1024)
    }

    #[tokio::test]
    async fn second_initialize_only_logs_once() {
        let (mut engine, console) = controller(with_pack());

        engine.initialize_engine().await.unwrap();
        assert_eq!(engine.status(), EngineStatus::Connected);
        let before = console.len();

        engine.initialize_engine().await.unwrap();
        assert_eq!(engine.status(), EngineStatus::Connected);
        let lines = console.snapshot();
        assert_eq!(lines.len(), before + 1);
        assert!(lines[before].message.contains("already initialized"));
    }

    #[tokio::test]
    async fn load_requires_connected_engine() {
        let (mut engine, _) = controller(with_pack());

        let result = engine
            .load_pack(PackSource::Discover, CancellationToken::new())
            .await;
        assert_eq!(result, Err(EngineError::EngineNotReady));
        assert_eq!(engine.status(), EngineStatus::Disconnected);
        assert_eq!(engine.pack_state().status, PackStatus::Idle);
    }

    #[tokio::test]
    async fn progress_never_decreases_during_a_load() {
        let (mut engine, _) = controller(with_pack());
        engine.initialize_engine().await.unwrap();
        let mut updates = engine.subscribe_pack_state();

        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while updates.changed().await.is_ok() {
                let state = updates.borrow_and_update().clone();
                seen.push(state.progress);
                if state.status == PackStatus::Loaded {
                    break;
                }
            }
            seen
        });

        let state = engine
            .load_pack(PackSource::Discover, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(state.status, PackStatus::Loaded);
        assert_eq!(engine.status(), EngineStatus::PackLoaded);

        let seen = watcher.await.unwrap();
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[tokio::test]
    async fn load_failure_is_sticky_until_shutdown() {
        let empty = MemoryStorage::new().with_file("/content/GameContent/game.pck", 0);
        let (mut engine, _) = controller(empty);
        engine.initialize_engine().await.unwrap();

        let result = engine
            .load_pack(PackSource::Discover, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(EngineError::PackLoad { .. })));
        assert!(engine.status().is_error());

        assert_eq!(engine.inspect_structure(), Err(EngineError::NoPackLoaded));
        assert!(engine.status().is_error());
        assert_eq!(
            engine
                .load_pack(PackSource::Discover, CancellationToken::new())
                .await,
            Err(EngineError::EngineNotReady)
        );
        assert!(engine.status().is_error());

        engine.shutdown();
        assert_eq!(engine.status(), EngineStatus::Disconnected);
        assert_eq!(engine.pack_state(), PackLoadState::default());
    }

    #[tokio::test]
    async fn missing_pack_reports_not_found() {
        let storage = MemoryStorage::new().with_directory("/content/GameContent");
        let (mut engine, _) = controller(storage);
        engine.initialize_engine().await.unwrap();

        let result = engine
            .load_pack(PackSource::Discover, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(EngineError::PackDiscovery { .. })));
        assert_eq!(engine.pack_state().status, PackStatus::NotFound);
        assert!(engine.status().is_error());
    }

    #[tokio::test]
    async fn reinitialize_clears_error() {
        let (mut engine, _) = controller(MemoryStorage::new());
        engine.initialize_engine().await.unwrap();
        let _ = engine
            .load_pack(PackSource::Discover, CancellationToken::new())
            .await;
        assert!(engine.status().is_error());

        engine.initialize_engine().await.unwrap();
        assert_eq!(engine.status(), EngineStatus::Connected);
        assert_eq!(engine.pack_state().status, PackStatus::Idle);
    }

    #[tokio::test]
    async fn cancelled_load_releases_engine() {
        let (mut engine, _) = controller(with_pack());
        engine.initialize_engine().await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine.load_pack(PackSource::Discover, cancel).await;
        assert_eq!(result, Err(EngineError::Cancelled));
        assert_eq!(engine.status(), EngineStatus::Connected);
        assert_eq!(engine.pack_state().status, PackStatus::Idle);

        // The engine accepts the next load
        assert!(engine
            .load_pack(PackSource::Discover, CancellationToken::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn dropped_load_future_releases_engine() {
        let console = Arc::new(DebugConsole::new(100));
        let mut engine = EngineController::new(
            EngineConfig {
                checkpoint_delay_ms: 60_000,
                ..settings()
            },
            Arc::new(with_pack()),
            Arc::new(SimulatedProjectEnumerator),
            console,
        );
        engine.initialize_engine().await.unwrap();

        let load = engine.load_pack(PackSource::Discover, CancellationToken::new());
        let outcome = tokio::time::timeout(Duration::from_millis(20), load).await;
        assert!(outcome.is_err());

        assert_eq!(engine.status(), EngineStatus::Connected);
        assert_eq!(engine.pack_state().status, PackStatus::Idle);
    }

    #[tokio::test]
    async fn inspect_summarises_simulated_project() {
        let (mut engine, _) = controller(with_pack());
        engine.initialize_engine().await.unwrap();
        engine
            .load_pack(PackSource::Discover, CancellationToken::new())
            .await
            .unwrap();

        let summary = engine.inspect_structure().unwrap();
        assert_eq!(summary.scenes.len(), 2);
        assert_eq!(summary.scripts.len(), 2);
        assert_eq!(summary.assets.len(), 2);
        assert_eq!(summary.unclassified, 1);
    }

    #[tokio::test]
    async fn reload_replaces_contents() {
        let (mut engine, _) = controller(with_pack());
        engine.initialize_engine().await.unwrap();
        engine
            .load_pack(PackSource::Discover, CancellationToken::new())
            .await
            .unwrap();
        let state = engine
            .load_pack(PackSource::Discover, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state.contents.len(), 7);
        assert_eq!(engine.metrics().packs_loaded, 2);
        assert_eq!(engine.metrics().last_file_count, 7);
    }

    #[tokio::test]
    async fn bridge_test_records_latency() {
        let (mut engine, _) = controller(with_pack());
        assert_eq!(engine.test_bridge().await, Err(EngineError::EngineNotReady));

        engine.initialize_engine().await.unwrap();
        let latency = engine.test_bridge().await.unwrap();
        assert_eq!(engine.metrics().last_bridge_latency, Some(latency));
    }

    #[tokio::test]
    async fn simulated_backend_finds_its_own_pack() {
        let console = Arc::new(DebugConsole::new(100));
        let mut engine = EngineController::from_config(
            EngineConfig {
                backend: StorageBackend::Simulated,
                ..settings()
            },
            console,
        );
        engine.initialize_engine().await.unwrap();

        let state = engine
            .load_pack(PackSource::Discover, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            state.detected_path,
            Some(PathBuf::from("/content/GameContent/game.pck"))
        );
    }
}
