//! Staged pack loading
//!
//! ```text
//! Probing ──locate──► Staging ──stage──► Validating ──validate──► Enumerating ──enumerate──► Loaded
//!  0.0                 0.2               0.4                      0.6 / 0.7                   0.8 / 1.0
//! ```
//!
//! Every stage publishes its progress checkpoint and then pauses. The pause
//! races the cancellation token, so a load can be abandoned at any
//! checkpoint. Failures are written into the published [`PackLoadState`]
//! before the error is returned.

use crate::config::EngineConfig;
use crate::engine::enumerator::{PackHandle, ProjectFileEnumerator};
use crate::engine::error::EngineError;
use crate::engine::status::{PackLoadState, PackSource, PackStatus};
use crate::engine::storage::StorageProbe;
use statum::{machine, state};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A pack file that discovery located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackCandidate {
    /// Candidate folder the file was found in, `None` for explicit paths
    pub folder: Option<PathBuf>,
    pub path: PathBuf,
}

struct Miss {
    path: Option<PathBuf>,
    cause: String,
}

#[state]
#[derive(Debug, Clone)]
pub enum PipelineStage {
    Probing,
    Staging(PackCandidate),
    Validating(PackCandidate),
    Enumerating(PackHandle),
}

#[machine]
pub struct PackPipeline<S: PipelineStage> {
    storage: Arc<dyn StorageProbe>,
    enumerator: Arc<dyn ProjectFileEnumerator>,
    settings: EngineConfig,
    pack_state: Arc<watch::Sender<PackLoadState>>,
    cancel: CancellationToken,
}

impl<S: PipelineStage> PackPipeline<S> {
    async fn checkpoint(&self, status: PackStatus, progress: f32) -> Result<(), EngineError> {
        self.pack_state.send_modify(|state| {
            state.status = status;
            state.progress = progress;
        });
        debug!("Pack load checkpoint {:?} at {:.0}%", status, progress * 100.0);

        let delay = Duration::from_millis(self.settings.checkpoint_delay_ms);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn fail(&self, status: PackStatus, path: Option<PathBuf>, cause: &str) {
        warn!("Pack load failed: {}", cause);
        self.pack_state.send_modify(|state| {
            state.status = status;
            if path.is_some() {
                state.detected_path = path;
            }
            state.contents.clear();
            state.cause = Some(cause.to_string());
        });
    }

    fn load_failure(&self, path: Option<PathBuf>, cause: String) -> EngineError {
        self.fail(PackStatus::Error, path, &cause);
        EngineError::PackLoad { cause }
    }
}

impl PackPipeline<Probing> {
    pub fn start(
        storage: Arc<dyn StorageProbe>,
        enumerator: Arc<dyn ProjectFileEnumerator>,
        settings: EngineConfig,
        pack_state: Arc<watch::Sender<PackLoadState>>,
        cancel: CancellationToken,
    ) -> Self {
        pack_state.send_replace(PackLoadState {
            status: PackStatus::Loading,
            ..Default::default()
        });
        Self::new(storage, enumerator, settings, pack_state, cancel)
    }

    pub async fn locate(self, source: &PackSource) -> Result<PackPipeline<Staging>, EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let located = match source {
            PackSource::Discover => self.discover(),
            PackSource::Path(path) => {
                if self.storage.file_exists(path) {
                    Ok(PackCandidate {
                        folder: None,
                        path: path.clone(),
                    })
                } else {
                    Err(Miss {
                        path: Some(path.clone()),
                        cause: format!("Pack file {} not found", path.display()),
                    })
                }
            }
        };

        let candidate = match located {
            Ok(candidate) => candidate,
            Err(miss) => {
                self.fail(PackStatus::NotFound, miss.path, &miss.cause);
                return Err(EngineError::PackDiscovery { cause: miss.cause });
            }
        };

        info!("Pack located at {}", candidate.path.display());
        self.pack_state
            .send_modify(|state| state.detected_path = Some(candidate.path.clone()));
        self.checkpoint(PackStatus::Found, 0.2).await?;
        Ok(self.transition_with(candidate))
    }

    // The first existing folder decides the outcome, even when its pack
    // file is missing
    fn discover(&self) -> Result<PackCandidate, Miss> {
        let root = &self.settings.content_root;
        for folder in &self.settings.candidate_folders {
            let dir = root.join(folder);
            if !self.storage.file_exists(&dir) {
                debug!("Candidate folder {} does not exist", dir.display());
                continue;
            }

            match self.storage.list_directory(&dir) {
                Ok(entries) => debug!("{} contains {:?}", dir.display(), entries),
                Err(e) => warn!("Could not list {}: {}", dir.display(), e),
            }

            let path = dir.join(&self.settings.pack_file_name);
            if self.storage.file_exists(&path) {
                return Ok(PackCandidate {
                    folder: Some(dir),
                    path,
                });
            }
            return Err(Miss {
                cause: format!(
                    "Found folder {} but {} is missing",
                    dir.display(),
                    self.settings.pack_file_name
                ),
                path: Some(dir),
            });
        }

        Err(Miss {
            path: None,
            cause: format!(
                "No pack folder under {} (checked {})",
                root.display(),
                self.settings.candidate_folders.join(", ")
            ),
        })
    }
}

impl PackPipeline<Staging> {
    pub async fn stage(self) -> Result<PackPipeline<Validating>, EngineError> {
        let candidate = self
            .get_state_data()
            .cloned()
            .ok_or_else(|| self.load_failure(None, "Staging without a candidate".to_string()))?;
        self.checkpoint(PackStatus::Found, 0.4).await?;
        Ok(self.transition_with(candidate))
    }
}

impl PackPipeline<Validating> {
    pub async fn validate(self) -> Result<PackPipeline<Enumerating>, EngineError> {
        let candidate = self
            .get_state_data()
            .cloned()
            .ok_or_else(|| self.load_failure(None, "Validating without a candidate".to_string()))?;
        let path = candidate.path;

        if !self.storage.file_exists(&path) {
            let cause = format!("Pack file {} disappeared", path.display());
            return Err(self.load_failure(Some(path), cause));
        }
        let size = match self.storage.file_size(&path) {
            Ok(0) => {
                let cause = format!("Pack file {} is empty", path.display());
                return Err(self.load_failure(Some(path), cause));
            }
            Ok(size) => size,
            Err(e) => {
                let cause = format!("Cannot read {}: {}", path.display(), e);
                return Err(self.load_failure(Some(path), cause));
            }
        };
        debug!("Pack {} validated, {} bytes", path.display(), size);
        self.checkpoint(PackStatus::Found, 0.6).await?;

        // Mounted
        self.checkpoint(PackStatus::Found, 0.7).await?;
        Ok(self.transition_with(PackHandle { path, size }))
    }
}

impl PackPipeline<Enumerating> {
    /// Lists the pack's files and publishes the final `Loaded` state.
    pub async fn enumerate(self) -> Result<PackLoadState, EngineError> {
        let handle = self
            .get_state_data()
            .cloned()
            .ok_or_else(|| self.load_failure(None, "Enumerating without a pack".to_string()))?;

        let enumerator = self.enumerator.clone();
        let target = handle.clone();
        let listed = tokio::task::spawn_blocking(move || enumerator.enumerate_all_files(&target))
            .await
            .map_err(|e| e.to_string())
            .and_then(|result| result.map_err(|e| e.to_string()));

        let contents = match listed {
            Ok(contents) => contents,
            Err(cause) => {
                let cause = format!("Cannot enumerate {}: {}", handle.path.display(), cause);
                return Err(self.load_failure(Some(handle.path), cause));
            }
        };
        info!("Enumerated {} project files", contents.len());
        self.checkpoint(PackStatus::Found, 0.8).await?;

        self.pack_state.send_modify(|state| {
            state.status = PackStatus::Loaded;
            state.progress = 1.0;
            state.contents = contents;
            state.cause = None;
        });
        Ok(self.pack_state.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::enumerator::SimulatedProjectEnumerator;
    use crate::engine::storage::{MemoryStorage, MockStorageProbe};
    use std::path::Path;

    fn settings() -> EngineConfig {
        EngineConfig {
            content_root: PathBuf::from("/content"),
            checkpoint_delay_ms: 0,
            ..Default::default()
        }
    }

    fn pipeline(storage: Arc<dyn StorageProbe>) -> (PackPipeline<Probing>, watch::Receiver<PackLoadState>) {
        let (tx, rx) = watch::channel(PackLoadState::default());
        let pipeline = PackPipeline::<Probing>::start(
            storage,
            Arc::new(SimulatedProjectEnumerator),
            settings(),
            Arc::new(tx),
            CancellationToken::new(),
        );
        (pipeline, rx)
    }

    #[tokio::test]
    async fn first_existing_folder_wins_even_without_pack() {
        let mut storage = MockStorageProbe::new();
        storage
            .expect_file_exists()
            .withf(|path| path == Path::new("/content/GameContent"))
            .times(1)
            .return_const(true);
        storage
            .expect_list_directory()
            .times(1)
            .returning(|_| Ok(vec!["readme.txt".to_string()]));
        storage
            .expect_file_exists()
            .withf(|path| path == Path::new("/content/GameContent/game.pck"))
            .times(1)
            .return_const(false);
        storage
            .expect_file_exists()
            .withf(|path| path.starts_with("/content/PCK"))
            .times(0)
            .return_const(true);

        let (pipeline, state) = pipeline(Arc::new(storage));
        let result = pipeline.locate(&PackSource::Discover).await;

        assert!(matches!(result, Err(EngineError::PackDiscovery { .. })));
        let state = state.borrow();
        assert_eq!(state.status, PackStatus::NotFound);
        assert_eq!(
            state.detected_path.as_deref(),
            Some(Path::new("/content/GameContent"))
        );
        assert!(state.contents.is_empty());
    }

    #[tokio::test]
    async fn later_folder_is_used_when_earlier_ones_are_absent() {
        let storage = MemoryStorage::new().with_file("/content/Pack/game.pck", 2048);
        let (pipeline, state) = pipeline(Arc::new(storage));

        let staging = pipeline.locate(&PackSource::Discover).await.unwrap();
        assert_eq!(
            staging.get_state_data().map(|c| c.path.clone()),
            Some(PathBuf::from("/content/Pack/game.pck"))
        );
        assert_eq!(state.borrow().progress, 0.2);
    }

    #[tokio::test]
    async fn full_run_reaches_loaded_with_contents() {
        let storage = MemoryStorage::new().with_file("/content/GameData/game.pck", 2048);
        let (pipeline, mut state) = pipeline(Arc::new(storage));

        let loaded = pipeline
            .locate(&PackSource::Discover)
            .await
            .unwrap()
            .stage()
            .await
            .unwrap()
            .validate()
            .await
            .unwrap()
            .enumerate()
            .await
            .unwrap();

        assert_eq!(loaded.status, PackStatus::Loaded);
        assert_eq!(loaded.progress, 1.0);
        assert_eq!(loaded.contents.len(), 7);
        assert_eq!(*state.borrow_and_update(), loaded);
    }

    #[tokio::test]
    async fn empty_pack_fails_validation() {
        let storage = MemoryStorage::new().with_file("/content/GameContent/game.pck", 0);
        let (pipeline, state) = pipeline(Arc::new(storage));

        let result = pipeline
            .locate(&PackSource::Discover)
            .await
            .unwrap()
            .stage()
            .await
            .unwrap()
            .validate()
            .await;

        assert!(matches!(result, Err(EngineError::PackLoad { .. })));
        let state = state.borrow();
        assert_eq!(state.status, PackStatus::Error);
        assert!(state.cause.as_deref().unwrap_or_default().contains("empty"));
        assert!(state.contents.is_empty());
    }

    #[tokio::test]
    async fn explicit_path_skips_discovery() {
        let storage = MemoryStorage::new().with_file("/downloads/level.pck", 10);
        let (pipeline, _) = pipeline(Arc::new(storage));

        let staging = pipeline
            .locate(&PackSource::Path(PathBuf::from("/downloads/level.pck")))
            .await
            .unwrap();
        assert_eq!(staging.get_state_data().and_then(|c| c.folder.clone()), None);
    }

    #[tokio::test]
    async fn cancelled_token_stops_at_checkpoint() {
        let storage = MemoryStorage::new().with_file("/content/GameContent/game.pck", 10);
        let (tx, _rx) = watch::channel(PackLoadState::default());
        let cancel = CancellationToken::new();
        let pipeline = PackPipeline::<Probing>::start(
            Arc::new(storage),
            Arc::new(SimulatedProjectEnumerator),
            EngineConfig {
                content_root: PathBuf::from("/content"),
                checkpoint_delay_ms: 60_000,
                ..Default::default()
            },
            Arc::new(tx),
            cancel.clone(),
        );

        let locate = pipeline.locate(&PackSource::Discover);
        cancel.cancel();
        assert!(matches!(locate.await, Err(EngineError::Cancelled)));
    }
}
