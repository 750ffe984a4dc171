//! Engine actor
//!
//! The [`EngineController`] lives inside one task. Callers talk to it through
//! [`EngineHandle`] with request/response actions, and observe it through
//! watch channels that stay readable while a load is in flight.

use crate::engine::error::EngineError;
use crate::engine::lifecycle::EngineController;
use crate::engine::status::{EngineMetrics, EngineStatus, PackLoadState, PackSource};
use crate::engine::structure::ProjectStructureSummary;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

macro_rules! respond {
    ($response_tx:expr, $value:expr) => {
        if $response_tx.send($value).is_err() {
            error!("Failed to send engine response");
        }
    };
}

#[derive(Debug)]
pub enum EngineAction {
    Initialize {
        response_tx: oneshot::Sender<Result<(), EngineError>>,
    },
    LoadPack {
        source: PackSource,
        response_tx: oneshot::Sender<Result<PackLoadState, EngineError>>,
    },
    /// Answers whether a load was in flight
    CancelLoad {
        response_tx: oneshot::Sender<bool>,
    },
    InspectStructure {
        response_tx: oneshot::Sender<Result<ProjectStructureSummary, EngineError>>,
    },
    TestBridge {
        response_tx: oneshot::Sender<Result<Duration, EngineError>>,
    },
    Shutdown {
        response_tx: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineAction>,
    status: watch::Receiver<EngineStatus>,
    pack_state: watch::Receiver<PackLoadState>,
    metrics: watch::Receiver<EngineMetrics>,
}

impl EngineHandle {
    /// Moves `controller` into its own task. The task shuts the engine down
    /// and exits once `shutdown` is cancelled or every handle is dropped.
    pub fn spawn(
        mut controller: EngineController,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<EngineAction>(32);
        let handle = Self {
            tx,
            status: controller.subscribe_status(),
            pack_state: controller.subscribe_pack_state(),
            metrics: controller.subscribe_metrics(),
        };

        let worker = tokio::spawn(async move {
            info!("Engine worker started");
            loop {
                let action = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    action = rx.recv() => match action {
                        Some(action) => action,
                        None => break,
                    },
                };

                match action {
                    EngineAction::Initialize { response_tx } => {
                        respond!(response_tx, controller.initialize_engine().await);
                    }
                    EngineAction::LoadPack {
                        source,
                        response_tx,
                    } => {
                        let pending_shutdown =
                            run_load(&mut controller, &mut rx, source, response_tx, &shutdown)
                                .await;
                        if let Some(response_tx) = pending_shutdown {
                            controller.shutdown();
                            respond!(response_tx, ());
                        }
                    }
                    EngineAction::CancelLoad { response_tx } => {
                        respond!(response_tx, false);
                    }
                    EngineAction::InspectStructure { response_tx } => {
                        respond!(response_tx, controller.inspect_structure());
                    }
                    EngineAction::TestBridge { response_tx } => {
                        respond!(response_tx, controller.test_bridge().await);
                    }
                    EngineAction::Shutdown { response_tx } => {
                        controller.shutdown();
                        respond!(response_tx, ());
                    }
                }
            }

            controller.shutdown();
            info!("Engine worker stopped");
        });

        (handle, worker)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineAction,
    ) -> Result<T, EngineError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(build(response_tx))
            .await
            .map_err(|e| EngineError::Channel(e.to_string()))?;
        response_rx
            .await
            .map_err(|e| EngineError::Channel(e.to_string()))
    }

    pub async fn initialize(&self) -> Result<(), EngineError> {
        self.request(|response_tx| EngineAction::Initialize { response_tx })
            .await?
    }

    pub async fn load_pack(&self, source: PackSource) -> Result<PackLoadState, EngineError> {
        self.request(|response_tx| EngineAction::LoadPack {
            source,
            response_tx,
        })
        .await?
    }

    pub async fn cancel_load(&self) -> Result<bool, EngineError> {
        self.request(|response_tx| EngineAction::CancelLoad { response_tx })
            .await
    }

    pub async fn inspect_structure(&self) -> Result<ProjectStructureSummary, EngineError> {
        self.request(|response_tx| EngineAction::InspectStructure { response_tx })
            .await?
    }

    pub async fn test_bridge(&self) -> Result<Duration, EngineError> {
        self.request(|response_tx| EngineAction::TestBridge { response_tx })
            .await?
    }

    pub async fn shutdown_engine(&self) -> Result<(), EngineError> {
        self.request(|response_tx| EngineAction::Shutdown { response_tx })
            .await
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
        self.status.clone()
    }

    pub fn subscribe_pack_state(&self) -> watch::Receiver<PackLoadState> {
        self.pack_state.clone()
    }
}

// Drives one load while answering everything else that arrives meanwhile.
// Returns the response channel of a shutdown requested during the load.
async fn run_load(
    controller: &mut EngineController,
    rx: &mut mpsc::Receiver<EngineAction>,
    source: PackSource,
    response_tx: oneshot::Sender<Result<PackLoadState, EngineError>>,
    shutdown: &CancellationToken,
) -> Option<oneshot::Sender<()>> {
    let cancel = shutdown.child_token();
    let mut pending_shutdown = None;

    let load = controller.load_pack(source, cancel.clone());
    tokio::pin!(load);

    let result = loop {
        tokio::select! {
            result = &mut load => break result,
            Some(action) = rx.recv() => match action {
                EngineAction::CancelLoad { response_tx } => {
                    info!("Cancelling pack load on request");
                    cancel.cancel();
                    respond!(response_tx, true);
                }
                EngineAction::Shutdown { response_tx } => {
                    info!("Shutdown requested during pack load");
                    cancel.cancel();
                    pending_shutdown = Some(response_tx);
                }
                EngineAction::Initialize { response_tx } => {
                    debug!("Engine already initialized, load in flight");
                    respond!(response_tx, Ok(()));
                }
                EngineAction::LoadPack { response_tx, .. } => {
                    warn!("Rejecting pack load, another load is in flight");
                    respond!(response_tx, Err(EngineError::Busy));
                }
                EngineAction::InspectStructure { response_tx } => {
                    respond!(response_tx, Err(EngineError::Busy));
                }
                EngineAction::TestBridge { response_tx } => {
                    respond!(response_tx, Err(EngineError::Busy));
                }
            },
        }
    };

    respond!(response_tx, result);
    pending_shutdown
}
