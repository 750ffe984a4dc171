use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Engine lifecycle tag. Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineStatus {
    #[default]
    Disconnected,
    Initializing,
    Connected,
    LoadingPack,
    PackLoaded,
    /// Sticky until the engine is reinitialised or shut down
    Error(String),
}

impl EngineStatus {
    /// Engine is up, whether or not a pack is loaded.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            EngineStatus::Connected | EngineStatus::LoadingPack | EngineStatus::PackLoaded
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, EngineStatus::Error(_))
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStatus::Disconnected => write!(f, "Disconnected"),
            EngineStatus::Initializing => write!(f, "Initializing"),
            EngineStatus::Connected => write!(f, "Connected"),
            EngineStatus::LoadingPack => write!(f, "Loading pack"),
            EngineStatus::PackLoaded => write!(f, "Pack loaded"),
            EngineStatus::Error(cause) => write!(f, "Error: {}", cause),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PackStatus {
    /// No attempt since startup or the last shutdown
    #[default]
    Idle,
    Loading,
    Found,
    NotFound,
    Loaded,
    Error,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PackLoadState {
    pub status: PackStatus,
    pub detected_path: Option<PathBuf>,
    /// Only non-empty while `status` is `Loaded`
    pub contents: Vec<String>,
    pub progress: f32,
    pub cause: Option<String>,
}

impl PackLoadState {
    pub fn is_loaded(&self) -> bool {
        self.status == PackStatus::Loaded
    }
}

/// Where a pack load looks for its file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PackSource {
    /// Probe the configured candidate folders below the content root
    #[default]
    Discover,
    /// Load this file directly
    Path(PathBuf),
}

/// Figures derived from real engine operations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub packs_loaded: u64,
    pub last_load_duration: Option<Duration>,
    pub last_file_count: usize,
    pub last_bridge_latency: Option<Duration>,
    pub connected_since: Option<DateTime<Local>>,
}

impl EngineMetrics {
    pub fn uptime(&self) -> Option<chrono::Duration> {
        self.connected_since.map(|since| Local::now() - since)
    }
}
