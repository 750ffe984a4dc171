//! Engine and pack lifecycle
//!
//! ```text
//! Disconnected ──► Initializing ──► Connected ◄─────────┐
//!                                      │ load_pack      │ cancelled
//!                                      ▼                │
//!                                 LoadingPack ──────────┘
//!                                  │        │
//!                                  ▼        ▼
//!                            PackLoaded   Error (sticky until initialize)
//!
//! shutdown: any state ──► Disconnected
//! ```
//!
//! [`lifecycle::EngineController`] owns the state machine and [`pipeline`]
//! runs the staged load. [`engine_handle::EngineHandle`] serialises access
//! from the rest of the process. Storage and enumeration sit behind traits
//! with a real and a simulated implementation each.

pub mod engine_handle;
pub mod enumerator;
pub mod error;
pub mod lifecycle;
pub mod pck;
pub mod pipeline;
pub mod status;
pub mod storage;
pub mod structure;

pub use engine_handle::{EngineAction, EngineHandle};
pub use enumerator::{PackHandle, PckIndexEnumerator, ProjectFileEnumerator, SimulatedProjectEnumerator};
pub use error::EngineError;
pub use lifecycle::EngineController;
pub use pck::PckError;
pub use status::{EngineMetrics, EngineStatus, PackLoadState, PackSource, PackStatus};
pub use storage::{FsStorage, MemoryStorage, StorageProbe};
pub use structure::{FileCategory, ProjectStructureSummary};
