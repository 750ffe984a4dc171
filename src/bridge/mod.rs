//! Wiring between controller input and the engine
//!
//! ```text
//! RawInput ──► Coordinator ──► InputRouter ──► NavigationAction ──► hooks (broadcast)
//!                  │                                   │
//!                  │                     Activate(ring)┘
//!                  ▼
//!             EngineHandle (engine task)
//! ```

pub mod coordinator;

pub use coordinator::{ring_action, Coordinator, RingAction};
