//! Haptic feedback requests
//!
//! The router never drives a motor itself. It asks a [`HapticsSink`] for an
//! intensity and moves on; whether anything vibrates is the sink's business.

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Fire-and-forget haptics collaborator.
#[cfg_attr(test, mockall::automock)]
pub trait HapticsSink: Send + Sync {
    /// `intensity` is clamped to 0.0 - 1.0 by implementations.
    fn request_haptic(&self, intensity: f32);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HapticRequest {
    pub intensity: f32,
    pub duration_ms: u32,
}

/// Forwards requests to the gamepad collector, which plays them as rumble.
#[derive(Debug, Clone)]
pub struct RumbleHaptics {
    sender: mpsc::Sender<HapticRequest>,
    duration_ms: u32,
}

impl RumbleHaptics {
    pub fn new(sender: mpsc::Sender<HapticRequest>, duration_ms: u32) -> Self {
        Self {
            sender,
            duration_ms,
        }
    }
}

impl HapticsSink for RumbleHaptics {
    fn request_haptic(&self, intensity: f32) {
        let request = HapticRequest {
            intensity: intensity.clamp(0.0, 1.0),
            duration_ms: self.duration_ms,
        };
        match self.sender.try_send(request) {
            Ok(_) => debug!("Haptic feedback requested with intensity {:.2}", request.intensity),
            // Dropping feedback is preferable to stalling input handling
            Err(e) => warn!("Haptic request dropped: {}", e),
        }
    }
}
