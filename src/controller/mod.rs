//! Controller subsystem for gamepad input handling
//!
//! ```text
//! gilrs ──► event_collector ──► RawInput ──► router ──► InputEvent history
//!   ▲        (own thread)                      │
//!   │                                          ├──► NavigationAction
//!   └──────── HapticRequest ◄── haptics ◄──────┘
//! ```
//!
//! The collector is the only code that talks to hardware. Everything from
//! [`router`] inward is plain data and runs in the coordinator task, which
//! keeps it testable without a gamepad attached.

pub mod device;
pub mod event_collector;
pub mod haptics;
pub mod input;
pub mod router;

pub use device::{
    BatteryState, Capabilities, ControllerDevice, ControllerKind, DeviceId, DeviceLifecycle,
    GamepadProfile, InputError,
};
pub use event_collector::{CollectorError, CollectorHandle};
pub use haptics::{HapticRequest, HapticsSink, RumbleHaptics};
pub use input::{ButtonKind, InputEvent, InputType, RawInput, Side};
pub use router::{InputRouter, NavigationAction, NavigationSelection};
