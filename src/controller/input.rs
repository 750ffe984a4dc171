use crate::controller::device::{BatteryState, ControllerDevice, DeviceId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

// Digital buttons the router understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonKind {
    A,
    B,
    X,
    Y,
    Menu,
}

// Left/right side for sticks and triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Raw hardware input, one variant per kind of callback a gamepad backend
/// produces. The router maps each variant onto its normalisation rules.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    Connected(ControllerDevice),
    Disconnected(DeviceId),
    Button {
        device: DeviceId,
        button: ButtonKind,
        value: f32,
        pressed: bool,
    },
    Trigger {
        device: DeviceId,
        side: Side,
        value: f32,
    },
    Stick {
        device: DeviceId,
        side: Side,
        x: f32,
        y: f32,
    },
    DPad {
        device: DeviceId,
        x: f32,
        y: f32,
    },
    Battery {
        device: DeviceId,
        level: f32,
        state: BatteryState,
    },
}

impl RawInput {
    pub fn device(&self) -> DeviceId {
        match self {
            RawInput::Connected(device) => device.id,
            RawInput::Disconnected(device)
            | RawInput::Button { device, .. }
            | RawInput::Trigger { device, .. }
            | RawInput::Stick { device, .. }
            | RawInput::DPad { device, .. }
            | RawInput::Battery { device, .. } => *device,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputType {
    ButtonA,
    ButtonB,
    ButtonX,
    ButtonY,
    LeftStick,
    RightStick,
    LeftTrigger,
    RightTrigger,
    DPad,
    Menu,
}

impl InputType {
    pub fn label(&self) -> &'static str {
        match self {
            InputType::ButtonA => "A Button",
            InputType::ButtonB => "B Button",
            InputType::ButtonX => "X Button",
            InputType::ButtonY => "Y Button",
            InputType::LeftStick => "Left Stick",
            InputType::RightStick => "Right Stick",
            InputType::LeftTrigger => "Left Trigger",
            InputType::RightTrigger => "Right Trigger",
            InputType::DPad => "D-Pad",
            InputType::Menu => "Menu Button",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<ButtonKind> for InputType {
    fn from(button: ButtonKind) -> Self {
        match button {
            ButtonKind::A => InputType::ButtonA,
            ButtonKind::B => InputType::ButtonB,
            ButtonKind::X => InputType::ButtonX,
            ButtonKind::Y => InputType::ButtonY,
            ButtonKind::Menu => InputType::Menu,
        }
    }
}

/// A normalised input that made it past the dead zone / press-edge filters.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub timestamp: DateTime<Local>,
    pub input_type: InputType,
    pub magnitude: f32,
    pub source: DeviceId,
}

pub fn stick_magnitude(x: f32, y: f32) -> f32 {
    (x * x + y * y).sqrt()
}
