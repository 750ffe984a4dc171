//! Controller device model and the registry that owns it
//!
//! Devices are created on a connect notification and dropped on disconnect.
//! Nothing outside the registry holds a device; the "primary" device is a
//! lookup over registration order, recomputed on every call.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Gamepad profiles a device may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub extended_gamepad: bool,
    pub micro_gamepad: bool,
}

impl Capabilities {
    pub const EXTENDED: Capabilities = Capabilities {
        extended_gamepad: true,
        micro_gamepad: false,
    };
    pub const MICRO: Capabilities = Capabilities {
        extended_gamepad: false,
        micro_gamepad: true,
    };
    pub const NONE: Capabilities = Capabilities {
        extended_gamepad: false,
        micro_gamepad: false,
    };

    /// Extended wins over micro; a device with neither has no profile.
    pub fn preferred_profile(&self) -> Option<GamepadProfile> {
        if self.extended_gamepad {
            Some(GamepadProfile::Extended)
        } else if self.micro_gamepad {
            Some(GamepadProfile::Micro)
        } else {
            None
        }
    }
}

/// The input handler set bound to an active device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamepadProfile {
    /// Full pad: face buttons, sticks, triggers, D-pad, menu
    Extended,
    /// Remote-style pad: A, X and the D-pad only
    Micro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatteryState {
    #[default]
    Unknown,
    Discharging,
    Charging,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerKind {
    Xbox,
    PlayStation,
    MFi,
    Unknown,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerKind::Xbox => write!(f, "Xbox Controller"),
            ControllerKind::PlayStation => write!(f, "PlayStation Controller"),
            ControllerKind::MFi => write!(f, "MFi Controller"),
            ControllerKind::Unknown => write!(f, "Unknown Controller"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerDevice {
    pub id: DeviceId,
    pub vendor_name: String,
    pub capabilities: Capabilities,
    /// 0.0 - 1.0, 1.0 when the pad does not report a level
    pub battery_level: f32,
    pub battery_state: BatteryState,
}

impl ControllerDevice {
    pub fn new(id: DeviceId, vendor_name: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            id,
            vendor_name: vendor_name.into(),
            capabilities,
            battery_level: 1.0,
            battery_state: BatteryState::Unknown,
        }
    }

    pub fn kind(&self) -> ControllerKind {
        let vendor = self.vendor_name.to_lowercase();
        if vendor.contains("xbox") {
            ControllerKind::Xbox
        } else if ["playstation", "dualshock", "dualsense"]
            .iter()
            .any(|name| vendor.contains(name))
        {
            ControllerKind::PlayStation
        } else if self.capabilities.preferred_profile().is_some() {
            ControllerKind::MFi
        } else {
            ControllerKind::Unknown
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InputError {
    #[error("Controller {vendor} ({device}) exposes no supported gamepad profile")]
    DeviceCapabilityUnsupported { device: DeviceId, vendor: String },

    #[error("Input from unregistered controller {0}")]
    UnknownDevice(DeviceId),

    #[error("Controller {0} is already registered")]
    DuplicateDevice(DeviceId),
}

/// Per-device lifecycle. `Unregistered` is simply absence from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLifecycle {
    /// Capabilities probed, no handlers bound
    Registered,
    /// Handlers for the given profile are bound
    Active(GamepadProfile),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredDevice {
    pub device: ControllerDevice,
    pub lifecycle: DeviceLifecycle,
}

impl RegisteredDevice {
    pub fn profile(&self) -> Option<GamepadProfile> {
        match self.lifecycle {
            DeviceLifecycle::Active(profile) => Some(profile),
            DeviceLifecycle::Registered => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    // Registration order is significant for primary selection
    devices: Vec<RegisteredDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `device` and binds the best available profile.
    ///
    /// A device without a supported profile is still registered (it shows up
    /// in the device list) but stays inactive; the returned error carries the
    /// reason for the caller's warning.
    pub fn register(&mut self, device: ControllerDevice) -> Result<GamepadProfile, InputError> {
        if self.get(device.id).is_some() {
            return Err(InputError::DuplicateDevice(device.id));
        }

        debug!(
            "Probing {} ({}): extended={}, micro={}",
            device.vendor_name,
            device.id,
            device.capabilities.extended_gamepad,
            device.capabilities.micro_gamepad
        );

        let profile = device.capabilities.preferred_profile();
        let lifecycle = match profile {
            Some(profile) => DeviceLifecycle::Active(profile),
            None => DeviceLifecycle::Registered,
        };
        let id = device.id;
        let vendor = device.vendor_name.clone();
        self.devices.push(RegisteredDevice { device, lifecycle });

        match profile {
            Some(profile) => {
                info!("Controller {} ({}) active with {:?} profile", vendor, id, profile);
                Ok(profile)
            }
            None => {
                warn!("Controller {} ({}) registered without handlers", vendor, id);
                Err(InputError::DeviceCapabilityUnsupported { device: id, vendor })
            }
        }
    }

    pub fn remove(&mut self, id: DeviceId) -> Option<RegisteredDevice> {
        let index = self.devices.iter().position(|entry| entry.device.id == id)?;
        Some(self.devices.remove(index))
    }

    pub fn get(&self, id: DeviceId) -> Option<&RegisteredDevice> {
        self.devices.iter().find(|entry| entry.device.id == id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut RegisteredDevice> {
        self.devices.iter_mut().find(|entry| entry.device.id == id)
    }

    /// First registered device still present, if any.
    pub fn primary(&self) -> Option<DeviceId> {
        self.devices.first().map(|entry| entry.device.id)
    }

    pub fn has_active_extended(&self) -> bool {
        self.devices
            .iter()
            .any(|entry| entry.profile() == Some(GamepadProfile::Extended))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredDevice> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(id: usize, vendor: &str, capabilities: Capabilities) -> ControllerDevice {
        ControllerDevice::new(DeviceId(id), vendor, capabilities)
    }

    #[test]
    fn extended_profile_preferred_over_micro() {
        let both = Capabilities {
            extended_gamepad: true,
            micro_gamepad: true,
        };
        assert_eq!(both.preferred_profile(), Some(GamepadProfile::Extended));
        assert_eq!(
            Capabilities::MICRO.preferred_profile(),
            Some(GamepadProfile::Micro)
        );
        assert_eq!(Capabilities::NONE.preferred_profile(), None);
    }

    #[test]
    fn unsupported_device_is_registered_but_inactive() {
        let mut registry = DeviceRegistry::new();
        let result = registry.register(pad(3, "Steering Wheel", Capabilities::NONE));

        assert!(matches!(
            result,
            Err(InputError::DeviceCapabilityUnsupported { device: DeviceId(3), .. })
        ));
        let entry = registry.get(DeviceId(3)).unwrap();
        assert_eq!(entry.lifecycle, DeviceLifecycle::Registered);
        assert!(!registry.has_active_extended());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = DeviceRegistry::new();
        registry
            .register(pad(1, "Xbox Wireless", Capabilities::EXTENDED))
            .unwrap();
        assert_eq!(
            registry.register(pad(1, "Xbox Wireless", Capabilities::EXTENDED)),
            Err(InputError::DuplicateDevice(DeviceId(1)))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn primary_follows_registration_order() {
        let mut registry = DeviceRegistry::new();
        registry.register(pad(7, "Remote", Capabilities::MICRO)).unwrap();
        registry
            .register(pad(2, "DualSense", Capabilities::EXTENDED))
            .unwrap();
        assert_eq!(registry.primary(), Some(DeviceId(7)));

        registry.remove(DeviceId(7));
        assert_eq!(registry.primary(), Some(DeviceId(2)));

        registry.remove(DeviceId(2));
        assert_eq!(registry.primary(), None);
    }

    #[test]
    fn kind_is_derived_from_vendor_name() {
        assert_eq!(
            pad(0, "Xbox Wireless Controller", Capabilities::EXTENDED).kind(),
            ControllerKind::Xbox
        );
        assert_eq!(
            pad(0, "DUALSHOCK 4", Capabilities::EXTENDED).kind(),
            ControllerKind::PlayStation
        );
        assert_eq!(
            pad(0, "8BitDo", Capabilities::MICRO).kind(),
            ControllerKind::MFi
        );
        assert_eq!(
            pad(0, "Mystery", Capabilities::NONE).kind(),
            ControllerKind::Unknown
        );
    }
}
