//! Controller input router
//!
//! Turns raw gamepad callbacks into a canonical [`InputEvent`] history and
//! semantic [`NavigationAction`]s. The router is owned by a single task; every
//! hardware callback, from every device, is serialised through
//! [`InputRouter::dispatch`] before any shared state is touched.
//!
//! # Normalisation
//!
//! ```text
//! Button  ──► press edge only ───────────────┐
//! Trigger ──► value > dead zone ─────────────┼──► InputEvent ring buffer
//! Stick   ──► sqrt(x² + y²) > dead zone ─────┤
//! D-pad   ──► sqrt(x² + y²) > dead zone ─────┘
//!                     │
//!                     └──► |x| > threshold ──► Navigate (clamped)
//! ```
//!
//! Navigation (D-pad, A, B, Menu) is only honoured from devices running the
//! extended profile, and only while at least one such device is active.

use crate::config::InputConfig;
use crate::console::{ConsoleKind, LogSink};
use crate::controller::device::{
    ControllerDevice, DeviceId, DeviceRegistry, GamepadProfile, InputError, RegisteredDevice,
};
use crate::controller::haptics::HapticsSink;
use crate::controller::input::{stick_magnitude, ButtonKind, InputEvent, InputType, RawInput, Side};
use crate::ring_buffer::RingBuffer;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Dashboard selection state driven by the D-pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigationSelection {
    /// Always within `0..max_buttons`
    pub selected_index: usize,
    pub can_navigate: bool,
}

/// Semantic actions produced from controller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationAction {
    Navigate { from: usize, to: usize },
    Activate(usize),
    Cancel,
    ToggleMenu,
}

pub struct InputRouter {
    settings: InputConfig,
    registry: DeviceRegistry,
    events: RingBuffer<InputEvent>,
    selection: NavigationSelection,
    // Buttons currently held, for press-edge detection
    held_buttons: HashSet<(DeviceId, ButtonKind)>,
    last_input_time: Option<DateTime<Local>>,
    events_recorded: u64,
    haptics: Arc<dyn HapticsSink>,
    console: Arc<dyn LogSink>,
    selection_sender: watch::Sender<NavigationSelection>,
}

impl InputRouter {
    pub fn new(
        settings: InputConfig,
        haptics: Arc<dyn HapticsSink>,
        console: Arc<dyn LogSink>,
    ) -> Self {
        info!(
            "Creating input router: dead zone {}, {} selectable rings, {} event history",
            settings.dead_zone, settings.max_buttons, settings.event_capacity
        );
        let selection = NavigationSelection::default();
        let (selection_sender, _) = watch::channel(selection);

        Self {
            events: RingBuffer::new(settings.event_capacity),
            settings,
            registry: DeviceRegistry::new(),
            selection,
            held_buttons: HashSet::new(),
            last_input_time: None,
            events_recorded: 0,
            haptics,
            console,
            selection_sender,
        }
    }

    /// Single entry point for hardware input. Returns the semantic actions the
    /// input produced, in order.
    pub fn dispatch(&mut self, input: RawInput) -> Vec<NavigationAction> {
        match input {
            RawInput::Connected(device) => {
                self.handle_connected(device);
                Vec::new()
            }
            RawInput::Disconnected(id) => {
                self.handle_disconnected(id);
                Vec::new()
            }
            RawInput::Battery {
                device,
                level,
                state,
            } => {
                if let Some(entry) = self.registry.get_mut(device) {
                    entry.device.battery_level = level.clamp(0.0, 1.0);
                    entry.device.battery_state = state;
                    debug!("Battery of {}: {:.0}% ({:?})", device, level * 100.0, state);
                }
                Vec::new()
            }
            other => self.handle_device_input(other),
        }
    }

    fn handle_connected(&mut self, device: ControllerDevice) {
        let vendor = device.vendor_name.clone();
        let kind = device.kind();
        match self.registry.register(device) {
            Ok(profile) => {
                self.console.append_log_line(
                    ConsoleKind::Controller,
                    &format!("Controller connected: {} ({}, {:?} profile)", vendor, kind, profile),
                );
            }
            Err(e @ InputError::DeviceCapabilityUnsupported { .. }) => {
                warn!("{}", e);
                self.console
                    .append_log_line(ConsoleKind::Warning, &e.to_string());
            }
            Err(e) => {
                warn!("Ignoring connect notification: {}", e);
            }
        }
        self.refresh_navigation();
    }

    fn handle_disconnected(&mut self, id: DeviceId) {
        let was_primary = self.registry.primary() == Some(id);
        let Some(removed) = self.registry.remove(id) else {
            debug!("Disconnect for unknown controller {}", id);
            return;
        };
        self.held_buttons.retain(|(device, _)| *device != id);
        self.console.append_log_line(
            ConsoleKind::Controller,
            &format!("Controller disconnected: {}", removed.device.vendor_name),
        );

        if was_primary {
            match self.primary_device() {
                Some(primary) => info!(
                    "Primary controller is now {} ({})",
                    primary.vendor_name, primary.id
                ),
                None => info!("No controllers left, primary cleared"),
            }
        }
        self.refresh_navigation();
    }

    fn handle_device_input(&mut self, input: RawInput) -> Vec<NavigationAction> {
        let device = input.device();
        let profile = match self.registry.get(device) {
            Some(entry) => match entry.profile() {
                Some(profile) => profile,
                None => {
                    debug!("Input from inactive controller {} ignored", device);
                    return Vec::new();
                }
            },
            None => {
                debug!("{}", InputError::UnknownDevice(device));
                return Vec::new();
            }
        };

        let mut actions = Vec::new();
        match input {
            RawInput::Button {
                button,
                value,
                pressed,
                ..
            } => {
                if !profile_has_button(profile, button) {
                    debug!("{:?} not bound on {:?} profile", button, profile);
                    return actions;
                }
                if !pressed {
                    self.held_buttons.remove(&(device, button));
                    return actions;
                }
                // Only the transition into the pressed state counts
                if !self.held_buttons.insert((device, button)) {
                    return actions;
                }
                self.record(device, button.into(), value);
                if self.navigation_allowed(profile) {
                    if let Some(action) = self.button_action(button) {
                        actions.push(action);
                    }
                }
            }
            RawInput::Trigger { side, value, .. } => {
                if profile != GamepadProfile::Extended {
                    return actions;
                }
                if value > self.settings.dead_zone {
                    let input_type = match side {
                        Side::Left => InputType::LeftTrigger,
                        Side::Right => InputType::RightTrigger,
                    };
                    self.record(device, input_type, value);
                }
            }
            RawInput::Stick { side, x, y, .. } => {
                if profile != GamepadProfile::Extended {
                    return actions;
                }
                let magnitude = stick_magnitude(x, y);
                if magnitude > self.settings.dead_zone {
                    let input_type = match side {
                        Side::Left => InputType::LeftStick,
                        Side::Right => InputType::RightStick,
                    };
                    self.record(device, input_type, magnitude);
                }
            }
            RawInput::DPad { x, y, .. } => {
                let magnitude = stick_magnitude(x, y);
                if magnitude <= self.settings.dead_zone {
                    return actions;
                }
                self.record(device, InputType::DPad, magnitude);
                if self.navigation_allowed(profile) && x.abs() > self.settings.navigation_threshold
                {
                    actions.push(self.navigate(x > 0.0));
                }
            }
            RawInput::Connected(_) | RawInput::Disconnected(_) | RawInput::Battery { .. } => {}
        }
        actions
    }

    fn navigation_allowed(&self, profile: GamepadProfile) -> bool {
        profile == GamepadProfile::Extended && self.selection.can_navigate
    }

    fn button_action(&mut self, button: ButtonKind) -> Option<NavigationAction> {
        match button {
            ButtonKind::A => {
                let index = self.selection.selected_index;
                self.console.append_log_line(
                    ConsoleKind::Controller,
                    &format!("Controller activated: Ring {}", index),
                );
                self.haptics
                    .request_haptic(self.settings.haptics.activate);
                Some(NavigationAction::Activate(index))
            }
            ButtonKind::B => {
                self.console
                    .append_log_line(ConsoleKind::Controller, "Controller cancel action");
                self.haptics.request_haptic(self.settings.haptics.cancel);
                Some(NavigationAction::Cancel)
            }
            ButtonKind::Menu => {
                self.console
                    .append_log_line(ConsoleKind::Controller, "Controller menu toggle");
                self.haptics.request_haptic(self.settings.haptics.menu);
                Some(NavigationAction::ToggleMenu)
            }
            ButtonKind::X | ButtonKind::Y => None,
        }
    }

    // Clamped, never wraps
    fn navigate(&mut self, right: bool) -> NavigationAction {
        let from = self.selection.selected_index;
        let last = self.settings.max_buttons.saturating_sub(1);
        let to = if right {
            (from + 1).min(last)
        } else {
            from.saturating_sub(1)
        };
        self.selection.selected_index = to;
        self.selection_sender.send_replace(self.selection);

        self.console.append_log_line(
            ConsoleKind::Controller,
            &format!("UI Navigation: {}", if right { "Right" } else { "Left" }),
        );
        self.haptics
            .request_haptic(self.settings.haptics.navigate);
        NavigationAction::Navigate { from, to }
    }

    fn record(&mut self, source: DeviceId, input_type: InputType, magnitude: f32) {
        let timestamp = Local::now();
        debug!("{} on {}: {:.3}", input_type, source, magnitude);
        self.events.push(InputEvent {
            timestamp,
            input_type,
            magnitude,
            source,
        });
        self.last_input_time = Some(timestamp);
        self.events_recorded += 1;
    }

    fn refresh_navigation(&mut self) {
        let can_navigate = self.registry.has_active_extended();
        if can_navigate != self.selection.can_navigate {
            info!("Controller navigation {}", if can_navigate { "enabled" } else { "disabled" });
            self.selection.can_navigate = can_navigate;
            self.selection_sender.send_replace(self.selection);
        }
    }

    /// Plays `intensity` if any controller is connected. Returns whether a
    /// request was made.
    pub fn pulse_primary(&self, intensity: f32) -> bool {
        if self.registry.primary().is_none() {
            return false;
        }
        self.haptics.request_haptic(intensity);
        true
    }

    pub fn selection(&self) -> NavigationSelection {
        self.selection
    }

    pub fn subscribe(&self) -> watch::Receiver<NavigationSelection> {
        self.selection_sender.subscribe()
    }

    /// Oldest first.
    pub fn input_events(&self) -> impl Iterator<Item = &InputEvent> {
        self.events.iter()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn events_recorded(&self) -> u64 {
        self.events_recorded
    }

    pub fn last_input_time(&self) -> Option<DateTime<Local>> {
        self.last_input_time
    }

    pub fn devices(&self) -> impl Iterator<Item = &RegisteredDevice> {
        self.registry.iter()
    }

    pub fn is_controller_connected(&self) -> bool {
        !self.registry.is_empty()
    }

    pub fn primary_device(&self) -> Option<&ControllerDevice> {
        let id = self.registry.primary()?;
        self.registry.get(id).map(|entry| &entry.device)
    }

    pub fn battery_level(&self) -> f32 {
        self.primary_device()
            .map(|device| device.battery_level)
            .unwrap_or(1.0)
    }
}

fn profile_has_button(profile: GamepadProfile, button: ButtonKind) -> bool {
    match profile {
        GamepadProfile::Extended => true,
        GamepadProfile::Micro => matches!(button, ButtonKind::A | ButtonKind::X),
    }
}
