//! Gamepad collector backed by gilrs
//!
//! Owns the gilrs context on a dedicated thread, translates its events into
//! [`RawInput`] and plays rumble requests coming back from the router.
//! gilrs reports the D-pad as four buttons; the collector folds them into a
//! single x/y pair so the router sees the same shape on every platform.

use crate::config::InputConfig;
use crate::controller::device::{BatteryState, Capabilities, ControllerDevice, DeviceId};
use crate::controller::haptics::HapticRequest;
use crate::controller::input::{ButtonKind, RawInput, Side};
use gilrs::ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder, Repeat, Replay, Ticks};
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs, PowerInfo};
use statum::{machine, state};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const POLL_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to start collector thread: {0}")]
    ThreadError(#[from] std::io::Error),

    #[error("Input channel closed")]
    ChannelClosed,
}

// Last known analog state of one pad
#[derive(Debug, Default, Clone, Copy)]
struct PadState {
    left_stick: (f32, f32),
    right_stick: (f32, f32),
    dpad: (f32, f32),
    dpad_buttons: DPadButtons,
}

// Held D-pad buttons on pads that report the D-pad as four buttons
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct DPadButtons {
    left: bool,
    right: bool,
    up: bool,
    down: bool,
}

impl DPadButtons {
    /// Returns false when `button` is not part of the D-pad.
    fn set(&mut self, button: Button, pressed: bool) -> bool {
        let slot = match button {
            Button::DPadLeft => &mut self.left,
            Button::DPadRight => &mut self.right,
            Button::DPadUp => &mut self.up,
            Button::DPadDown => &mut self.down,
            _ => return false,
        };
        *slot = pressed;
        true
    }

    fn axes(&self) -> (f32, f32) {
        (
            f32::from(u8::from(self.right)) - f32::from(u8::from(self.left)),
            f32::from(u8::from(self.up)) - f32::from(u8::from(self.down)),
        )
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectorState {
    Initializing,
    Collecting,
}

#[machine]
pub struct GamepadCollector<S: CollectorState> {
    gilrs: Gilrs,
    settings: InputConfig,
    input_sender: mpsc::Sender<RawInput>,
    haptic_receiver: mpsc::Receiver<HapticRequest>,
    pads: HashMap<GamepadId, PadState>,
    // Kept alive while it plays; dropping an Effect stops it
    rumble: Option<Effect>,
    last_battery_poll: Instant,
}

impl GamepadCollector<Initializing> {
    pub fn create(
        settings: InputConfig,
        input_sender: mpsc::Sender<RawInput>,
        haptic_receiver: mpsc::Receiver<HapticRequest>,
    ) -> Result<Self, CollectorError> {
        info!("Initializing gilrs controller interface");
        let gilrs = Gilrs::new().map_err(|e| {
            error!("Failed to initialize gilrs: {}", e);
            CollectorError::InitializationError(e.to_string())
        })?;

        Ok(Self::new(
            gilrs,
            settings,
            input_sender,
            haptic_receiver,
            HashMap::new(),
            None,
            Instant::now(),
        ))
    }

    /// Announces every pad that was already connected before the collector
    /// started, then starts collecting.
    pub fn initialize(mut self) -> Result<GamepadCollector<Collecting>, CollectorError> {
        let connected: Vec<GamepadId> = self.gilrs.gamepads().map(|(id, _)| id).collect();
        if connected.is_empty() {
            warn!("No gamepad connected, waiting for one");
        } else {
            info!("Found {} gamepad(s)", connected.len());
        }
        for id in connected {
            self.announce(id)?;
        }
        Ok(self.transition())
    }
}

impl<S: CollectorState> GamepadCollector<S> {
    fn send(&self, input: RawInput) -> Result<(), CollectorError> {
        self.input_sender
            .blocking_send(input)
            .map_err(|_| CollectorError::ChannelClosed)
    }

    fn announce(&mut self, id: GamepadId) -> Result<(), CollectorError> {
        if self.pads.contains_key(&id) {
            return Ok(());
        }
        let Some(gamepad) = self.gilrs.connected_gamepad(id) else {
            return Ok(());
        };
        let device = describe(id, &gamepad);
        let battery = battery_reading(gamepad.power_info());
        info!(
            "Gamepad {} connected: {} (extended={}, micro={}, force feedback={})",
            device.id,
            device.vendor_name,
            device.capabilities.extended_gamepad,
            device.capabilities.micro_gamepad,
            gamepad.is_ff_supported()
        );

        self.pads.insert(id, PadState::default());
        self.send(RawInput::Connected(device))?;
        if let Some((level, state)) = battery {
            self.send(RawInput::Battery {
                device: device_id(id),
                level,
                state,
            })?;
        }
        Ok(())
    }
}

impl GamepadCollector<Collecting> {
    pub fn run_collection_loop(&mut self, shutdown: CancellationToken) -> Result<(), CollectorError> {
        info!("Starting gamepad collection loop");
        let battery_interval = Duration::from_millis(self.settings.battery_poll_interval_ms);

        while !shutdown.is_cancelled() {
            while let Ok(request) = self.haptic_receiver.try_recv() {
                self.play_rumble(request);
            }

            if let Some(Event { id, event, .. }) = self.gilrs.next_event_blocking(Some(POLL_TIMEOUT)) {
                self.handle_event(id, event)?;
            }

            if self.last_battery_poll.elapsed() >= battery_interval {
                self.poll_battery()?;
                self.last_battery_poll = Instant::now();
            }
        }

        info!("Gamepad collection loop stopped");
        Ok(())
    }

    fn handle_event(&mut self, id: GamepadId, event: EventType) -> Result<(), CollectorError> {
        let device = device_id(id);
        match event {
            EventType::Connected => self.announce(id)?,
            EventType::Disconnected => {
                if self.pads.remove(&id).is_some() {
                    info!("Gamepad {} disconnected", device);
                    self.send(RawInput::Disconnected(device))?;
                }
            }
            EventType::ButtonPressed(button, _) | EventType::ButtonReleased(button, _) => {
                let pressed = matches!(event, EventType::ButtonPressed(..));
                if let Some(kind) = map_button(button) {
                    self.send(RawInput::Button {
                        device,
                        button: kind,
                        value: if pressed { 1.0 } else { 0.0 },
                        pressed,
                    })?;
                } else if let Some(pad) = self.pads.get_mut(&id) {
                    if !pad.dpad_buttons.set(button, pressed) {
                        return Ok(());
                    }
                    pad.dpad = pad.dpad_buttons.axes();
                    let (x, y) = pad.dpad;
                    self.send(RawInput::DPad { device, x, y })?;
                }
            }
            EventType::ButtonChanged(button, value, _) => {
                let side = match button {
                    Button::LeftTrigger2 => Side::Left,
                    Button::RightTrigger2 => Side::Right,
                    _ => return Ok(()),
                };
                self.send(RawInput::Trigger {
                    device,
                    side,
                    value: value.clamp(0.0, 1.0),
                })?;
            }
            EventType::AxisChanged(axis, value, _) => {
                let Some(pad) = self.pads.get_mut(&id) else {
                    return Ok(());
                };
                let input = match axis {
                    Axis::LeftStickX | Axis::LeftStickY => {
                        set_axis(&mut pad.left_stick, axis == Axis::LeftStickX, value);
                        let (x, y) = pad.left_stick;
                        RawInput::Stick {
                            device,
                            side: Side::Left,
                            x,
                            y,
                        }
                    }
                    Axis::RightStickX | Axis::RightStickY => {
                        set_axis(&mut pad.right_stick, axis == Axis::RightStickX, value);
                        let (x, y) = pad.right_stick;
                        RawInput::Stick {
                            device,
                            side: Side::Right,
                            x,
                            y,
                        }
                    }
                    Axis::DPadX | Axis::DPadY => {
                        set_axis(&mut pad.dpad, axis == Axis::DPadX, value);
                        let (x, y) = pad.dpad;
                        RawInput::DPad { device, x, y }
                    }
                    Axis::LeftZ => RawInput::Trigger {
                        device,
                        side: Side::Left,
                        value: value.clamp(0.0, 1.0),
                    },
                    Axis::RightZ => RawInput::Trigger {
                        device,
                        side: Side::Right,
                        value: value.clamp(0.0, 1.0),
                    },
                    _ => {
                        debug!("Ignoring unsupported axis: {:?}", axis);
                        return Ok(());
                    }
                };
                self.send(input)?;
            }
            _ => debug!("Unhandled gilrs event: {:?}", event),
        }
        Ok(())
    }

    fn poll_battery(&mut self) -> Result<(), CollectorError> {
        let readings: Vec<(DeviceId, f32, BatteryState)> = self
            .gilrs
            .gamepads()
            .filter_map(|(id, gamepad)| {
                battery_reading(gamepad.power_info()).map(|(level, state)| (device_id(id), level, state))
            })
            .collect();
        for (device, level, state) in readings {
            self.send(RawInput::Battery {
                device,
                level,
                state,
            })?;
        }
        Ok(())
    }

    // Plays on the first pad that supports force feedback
    fn play_rumble(&mut self, request: HapticRequest) {
        let Some(target) = self
            .gilrs
            .gamepads()
            .find(|(_, gamepad)| gamepad.is_ff_supported())
            .map(|(id, _)| id)
        else {
            debug!("No force feedback capable gamepad for haptic request");
            return;
        };

        let duration = Ticks::from_ms(request.duration_ms);
        let effect = EffectBuilder::new()
            .add_effect(BaseEffect {
                kind: BaseEffectType::Strong {
                    magnitude: (request.intensity * f32::from(u16::MAX)) as u16,
                },
                scheduling: Replay {
                    play_for: duration,
                    ..Default::default()
                },
                ..Default::default()
            })
            .repeat(Repeat::For(duration))
            .gamepads(&[target])
            .finish(&mut self.gilrs);

        match effect {
            Ok(effect) => {
                if let Err(e) = effect.play() {
                    warn!("Failed to play rumble: {}", e);
                    return;
                }
                self.rumble = Some(effect);
            }
            Err(e) => warn!("Failed to build rumble effect: {}", e),
        }
    }
}

/// Owns the collector thread.
pub struct CollectorHandle {
    thread: std::thread::JoinHandle<()>,
}

impl CollectorHandle {
    /// Starts the collector thread and waits for gilrs to come up.
    pub async fn spawn(
        settings: Option<InputConfig>,
        input_sender: mpsc::Sender<RawInput>,
        haptic_receiver: mpsc::Receiver<HapticRequest>,
        shutdown: CancellationToken,
    ) -> Result<Self, CollectorError> {
        let settings = settings.unwrap_or_default();
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("gamepad-collector".to_string())
            .spawn(move || {
                let startup = GamepadCollector::create(settings, input_sender, haptic_receiver)
                    .and_then(|collector| collector.initialize());
                match startup {
                    Ok(mut collecting) => {
                        let _ = ready_tx.send(Ok(()));
                        if let Err(e) = collecting.run_collection_loop(shutdown) {
                            error!("Gamepad collector terminated: {}", e);
                        }
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        wait_until_ready(ready_rx).await?;
        info!("Gamepad collector started");
        Ok(Self { thread })
    }

    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Blocks until the thread exits; cancel its shutdown token first.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("Gamepad collector thread panicked");
        }
    }
}

async fn wait_until_ready(
    ready_rx: oneshot::Receiver<Result<(), CollectorError>>,
) -> Result<(), CollectorError> {
    ready_rx.await.unwrap_or_else(|_| {
        Err(CollectorError::InitializationError(
            "collector thread exited during startup".to_string(),
        ))
    })
}

fn device_id(id: GamepadId) -> DeviceId {
    DeviceId(usize::from(id))
}

fn describe(id: GamepadId, gamepad: &Gamepad<'_>) -> ControllerDevice {
    let extended_gamepad = gamepad.axis_code(Axis::LeftStickX).is_some()
        && gamepad.axis_code(Axis::RightStickX).is_some()
        && gamepad.button_code(Button::East).is_some();
    let micro_gamepad = gamepad.button_code(Button::South).is_some();
    ControllerDevice::new(
        device_id(id),
        gamepad.name(),
        Capabilities {
            extended_gamepad,
            micro_gamepad,
        },
    )
}

fn map_button(button: Button) -> Option<ButtonKind> {
    match button {
        Button::South => Some(ButtonKind::A),
        Button::East => Some(ButtonKind::B),
        Button::West => Some(ButtonKind::X),
        Button::North => Some(ButtonKind::Y),
        Button::Start => Some(ButtonKind::Menu),
        _ => None,
    }
}

fn set_axis(pair: &mut (f32, f32), is_x: bool, value: f32) {
    if is_x {
        pair.0 = value;
    } else {
        pair.1 = value;
    }
}

fn battery_reading(power: PowerInfo) -> Option<(f32, BatteryState)> {
    match power {
        PowerInfo::Discharging(percent) => {
            Some((f32::from(percent.min(100)) / 100.0, BatteryState::Discharging))
        }
        PowerInfo::Charging(percent) => {
            Some((f32::from(percent.min(100)) / 100.0, BatteryState::Charging))
        }
        PowerInfo::Charged | PowerInfo::Wired => Some((1.0, BatteryState::Full)),
        _ => None,
    }
}
