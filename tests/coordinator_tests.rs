//! Integration tests for the coordinator
//!
//! Controller input is fed in as raw events; the assertions look at the
//! engine the activations reach and at the hooks the UI would consume.

use nativebridge::bridge::{Coordinator, RingAction};
use nativebridge::config::BridgeConfig;
use nativebridge::console::DebugConsole;
use nativebridge::controller::{
    ButtonKind, Capabilities, ControllerDevice, DeviceId, HapticsSink, InputRouter,
    NavigationAction, RawInput,
};
use nativebridge::engine::{
    EngineController, EngineHandle, EngineStatus, MemoryStorage, SimulatedProjectEnumerator,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

const PAD: DeviceId = DeviceId(0);

#[derive(Default)]
struct RecordingHaptics {
    requests: Mutex<Vec<f32>>,
}

impl HapticsSink for RecordingHaptics {
    fn request_haptic(&self, intensity: f32) {
        self.requests.lock().unwrap().push(intensity);
    }
}

struct Harness {
    coordinator: Coordinator,
    engine: EngineHandle,
    haptics: Arc<RecordingHaptics>,
    console: Arc<DebugConsole>,
}

fn harness() -> Harness {
    harness_with(BridgeConfig::default())
}

fn harness_with(mut config: BridgeConfig) -> Harness {
    config.engine.content_root = PathBuf::from("/content");
    config.engine.init_delay_ms = 0;
    config.engine.checkpoint_delay_ms = 0;
    config.engine.test_message_delay_ms = 0;

    let console = Arc::new(DebugConsole::new(config.console.capacity));
    let controller = EngineController::new(
        config.engine.clone(),
        Arc::new(MemoryStorage::new().with_file("/content/GameContent/game.pck", 4096)),
        Arc::new(SimulatedProjectEnumerator),
        console.clone(),
    );
    let (engine, _worker) = EngineHandle::spawn(controller, CancellationToken::new());

    let haptics = Arc::new(RecordingHaptics::default());
    let router = InputRouter::new(config.input.clone(), haptics.clone(), console.clone());
    let coordinator = Coordinator::new(router, engine.clone(), console.clone(), &config);

    Harness {
        coordinator,
        engine,
        haptics,
        console,
    }
}

fn connect_pad() -> RawInput {
    RawInput::Connected(ControllerDevice::new(
        PAD,
        "Xbox Wireless Controller",
        Capabilities::EXTENDED,
    ))
}

fn button(button: ButtonKind, pressed: bool) -> RawInput {
    RawInput::Button {
        device: PAD,
        button,
        value: if pressed { 1.0 } else { 0.0 },
        pressed,
    }
}

fn right() -> RawInput {
    RawInput::DPad {
        device: PAD,
        x: 1.0,
        y: 0.0,
    }
}

fn click(coordinator: &mut Coordinator, kind: ButtonKind) {
    coordinator.handle_input(button(kind, true));
    coordinator.handle_input(button(kind, false));
}

async fn wait_for_status(rx: &mut watch::Receiver<EngineStatus>, wanted: EngineStatus) {
    timeout(Duration::from_secs(2), async {
        loop {
            if *rx.borrow_and_update() == wanted {
                return;
            }
            rx.changed().await.expect("Engine worker stopped");
        }
    })
    .await
    .expect("Timeout waiting for engine status");
}

#[tokio::test]
async fn test_rings_drive_engine_lifecycle() {
    let mut h = harness();
    h.coordinator.handle_input(connect_pad());

    // Ring 0: connect
    click(&mut h.coordinator, ButtonKind::A);
    h.coordinator.wait_idle().await;
    assert_eq!(h.engine.status(), EngineStatus::Connected);

    // Ring 2: load pack
    h.coordinator.handle_input(right());
    h.coordinator.handle_input(right());
    click(&mut h.coordinator, ButtonKind::A);
    h.coordinator.wait_idle().await;
    assert_eq!(h.engine.status(), EngineStatus::PackLoaded);
    assert_eq!(h.engine.pack_state().contents.len(), 7);

    // Ring 2 again does nothing once loaded
    assert_eq!(h.coordinator.activate(2), RingAction::Nothing);

    // Ring 1: shut down
    assert_eq!(h.coordinator.activate(1), RingAction::ShutdownEngine);
    h.coordinator.wait_idle().await;
    assert_eq!(h.engine.status(), EngineStatus::Disconnected);
}

#[tokio::test]
async fn test_inspect_and_bridge_rings() {
    let mut h = harness();
    h.engine.initialize().await.unwrap();

    assert_eq!(h.coordinator.activate(5), RingAction::Nothing);
    assert_eq!(h.coordinator.activate(4), RingAction::TestBridge);
    h.coordinator.wait_idle().await;
    assert!(h.engine.metrics().last_bridge_latency.is_some());

    assert_eq!(h.coordinator.activate(2), RingAction::LoadPack);
    h.coordinator.wait_idle().await;
    assert_eq!(h.coordinator.activate(5), RingAction::InspectStructure);
    h.coordinator.wait_idle().await;

    assert!(h
        .console
        .snapshot()
        .iter()
        .any(|line| line.message.starts_with("Project structure: Scenes: 2")));
}

#[tokio::test]
async fn test_haptic_ring_needs_a_controller() {
    let mut h = harness();
    assert_eq!(h.coordinator.activate(3), RingAction::Nothing);

    h.coordinator.handle_input(connect_pad());
    for _ in 0..3 {
        h.coordinator.handle_input(right());
    }
    click(&mut h.coordinator, ButtonKind::A);

    // Three navigations, the activation, then the haptic test itself
    assert_eq!(
        *h.haptics.requests.lock().unwrap(),
        vec![0.3, 0.3, 0.3, 0.7, 1.0]
    );
}

#[tokio::test]
async fn test_haptic_ring_ignores_menu_intensity() {
    let mut config = BridgeConfig::default();
    config.input.haptics.menu = 0.2;
    config.input.haptics.test = 0.9;
    let mut h = harness_with(config);

    h.coordinator.handle_input(connect_pad());
    assert_eq!(h.coordinator.activate(3), RingAction::HapticTest);
    assert_eq!(*h.haptics.requests.lock().unwrap(), vec![0.9]);
}

#[tokio::test]
async fn test_hooks_receive_navigation_actions() {
    let mut h = harness();
    let mut hooks = h.coordinator.subscribe_hooks();
    let selection = h.coordinator.subscribe_selection();

    h.coordinator.handle_input(connect_pad());
    h.coordinator.handle_input(right());
    click(&mut h.coordinator, ButtonKind::B);
    click(&mut h.coordinator, ButtonKind::Menu);

    let mut received = Vec::new();
    for _ in 0..3 {
        let action = timeout(Duration::from_millis(100), hooks.recv())
            .await
            .expect("Timeout waiting for hook")
            .expect("Hook channel closed");
        received.push(action);
    }
    assert_eq!(
        received,
        vec![
            NavigationAction::Navigate { from: 0, to: 1 },
            NavigationAction::Cancel,
            NavigationAction::ToggleMenu,
        ]
    );
    assert_eq!(selection.borrow().selected_index, 1);
}

#[tokio::test]
async fn test_run_loop_processes_inputs_until_shutdown() {
    let h = harness();
    let engine = h.engine.clone();
    let mut status = engine.subscribe_status();
    let (tx, rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();

    let task = tokio::spawn(h.coordinator.run(rx, shutdown.clone()));

    tx.send(connect_pad()).await.unwrap();
    tx.send(button(ButtonKind::A, true)).await.unwrap();
    wait_for_status(&mut status, EngineStatus::Connected).await;

    shutdown.cancel();
    timeout(Duration::from_secs(1), task)
        .await
        .expect("Coordinator did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_run_loop_stops_when_inputs_close() {
    let h = harness();
    let (tx, rx) = mpsc::channel::<RawInput>(1);
    let task = tokio::spawn(h.coordinator.run(rx, CancellationToken::new()));

    drop(tx);
    timeout(Duration::from_secs(1), task)
        .await
        .expect("Coordinator did not stop")
        .unwrap();
}
