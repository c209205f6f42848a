//! Tests for the control surface dispatch and flush

use super::*;
use crate::control::{load_default_layout, ControlValue, LogicalControl};
use crate::featuregroup::{ControlEvent, EventOutcome, HandlerContext};
use crate::flexi::CommandSlot;
use crate::scheduler::ManualScheduler;
use anyhow::anyhow;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

const PLAY: ViewId = ViewId("play");
const SHIFT: ViewId = ViewId("shift");
const VOLUME: ModeId = ModeId("volume");
const ARM: ModeId = ModeId("arm");

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<Vec<u8>>,
    executed: Vec<(FlexiCommand, ControlValue)>,
    notes: Vec<(u8, u8, u8)>,
    keyboard: Vec<[u8; 3]>,
    cells: Vec<(usize, usize, String)>,
    notifications: Vec<String>,
    values: HashMap<FlexiCommand, u8>,
}

#[derive(Clone, Default)]
struct TestHost {
    recorded: Arc<Mutex<Recorded>>,
}

impl Host for TestHost {
    fn send_midi(&mut self, bytes: &[u8]) {
        self.recorded.lock().sent.push(bytes.to_vec());
    }

    fn execute_command(&mut self, command: FlexiCommand, value: ControlValue) {
        self.recorded.lock().executed.push((command, value));
    }

    fn command_value(&self, command: FlexiCommand) -> Option<u8> {
        self.recorded.lock().values.get(&command).copied()
    }

    fn route_note(&mut self, channel: u8, note: u8, velocity: u8) {
        self.recorded.lock().notes.push((channel, note, velocity));
    }

    fn route_keyboard_message(&mut self, bytes: [u8; 3]) {
        self.recorded.lock().keyboard.push(bytes);
    }

    fn update_display_cell(&mut self, row: usize, cell: usize, text: &str) {
        self.recorded.lock().cells.push((row, cell, text.to_string()));
    }

    fn notify(&mut self, message: &str) {
        self.recorded.lock().notifications.push(message.to_string());
    }
}

struct PlayView {
    log: Log,
}

impl SurfaceHandler for PlayView {
    fn name(&self) -> &str {
        "play"
    }

    fn on_control_event(
        &mut self,
        control: &LogicalControl,
        event: ControlEvent,
        ctx: &mut HandlerContext<'_>,
    ) -> EventOutcome {
        self.log.lock().push(format!("play:{}:{:?}", control.name(), event));
        match (control.name(), event) {
            ("play", ControlEvent::Down(_)) => {
                ctx.execute(FlexiCommand::TransportPlay, ControlValue::Absolute(127))
            }
            ("shift", ControlEvent::Down(_)) => ctx.set_temporary_view(SHIFT),
            ("select3", ControlEvent::Down(_)) => ctx.consume(control.id()),
            _ => {}
        }
        EventOutcome::Handled
    }

    fn on_long_press(&mut self, control: &LogicalControl, _ctx: &mut HandlerContext<'_>) -> EventOutcome {
        self.log.lock().push(format!("play:long:{}", control.name()));
        EventOutcome::Handled
    }

    fn on_note(&mut self, _channel: u8, note: u8, _velocity: u8, _ctx: &mut HandlerContext<'_>) -> EventOutcome {
        self.log.lock().push(format!("play:note:{}", note));
        EventOutcome::Handled
    }

    fn on_aftertouch(&mut self, note: Option<u8>, value: u8, _ctx: &mut HandlerContext<'_>) {
        self.log.lock().push(format!("play:aftertouch:{:?}:{}", note, value));
    }

    fn on_program_change(&mut self, _channel: u8, program: u8, _ctx: &mut HandlerContext<'_>) {
        self.log.lock().push(format!("play:pc:{}", program));
    }

    fn color(&self, control: &LogicalControl) -> anyhow::Result<Option<u8>> {
        match control.name() {
            "play" => Ok(Some(3)),
            "stop" => Err(anyhow!("transport state unavailable")),
            _ => Ok(None),
        }
    }

    fn draw_grid(&self, grid: &mut PadGrid) -> anyhow::Result<()> {
        grid.light(0, 5);
        Ok(())
    }

    fn update_display(&self, display: &mut DisplayBuffer) -> anyhow::Result<()> {
        display.set_cell(0, 0, "Play");
        Ok(())
    }
}

/// Overlay shown while shift is held
struct ShiftView;

impl SurfaceHandler for ShiftView {
    fn name(&self) -> &str {
        "shift"
    }

    fn on_control_event(
        &mut self,
        control: &LogicalControl,
        event: ControlEvent,
        ctx: &mut HandlerContext<'_>,
    ) -> EventOutcome {
        match (control.name(), event) {
            ("shift", ControlEvent::Up) => {
                ctx.restore_view();
                EventOutcome::Handled
            }
            ("play", ControlEvent::Down(_)) => {
                ctx.execute(FlexiCommand::TransportRestart, ControlValue::Absolute(127));
                EventOutcome::Handled
            }
            _ => EventOutcome::Relay,
        }
    }

    fn color(&self, control: &LogicalControl) -> anyhow::Result<Option<u8>> {
        Ok((control.name() == "play").then_some(9))
    }
}

struct VolumeMode {
    log: Log,
}

impl SurfaceHandler for VolumeMode {
    fn name(&self) -> &str {
        "volume"
    }

    fn on_control_event(
        &mut self,
        control: &LogicalControl,
        event: ControlEvent,
        _ctx: &mut HandlerContext<'_>,
    ) -> EventOutcome {
        match control.group() {
            Some(("fader", _)) => {
                self.log.lock().push(format!("volume:{}:{:?}", control.name(), event));
                EventOutcome::Handled
            }
            _ => EventOutcome::Relay,
        }
    }

    fn update_display(&self, display: &mut DisplayBuffer) -> anyhow::Result<()> {
        display.set_cell(1, 0, "Volume");
        Ok(())
    }
}

/// Lights the record button, defers everything else
struct ArmMode;

impl SurfaceHandler for ArmMode {
    fn name(&self) -> &str {
        "arm"
    }

    fn color(&self, control: &LogicalControl) -> anyhow::Result<Option<u8>> {
        Ok((control.name() == "record").then_some(11))
    }
}

struct Fixture {
    surface: ControlSurface,
    host: TestHost,
    scheduler: ManualScheduler,
    log: Log,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(SurfaceConfig::default())
    }

    fn with_config(config: SurfaceConfig) -> Self {
        let layout = load_default_layout().unwrap();
        let host = TestHost::default();
        let scheduler = ManualScheduler::new();
        let log: Log = Arc::default();

        let mut surface = ControlSurface::new(
            layout,
            config,
            Box::new(host.clone()),
            Box::new(scheduler.clone()),
        );
        surface.register_view(PLAY, Box::new(PlayView { log: log.clone() }));
        surface.register_view(SHIFT, Box::new(ShiftView));
        surface.register_mode(VOLUME, Box::new(VolumeMode { log: log.clone() }));
        surface.set_active_view(PLAY);
        surface.set_active_mode(VOLUME);

        let mut fixture = Self {
            surface,
            host,
            scheduler,
            log,
        };
        fixture.run(Duration::from_millis(1));
        fixture.clear();
        fixture
    }

    /// Advance virtual time and run whatever became due, including tasks
    /// posted by those tasks
    fn run(&mut self, by: Duration) {
        let mut tasks = self.scheduler.advance(by);
        while !tasks.is_empty() {
            for task in tasks {
                self.surface.run_task(task);
            }
            tasks = self.scheduler.advance(Duration::ZERO);
        }
    }

    fn flush(&mut self) {
        self.run(Duration::from_millis(1));
    }

    fn send(&mut self, status: u8, data1: u8, data2: u8) {
        self.surface.on_raw_message(status, data1, data2);
    }

    fn clear(&mut self) {
        let mut recorded = self.host.recorded.lock();
        recorded.sent.clear();
        recorded.executed.clear();
        recorded.notes.clear();
        recorded.keyboard.clear();
        recorded.cells.clear();
        self.log.lock().clear();
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.host.recorded.lock().sent.clone()
    }

    fn executed(&self) -> Vec<(FlexiCommand, ControlValue)> {
        self.host.recorded.lock().executed.clone()
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

fn slot(slot_type: SlotType, number: u8, channel: u8, command: FlexiCommand) -> CommandSlot {
    CommandSlot {
        slot_type,
        number,
        midi_channel: channel,
        command,
        ..CommandSlot::default()
    }
}

// =============================================================================
// Flush
// =============================================================================

#[test]
fn test_initial_flush_renders_lights_grid_and_display() {
    let mut fixture = Fixture::new();
    fixture.surface.force_flush();

    let sent = fixture.sent();
    assert!(sent.contains(&vec![0x90, 94, 3]), "play light from view color");
    assert!(sent.contains(&vec![0x90, 95, 0]), "record light defaults to off");
    assert!(sent.contains(&vec![0x99, 36, 5]), "first pad drawn by view");
    assert!(sent.contains(&vec![0x99, 37, 0]));

    let cells = fixture.host.recorded.lock().cells.clone();
    assert!(cells.contains(&(0, 0, "Play".to_string())));
    assert!(cells.contains(&(1, 0, "Volume".to_string())));
}

#[test]
fn test_active_mode_colors_lights_before_view() {
    let mut fixture = Fixture::new();
    fixture.surface.register_mode(ARM, Box::new(ArmMode));
    fixture.surface.set_active_mode(ARM);
    fixture.clear();
    fixture.surface.force_flush();

    let sent = fixture.sent();
    assert!(sent.contains(&vec![0x90, 95, 11]), "record light from mode color");
    assert!(sent.contains(&vec![0x90, 94, 3]), "mode defers play to the view");
}

#[test]
fn test_flush_requests_coalesce_into_one_render() {
    let mut fixture = Fixture::new();
    let before = fixture.surface.flush_scheduler().render_count();

    for _ in 0..5 {
        fixture.surface.request_flush();
    }
    assert_eq!(fixture.scheduler.count(|t| *t == Task::Flush), 1);

    fixture.flush();
    assert_eq!(fixture.surface.flush_scheduler().render_count(), before + 1);
    assert_eq!(fixture.scheduler.count(|t| *t == Task::Flush), 0);
}

#[test]
fn test_flush_sends_only_changes() {
    let mut fixture = Fixture::new();
    fixture.surface.request_flush();
    fixture.flush();
    assert!(fixture.sent().is_empty());
    assert!(fixture.host.recorded.lock().cells.is_empty());
}

#[test]
fn test_render_fault_skips_only_that_light() {
    let mut fixture = Fixture::new();
    fixture.surface.force_flush();

    let sent = fixture.sent();
    assert!(!sent.iter().any(|m| m[0] == 0x90 && m[1] == 93), "stop color failed");
    assert!(sent.contains(&vec![0x90, 94, 3]));
    assert!(sent.contains(&vec![0x90, 89, 0]), "click led still written");
}

#[test]
fn test_force_flush_rewrites_unchanged_lights() {
    let mut fixture = Fixture::new();
    fixture.surface.force_flush();
    let first = fixture.sent().len();
    fixture.clear();

    fixture.surface.force_flush();
    assert_eq!(fixture.sent().len(), first);
    assert!(!fixture.surface.flush_scheduler().is_armed());
}

// =============================================================================
// Dispatch
// =============================================================================

#[test]
fn test_unhandled_status_is_dropped() {
    let mut fixture = Fixture::new();
    fixture.send(0xF8, 0, 0);
    fixture.send(0xF0, 0x7F, 0x7F);
    fixture.flush();

    assert!(fixture.executed().is_empty());
    assert!(fixture.log().is_empty());
}

#[test]
fn test_learned_cc_slot_executes_only_on_its_channel() {
    let mut fixture = Fixture::new();
    fixture.surface.on_settings(SettingsEvent::SelectSlot(5));
    // Selector echoes are ignored until the settle window closes
    fixture.run(Duration::from_millis(600));
    assert!(!fixture.surface.flexi().is_settling());
    fixture.surface.on_settings(SettingsEvent::Function {
        category: CommandCategory::Transport,
        command: FlexiCommand::TransportPlay,
    });
    fixture.surface.on_settings(SettingsEvent::StartLearn);

    // Captured, not dispatched
    fixture.send(0xB0, 70, 127);
    assert!(fixture.executed().is_empty());
    fixture.surface.on_settings(SettingsEvent::CommitLearn);

    let learned = *fixture.surface.flexi().slot(5).unwrap();
    assert_eq!(learned.slot_type, SlotType::Cc);
    assert_eq!(learned.number, 70);
    assert_eq!(learned.midi_channel, 0);
    assert_eq!(learned.command, FlexiCommand::TransportPlay);

    fixture.send(0xB0, 70, 127);
    assert_eq!(
        fixture.executed(),
        vec![(FlexiCommand::TransportPlay, ControlValue::Absolute(127))]
    );

    fixture.send(0xB1, 70, 127);
    assert_eq!(fixture.executed().len(), 1);
}

#[test]
fn test_learn_swallows_bound_button() {
    let mut fixture = Fixture::new();
    fixture.surface.on_settings(SettingsEvent::StartLearn);
    fixture.send(0x90, 94, 127);
    fixture.send(0x80, 94, 0);

    assert!(fixture.log().is_empty());
    assert!(fixture.executed().is_empty());
    assert_eq!(
        fixture.surface.flexi().learn_state(),
        crate::flexi::LearnState::Captured(crate::flexi::LearnCapture {
            slot_type: SlotType::Note,
            number: 94,
            channel: 0,
        })
    );
}

#[test]
fn test_button_reaches_view_and_executes() {
    let mut fixture = Fixture::new();
    fixture.send(0x90, 94, 127);
    fixture.send(0x90, 94, 0);

    assert_eq!(fixture.log(), vec!["play:play:Down(127)", "play:play:Up"]);
    assert_eq!(
        fixture.executed(),
        vec![(FlexiCommand::TransportPlay, ControlValue::Absolute(127))]
    );
}

#[test]
fn test_shift_overlay_relays_and_restores() {
    let mut fixture = Fixture::new();
    fixture.send(0x90, 70, 127);
    assert_eq!(fixture.surface.views().active_id(), Some(SHIFT));

    // Unhandled by the overlay, relayed to the view below
    fixture.send(0x90, 93, 127);
    assert!(fixture.log().contains(&"play:stop:Down(127)".to_string()));

    fixture.send(0x90, 94, 127);
    assert_eq!(
        fixture.executed(),
        vec![(FlexiCommand::TransportRestart, ControlValue::Absolute(127))]
    );

    fixture.flush();
    assert!(fixture.sent().contains(&vec![0x90, 94, 9]));

    fixture.send(0x90, 70, 0);
    assert_eq!(fixture.surface.views().active_id(), Some(PLAY));
    assert!(!fixture.surface.views().is_temporary());
}

#[test]
fn test_long_press_fires_while_held() {
    let mut fixture = Fixture::new();
    fixture.send(0x90, 24, 127);
    fixture.run(Duration::from_millis(400));

    let long: Vec<_> = fixture.log().into_iter().filter(|l| l.starts_with("play:long")).collect();
    assert_eq!(long, vec!["play:long:select1"]);
}

#[test]
fn test_long_press_stale_after_release() {
    let mut fixture = Fixture::new();
    fixture.send(0x90, 25, 127);
    fixture.send(0x90, 25, 0);
    fixture.run(Duration::from_millis(400));
    assert!(!fixture.log().iter().any(|l| l.starts_with("play:long")));

    // Re-press: only the latest press can fire
    fixture.send(0x90, 25, 127);
    fixture.send(0x90, 25, 0);
    fixture.send(0x90, 25, 127);
    fixture.run(Duration::from_millis(400));
    let long = fixture.log().iter().filter(|l| l.starts_with("play:long")).count();
    assert_eq!(long, 1);
}

#[test]
fn test_consumed_release_is_swallowed_once() {
    let mut fixture = Fixture::new();
    fixture.send(0x90, 26, 127);
    fixture.send(0x90, 26, 0);
    assert_eq!(fixture.log(), vec!["play:select3:Down(127)"]);

    // The next press consumes again, so only downs ever show
    fixture.send(0x90, 26, 127);
    fixture.send(0x90, 26, 0);
    assert_eq!(
        fixture.log(),
        vec!["play:select3:Down(127)", "play:select3:Down(127)"]
    );
}

#[test]
fn test_fader_goes_to_mode_and_knob_relays_to_view() {
    let mut fixture = Fixture::new();
    fixture.send(0xE0, 0, 64);
    assert_eq!(fixture.log(), vec!["volume:fader1:Value(Absolute14(8192))"]);

    fixture.log.lock().clear();
    fixture.send(0xB0, 16, 1);
    let log = fixture.log();
    assert_eq!(log.len(), 1);
    assert!(log[0].starts_with("play:knob1:Value(Relative("), "{}", log[0]);
}

#[test]
fn test_aftertouch_reaches_view() {
    let mut fixture = Fixture::new();
    fixture.send(0xA0, 60, 100);
    fixture.send(0xD0, 50, 0);
    assert_eq!(
        fixture.log(),
        vec!["play:aftertouch:Some(60):100", "play:aftertouch:None:50"]
    );
}

#[test]
fn test_keyboard_routing_and_suppression() {
    let mut fixture = Fixture::new();
    fixture
        .surface
        .flexi_mut()
        .assign(0, slot(SlotType::Note, 60, 0, FlexiCommand::TransportStop));

    fixture.send(0x90, 60, 100);
    assert_eq!(
        fixture.executed(),
        vec![(FlexiCommand::TransportStop, ControlValue::Absolute(100))]
    );

    fixture.send(0x90, 61, 100);
    assert_eq!(fixture.host.recorded.lock().notes, vec![(0, 61, 100)]);

    // Off the keyboard channel, unbound notes go to the view
    fixture.send(0x95, 50, 100);
    assert_eq!(fixture.log(), vec!["play:note:50"]);
}

#[test]
fn test_omni_keyboard_suppresses_slot_notes() {
    let mut fixture = Fixture::new();
    fixture
        .surface
        .on_settings(SettingsEvent::KeyboardChannel(KeyboardChannel::Omni));
    fixture
        .surface
        .flexi_mut()
        .assign(0, slot(SlotType::Note, 62, 5, FlexiCommand::TransportStop));

    fixture.send(0x93, 62, 90);
    assert!(fixture.host.recorded.lock().notes.is_empty());
    assert!(fixture.executed().is_empty());

    fixture.send(0x93, 63, 90);
    assert_eq!(fixture.host.recorded.lock().notes, vec![(3, 63, 90)]);
}

#[test]
fn test_keyboard_controller_routing() {
    let mut fixture = Fixture::new();
    fixture.send(0xB0, 1, 40);
    assert_eq!(fixture.host.recorded.lock().keyboard, vec![[0xB0, 1, 40]]);

    fixture.surface.on_settings(SettingsEvent::KeyboardRouting {
        modulation: true,
        sustain: false,
        pitchbend: true,
    });
    fixture.send(0xB0, 64, 127);
    assert_eq!(fixture.host.recorded.lock().keyboard.len(), 1);
}

#[test]
fn test_program_change_slot_then_view() {
    let mut fixture = Fixture::new();
    fixture
        .surface
        .flexi_mut()
        .assign(0, slot(SlotType::ProgramChange, 3, 0, FlexiCommand::SceneLaunch1));

    fixture.send(0xC0, 3, 0);
    assert_eq!(
        fixture.executed(),
        vec![(FlexiCommand::SceneLaunch1, ControlValue::Absolute(127))]
    );

    fixture.send(0xC0, 4, 0);
    assert_eq!(fixture.log(), vec!["play:pc:4"]);
}

#[test]
fn test_mmc_executes_slot_when_enabled() {
    let mut fixture = Fixture::new();
    fixture
        .surface
        .flexi_mut()
        .assign(0, slot(SlotType::Mmc, 2, 0, FlexiCommand::TransportPlay));

    fixture.surface.on_sysex(&[0xF0, 0x7F, 0x7F, 0x06, 0x02, 0xF7]);
    assert_eq!(
        fixture.executed(),
        vec![(FlexiCommand::TransportPlay, ControlValue::Absolute(127))]
    );

    let mut config = SurfaceConfig::default();
    config.flexi.enable_mmc = false;
    fixture.surface.apply_config(config);
    fixture
        .surface
        .flexi_mut()
        .assign(0, slot(SlotType::Mmc, 2, 0, FlexiCommand::TransportPlay));
    fixture.surface.on_sysex(&[0xF0, 0x7F, 0x7F, 0x06, 0x02, 0xF7]);
    assert_eq!(fixture.executed().len(), 1);
}

// =============================================================================
// Value feedback
// =============================================================================

#[test]
fn test_send_value_follows_host() {
    let mut fixture = Fixture::new();
    let mut feedback = slot(SlotType::Cc, 7, 2, FlexiCommand::TrackSetVolume);
    feedback.send_value = true;
    fixture.surface.flexi_mut().assign(0, feedback);
    fixture
        .host
        .recorded
        .lock()
        .values
        .insert(FlexiCommand::TrackSetVolume, 100);

    fixture.surface.request_flush();
    fixture.flush();
    assert_eq!(fixture.sent(), vec![vec![0xB2, 7, 100]]);

    fixture.clear();
    fixture.surface.request_flush();
    fixture.flush();
    assert!(fixture.sent().is_empty());

    fixture
        .host
        .recorded
        .lock()
        .values
        .insert(FlexiCommand::TrackSetVolume, 90);
    fixture.surface.request_flush();
    fixture.flush();
    assert_eq!(fixture.sent(), vec![vec![0xB2, 7, 90]]);
}

#[test]
fn test_send_value_when_received_echoes() {
    let mut fixture = Fixture::new();
    let mut echo = slot(SlotType::Cc, 20, 0, FlexiCommand::TrackSetPanorama);
    echo.send_value_when_received = true;
    fixture.surface.flexi_mut().assign(0, echo);

    fixture.send(0xB0, 20, 33);
    assert_eq!(fixture.sent(), vec![vec![0xB0, 20, 33]]);
}

// =============================================================================
// Mapping import
// =============================================================================

#[test]
fn test_import_failure_notifies_and_keeps_table() {
    let mut fixture = Fixture::new();
    fixture
        .surface
        .flexi_mut()
        .assign(0, slot(SlotType::Cc, 70, 0, FlexiCommand::TransportPlay));

    let result = fixture.surface.import_mapping_str("SLOT0_TYPE=1\n");
    assert!(result.is_err());
    assert_eq!(fixture.host.recorded.lock().notifications.len(), 1);
    assert_eq!(
        fixture.surface.flexi().slot(0).unwrap().command,
        FlexiCommand::TransportPlay
    );
}

#[test]
fn test_import_replaces_table() {
    let mut fixture = Fixture::new();
    let mut source = Fixture::new();
    source
        .surface
        .flexi_mut()
        .assign(3, slot(SlotType::Note, 48, 1, FlexiCommand::TransportStop));
    let text = source.surface.flexi().export_string();

    fixture.surface.import_mapping_str(&text).unwrap();
    fixture.send(0x91, 48, 127);
    assert_eq!(
        fixture.executed(),
        vec![(FlexiCommand::TransportStop, ControlValue::Absolute(127))]
    );
    assert!(fixture.host.recorded.lock().notifications.is_empty());
}
