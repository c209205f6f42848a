//! Input dispatch
//!
//! Classifies raw messages by status nibble and walks the routing chain:
//! learn capture, bound controls, Flexi slots, keyboard note input and
//! finally the active view.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::ControlSurface;
use crate::control::{ControlId, ControlKind, ControlValue, Selector};
use crate::featuregroup::{ControlEvent, EventOutcome, FeatureGroupManager, HandlerContext, SurfaceHandler};
use crate::flexi::{SlotType, SUPPRESSED};
use crate::midi::{self, status, MidiKind, MidiMessage, MmcCommand};
use crate::scheduler::Task;

/// Modulation wheel controller
const CC_MODULATION: u8 = 1;
/// Sustain pedal controller
const CC_SUSTAIN: u8 = 64;

/// Call the active handler, then the one below a relaying overlay
fn deliver<K, F>(manager: &mut FeatureGroupManager<K>, ctx: &mut HandlerContext<'_>, mut call: F) -> EventOutcome
where
    K: Copy + Eq + Hash + fmt::Display,
    F: FnMut(&mut dyn SurfaceHandler, &mut HandlerContext<'_>) -> EventOutcome,
{
    let outcome = match manager.active_mut() {
        Some(handler) => call(handler, ctx),
        None => return EventOutcome::Ignored,
    };
    if outcome != EventOutcome::Relay || !manager.is_temporary() {
        return outcome;
    }
    match manager.active_ignore_temporary_mut() {
        Some(handler) => call(handler, ctx),
        None => outcome,
    }
}

impl ControlSurface {
    /// Entry point for every 3-byte channel message
    pub fn on_raw_message(&mut self, status: u8, data1: u8, data2: u8) {
        let Some(message) = MidiMessage::from_parts(status, data1, data2) else {
            warn!("Unhandled midi status: 0x{:02X}", status);
            return;
        };
        trace!("MIDI in: {}", message);

        if self.capture_learn(&message) {
            return;
        }

        match message {
            MidiMessage::NoteOn { channel, note, velocity } => self.handle_note(channel, note, velocity),
            MidiMessage::NoteOff { channel, note, .. } => self.handle_note(channel, note, 0),
            MidiMessage::PolyPressure { note, pressure, .. } => self.handle_aftertouch(Some(note), pressure),
            MidiMessage::ChannelPressure { pressure, .. } => self.handle_aftertouch(None, pressure),
            MidiMessage::ControlChange { channel, cc, value } => self.handle_cc(channel, cc, value),
            MidiMessage::ProgramChange { channel, program } => self.handle_program_change(channel, program),
            MidiMessage::PitchBend { channel, value } => self.handle_pitch_bend(channel, value),
            MidiMessage::SysEx { .. } => {}
        }
    }

    /// Entry point for SysEx; only MIDI Machine Control is understood
    pub fn on_sysex(&mut self, data: &[u8]) {
        let Some(mmc) = MmcCommand::parse(data) else {
            trace!("Ignoring SysEx: {}", midi::format_hex(data));
            return;
        };

        if self.flexi.capture_learn(SlotType::Mmc, mmc.command, 0) {
            self.request_flush();
            return;
        }
        if !self.flexi.enable_mmc() {
            debug!("MMC disabled, dropping command {}", mmc.command);
            return;
        }
        match self.flexi.find_slot(SlotType::Mmc, mmc.command, 0) {
            Some(index) => self.execute_slot(index, ControlValue::Absolute(127)),
            None => debug!("Unresolved MMC command {}", mmc.command),
        }
    }

    /// While learning, addressable messages are captured instead of dispatched
    fn capture_learn(&mut self, message: &MidiMessage) -> bool {
        if !self.flexi.is_learning() {
            return false;
        }
        // Releases would overwrite the press with the same address
        if matches!(message, MidiMessage::NoteOff { .. }) {
            return true;
        }
        let Some((kind, number, channel)) = message.address() else {
            return false;
        };
        if self.flexi.capture_learn(SlotType::from_midi_kind(kind), number, channel) {
            self.request_flush();
            return true;
        }
        false
    }

    // =========================================================================
    // Notes
    // =========================================================================

    fn handle_note(&mut self, channel: u8, note: u8, velocity: u8) {
        let selector = Selector::new(MidiKind::Note, channel, note);
        if let Some(id) = self.bindings.resolve(&selector) {
            self.handle_bound_note(id, velocity);
            return;
        }

        if let Some(index) = self.flexi.find_slot(SlotType::Note, note, channel) {
            if let Some(value) = self.flexi.decode_value(index, velocity) {
                self.execute_slot(index, value);
            }
            return;
        }

        if self.flexi.keyboard().channel.accepts(channel) {
            let map = self.flexi.note_map();
            let mapped = map[(note & 0x7F) as usize];
            if mapped == SUPPRESSED {
                trace!("Note {} suppressed from note input", note);
            } else {
                self.host.route_note(channel, mapped as u8, velocity);
            }
            return;
        }

        let outcome = self.dispatch_to_view(|view, ctx| view.on_note(channel, note, velocity, ctx));
        if outcome == EventOutcome::Ignored {
            debug!("Unresolved note {} ch:{}", note, channel + 1);
        }
    }

    fn handle_bound_note(&mut self, id: ControlId, velocity: u8) {
        let Some(kind) = self.registry.get(id).map(|c| c.kind()) else {
            return;
        };
        match kind {
            ControlKind::Button => self.button_event(id, velocity),
            // Touch sensors of faders and knobs
            ControlKind::Continuous => {
                let touched = velocity > 0;
                if let Some(control) = self.registry.get_mut(id) {
                    control.state.touched = touched;
                }
                let event = if touched { ControlEvent::Down(velocity) } else { ControlEvent::Up };
                self.continuous_event(id, event);
            }
            ControlKind::Light => debug!("Input on output-only control {}", id),
        }
    }

    fn button_event(&mut self, id: ControlId, velocity: u8) {
        let long_press = Duration::from_millis(self.config.timing.long_press_ms);
        let Some(control) = self.registry.get_mut(id) else {
            return;
        };

        let event = if velocity > 0 {
            let state = &mut control.state;
            state.pressed = true;
            state.value = velocity;
            state.press_seq += 1;
            state.long_pressed = false;
            state.consumed = false;
            let press_seq = state.press_seq;
            self.scheduler
                .schedule(Task::LongPress { control: id, press_seq }, long_press);
            ControlEvent::Down(velocity)
        } else {
            let state = &mut control.state;
            state.pressed = false;
            state.value = 0;
            if state.consumed {
                state.consumed = false;
                trace!("Release of {} consumed", control.name());
                return;
            }
            ControlEvent::Up
        };

        let outcome = self.dispatch_control_to_view(id, event);
        if outcome == EventOutcome::Ignored {
            debug!("No view handled {:?} on {}", event, id);
        }
        self.request_flush();
    }

    /// Long-press check posted when a button went down
    pub(crate) fn on_long_press_check(&mut self, id: ControlId, press_seq: u64) {
        let Some(control) = self.registry.get_mut(id) else {
            return;
        };
        let state = &mut control.state;
        if !state.pressed || state.press_seq != press_seq || state.long_pressed {
            trace!("Stale long press check for {}", id);
            return;
        }
        state.long_pressed = true;

        let Some(control) = self.registry.get(id).cloned() else {
            return;
        };
        self.dispatch_to_view(|view, ctx| view.on_long_press(&control, ctx));
        self.request_flush();
    }

    // =========================================================================
    // Continuous messages
    // =========================================================================

    fn handle_cc(&mut self, channel: u8, cc: u8, value: u8) {
        let selector = Selector::new(MidiKind::Cc, channel, cc);
        if let Some(id) = self.bindings.resolve(&selector) {
            let Some(kind) = self.registry.get(id).map(|c| c.kind()) else {
                return;
            };
            match kind {
                ControlKind::Button => self.button_event(id, value),
                ControlKind::Continuous => {
                    if let Some(decoded) = self.bindings.decode(id, value) {
                        self.continuous_value(id, decoded);
                    }
                }
                ControlKind::Light => debug!("Input on output-only control {}", id),
            }
            return;
        }

        if let Some(index) = self.flexi.find_slot(SlotType::Cc, cc, channel) {
            if let Some(decoded) = self.flexi.decode_value(index, value) {
                self.execute_slot(index, decoded);
            }
            return;
        }

        let keyboard = self.flexi.keyboard();
        let routed = keyboard.channel.accepts(channel)
            && ((cc == CC_MODULATION && keyboard.route_modulation) || (cc == CC_SUSTAIN && keyboard.route_sustain));
        if routed {
            self.host
                .route_keyboard_message([status::CONTROL_CHANGE | channel, cc, value]);
            return;
        }

        debug!("Unresolved CC {} ch:{}", cc, channel + 1);
    }

    fn handle_pitch_bend(&mut self, channel: u8, value: u16) {
        let selector = Selector::new(MidiKind::PitchBend, channel, 0);
        if let Some(id) = self.bindings.resolve(&selector) {
            self.continuous_value(id, ControlValue::Absolute14(value));
            return;
        }

        if let Some(index) = self.flexi.find_slot(SlotType::PitchBend, 0, channel) {
            let absolute = self.flexi.slot(index).is_some_and(|s| s.knob_mode.is_absolute());
            let decoded = if absolute {
                Some(ControlValue::Absolute14(value))
            } else {
                self.flexi.decode_value(index, midi::convert::to_7bit(value))
            };
            if let Some(decoded) = decoded {
                self.execute_slot(index, decoded);
            }
            return;
        }

        let keyboard = self.flexi.keyboard();
        if keyboard.route_pitchbend && keyboard.channel.accepts(channel) {
            self.host.route_keyboard_message([
                status::PITCH_BEND | channel,
                (value & 0x7F) as u8,
                ((value >> 7) & 0x7F) as u8,
            ]);
            return;
        }

        debug!("Unresolved pitch bend ch:{}", channel + 1);
    }

    fn continuous_value(&mut self, id: ControlId, value: ControlValue) {
        if let Some(control) = self.registry.get_mut(id) {
            if let Some(v) = value.as_7bit() {
                control.state.value = v;
            }
        }
        self.continuous_event(id, ControlEvent::Value(value));
    }

    /// Continuous controls go to the active mode, then to the view when no
    /// mode is active or the mode relays
    fn continuous_event(&mut self, id: ControlId, event: ControlEvent) {
        let Some(control) = self.registry.get(id).cloned() else {
            return;
        };

        let mut ctx = HandlerContext::new(&self.registry);
        let mut outcome = deliver(&mut self.modes, &mut ctx, |mode, ctx| {
            mode.on_control_event(&control, event, ctx)
        });
        if outcome == EventOutcome::Relay || self.modes.active_id().is_none() {
            outcome = deliver(&mut self.views, &mut ctx, |view, ctx| {
                view.on_control_event(&control, event, ctx)
            });
        }
        let requests = ctx.into_requests();
        self.apply_requests(requests);

        if outcome == EventOutcome::Ignored {
            trace!("No handler for {:?} on {}", event, control.name());
        }
        self.request_flush();
    }

    // =========================================================================
    // Program change and aftertouch
    // =========================================================================

    fn handle_program_change(&mut self, channel: u8, program: u8) {
        if let Some(index) = self.flexi.find_slot(SlotType::ProgramChange, program, channel) {
            self.execute_slot(index, ControlValue::Absolute(127));
            return;
        }
        self.dispatch_to_view(|view, ctx| {
            view.on_program_change(channel, program, ctx);
            EventOutcome::Handled
        });
    }

    fn handle_aftertouch(&mut self, note: Option<u8>, value: u8) {
        self.dispatch_to_view(|view, ctx| {
            view.on_aftertouch(note, value, ctx);
            EventOutcome::Handled
        });
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Run a slot's command and echo the value if configured
    fn execute_slot(&mut self, index: usize, value: ControlValue) {
        let Some(slot) = self.flexi.slot(index).copied() else {
            return;
        };
        trace!("Slot {} -> {} ({:?})", index + 1, slot.command, value);
        self.host.execute_command(slot.command, value);
        if let Some(bytes) = self.flexi.echo(index, value) {
            self.host.send_midi(&bytes);
        }
        self.request_flush();
    }

    fn dispatch_control_to_view(&mut self, id: ControlId, event: ControlEvent) -> EventOutcome {
        let Some(control) = self.registry.get(id).cloned() else {
            return EventOutcome::Ignored;
        };
        self.dispatch_to_view(|view, ctx| view.on_control_event(&control, event, ctx))
    }

    fn dispatch_to_view<F>(&mut self, call: F) -> EventOutcome
    where
        F: FnMut(&mut dyn SurfaceHandler, &mut HandlerContext<'_>) -> EventOutcome,
    {
        let mut ctx = HandlerContext::new(&self.registry);
        let outcome = deliver(&mut self.views, &mut ctx, call);
        let requests = ctx.into_requests();
        self.apply_requests(requests);
        outcome
    }
}
