//! Views and modes
//!
//! A feature group is a handler owning part of the surface: a View owns the
//! buttons, lights and pad grid, a Mode owns the continuous controls. Each
//! kind lives in its own [`FeatureGroupManager`] with one active entry and an
//! optional temporary overlay.

pub mod manager;

use std::fmt;

use crate::control::{ControlId, ControlRegistry, ControlValue, LogicalControl};
use crate::flexi::FlexiCommand;
use crate::surface::output::{DisplayBuffer, PadGrid};

pub use manager::{FeatureGroupManager, StackState};

/// View identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub &'static str);

/// Mode identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModeId(pub &'static str);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Semantic event for a bound control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Button pressed with velocity
    Down(u8),
    Up,
    /// Continuous control moved
    Value(ControlValue),
}

/// What a handler did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Handled,
    /// Pass the event to the handler below the overlay (or the View for Modes)
    Relay,
    Ignored,
}

/// Surface changes requested by a handler, applied after it returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceRequest {
    SetActiveView(ViewId),
    SetTemporaryView(ViewId),
    RestoreView,
    SetActiveMode(ModeId),
    SetTemporaryMode(ModeId),
    RestoreMode,
    Execute(FlexiCommand, ControlValue),
    SendMidi(Vec<u8>),
    /// Swallow the next release of a button
    Consume(ControlId),
    Flush,
}

/// What a handler can see and ask for while handling an event
pub struct HandlerContext<'a> {
    pub registry: &'a ControlRegistry,
    requests: Vec<SurfaceRequest>,
}

impl<'a> HandlerContext<'a> {
    pub fn new(registry: &'a ControlRegistry) -> Self {
        Self {
            registry,
            requests: Vec::new(),
        }
    }

    pub fn request(&mut self, request: SurfaceRequest) {
        self.requests.push(request);
    }

    pub fn set_active_view(&mut self, id: ViewId) {
        self.request(SurfaceRequest::SetActiveView(id));
    }

    pub fn set_temporary_view(&mut self, id: ViewId) {
        self.request(SurfaceRequest::SetTemporaryView(id));
    }

    pub fn restore_view(&mut self) {
        self.request(SurfaceRequest::RestoreView);
    }

    pub fn set_active_mode(&mut self, id: ModeId) {
        self.request(SurfaceRequest::SetActiveMode(id));
    }

    pub fn execute(&mut self, command: FlexiCommand, value: ControlValue) {
        self.request(SurfaceRequest::Execute(command, value));
    }

    pub fn send_midi(&mut self, bytes: Vec<u8>) {
        self.request(SurfaceRequest::SendMidi(bytes));
    }

    pub fn consume(&mut self, control: ControlId) {
        self.request(SurfaceRequest::Consume(control));
    }

    pub fn request_flush(&mut self) {
        self.request(SurfaceRequest::Flush);
    }

    pub fn into_requests(self) -> Vec<SurfaceRequest> {
        self.requests
    }
}

/// Capability interface of a View or Mode
///
/// Every method has a neutral default so handlers only implement what they
/// own. Render methods return errors instead of panicking; the flush logs
/// them per element and carries on.
pub trait SurfaceHandler: Send {
    fn name(&self) -> &str;

    fn on_activate(&mut self) {}

    fn on_deactivate(&mut self) {}

    fn on_control_event(
        &mut self,
        _control: &LogicalControl,
        _event: ControlEvent,
        _ctx: &mut HandlerContext<'_>,
    ) -> EventOutcome {
        EventOutcome::Ignored
    }

    fn on_long_press(&mut self, _control: &LogicalControl, _ctx: &mut HandlerContext<'_>) -> EventOutcome {
        EventOutcome::Ignored
    }

    /// Unbound note (grid or keyboard)
    fn on_note(&mut self, _channel: u8, _note: u8, _velocity: u8, _ctx: &mut HandlerContext<'_>) -> EventOutcome {
        EventOutcome::Ignored
    }

    /// Poly (`note` set) or channel aftertouch
    fn on_aftertouch(&mut self, _note: Option<u8>, _value: u8, _ctx: &mut HandlerContext<'_>) {}

    fn on_program_change(&mut self, _channel: u8, _program: u8, _ctx: &mut HandlerContext<'_>) {}

    /// Light value for a control; `Ok(None)` defers to the handler below
    fn color(&self, _control: &LogicalControl) -> anyhow::Result<Option<u8>> {
        Ok(None)
    }

    fn draw_grid(&self, _grid: &mut PadGrid) -> anyhow::Result<()> {
        Ok(())
    }

    fn update_display(&self, _display: &mut DisplayBuffer) -> anyhow::Result<()> {
        Ok(())
    }
}
