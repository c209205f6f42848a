//! Control surface
//!
//! Composes the control registry, bindings, view and mode stacks, the Flexi
//! engine and the flush scheduler into one object driven by the event loop:
//! raw MIDI goes in through [`ControlSurface::on_raw_message`], deferred work
//! comes back through [`ControlSurface::run_task`].

mod dispatch;
pub mod flush;
pub mod output;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::SurfaceConfig;
use crate::control::{BindingTable, ControlRegistry, KnobMode, SurfaceLayout};
use crate::error::ImportError;
use crate::featuregroup::{FeatureGroupManager, ModeId, SurfaceHandler, SurfaceRequest, ViewId};
use crate::flexi::{CommandCategory, FlexiCommand, FlexiMappingEngine, KeyboardChannel, SlotType};
use crate::host::Host;
use crate::scheduler::{Scheduler, Task};

pub use flush::FlushScheduler;
pub use output::{DisplayBuffer, PadGrid, GRID_GROUP};

/// Typed edits coming from the settings surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsEvent {
    /// 0-based slot index
    SelectSlot(usize),
    SlotType(SlotType),
    Number(u8),
    MidiChannel(u8),
    KnobMode(KnobMode),
    SendValue(bool),
    SendValueWhenReceived(bool),
    /// A category selector changed
    Function {
        category: CommandCategory,
        command: FlexiCommand,
    },
    StartLearn,
    CommitLearn,
    CancelLearn,
    KeyboardChannel(KeyboardChannel),
    KeyboardRouting {
        modulation: bool,
        sustain: bool,
        pitchbend: bool,
    },
}

/// The dispatch core of one controller
pub struct ControlSurface {
    registry: ControlRegistry,
    bindings: BindingTable,
    views: FeatureGroupManager<ViewId>,
    modes: FeatureGroupManager<ModeId>,
    flexi: FlexiMappingEngine,
    flush: FlushScheduler,
    grid: PadGrid,
    display: DisplayBuffer,
    scheduler: Box<dyn Scheduler>,
    host: Box<dyn Host>,
    config: SurfaceConfig,
}

impl ControlSurface {
    pub fn new(
        layout: SurfaceLayout,
        config: SurfaceConfig,
        host: Box<dyn Host>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        let SurfaceLayout { registry, bindings } = layout;

        let grid_outputs = registry
            .group(GRID_GROUP)
            .into_iter()
            .filter_map(|id| registry.get(id).and_then(|c| c.output()))
            .collect();

        let flexi = FlexiMappingEngine::new(&config.flexi, config.keyboard.clone());
        let flush = FlushScheduler::new(Duration::from_millis(config.timing.flush_tick_ms));
        let display = DisplayBuffer::new(config.display.rows, config.display.cells);

        info!(
            "🎛️ Control surface ready: {} controls, {} slots",
            registry.len(),
            flexi.num_slots()
        );

        Self {
            registry,
            bindings,
            views: FeatureGroupManager::new("view"),
            modes: FeatureGroupManager::new("mode"),
            flexi,
            flush,
            grid: PadGrid::new(grid_outputs),
            display,
            scheduler,
            host,
            config,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn registry(&self) -> &ControlRegistry {
        &self.registry
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut BindingTable {
        &mut self.bindings
    }

    pub fn views(&self) -> &FeatureGroupManager<ViewId> {
        &self.views
    }

    pub fn modes(&self) -> &FeatureGroupManager<ModeId> {
        &self.modes
    }

    pub fn flexi(&self) -> &FlexiMappingEngine {
        &self.flexi
    }

    pub fn flexi_mut(&mut self) -> &mut FlexiMappingEngine {
        &mut self.flexi
    }

    pub fn flush_scheduler(&self) -> &FlushScheduler {
        &self.flush
    }

    pub fn display(&self) -> &DisplayBuffer {
        &self.display
    }

    pub fn grid(&self) -> &PadGrid {
        &self.grid
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    // =========================================================================
    // Views and modes
    // =========================================================================

    pub fn register_view(&mut self, id: ViewId, handler: Box<dyn SurfaceHandler>) {
        self.views.register(id, handler);
    }

    pub fn register_mode(&mut self, id: ModeId, handler: Box<dyn SurfaceHandler>) {
        self.modes.register(id, handler);
    }

    pub fn set_active_view(&mut self, id: ViewId) {
        if self.views.set_active(id) {
            self.request_flush();
        }
    }

    pub fn set_temporary_view(&mut self, id: ViewId) {
        if self.views.set_temporary(id) {
            self.request_flush();
        }
    }

    pub fn restore_view(&mut self) {
        if self.views.restore() {
            self.request_flush();
        }
    }

    pub fn set_active_mode(&mut self, id: ModeId) {
        if self.modes.set_active(id) {
            self.request_flush();
        }
    }

    pub fn set_temporary_mode(&mut self, id: ModeId) {
        if self.modes.set_temporary(id) {
            self.request_flush();
        }
    }

    pub fn restore_mode(&mut self) {
        if self.modes.restore() {
            self.request_flush();
        }
    }

    /// Apply what handlers asked for while processing an event
    fn apply_requests(&mut self, requests: Vec<SurfaceRequest>) {
        for request in requests {
            match request {
                SurfaceRequest::SetActiveView(id) => self.set_active_view(id),
                SurfaceRequest::SetTemporaryView(id) => self.set_temporary_view(id),
                SurfaceRequest::RestoreView => self.restore_view(),
                SurfaceRequest::SetActiveMode(id) => self.set_active_mode(id),
                SurfaceRequest::SetTemporaryMode(id) => self.set_temporary_mode(id),
                SurfaceRequest::RestoreMode => self.restore_mode(),
                SurfaceRequest::Execute(command, value) => {
                    self.host.execute_command(command, value);
                    self.request_flush();
                }
                SurfaceRequest::SendMidi(bytes) => self.host.send_midi(&bytes),
                SurfaceRequest::Consume(id) => match self.registry.get_mut(id) {
                    Some(control) => control.state.consumed = true,
                    None => debug!("Cannot consume unknown control {}", id),
                },
                SurfaceRequest::Flush => self.request_flush(),
            }
        }
    }

    // =========================================================================
    // Scheduled tasks
    // =========================================================================

    /// Run a task posted earlier through the scheduler
    pub fn run_task(&mut self, task: Task) {
        match task {
            Task::Flush => self.run_flush(),
            Task::LongPress { control, press_seq } => self.on_long_press_check(control, press_seq),
            Task::CommandSettled { generation } => self.flexi.finish_settle(generation),
            Task::LearnExpired { generation } => {
                self.flexi.expire_learn(generation);
                self.request_flush();
            }
        }
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Apply one settings edit
    pub fn on_settings(&mut self, event: SettingsEvent) {
        debug!("Settings: {:?}", event);
        let scheduler = self.scheduler.as_ref();
        match event {
            SettingsEvent::SelectSlot(index) => {
                self.flexi.select_slot(index, scheduler);
            }
            SettingsEvent::SlotType(slot_type) => self.flexi.set_slot_type(slot_type),
            SettingsEvent::Number(number) => self.flexi.set_number(number),
            SettingsEvent::MidiChannel(channel) => self.flexi.set_midi_channel(channel),
            SettingsEvent::KnobMode(mode) => self.flexi.set_knob_mode(mode),
            SettingsEvent::SendValue(enabled) => self.flexi.set_send_value(enabled),
            SettingsEvent::SendValueWhenReceived(enabled) => {
                self.flexi.set_send_value_when_received(enabled)
            }
            SettingsEvent::Function { category, command } => {
                self.flexi.on_function_selected(category, command, scheduler);
            }
            SettingsEvent::StartLearn => self.flexi.start_learn(scheduler),
            SettingsEvent::CommitLearn => {
                self.flexi.commit_learn();
            }
            SettingsEvent::CancelLearn => self.flexi.cancel_learn(),
            SettingsEvent::KeyboardChannel(channel) => {
                self.flexi.set_keyboard_channel(channel);
                self.config.keyboard.channel = channel;
            }
            SettingsEvent::KeyboardRouting {
                modulation,
                sustain,
                pitchbend,
            } => {
                self.config.keyboard.route_modulation = modulation;
                self.config.keyboard.route_sustain = sustain;
                self.config.keyboard.route_pitchbend = pitchbend;
                self.flexi.set_keyboard(self.config.keyboard.clone());
            }
        }
        self.request_flush();
    }

    /// Take over a reloaded configuration
    ///
    /// Layout and display geometry are fixed at construction.
    pub fn apply_config(&mut self, config: SurfaceConfig) {
        if config.layout_csv != self.config.layout_csv || config.display != self.config.display {
            warn!("Layout and display changes need a restart");
        }
        self.flexi.apply_config(&config.flexi, config.keyboard.clone());
        self.flush
            .set_tick(Duration::from_millis(config.timing.flush_tick_ms));
        self.config = config;
        info!("Applied new configuration");
        self.request_flush();
    }

    // =========================================================================
    // Mapping files
    // =========================================================================

    /// Replace the slot table from mapping text
    ///
    /// On failure the table is unchanged and the user is notified.
    pub fn import_mapping_str(&mut self, text: &str) -> Result<(), ImportError> {
        match self.flexi.import_str(text, self.scheduler.as_ref()) {
            Ok(()) => {
                self.request_flush();
                Ok(())
            }
            Err(e) => {
                error!("Could not import mapping: {}", e);
                self.host
                    .notify("Could not import from file. Check the log for details.");
                Err(e)
            }
        }
    }

    pub async fn import_mapping(&mut self, path: impl AsRef<Path>) -> Result<(), ImportError> {
        let path = path.as_ref();
        let text = match FlexiMappingEngine::read_mapping(path).await {
            Ok(text) => text,
            Err(e) => {
                error!("Could not read mapping file {}: {}", path.display(), e);
                self.host
                    .notify("Could not import from file. Check the log for details.");
                return Err(e);
            }
        };
        self.import_mapping_str(&text)?;
        info!("📂 Imported mapping from {}", path.display());
        Ok(())
    }
}
