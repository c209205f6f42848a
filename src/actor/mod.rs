//! SurfaceActor - event loop owning the control surface
//!
//! All input and every scheduled task is processed on one tokio task, so the
//! surface itself needs no locking. Callers talk to it through a cloneable
//! [`SurfaceHandle`].

mod commands;
mod handle;

pub use commands::{SelectedSlot, SurfaceCommand};
pub use handle::SurfaceHandle;

use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::config::SurfaceConfig;
use crate::control::SurfaceLayout;
use crate::host::Host;
use crate::scheduler::{Task, TokioScheduler};
use crate::surface::ControlSurface;

/// Actor owning one [`ControlSurface`]
///
/// ```text
/// command_rx ──┐
///              ├──> SurfaceActor ──> ControlSurface ──> Host
/// task_rx ─────┘         ▲                  │
///                        └── TokioScheduler ┘
/// ```
pub struct SurfaceActor {
    surface: ControlSurface,
    command_rx: mpsc::UnboundedReceiver<SurfaceCommand>,
    task_rx: mpsc::UnboundedReceiver<Task>,
    /// Messages handled since start
    processed: u64,
}

impl SurfaceActor {
    /// Build the surface, let `setup` register views and modes, and start
    /// the loop
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(
        layout: SurfaceLayout,
        config: SurfaceConfig,
        host: Box<dyn Host>,
        setup: F,
    ) -> SurfaceHandle
    where
        F: FnOnce(&mut ControlSurface),
    {
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();
        let (task_tx, task_rx) = mpsc::unbounded_channel();

        let scheduler = TokioScheduler::new(task_tx);
        let mut surface = ControlSurface::new(layout, config, host, Box::new(scheduler));
        setup(&mut surface);

        let actor = SurfaceActor {
            surface,
            command_rx,
            task_rx,
            processed: 0,
        };
        tokio::spawn(actor.run());

        info!("🚀 SurfaceActor spawned");
        SurfaceHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        debug!("SurfaceActor run loop started");
        self.load_mapping_file().await;
        self.surface.force_flush();

        loop {
            tokio::select! {
                Some(task) = self.task_rx.recv() => {
                    trace!(?task, "Running task");
                    self.surface.run_task(task);
                }
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("All surface handles dropped");
                        break;
                    };
                    self.processed += 1;
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }
            }
        }

        info!("SurfaceActor stopped after {} commands", self.processed);
    }

    /// Returns false when the loop should stop
    async fn handle_command(&mut self, cmd: SurfaceCommand) -> bool {
        trace!(?cmd, "Processing command");

        match cmd {
            // Hot path
            SurfaceCommand::Midi { status, data1, data2 } => {
                self.surface.on_raw_message(status, data1, data2);
            }
            SurfaceCommand::SysEx(data) => self.surface.on_sysex(&data),
            SurfaceCommand::Settings(event) => self.surface.on_settings(event),
            SurfaceCommand::SetActiveView(id) => self.surface.set_active_view(id),
            SurfaceCommand::SetActiveMode(id) => self.surface.set_active_mode(id),
            SurfaceCommand::RequestFlush => self.surface.request_flush(),
            SurfaceCommand::ForceFlush => self.surface.force_flush(),
            SurfaceCommand::ApplyConfig(config) => self.surface.apply_config(*config),

            // Request-response
            SurfaceCommand::ImportMapping { path, response } => {
                let result = self.surface.import_mapping(&path).await;
                let _ = response.send(result);
            }
            SurfaceCommand::ExportMapping { path, response } => {
                let result = self.surface.flexi().export_to(&path).await;
                let _ = response.send(result);
            }
            SurfaceCommand::GetSelectedSlot { response } => {
                let flexi = self.surface.flexi();
                let _ = response.send(SelectedSlot {
                    index: flexi.selected_index(),
                    slot: *flexi.selected_slot(),
                    learn: flexi.learn_state(),
                });
            }
            SurfaceCommand::GetMappedCommands { response } => {
                let _ = response.send(self.surface.flexi().mapped_commands());
            }
            SurfaceCommand::GetActiveView { response } => {
                let _ = response.send(self.surface.views().active_id());
            }
            SurfaceCommand::GetNoteMapReader { response } => {
                // Build once so readers see a current map right away
                self.surface.flexi().note_map();
                let _ = response.send(self.surface.flexi().note_map_reader());
            }

            SurfaceCommand::Shutdown => {
                info!("SurfaceActor received shutdown command");
                return false;
            }
        }
        true
    }

    /// Import the configured mapping file if it exists
    async fn load_mapping_file(&mut self) {
        let Some(path) = self.surface.config().flexi.mapping_file.clone().map(PathBuf::from) else {
            return;
        };
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("No mapping file at {}", path.display());
            return;
        }
        // Failures are logged and reported through the host
        let _ = self.surface.import_mapping(&path).await;
    }
}
