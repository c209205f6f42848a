//! SurfaceHandle - public API of the SurfaceActor
//!
//! Fire-and-forget methods for MIDI input and settings edits, async methods
//! with oneshot replies for queries and file operations.

use std::collections::BTreeSet;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::commands::{SelectedSlot, SurfaceCommand};
use crate::config::watcher::ConfigWatcher;
use crate::config::SurfaceConfig;
use crate::error::ImportError;
use crate::featuregroup::{ModeId, ViewId};
use crate::flexi::{FlexiCommand, NoteMapReader};
use crate::surface::SettingsEvent;

/// Cloneable handle to a running surface
///
/// Sends after the actor stopped are dropped silently; queries then return
/// `None` or an empty value.
#[derive(Clone)]
pub struct SurfaceHandle {
    cmd_tx: mpsc::UnboundedSender<SurfaceCommand>,
}

impl SurfaceHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<SurfaceCommand>) -> Self {
        Self { cmd_tx }
    }

    fn send(&self, cmd: SurfaceCommand) {
        let _ = self.cmd_tx.send(cmd);
    }

    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    // =========================================================================
    // Hot path (fire-and-forget)
    // =========================================================================

    /// Raw 3-byte message from the controller
    pub fn on_midi(&self, status: u8, data1: u8, data2: u8) {
        self.send(SurfaceCommand::Midi { status, data1, data2 });
    }

    pub fn on_sysex(&self, data: Vec<u8>) {
        self.send(SurfaceCommand::SysEx(data));
    }

    pub fn settings(&self, event: SettingsEvent) {
        self.send(SurfaceCommand::Settings(event));
    }

    pub fn set_active_view(&self, id: ViewId) {
        self.send(SurfaceCommand::SetActiveView(id));
    }

    pub fn set_active_mode(&self, id: ModeId) {
        self.send(SurfaceCommand::SetActiveMode(id));
    }

    pub fn request_flush(&self) {
        self.send(SurfaceCommand::RequestFlush);
    }

    /// Rewrite all hardware state, e.g. after the controller reconnected
    pub fn force_flush(&self) {
        self.send(SurfaceCommand::ForceFlush);
    }

    pub fn apply_config(&self, config: SurfaceConfig) {
        self.send(SurfaceCommand::ApplyConfig(Box::new(config)));
    }

    pub fn shutdown(&self) {
        self.send(SurfaceCommand::Shutdown);
    }

    // =========================================================================
    // Mapping files
    // =========================================================================

    pub async fn import_mapping(&self, path: impl AsRef<Path>) -> Result<(), ImportError> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SurfaceCommand::ImportMapping {
            path: path.as_ref().to_path_buf(),
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return Err(ImportError::Stopped);
        }
        response_rx.await.unwrap_or(Err(ImportError::Stopped))
    }

    pub async fn export_mapping(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SurfaceCommand::ExportMapping {
            path: path.as_ref().to_path_buf(),
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_err() {
            anyhow::bail!("Surface is not running");
        }
        response_rx
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("Surface stopped during export")))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn selected_slot(&self) -> Option<SelectedSlot> {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(SurfaceCommand::GetSelectedSlot { response: response_tx })
            .ok()?;
        response_rx.await.ok()
    }

    /// Commands bound in at least one slot
    pub async fn mapped_commands(&self) -> BTreeSet<FlexiCommand> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SurfaceCommand::GetMappedCommands { response: response_tx })
            .is_err()
        {
            return BTreeSet::new();
        }
        response_rx.await.unwrap_or_default()
    }

    pub async fn active_view(&self) -> Option<ViewId> {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(SurfaceCommand::GetActiveView { response: response_tx })
            .ok()?;
        response_rx.await.ok().flatten()
    }

    /// Reader for the note suppression map, usable from any thread
    pub async fn note_map_reader(&self) -> Option<NoteMapReader> {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(SurfaceCommand::GetNoteMapReader { response: response_tx })
            .ok()?;
        response_rx.await.ok()
    }

    // =========================================================================
    // Hot reload
    // =========================================================================

    /// Forward every reloaded config to the surface until either side closes
    pub fn follow_config(&self, mut watcher: ConfigWatcher) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            while let Some(config) = watcher.next_config().await {
                if !handle.is_running() {
                    break;
                }
                info!("🔄 Applying reloaded configuration");
                handle.apply_config(config);
            }
            debug!("Config forwarding stopped");
        })
    }
}
