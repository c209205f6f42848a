//! Command enum for the surface actor
//!
//! Hot-path input (MIDI, settings edits) is fire-and-forget; queries and file
//! operations carry a oneshot sender for the reply.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::oneshot;

use crate::config::SurfaceConfig;
use crate::error::ImportError;
use crate::featuregroup::{ModeId, ViewId};
use crate::flexi::{CommandSlot, FlexiCommand, LearnState, NoteMapReader};
use crate::surface::SettingsEvent;

/// Snapshot of the slot being edited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedSlot {
    /// 0-based
    pub index: usize,
    pub slot: CommandSlot,
    pub learn: LearnState,
}

pub enum SurfaceCommand {
    // -------------------------------------------------------------------------
    // Hot path (no response)
    // -------------------------------------------------------------------------
    /// 3-byte channel message from the controller
    Midi { status: u8, data1: u8, data2: u8 },
    /// Complete SysEx message including framing bytes
    SysEx(Vec<u8>),
    Settings(SettingsEvent),
    SetActiveView(ViewId),
    SetActiveMode(ModeId),
    RequestFlush,
    ForceFlush,
    ApplyConfig(Box<SurfaceConfig>),

    // -------------------------------------------------------------------------
    // Request-response
    // -------------------------------------------------------------------------
    ImportMapping {
        path: PathBuf,
        response: oneshot::Sender<Result<(), ImportError>>,
    },
    ExportMapping {
        path: PathBuf,
        response: oneshot::Sender<anyhow::Result<()>>,
    },
    GetSelectedSlot {
        response: oneshot::Sender<SelectedSlot>,
    },
    GetMappedCommands {
        response: oneshot::Sender<BTreeSet<FlexiCommand>>,
    },
    GetActiveView {
        response: oneshot::Sender<Option<ViewId>>,
    },
    GetNoteMapReader {
        response: oneshot::Sender<NoteMapReader>,
    },

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    Shutdown,
}

impl fmt::Debug for SurfaceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Midi { status, data1, data2 } => {
                write!(f, "Midi({:02X} {:02X} {:02X})", status, data1, data2)
            }
            Self::SysEx(data) => write!(f, "SysEx({})", crate::midi::format_hex(data)),
            Self::Settings(event) => write!(f, "Settings({:?})", event),
            Self::SetActiveView(id) => write!(f, "SetActiveView({})", id),
            Self::SetActiveMode(id) => write!(f, "SetActiveMode({})", id),
            Self::RequestFlush => f.write_str("RequestFlush"),
            Self::ForceFlush => f.write_str("ForceFlush"),
            Self::ApplyConfig(_) => f.write_str("ApplyConfig"),
            Self::ImportMapping { path, .. } => write!(f, "ImportMapping({})", path.display()),
            Self::ExportMapping { path, .. } => write!(f, "ExportMapping({})", path.display()),
            Self::GetSelectedSlot { .. } => f.write_str("GetSelectedSlot"),
            Self::GetMappedCommands { .. } => f.write_str("GetMappedCommands"),
            Self::GetActiveView { .. } => f.write_str("GetActiveView"),
            Self::GetNoteMapReader { .. } => f.write_str("GetNoteMapReader"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}
