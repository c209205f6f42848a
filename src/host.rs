//! Host collaborator interface
//!
//! Everything the surface needs from the process that embeds it: MIDI output,
//! command execution, note input routing and user notifications.

use tracing::info;

use crate::control::ControlValue;
use crate::flexi::FlexiCommand;

/// Services provided by the embedding host
///
/// Only `send_midi` and `execute_command` are mandatory; the rest default to
/// no-ops so small hosts and tests stay short.
pub trait Host: Send {
    /// Write raw bytes to the controller
    fn send_midi(&mut self, bytes: &[u8]);

    /// Run a Flexi command with the decoded control value
    fn execute_command(&mut self, command: FlexiCommand, value: ControlValue);

    /// Current host value of a command (for `send_value` feedback)
    fn command_value(&self, _command: FlexiCommand) -> Option<u8> {
        None
    }

    /// Forward a keyboard note to note input
    fn route_note(&mut self, _channel: u8, _note: u8, _velocity: u8) {}

    /// Forward a keyboard channel message (modulation, sustain, pitch bend)
    fn route_keyboard_message(&mut self, _bytes: [u8; 3]) {}

    /// Write one text cell of the controller display
    fn update_display_cell(&mut self, _row: usize, _cell: usize, _text: &str) {}

    /// Show a message to the user
    fn notify(&mut self, message: &str) {
        info!("{}", message);
    }
}
