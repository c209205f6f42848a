//! Flexi slot mapping
//!
//! A fixed table of user-editable slots, each mapping one incoming message
//! (CC, note, program change, pitch bend or MMC) to a command.

pub mod command;
pub mod engine;
pub mod learn;
pub mod note_map;
pub mod properties;
pub mod slot;

pub use command::{CommandCategory, FlexiCommand};
pub use engine::FlexiMappingEngine;
pub use learn::{LearnCapture, LearnState};
pub use note_map::{KeyboardChannel, NoteMap, NoteMapReader, SUPPRESSED};
pub use properties::Properties;
pub use slot::{CommandSlot, SlotType, DEFAULT_NUM_SLOTS, OMNI_CHANNEL};
