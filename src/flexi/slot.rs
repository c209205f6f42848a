//! Command slots

use std::fmt;

use crate::control::KnobMode;
use crate::flexi::command::FlexiCommand;
use crate::midi::MidiKind;

/// Default size of the slot table
pub const DEFAULT_NUM_SLOTS: usize = 200;

/// Slot channel value meaning "any channel"; never matches incoming messages
pub const OMNI_CHANNEL: u8 = 16;

/// Message type a slot listens to
///
/// The persisted value is the type index minus one (`Off` = -1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SlotType {
    #[default]
    Off,
    Cc,
    Note,
    ProgramChange,
    PitchBend,
    Mmc,
}

impl SlotType {
    pub const ALL: [SlotType; 6] = [
        SlotType::Off,
        SlotType::Cc,
        SlotType::Note,
        SlotType::ProgramChange,
        SlotType::PitchBend,
        SlotType::Mmc,
    ];

    /// Value written to mapping files
    pub fn persisted(self) -> i64 {
        match self {
            SlotType::Off => -1,
            SlotType::Cc => 0,
            SlotType::Note => 1,
            SlotType::ProgramChange => 2,
            SlotType::PitchBend => 3,
            SlotType::Mmc => 4,
        }
    }

    pub fn from_persisted(value: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.persisted() == value)
    }

    pub fn from_midi_kind(kind: MidiKind) -> Self {
        match kind {
            MidiKind::Note => SlotType::Note,
            MidiKind::Cc => SlotType::Cc,
            MidiKind::ProgramChange => SlotType::ProgramChange,
            MidiKind::PitchBend => SlotType::PitchBend,
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotType::Off => "Off",
            SlotType::Cc => "CC",
            SlotType::Note => "Note",
            SlotType::ProgramChange => "Program Change",
            SlotType::PitchBend => "Pitchbend",
            SlotType::Mmc => "MMC",
        };
        f.write_str(name)
    }
}

/// One user-configurable mapping from an incoming message to a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandSlot {
    pub slot_type: SlotType,
    /// Note, CC, program or MMC command number (ignored for pitch bend)
    pub number: u8,
    /// 0-15, or [`OMNI_CHANNEL`]
    pub midi_channel: u8,
    pub knob_mode: KnobMode,
    pub command: FlexiCommand,
    /// Mirror the host value of the command back to the controller
    pub send_value: bool,
    /// Echo the received value back immediately
    pub send_value_when_received: bool,
}

impl CommandSlot {
    /// Off-command or Off-type slots take part in nothing
    pub fn is_active(&self) -> bool {
        !self.command.is_off() && self.slot_type != SlotType::Off
    }

    /// Does an incoming message address this slot?
    pub fn matches(&self, slot_type: SlotType, number: u8, channel: u8) -> bool {
        self.is_active()
            && self.slot_type == slot_type
            && self.midi_channel == channel
            && (slot_type == SlotType::PitchBend || self.number == number)
    }

    /// Output message for value feedback, None for types without one
    pub fn feedback(&self, value: u8) -> Option<Vec<u8>> {
        let kind = match self.slot_type {
            SlotType::Cc => MidiKind::Cc,
            SlotType::Note => MidiKind::Note,
            SlotType::PitchBend => MidiKind::PitchBend,
            SlotType::Off | SlotType::ProgramChange | SlotType::Mmc => return None,
        };
        if self.midi_channel >= OMNI_CHANNEL {
            return None;
        }
        Some(crate::control::Selector::new(kind, self.midi_channel, self.number).encode(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc_slot(number: u8, channel: u8) -> CommandSlot {
        CommandSlot {
            slot_type: SlotType::Cc,
            number,
            midi_channel: channel,
            command: FlexiCommand::TransportPlay,
            ..Default::default()
        }
    }

    #[test]
    fn test_persisted_type_values() {
        assert_eq!(SlotType::Off.persisted(), -1);
        assert_eq!(SlotType::Mmc.persisted(), 4);
        assert_eq!(SlotType::from_persisted(1), Some(SlotType::Note));
        assert_eq!(SlotType::from_persisted(5), None);
    }

    #[test]
    fn test_matching() {
        let slot = cc_slot(70, 0);
        assert!(slot.matches(SlotType::Cc, 70, 0));
        assert!(!slot.matches(SlotType::Cc, 70, 1));
        assert!(!slot.matches(SlotType::Note, 70, 0));

        let off = CommandSlot {
            command: FlexiCommand::Off,
            ..slot
        };
        assert!(!off.matches(SlotType::Cc, 70, 0));

        let omni = cc_slot(70, OMNI_CHANNEL);
        assert!(!omni.matches(SlotType::Cc, 70, 0));
    }

    #[test]
    fn test_pitch_bend_ignores_number() {
        let slot = CommandSlot {
            slot_type: SlotType::PitchBend,
            number: 12,
            midi_channel: 3,
            command: FlexiCommand::TrackSetVolume,
            ..Default::default()
        };
        assert!(slot.matches(SlotType::PitchBend, 0, 3));
    }

    #[test]
    fn test_feedback_bytes() {
        assert_eq!(cc_slot(7, 2).feedback(100), Some(vec![0xB2, 7, 100]));
        assert_eq!(cc_slot(7, OMNI_CHANNEL).feedback(100), None);
    }
}
