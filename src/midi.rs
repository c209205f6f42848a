//! MIDI utilities and message types
//!
//! Provides channel-message parsing, encoding, MIDI Machine Control decoding
//! and value conversions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status nibbles of the channel messages the dispatcher understands
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_AFTERTOUCH: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_AFTERTOUCH: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;
}

/// Addressable message kinds (what a binding or a learned slot can select on)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MidiKind {
    Note,
    Cc,
    #[serde(rename = "pc")]
    ProgramChange,
    #[serde(rename = "pb")]
    PitchBend,
}

impl fmt::Display for MidiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MidiKind::Note => "Note",
            MidiKind::Cc => "CC",
            MidiKind::ProgramChange => "Program Change",
            MidiKind::PitchBend => "Pitchbend",
        };
        f.write_str(name)
    }
}

/// MIDI channel messages (plus SysEx for MMC)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Polyphonic Key Pressure: channel (0-15), note (0-127), pressure (0-127)
    PolyPressure { channel: u8, note: u8, pressure: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Channel Pressure: channel (0-15), pressure (0-127)
    ChannelPressure { channel: u8, pressure: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },

    /// System Exclusive payload (without F0/F7)
    SysEx { data: Vec<u8> },
}

impl MidiMessage {
    /// Parse a 3-byte channel message as delivered by the transport callback
    ///
    /// Note On with velocity 0 is reported as Note Off. Returns None for
    /// status nibbles outside 0x80-0xE0.
    pub fn from_parts(status: u8, data1: u8, data2: u8) -> Option<Self> {
        let channel = status & 0x0F;
        let data1 = data1 & 0x7F;
        let data2 = data2 & 0x7F;

        match status & 0xF0 {
            status::NOTE_OFF => Some(MidiMessage::NoteOff {
                channel,
                note: data1,
                velocity: data2,
            }),
            status::NOTE_ON if data2 == 0 => Some(MidiMessage::NoteOff {
                channel,
                note: data1,
                velocity: 0,
            }),
            status::NOTE_ON => Some(MidiMessage::NoteOn {
                channel,
                note: data1,
                velocity: data2,
            }),
            status::POLY_AFTERTOUCH => Some(MidiMessage::PolyPressure {
                channel,
                note: data1,
                pressure: data2,
            }),
            status::CONTROL_CHANGE => Some(MidiMessage::ControlChange {
                channel,
                cc: data1,
                value: data2,
            }),
            status::PROGRAM_CHANGE => Some(MidiMessage::ProgramChange {
                channel,
                program: data1,
            }),
            status::CHANNEL_AFTERTOUCH => Some(MidiMessage::ChannelPressure {
                channel,
                pressure: data1,
            }),
            status::PITCH_BEND => Some(MidiMessage::PitchBend {
                channel,
                value: ((data2 as u16) << 7) | data1 as u16,
            }),
            _ => None,
        }
    }

    /// Parse a MIDI message from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;

        if status == 0xF0 {
            let end = data.iter().position(|&b| b == 0xF7)?;
            return Some(MidiMessage::SysEx {
                data: data[1..end].to_vec(),
            });
        }

        // Running status (data byte first) is resolved by the transport
        if status < 0x80 || status >= 0xF0 {
            return None;
        }

        let needed = match status & 0xF0 {
            status::PROGRAM_CHANGE | status::CHANNEL_AFTERTOUCH => 1,
            _ => 2,
        };
        if rest.len() < needed {
            return None;
        }

        let data1 = rest[0];
        let data2 = rest.get(1).copied().unwrap_or(0);
        Self::from_parts(status, data1, data2)
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![status::NOTE_OFF | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![status::NOTE_ON | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::PolyPressure { channel, note, pressure } => {
                vec![status::POLY_AFTERTOUCH | (channel & 0x0F), note & 0x7F, pressure & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![status::CONTROL_CHANGE | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::ProgramChange { channel, program } => {
                vec![status::PROGRAM_CHANGE | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                vec![status::CHANNEL_AFTERTOUCH | (channel & 0x0F), pressure & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![status::PITCH_BEND | (channel & 0x0F), lsb, msb]
            }
            MidiMessage::SysEx { ref data } => {
                let mut result = vec![0xF0];
                result.extend_from_slice(data);
                result.push(0xF7);
                result
            }
        }
    }

    /// Get the channel for channel messages (0-15), None for SysEx
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::PolyPressure { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::ChannelPressure { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => Some(channel),
            MidiMessage::SysEx { .. } => None,
        }
    }

    /// Addressable kind and number of this message, if it can be bound
    ///
    /// Pitch bend has no controller number and reports 0.
    pub fn address(&self) -> Option<(MidiKind, u8, u8)> {
        match *self {
            MidiMessage::NoteOff { channel, note, .. } | MidiMessage::NoteOn { channel, note, .. } => {
                Some((MidiKind::Note, note, channel))
            }
            MidiMessage::ControlChange { channel, cc, .. } => Some((MidiKind::Cc, cc, channel)),
            MidiMessage::ProgramChange { channel, program } => {
                Some((MidiKind::ProgramChange, program, channel))
            }
            MidiMessage::PitchBend { channel, .. } => Some((MidiKind::PitchBend, 0, channel)),
            _ => None,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::PolyPressure { channel, note, pressure } => {
                write!(f, "PolyPressure ch:{} n:{} p:{}", channel + 1, note, pressure)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                write!(f, "ChannelPressure ch:{} p:{}", channel + 1, pressure)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiMessage::SysEx { ref data } => write!(f, "SysEx {} bytes", data.len()),
        }
    }
}

/// MIDI Machine Control command carried in a universal real-time SysEx
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmcCommand {
    /// Target device ID (0x7F = all call)
    pub device_id: u8,
    /// MMC command byte (1 = Stop, 2 = Play, 6 = Record Strobe, ...)
    pub command: u8,
}

impl MmcCommand {
    /// Decode `F0 7F <device> 06 <command> F7` (with or without the framing bytes)
    pub fn parse(data: &[u8]) -> Option<Self> {
        let payload = match data {
            [0xF0, inner @ .., 0xF7] => inner,
            other => other,
        };
        match *payload {
            [0x7F, device_id, 0x06, command, ..] => Some(Self {
                device_id: device_id & 0x7F,
                command: command & 0x7F,
            }),
            _ => None,
        }
    }

    /// Encode as a complete SysEx message
    pub fn encode(&self) -> Vec<u8> {
        vec![0xF0, 0x7F, self.device_id & 0x7F, 0x06, self.command & 0x7F, 0xF7]
    }
}

/// MIDI value conversion utilities
pub mod convert {
    /// Convert 14-bit value (0-16383) to 7-bit value (0-127)
    pub fn to_7bit(value_14bit: u16) -> u8 {
        ((value_14bit >> 7) & 0x7F) as u8
    }

    /// Convert 7-bit value (0-127) to 14-bit value (0-16383)
    pub fn to_14bit(value_7bit: u8) -> u16 {
        ((value_7bit as u16 & 0x7F) << 7) | (value_7bit as u16 & 0x7F)
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_parsing() {
        let msg = MidiMessage::from_parts(0x90, 60, 100).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100,
            }
        );
    }

    #[test]
    fn test_note_on_velocity_zero() {
        // Note On with velocity 0 = Note Off
        let msg = MidiMessage::from_parts(0x93, 60, 0).unwrap();
        assert_eq!(
            msg,
            MidiMessage::NoteOff {
                channel: 3,
                note: 60,
                velocity: 0,
            }
        );
    }

    #[test]
    fn test_control_change() {
        let msg = MidiMessage::parse(&[0xB2, 7, 100]).unwrap();
        assert_eq!(
            msg,
            MidiMessage::ControlChange {
                channel: 2,
                cc: 7,
                value: 100,
            }
        );
        assert_eq!(msg.address(), Some((MidiKind::Cc, 7, 2)));
    }

    #[test]
    fn test_pitch_bend() {
        let msg = MidiMessage::from_parts(0xE0, 0x00, 0x40).unwrap();
        assert_eq!(msg, MidiMessage::PitchBend { channel: 0, value: 8192 });
        assert_eq!(msg.encode(), vec![0xE0, 0x00, 0x40]);
    }

    #[test]
    fn test_program_change_two_bytes() {
        let msg = MidiMessage::parse(&[0xC1, 5]).unwrap();
        assert_eq!(msg, MidiMessage::ProgramChange { channel: 1, program: 5 });
        assert_eq!(msg.encode(), vec![0xC1, 5]);
    }

    #[test]
    fn test_system_status_rejected() {
        assert_eq!(MidiMessage::from_parts(0xF8, 0, 0), None);
        assert_eq!(MidiMessage::parse(&[0x40, 1, 2]), None);
        assert_eq!(MidiMessage::parse(&[0xB0, 1]), None);
    }

    #[test]
    fn test_mmc_parse() {
        let mmc = MmcCommand::parse(&[0xF0, 0x7F, 0x7F, 0x06, 0x02, 0xF7]).unwrap();
        assert_eq!(mmc.command, 2);
        assert_eq!(mmc.device_id, 0x7F);
        assert_eq!(mmc.encode(), vec![0xF0, 0x7F, 0x7F, 0x06, 0x02, 0xF7]);
        assert!(MmcCommand::parse(&[0xF0, 0x43, 0x10, 0xF7]).is_none());
    }

    #[test]
    fn test_14bit_to_7bit() {
        assert_eq!(convert::to_7bit(0), 0);
        assert_eq!(convert::to_7bit(8192), 64);
        assert_eq!(convert::to_7bit(16383), 127);
        assert_eq!(convert::to_14bit(64), 8256);
    }
}
