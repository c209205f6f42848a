//! Knob value laws
//!
//! Interprets raw 0-127 controller values as absolute positions or signed
//! increments, and encodes outgoing feedback with the same law.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a knob, fader or button reports its value
///
/// The numeric order is persisted in mapping files and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnobMode {
    /// Absolute value; for buttons: down > 0, up = 0
    #[default]
    AbsolutePushDown,
    /// 1-64 increments, 127-65 decrements
    Relative1,
    /// 65-127 increments, 63-0 decrements
    Relative2,
    /// 1-63 increments, 65-127 decrements
    Relative3,
    /// Absolute toggle button: 1st press > 0, 2nd press = 0
    AbsoluteToggle,
}

impl KnobMode {
    /// All modes in persisted order
    pub const ALL: [KnobMode; 5] = [
        KnobMode::AbsolutePushDown,
        KnobMode::Relative1,
        KnobMode::Relative2,
        KnobMode::Relative3,
        KnobMode::AbsoluteToggle,
    ];

    /// Persisted index
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a mode by persisted index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Absolute laws (push and toggle) carry positions, relative laws carry deltas
    pub fn is_absolute(self) -> bool {
        matches!(self, KnobMode::AbsolutePushDown | KnobMode::AbsoluteToggle)
    }

    pub fn is_relative(self) -> bool {
        !self.is_absolute()
    }
}

impl fmt::Display for KnobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            KnobMode::AbsolutePushDown => "Absolute (push button: Button down > 0, button up = 0)",
            KnobMode::Relative1 => "Relative (1-64 increments, 127-65 decrements)",
            KnobMode::Relative2 => "Relative (65-127 increments, 63-0 decrements)",
            KnobMode::Relative3 => "Relative (1-63 increments, 65-127 decrements)",
            KnobMode::AbsoluteToggle => "Absolute (toggle button: 1st press > 0, 2nd press = 0)",
        };
        f.write_str(label)
    }
}

/// A decoded control value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlValue {
    /// 7-bit absolute value (0-127)
    Absolute(u8),
    /// 14-bit absolute value (0-16383), from pitch bend
    Absolute14(u16),
    /// Signed increment
    Relative(i32),
}

impl ControlValue {
    /// Button-like interpretation: any non-zero absolute value is "pressed"
    pub fn is_pressed(&self) -> bool {
        match *self {
            ControlValue::Absolute(v) => v > 0,
            ControlValue::Absolute14(v) => v > 0,
            ControlValue::Relative(d) => d > 0,
        }
    }

    /// Scale an absolute value to 7 bit, None for relative values
    pub fn as_7bit(&self) -> Option<u8> {
        match *self {
            ControlValue::Absolute(v) => Some(v),
            ControlValue::Absolute14(v) => Some(crate::midi::convert::to_7bit(v)),
            ControlValue::Relative(_) => None,
        }
    }
}

/// Decode a relative law; absolute laws return None
///
/// Every law is total over 0-127: each input lands in exactly one of the
/// increase or decrease bands. A value that decodes to 0 is "no movement".
pub fn decode_relative(mode: KnobMode, value: u8) -> Option<i32> {
    let v = (value & 0x7F) as i32;
    match mode {
        KnobMode::Relative1 => Some(if v <= 64 { v } else { v - 128 }),
        KnobMode::Relative2 => Some(v - 64),
        KnobMode::Relative3 => Some(if v < 64 { v } else { -(v - 64) }),
        KnobMode::AbsolutePushDown | KnobMode::AbsoluteToggle => None,
    }
}

/// Encode a signed increment with a relative law, saturating at the band edges
///
/// Absolute laws have no increment encoding and return None.
pub fn encode_relative(mode: KnobMode, delta: i32) -> Option<u8> {
    let byte = match mode {
        KnobMode::Relative1 => {
            if delta >= 0 {
                delta.min(64)
            } else {
                128 + delta.max(-63)
            }
        }
        KnobMode::Relative2 => 64 + delta.clamp(-64, 63),
        KnobMode::Relative3 => {
            if delta >= 0 {
                delta.min(63)
            } else {
                64 + (-delta).min(63)
            }
        }
        KnobMode::AbsolutePushDown | KnobMode::AbsoluteToggle => return None,
    };
    Some(byte as u8)
}

/// Outgoing byte for absolute feedback; relative values have none
pub fn encode_absolute(value: ControlValue) -> Option<u8> {
    value.as_7bit()
}

/// Per-control press/release pairing for the absolute toggle law
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToggleState {
    on: bool,
}

impl ToggleState {
    /// Feed a raw value; returns the new toggle output on a press, None on a release
    pub fn feed(&mut self, value: u8) -> Option<u8> {
        if value & 0x7F == 0 {
            return None;
        }
        self.on = !self.on;
        Some(if self.on { 127 } else { 0 })
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

/// Decode a raw 7-bit value with any law
///
/// Returns None when the value carries no event (toggle release).
pub fn decode(mode: KnobMode, value: u8, toggle: &mut ToggleState) -> Option<ControlValue> {
    match mode {
        KnobMode::AbsolutePushDown => Some(ControlValue::Absolute(value & 0x7F)),
        KnobMode::AbsoluteToggle => toggle.feed(value).map(ControlValue::Absolute),
        _ => decode_relative(mode, value).map(ControlValue::Relative),
    }
}
