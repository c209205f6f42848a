//! Binding table: raw message selectors to logical controls

use std::collections::HashMap;
use std::fmt;

use crate::control::encoder::{self, ControlValue, KnobMode, ToggleState};
use crate::control::registry::ControlId;
use crate::midi::MidiKind;

/// Raw message selector `{kind, channel, number}`
///
/// Pitch bend selectors always carry number 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selector {
    pub kind: MidiKind,
    pub channel: u8,
    pub number: u8,
}

impl Selector {
    pub fn new(kind: MidiKind, channel: u8, number: u8) -> Self {
        let number = if kind == MidiKind::PitchBend { 0 } else { number & 0x7F };
        Self {
            kind,
            channel: channel & 0x0F,
            number,
        }
    }

    /// Encode a 7-bit output value addressed by this selector
    pub fn encode(&self, value: u8) -> Vec<u8> {
        use crate::midi::status;
        let value = value & 0x7F;
        match self.kind {
            MidiKind::Note => vec![status::NOTE_ON | self.channel, self.number, value],
            MidiKind::Cc => vec![status::CONTROL_CHANGE | self.channel, self.number, value],
            MidiKind::ProgramChange => vec![status::PROGRAM_CHANGE | self.channel, value],
            MidiKind::PitchBend => {
                let value14 = crate::midi::convert::to_14bit(value);
                vec![
                    status::PITCH_BEND | self.channel,
                    (value14 & 0x7F) as u8,
                    ((value14 >> 7) & 0x7F) as u8,
                ]
            }
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MidiKind::PitchBend => write!(f, "{} ch:{}", self.kind, self.channel + 1),
            _ => write!(f, "{} {} ch:{}", self.kind, self.number, self.channel + 1),
        }
    }
}

/// Active binding of one control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub control: ControlId,
    pub selector: Selector,
    pub law: KnobMode,
}

/// Maps selectors to controls and decodes their values
#[derive(Debug, Default)]
pub struct BindingTable {
    by_selector: HashMap<Selector, ControlId>,
    by_control: HashMap<ControlId, Binding>,
    toggles: HashMap<ControlId, ToggleState>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a control, replacing its previous binding
    ///
    /// A selector owned by another control is moved to this one.
    pub fn bind(&mut self, control: ControlId, selector: Selector, law: KnobMode) {
        self.unbind(control);

        if let Some(previous_owner) = self.by_selector.insert(selector, control) {
            tracing::debug!(
                "Selector {} moved from control {} to {}",
                selector,
                previous_owner,
                control
            );
            self.by_control.remove(&previous_owner);
            self.toggles.remove(&previous_owner);
        }

        self.by_control.insert(
            control,
            Binding {
                control,
                selector,
                law,
            },
        );
    }

    /// Remove the binding of a control (no-op when unbound)
    pub fn unbind(&mut self, control: ControlId) -> Option<Binding> {
        let binding = self.by_control.remove(&control)?;
        self.by_selector.remove(&binding.selector);
        self.toggles.remove(&control);
        Some(binding)
    }

    /// Find the control owning a selector
    pub fn resolve(&self, selector: &Selector) -> Option<ControlId> {
        self.by_selector.get(selector).copied()
    }

    pub fn binding(&self, control: ControlId) -> Option<&Binding> {
        self.by_control.get(&control)
    }

    /// Decode a raw 7-bit value with the control's law
    ///
    /// Returns None for unbound controls and for toggle releases.
    pub fn decode(&mut self, control: ControlId, value: u8) -> Option<ControlValue> {
        let law = self.by_control.get(&control)?.law;
        let toggle = self.toggles.entry(control).or_default();
        encoder::decode(law, value, toggle)
    }

    /// Encode outgoing feedback for a control: absolute values as-is, relative
    /// laws as an increment acknowledgement
    pub fn encode_feedback(&self, control: ControlId, value: ControlValue) -> Option<Vec<u8>> {
        let binding = self.by_control.get(&control)?;
        let byte = match (binding.law.is_relative(), value) {
            (true, ControlValue::Relative(delta)) => encoder::encode_relative(binding.law, delta)?,
            (false, other) => encoder::encode_absolute(other)?,
            (true, _) => return None,
        };
        Some(binding.selector.encode(byte))
    }

    pub fn len(&self) -> usize {
        self.by_control.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_control.is_empty()
    }
}
