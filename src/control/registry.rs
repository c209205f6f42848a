//! Logical control registry
//!
//! Owns every addressable control of a surface. Controls are registered once
//! during surface setup; afterwards only their runtime state changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::control::binding::Selector;

/// Stable control identifier, assigned in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub u16);

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a control physically is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Button,
    Continuous,
    Light,
}

/// Mutable per-control runtime state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    pub pressed: bool,
    pub touched: bool,
    /// Last absolute value received (7-bit)
    pub value: u8,
    /// Set by a handler to swallow the next release
    pub consumed: bool,
    /// A long press fired for the current press
    pub long_pressed: bool,
    /// Incremented on every press, lets stale long-press checks detect a newer press
    pub press_seq: u64,
    /// Last value written to the hardware light (None = unknown, forces a write)
    pub light_shadow: Option<u8>,
}

/// A physical control on the surface
#[derive(Debug, Clone)]
pub struct LogicalControl {
    id: ControlId,
    name: String,
    kind: ControlKind,
    group: Option<(String, usize)>,
    /// Where light feedback for this control is sent
    output: Option<Selector>,
    pub state: ControlState,
}

impl LogicalControl {
    pub fn id(&self) -> ControlId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    /// Group name and index inside the group (e.g. "fader", 2)
    pub fn group(&self) -> Option<(&str, usize)> {
        self.group.as_ref().map(|(name, index)| (name.as_str(), *index))
    }

    pub fn output(&self) -> Option<Selector> {
        self.output
    }

    /// Whether the control can show feedback
    pub fn has_light(&self) -> bool {
        self.output.is_some() && self.kind != ControlKind::Continuous
    }
}

/// Registry of all logical controls
#[derive(Debug, Default)]
pub struct ControlRegistry {
    controls: Vec<LogicalControl>,
    by_name: HashMap<String, ControlId>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a control; a duplicate name returns the existing id unchanged
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: ControlKind,
        group: Option<(String, usize)>,
        output: Option<Selector>,
    ) -> ControlId {
        let name = name.into();
        if let Some(&id) = self.by_name.get(&name) {
            tracing::warn!("Control '{}' already registered as {}", name, id);
            return id;
        }

        let id = ControlId(self.controls.len() as u16);
        self.by_name.insert(name.clone(), id);
        self.controls.push(LogicalControl {
            id,
            name,
            kind,
            group,
            output,
            state: ControlState::default(),
        });
        id
    }

    pub fn get(&self, id: ControlId) -> Option<&LogicalControl> {
        self.controls.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: ControlId) -> Option<&mut LogicalControl> {
        self.controls.get_mut(id.0 as usize)
    }

    /// Look up a control by its stable name
    pub fn find(&self, name: &str) -> Option<ControlId> {
        self.by_name.get(name).copied()
    }

    /// All controls in registration order
    pub fn iter(&self) -> impl Iterator<Item = &LogicalControl> {
        self.controls.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LogicalControl> {
        self.controls.iter_mut()
    }

    /// Controls of a group, ordered by group index
    pub fn group(&self, group: &str) -> Vec<ControlId> {
        let mut members: Vec<(usize, ControlId)> = self
            .controls
            .iter()
            .filter_map(|c| match c.group() {
                Some((name, index)) if name == group => Some((index, c.id)),
                _ => None,
            })
            .collect();
        members.sort_unstable();
        members.into_iter().map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Forget all light shadows so the next flush rewrites every light
    pub fn clear_light_shadows(&mut self) {
        for control in &mut self.controls {
            control.state.light_shadow = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiKind;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ControlRegistry::new();
        let play = registry.register(
            "play",
            ControlKind::Button,
            None,
            Some(Selector::new(MidiKind::Note, 0, 94)),
        );
        let fader = registry.register("fader1", ControlKind::Continuous, Some(("fader".into(), 0)), None);

        assert_eq!(registry.find("play"), Some(play));
        assert_eq!(registry.get(fader).unwrap().kind(), ControlKind::Continuous);
        assert!(registry.get(play).unwrap().has_light());
        assert!(!registry.get(fader).unwrap().has_light());

        // Duplicate registration keeps the first id
        assert_eq!(registry.register("play", ControlKind::Light, None, None), play);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_group_ordering() {
        let mut registry = ControlRegistry::new();
        let b = registry.register("pad2", ControlKind::Button, Some(("pad".into(), 1)), None);
        let a = registry.register("pad1", ControlKind::Button, Some(("pad".into(), 0)), None);
        registry.register("stop", ControlKind::Button, None, None);

        assert_eq!(registry.group("pad"), vec![a, b]);
        assert!(registry.group("fader").is_empty());
    }
}
