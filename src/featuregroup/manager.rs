//! Active/temporary handler stack shared by views and modes

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use tracing::{debug, warn};

use super::SurfaceHandler;

/// Which handlers are active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState<K> {
    Normal { active: Option<K> },
    /// `temporary` overlays `active` until restored
    Temporary { active: Option<K>, temporary: K },
}

/// Registry of handlers with one active entry and an optional overlay
pub struct FeatureGroupManager<K> {
    label: &'static str,
    handlers: HashMap<K, Box<dyn SurfaceHandler>>,
    state: StackState<K>,
    previous: Option<K>,
}

impl<K> FeatureGroupManager<K>
where
    K: Copy + Eq + Hash + fmt::Display,
{
    /// `label` names the group in logs ("view", "mode")
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            handlers: HashMap::new(),
            state: StackState::Normal { active: None },
            previous: None,
        }
    }

    pub fn register(&mut self, id: K, handler: Box<dyn SurfaceHandler>) {
        if self.handlers.insert(id, handler).is_some() {
            warn!("Replaced {} handler {}", self.label, id);
        }
    }

    pub fn contains(&self, id: K) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn state(&self) -> StackState<K> {
        self.state
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.state, StackState::Temporary { .. })
    }

    /// Overlay if present, else the active entry
    pub fn active_id(&self) -> Option<K> {
        match self.state {
            StackState::Normal { active } => active,
            StackState::Temporary { temporary, .. } => Some(temporary),
        }
    }

    pub fn active_id_ignore_temporary(&self) -> Option<K> {
        match self.state {
            StackState::Normal { active } | StackState::Temporary { active, .. } => active,
        }
    }

    /// Active entry before the most recent `set_active`
    pub fn previous_id(&self) -> Option<K> {
        self.previous
    }

    pub fn is_active(&self, id: K) -> bool {
        self.active_id() == Some(id)
    }

    /// Switch the active entry; only allowed without an overlay
    pub fn set_active(&mut self, id: K) -> bool {
        let StackState::Normal { active } = self.state else {
            warn!("Cannot activate {} {} while a temporary {} is shown", self.label, id, self.label);
            return false;
        };
        if !self.handlers.contains_key(&id) {
            warn!("Unknown {} {}", self.label, id);
            return false;
        }
        if active == Some(id) {
            return false;
        }

        if let Some(old) = active {
            self.notify(old, false);
        }
        self.previous = active;
        self.state = StackState::Normal { active: Some(id) };
        self.notify(id, true);
        debug!("Active {}: {}", self.label, id);
        true
    }

    /// Go back to the previously active entry
    pub fn set_previous(&mut self) -> bool {
        match self.previous {
            Some(previous) => self.set_active(previous),
            None => false,
        }
    }

    /// Show an overlay over the active entry; nesting is not supported
    pub fn set_temporary(&mut self, id: K) -> bool {
        let StackState::Normal { active } = self.state else {
            warn!("Nested temporary {} {} ignored", self.label, id);
            return false;
        };
        if !self.handlers.contains_key(&id) {
            warn!("Unknown {} {}", self.label, id);
            return false;
        }

        self.state = StackState::Temporary { active, temporary: id };
        self.notify(id, true);
        debug!("Temporary {}: {}", self.label, id);
        true
    }

    /// Remove the overlay; no-op without one
    pub fn restore(&mut self) -> bool {
        let StackState::Temporary { active, temporary } = self.state else {
            debug!("No temporary {} to restore", self.label);
            return false;
        };
        self.notify(temporary, false);
        self.state = StackState::Normal { active };
        debug!("Restored {}", self.label);
        true
    }

    pub fn get_mut(&mut self, id: K) -> Option<&mut (dyn SurfaceHandler + 'static)> {
        self.handlers.get_mut(&id).map(|h| h.as_mut())
    }

    pub fn get(&self, id: K) -> Option<&(dyn SurfaceHandler + 'static)> {
        self.handlers.get(&id).map(|h| h.as_ref())
    }

    pub fn active(&self) -> Option<&(dyn SurfaceHandler + 'static)> {
        self.get(self.active_id()?)
    }

    pub fn active_mut(&mut self) -> Option<&mut (dyn SurfaceHandler + 'static)> {
        let id = self.active_id()?;
        self.get_mut(id)
    }

    pub fn active_ignore_temporary(&self) -> Option<&(dyn SurfaceHandler + 'static)> {
        self.get(self.active_id_ignore_temporary()?)
    }

    pub fn active_ignore_temporary_mut(&mut self) -> Option<&mut (dyn SurfaceHandler + 'static)> {
        let id = self.active_id_ignore_temporary()?;
        self.get_mut(id)
    }

    fn notify(&mut self, id: K, activated: bool) {
        if let Some(handler) = self.handlers.get_mut(&id) {
            if activated {
                handler.on_activate();
            } else {
                handler.on_deactivate();
            }
        }
    }
}
