//! Learn mode state machine
//!
//! `Idle -> Armed -> Captured -> (commit) -> Idle`. While learning, every
//! addressable message is captured (latest wins) instead of dispatched.

use crate::flexi::slot::SlotType;

/// What the last learned message addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearnCapture {
    pub slot_type: SlotType,
    pub number: u8,
    pub channel: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LearnState {
    #[default]
    Idle,
    Armed,
    Captured(LearnCapture),
}

/// Learn session with a generation counter for expiry tasks
#[derive(Debug, Default)]
pub struct Learn {
    state: LearnState,
    generation: u64,
}

impl Learn {
    pub fn state(&self) -> LearnState {
        self.state
    }

    /// Capturing (Armed or Captured)
    pub fn is_active(&self) -> bool {
        self.state != LearnState::Idle
    }

    /// Arm learning, dropping any earlier capture; returns the new generation
    pub fn arm(&mut self) -> u64 {
        self.generation += 1;
        self.state = LearnState::Armed;
        self.generation
    }

    /// Record a message; returns false when not learning
    pub fn capture(&mut self, capture: LearnCapture) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = LearnState::Captured(capture);
        true
    }

    /// Leave learn mode and hand out the capture, if any
    pub fn take(&mut self) -> Option<LearnCapture> {
        match std::mem::take(&mut self.state) {
            LearnState::Captured(capture) => Some(capture),
            LearnState::Idle | LearnState::Armed => None,
        }
    }

    pub fn cancel(&mut self) {
        self.state = LearnState::Idle;
    }

    /// Disarm a learn of this generation that captured nothing
    pub fn expire(&mut self, generation: u64) -> bool {
        if self.generation == generation && self.state == LearnState::Armed {
            self.state = LearnState::Idle;
            true
        } else {
            false
        }
    }
}
