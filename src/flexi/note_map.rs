//! Keyboard note suppression map
//!
//! Notes assigned to a command slot on the keyboard channel must not also
//! reach note input. The map translates raw note numbers to themselves or to
//! [`SUPPRESSED`]. It is rebuilt lazily after any change that can affect it,
//! and can be read from other threads through a [`NoteMapReader`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::flexi::slot::{CommandSlot, SlotType, OMNI_CHANNEL};

/// Map entry for a note that is blocked from note input
pub const SUPPRESSED: i16 = -1;

pub type NoteMap = [i16; 128];

/// Channel the keyboard plays notes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum KeyboardChannel {
    /// Keyboard routing disabled
    Off,
    Channel(u8),
    Omni,
}

impl Default for KeyboardChannel {
    fn default() -> Self {
        KeyboardChannel::Channel(0)
    }
}

impl KeyboardChannel {
    /// Does a message on this 0-based channel belong to the keyboard?
    pub fn accepts(self, channel: u8) -> bool {
        match self {
            KeyboardChannel::Off => false,
            KeyboardChannel::Channel(ch) => ch == channel,
            KeyboardChannel::Omni => true,
        }
    }

    pub fn is_off(self) -> bool {
        self == KeyboardChannel::Off
    }
}

impl TryFrom<i32> for KeyboardChannel {
    type Error = String;

    /// -1 = off, 0-15 = channel, 16 = omni
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(KeyboardChannel::Off),
            0..=15 => Ok(KeyboardChannel::Channel(value as u8)),
            16 => Ok(KeyboardChannel::Omni),
            other => Err(format!("keyboard channel {} out of range (-1..=16)", other)),
        }
    }
}

impl From<KeyboardChannel> for i32 {
    fn from(channel: KeyboardChannel) -> Self {
        match channel {
            KeyboardChannel::Off => -1,
            KeyboardChannel::Channel(ch) => ch as i32,
            KeyboardChannel::Omni => OMNI_CHANNEL as i32,
        }
    }
}

impl fmt::Display for KeyboardChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyboardChannel::Off => f.write_str("Off"),
            KeyboardChannel::Channel(ch) => write!(f, "{}", ch + 1),
            KeyboardChannel::Omni => f.write_str("All"),
        }
    }
}

/// Build the map from scratch
pub fn build_note_map(slots: &[CommandSlot], keyboard: KeyboardChannel) -> NoteMap {
    let mut map: NoteMap = std::array::from_fn(|note| note as i16);
    for slot in slots {
        if slot.command.is_off() || slot.slot_type != SlotType::Note {
            continue;
        }
        let on_keyboard = match keyboard {
            KeyboardChannel::Off => false,
            KeyboardChannel::Channel(ch) => slot.midi_channel == ch,
            KeyboardChannel::Omni => true,
        };
        if on_keyboard {
            map[(slot.number & 0x7F) as usize] = SUPPRESSED;
        }
    }
    map
}

#[derive(Debug)]
struct Cache {
    /// Bumped on every invalidation
    version: u64,
    /// Map and the version it was built for
    built: Option<(u64, Arc<NoteMap>)>,
}

/// Version-stamped lazily rebuilt note map
#[derive(Debug, Clone)]
pub struct NoteMapCache {
    inner: Arc<Mutex<Cache>>,
}

impl Default for NoteMapCache {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Cache {
                version: 0,
                built: None,
            })),
        }
    }
}

impl NoteMapCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the map stale; the next read rebuilds it
    pub fn invalidate(&self) {
        let mut cache = self.inner.lock();
        cache.version += 1;
        cache.built = None;
    }

    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    /// Current map, rebuilt under the lock if stale
    pub fn get_or_build(&self, slots: &[CommandSlot], keyboard: KeyboardChannel) -> Arc<NoteMap> {
        let mut cache = self.inner.lock();
        let version = cache.version;
        if let Some((built_for, map)) = &cache.built {
            if *built_for == version {
                return Arc::clone(map);
            }
        }
        let map = Arc::new(build_note_map(slots, keyboard));
        cache.built = Some((version, Arc::clone(&map)));
        tracing::trace!("Rebuilt note map (version {})", version);
        map
    }

    /// Read-only view for other threads
    pub fn reader(&self) -> NoteMapReader {
        NoteMapReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Cross-thread view of the last built note map
///
/// Returns None while the map is stale; the owner rebuilds it on its next read.
#[derive(Debug, Clone)]
pub struct NoteMapReader {
    inner: Arc<Mutex<Cache>>,
}

impl NoteMapReader {
    pub fn current(&self) -> Option<Arc<NoteMap>> {
        let cache = self.inner.lock();
        match &cache.built {
            Some((built_for, map)) if *built_for == cache.version => Some(Arc::clone(map)),
            _ => None,
        }
    }
}
