//! Flexi command catalog
//!
//! Every action a slot can be bound to. Names are persisted in mapping files
//! (`SLOT<i>_COMMAND`) and must stay stable.

use std::fmt;

/// Command categories; each gets its own selector in the settings surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandCategory {
    Browser,
    Clip,
    Device,
    FxTrack,
    Global,
    Layout,
    Marker,
    Master,
    MidiCc,
    Modes,
    NoteInput,
    Scene,
    Track,
    Transport,
    User,
    Action,
}

impl CommandCategory {
    pub const ALL: [CommandCategory; 16] = [
        CommandCategory::Browser,
        CommandCategory::Clip,
        CommandCategory::Device,
        CommandCategory::FxTrack,
        CommandCategory::Global,
        CommandCategory::Layout,
        CommandCategory::Marker,
        CommandCategory::Master,
        CommandCategory::MidiCc,
        CommandCategory::Modes,
        CommandCategory::NoteInput,
        CommandCategory::Scene,
        CommandCategory::Track,
        CommandCategory::Transport,
        CommandCategory::User,
        CommandCategory::Action,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CommandCategory::Browser => "Browser",
            CommandCategory::Clip => "Clip",
            CommandCategory::Device => "Device",
            CommandCategory::FxTrack => "FX Track",
            CommandCategory::Global => "Global",
            CommandCategory::Layout => "Layout",
            CommandCategory::Marker => "Marker",
            CommandCategory::Master => "Master",
            CommandCategory::MidiCc => "MIDI CC",
            CommandCategory::Modes => "Modes",
            CommandCategory::NoteInput => "Note Input",
            CommandCategory::Scene => "Scene",
            CommandCategory::Track => "Track",
            CommandCategory::Transport => "Transport",
            CommandCategory::User => "User",
            CommandCategory::Action => "Action",
        }
    }

    /// Commands of this category in catalog order
    pub fn commands(self) -> impl Iterator<Item = FlexiCommand> {
        CATALOG
            .iter()
            .filter(move |info| info.category == Some(self))
            .map(|info| info.command)
    }
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A bindable action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum FlexiCommand {
    #[default]
    Off,

    GlobalUndo,
    GlobalRedo,
    GlobalPreviousProject,
    GlobalNextProject,
    GlobalToggleAudioEngine,

    TransportPlay,
    TransportStop,
    TransportRestart,
    TransportToggleRecord,
    TransportToggleRepeat,
    TransportToggleMetronome,
    TransportTapTempo,
    TransportSetTempo,
    TransportMovePlayCursor,

    LayoutArrange,
    LayoutMix,
    LayoutEdit,

    TrackSelectPrevious,
    TrackSelectNext,
    TrackToggleMute,
    TrackToggleSolo,
    TrackToggleArm,
    TrackSetVolume,
    TrackSetPanorama,
    TrackSetSend1,

    MasterToggleMute,
    MasterSetVolume,
    MasterSetPanorama,

    FxTrackSelectNext,
    FxTrackSetVolume,

    DeviceToggleWindow,
    DeviceSelectPrevious,
    DeviceSelectNext,
    DeviceSetParameter1,
    DeviceSetParameter2,
    DeviceSetParameter3,
    DeviceSetParameter4,

    BrowserBrowsePresets,
    BrowserCommitSelection,
    BrowserSelectNextFilterItem,

    ClipPlay,
    ClipStop,
    ClipRecord,

    SceneLaunch1,
    SceneLaunch2,

    MarkerAdd,
    MarkerLaunch1,

    MidiCcModulation,
    MidiCcSustain,

    ModesSelectTrack,
    ModesSelectVolume,
    ModesKnob1,

    NoteInputToggleRepeat,
    NoteInputSetRepeatPeriod,

    UserSetParameter1,

    ActionAssignable1,
}

/// Catalog row
struct CommandInfo {
    command: FlexiCommand,
    name: &'static str,
    category: Option<CommandCategory>,
    /// On/off action rather than a continuously variable one
    trigger: bool,
}

const fn info(
    command: FlexiCommand,
    name: &'static str,
    category: CommandCategory,
    trigger: bool,
) -> CommandInfo {
    CommandInfo {
        command,
        name,
        category: Some(category),
        trigger,
    }
}

use CommandCategory as C;
use FlexiCommand as F;

static CATALOG: &[CommandInfo] = &[
    CommandInfo {
        command: F::Off,
        name: "Off",
        category: None,
        trigger: false,
    },
    info(F::GlobalUndo, "Global: Undo", C::Global, true),
    info(F::GlobalRedo, "Global: Redo", C::Global, true),
    info(F::GlobalPreviousProject, "Global: Previous Project", C::Global, true),
    info(F::GlobalNextProject, "Global: Next Project", C::Global, true),
    info(F::GlobalToggleAudioEngine, "Global: Toggle Audio Engine", C::Global, true),
    info(F::TransportPlay, "Transport: Play", C::Transport, true),
    info(F::TransportStop, "Transport: Stop", C::Transport, true),
    info(F::TransportRestart, "Transport: Restart", C::Transport, true),
    info(F::TransportToggleRecord, "Transport: Toggle Record", C::Transport, true),
    info(F::TransportToggleRepeat, "Transport: Toggle Repeat", C::Transport, true),
    info(F::TransportToggleMetronome, "Transport: Toggle Metronome", C::Transport, true),
    info(F::TransportTapTempo, "Transport: Tap Tempo", C::Transport, true),
    info(F::TransportSetTempo, "Transport: Set Tempo", C::Transport, false),
    info(F::TransportMovePlayCursor, "Transport: Move Play Cursor", C::Transport, false),
    info(F::LayoutArrange, "Layout: Set Arrange Layout", C::Layout, true),
    info(F::LayoutMix, "Layout: Set Mix Layout", C::Layout, true),
    info(F::LayoutEdit, "Layout: Set Edit Layout", C::Layout, true),
    info(F::TrackSelectPrevious, "Track: Select Previous Track", C::Track, true),
    info(F::TrackSelectNext, "Track: Select Next Track", C::Track, true),
    info(F::TrackToggleMute, "Track: Toggle Mute", C::Track, true),
    info(F::TrackToggleSolo, "Track: Toggle Solo", C::Track, true),
    info(F::TrackToggleArm, "Track: Toggle Arm", C::Track, true),
    info(F::TrackSetVolume, "Track: Set Volume", C::Track, false),
    info(F::TrackSetPanorama, "Track: Set Panorama", C::Track, false),
    info(F::TrackSetSend1, "Track: Set Send 1", C::Track, false),
    info(F::MasterToggleMute, "Master: Toggle Mute", C::Master, true),
    info(F::MasterSetVolume, "Master: Set Volume", C::Master, false),
    info(F::MasterSetPanorama, "Master: Set Panorama", C::Master, false),
    info(F::FxTrackSelectNext, "FX Track: Select Next FX Track", C::FxTrack, true),
    info(F::FxTrackSetVolume, "FX Track: Set Volume", C::FxTrack, false),
    info(F::DeviceToggleWindow, "Device: Toggle Window", C::Device, true),
    info(F::DeviceSelectPrevious, "Device: Select Previous", C::Device, true),
    info(F::DeviceSelectNext, "Device: Select Next", C::Device, true),
    info(F::DeviceSetParameter1, "Device: Set Parameter 1", C::Device, false),
    info(F::DeviceSetParameter2, "Device: Set Parameter 2", C::Device, false),
    info(F::DeviceSetParameter3, "Device: Set Parameter 3", C::Device, false),
    info(F::DeviceSetParameter4, "Device: Set Parameter 4", C::Device, false),
    info(F::BrowserBrowsePresets, "Browser: Browse Presets", C::Browser, true),
    info(F::BrowserCommitSelection, "Browser: Commit Selection", C::Browser, true),
    info(F::BrowserSelectNextFilterItem, "Browser: Select Next Filter Item", C::Browser, true),
    info(F::ClipPlay, "Clip: Play", C::Clip, true),
    info(F::ClipStop, "Clip: Stop", C::Clip, true),
    info(F::ClipRecord, "Clip: Record", C::Clip, true),
    info(F::SceneLaunch1, "Scene: Launch Scene 1", C::Scene, true),
    info(F::SceneLaunch2, "Scene: Launch Scene 2", C::Scene, true),
    info(F::MarkerAdd, "Marker: Add Marker", C::Marker, true),
    info(F::MarkerLaunch1, "Marker: Launch Marker 1", C::Marker, true),
    info(F::MidiCcModulation, "MIDI CC: Modulation", C::MidiCc, false),
    info(F::MidiCcSustain, "MIDI CC: Sustain", C::MidiCc, false),
    info(F::ModesSelectTrack, "Modes: Select Mode Track", C::Modes, true),
    info(F::ModesSelectVolume, "Modes: Select Mode Volume", C::Modes, true),
    info(F::ModesKnob1, "Modes: Knob 1", C::Modes, false),
    info(F::NoteInputToggleRepeat, "Note Input: Toggle Repeat", C::NoteInput, true),
    info(F::NoteInputSetRepeatPeriod, "Note Input: Set Repeat Period", C::NoteInput, false),
    info(F::UserSetParameter1, "User: Set Parameter 1", C::User, false),
    info(F::ActionAssignable1, "Action: Assignable 1", C::Action, true),
];

impl FlexiCommand {
    fn info(self) -> &'static CommandInfo {
        // Every variant has a catalog row (checked by tests)
        CATALOG
            .iter()
            .find(|info| info.command == self)
            .unwrap_or(&CATALOG[0])
    }

    /// Persisted display name, e.g. "Transport: Play"
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Category, None for Off
    pub fn category(self) -> Option<CommandCategory> {
        self.info().category
    }

    /// Trigger commands are on/off actions and only accept absolute knob modes
    pub fn is_trigger(self) -> bool {
        self.info().trigger
    }

    pub fn is_off(self) -> bool {
        self == FlexiCommand::Off
    }

    /// Look up a command by its persisted name
    pub fn lookup_by_name(name: &str) -> Option<Self> {
        let name = name.trim();
        CATALOG.iter().find(|info| info.name == name).map(|info| info.command)
    }

    /// All commands in catalog order, Off first
    pub fn all() -> impl Iterator<Item = FlexiCommand> {
        CATALOG.iter().map(|info| info.command)
    }
}

impl fmt::Display for FlexiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_names_unique_and_prefixed() {
        let mut names = HashSet::new();
        for command in FlexiCommand::all() {
            assert!(names.insert(command.name()), "duplicate name {}", command.name());
            if let Some(category) = command.category() {
                assert!(command.name().starts_with(category.name()));
            }
        }
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(FlexiCommand::lookup_by_name("Transport: Play"), Some(FlexiCommand::TransportPlay));
        assert_eq!(FlexiCommand::lookup_by_name("Off"), Some(FlexiCommand::Off));
        assert_eq!(FlexiCommand::lookup_by_name("Transport: Fly"), None);
    }

    #[test]
    fn test_trigger_flags() {
        assert!(FlexiCommand::TransportPlay.is_trigger());
        assert!(!FlexiCommand::TrackSetVolume.is_trigger());
        assert!(!FlexiCommand::Off.is_trigger());
        assert_eq!(FlexiCommand::Off.category(), None);
    }

    #[test]
    fn test_every_category_has_commands() {
        for category in CommandCategory::ALL {
            assert!(category.commands().next().is_some(), "{} is empty", category);
        }
    }
}
