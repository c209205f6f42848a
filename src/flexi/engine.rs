//! Flexi mapping engine
//!
//! Owns the slot table and everything the settings surface edits: the
//! selected slot, the per-category command selectors, learn mode, keyboard
//! routing and the note suppression map. Also imports and exports the table
//! as a mapping file.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{FlexiConfig, KeyboardConfig};
use crate::control::{encoder, ControlValue, KnobMode, ToggleState};
use crate::error::ImportError;
use crate::flexi::command::{CommandCategory, FlexiCommand};
use crate::flexi::learn::{Learn, LearnCapture, LearnState};
use crate::flexi::note_map::{KeyboardChannel, NoteMap, NoteMapCache, NoteMapReader};
use crate::flexi::properties::Properties;
use crate::flexi::slot::{CommandSlot, SlotType, OMNI_CHANNEL};
use crate::host::Host;
use crate::scheduler::{Scheduler, Task};

/// Comment written at the top of exported mapping files
const EXPORT_COMMENT: &str = "Generic Flexi";

/// Settle window state for the category selectors
#[derive(Debug, Default)]
struct SelectorSettle {
    generation: u64,
    active: bool,
}

/// User-configurable slot mapping
pub struct FlexiMappingEngine {
    slots: Vec<CommandSlot>,
    selected: usize,
    selectors: BTreeMap<CommandCategory, FlexiCommand>,
    settle: SelectorSettle,
    command_settle: Duration,
    learn: Learn,
    learn_timeout: Option<Duration>,
    note_map: NoteMapCache,
    keyboard: KeyboardConfig,
    enable_mmc: bool,
    /// Per-slot state for the absolute toggle law
    toggles: Vec<ToggleState>,
    /// Last value sent per slot for `send_value` feedback
    feedback_shadow: Vec<Option<u8>>,
}

impl FlexiMappingEngine {
    pub fn new(config: &FlexiConfig, keyboard: KeyboardConfig) -> Self {
        let num_slots = config.num_slots.max(1);
        Self {
            slots: vec![CommandSlot::default(); num_slots],
            selected: 0,
            selectors: CommandCategory::ALL
                .iter()
                .map(|&category| (category, FlexiCommand::Off))
                .collect(),
            settle: SelectorSettle::default(),
            command_settle: Duration::from_millis(config.command_settle_ms),
            learn: Learn::default(),
            learn_timeout: config.learn_timeout_ms.map(Duration::from_millis),
            note_map: NoteMapCache::new(),
            keyboard,
            enable_mmc: config.enable_mmc,
            toggles: vec![ToggleState::default(); num_slots],
            feedback_shadow: vec![None; num_slots],
        }
    }

    /// Apply reloaded settings; the slot table size is fixed at construction
    pub fn apply_config(&mut self, config: &FlexiConfig, keyboard: KeyboardConfig) {
        if config.num_slots != self.slots.len() {
            warn!(
                "Slot count change ({} -> {}) needs a restart, keeping {}",
                self.slots.len(),
                config.num_slots,
                self.slots.len()
            );
        }
        self.command_settle = Duration::from_millis(config.command_settle_ms);
        self.learn_timeout = config.learn_timeout_ms.map(Duration::from_millis);
        self.enable_mmc = config.enable_mmc;
        self.set_keyboard(keyboard);
    }

    // =========================================================================
    // Slot table
    // =========================================================================

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[CommandSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&CommandSlot> {
        self.slots.get(index)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_slot(&self) -> &CommandSlot {
        &self.slots[self.selected]
    }

    /// Lowest-index active slot listening to this message
    pub fn find_slot(&self, slot_type: SlotType, number: u8, channel: u8) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.matches(slot_type, number, channel))
    }

    /// Decode a raw 7-bit value with the slot's knob mode
    ///
    /// None for toggle releases and unknown slots.
    pub fn decode_value(&mut self, index: usize, raw: u8) -> Option<ControlValue> {
        let slot = self.slots.get(index)?;
        let toggle = self.toggles.get_mut(index)?;
        encoder::decode(slot.knob_mode, raw, toggle)
    }

    /// Overwrite a whole slot (knob mode coerced for trigger commands)
    pub fn assign(&mut self, index: usize, slot: CommandSlot) -> bool {
        let num_slots = self.slots.len();
        let Some(target) = self.slots.get_mut(index) else {
            warn!("Slot {} out of range (0..{})", index, num_slots);
            return false;
        };
        *target = slot;
        fix_knob_mode(target);
        self.retarget(index);
        true
    }

    /// Drop per-slot decode and feedback state after the slot moved to
    /// another message or law
    fn retarget(&mut self, index: usize) {
        self.toggles[index] = ToggleState::default();
        self.feedback_shadow[index] = None;
        self.note_map.invalidate();
    }

    pub fn set_slot_type(&mut self, slot_type: SlotType) {
        let slot = &mut self.slots[self.selected];
        slot.slot_type = slot_type;
        fix_knob_mode(slot);
        self.retarget(self.selected);
    }

    pub fn set_number(&mut self, number: u8) {
        self.slots[self.selected].number = number & 0x7F;
        self.retarget(self.selected);
    }

    /// 0-15, or 16 for omni
    pub fn set_midi_channel(&mut self, channel: u8) {
        self.slots[self.selected].midi_channel = channel.min(OMNI_CHANNEL);
        self.retarget(self.selected);
    }

    pub fn set_knob_mode(&mut self, knob_mode: KnobMode) {
        let slot = &mut self.slots[self.selected];
        slot.knob_mode = knob_mode;
        fix_knob_mode(slot);
        self.retarget(self.selected);
    }

    pub fn set_send_value(&mut self, enabled: bool) {
        self.slots[self.selected].send_value = enabled;
        self.feedback_shadow[self.selected] = None;
    }

    pub fn set_send_value_when_received(&mut self, enabled: bool) {
        self.slots[self.selected].send_value_when_received = enabled;
    }

    /// Set the command of the selected slot directly
    pub fn set_command(&mut self, command: FlexiCommand) {
        let slot = &mut self.slots[self.selected];
        slot.command = command;
        fix_knob_mode(slot);
        self.note_map.invalidate();
    }

    /// Every command bound in at least one slot
    pub fn mapped_commands(&self) -> BTreeSet<FlexiCommand> {
        self.slots
            .iter()
            .map(|slot| slot.command)
            .filter(|command| !command.is_off())
            .collect()
    }

    // =========================================================================
    // Slot selection and category selectors
    // =========================================================================

    /// Select a slot and load its command into the category selectors
    ///
    /// All selectors are written in one go; echoes of these writes arriving
    /// during the settle window are ignored.
    pub fn select_slot(&mut self, index: usize, scheduler: &dyn Scheduler) -> bool {
        if index >= self.slots.len() {
            warn!("Cannot select slot {} (table has {})", index + 1, self.slots.len());
            return false;
        }
        self.selected = index;
        let command = self.slots[index].command;
        for (category, selector) in self.selectors.iter_mut() {
            *selector = if command.category() == Some(*category) {
                command
            } else {
                FlexiCommand::Off
            };
        }
        debug!("Selected slot {} ({})", index + 1, command);
        self.begin_settle(scheduler);
        true
    }

    /// Current value of a category selector
    pub fn selector(&self, category: CommandCategory) -> FlexiCommand {
        self.selectors
            .get(&category)
            .copied()
            .unwrap_or(FlexiCommand::Off)
    }

    pub fn is_settling(&self) -> bool {
        self.settle.active
    }

    /// The user picked a command in one category selector
    ///
    /// Returns true when the selected slot changed.
    pub fn on_function_selected(
        &mut self,
        category: CommandCategory,
        command: FlexiCommand,
        scheduler: &dyn Scheduler,
    ) -> bool {
        if self.settle.active {
            debug!("Ignoring {} selector event while settling", category);
            return false;
        }
        if !command.is_off() && command.category() != Some(category) {
            warn!("Command {} does not belong to category {}", command, category);
            return false;
        }

        let old = self.slots[self.selected].command;
        if command.is_off() {
            // Resetting a category only matters for the one holding the command
            if old.category() != Some(category) {
                return false;
            }
        } else if old == command {
            return false;
        }

        self.selectors.insert(category, command);
        self.set_command(command);

        if let Some(old_category) = old.category() {
            if old_category != category {
                self.selectors.insert(old_category, FlexiCommand::Off);
                self.begin_settle(scheduler);
            }
        }
        debug!("Slot {}: {} -> {}", self.selected + 1, old, command);
        true
    }

    fn begin_settle(&mut self, scheduler: &dyn Scheduler) {
        if self.command_settle.is_zero() {
            return;
        }
        self.settle.generation += 1;
        self.settle.active = true;
        scheduler.schedule(
            Task::CommandSettled {
                generation: self.settle.generation,
            },
            self.command_settle,
        );
    }

    /// End of a settle window; stale generations are ignored
    pub fn finish_settle(&mut self, generation: u64) {
        if generation == self.settle.generation {
            self.settle.active = false;
        }
    }

    // =========================================================================
    // Learn
    // =========================================================================

    pub fn learn_state(&self) -> LearnState {
        self.learn.state()
    }

    pub fn is_learning(&self) -> bool {
        self.learn.is_active()
    }

    pub fn start_learn(&mut self, scheduler: &dyn Scheduler) {
        let generation = self.learn.arm();
        info!("Learn armed for slot {}", self.selected + 1);
        if let Some(timeout) = self.learn_timeout {
            scheduler.schedule(Task::LearnExpired { generation }, timeout);
        }
    }

    /// Offer an incoming message to learn mode; true when it was captured
    pub fn capture_learn(&mut self, slot_type: SlotType, number: u8, channel: u8) -> bool {
        let captured = self.learn.capture(LearnCapture {
            slot_type,
            number,
            channel,
        });
        if captured {
            debug!("Learn captured {} {} ch:{}", slot_type, number, channel + 1);
        }
        captured
    }

    /// Write the capture into the selected slot
    pub fn commit_learn(&mut self) -> bool {
        let Some(capture) = self.learn.take() else {
            debug!("Nothing learned to commit");
            return false;
        };
        let slot = &mut self.slots[self.selected];
        slot.slot_type = capture.slot_type;
        slot.number = capture.number;
        slot.midi_channel = capture.channel;
        fix_knob_mode(slot);
        self.retarget(self.selected);
        info!(
            "Learned {} {} ch:{} into slot {}",
            capture.slot_type,
            capture.number,
            capture.channel + 1,
            self.selected + 1
        );
        true
    }

    pub fn cancel_learn(&mut self) {
        self.learn.cancel();
    }

    pub fn expire_learn(&mut self, generation: u64) {
        if self.learn.expire(generation) {
            info!("Learn timed out");
        }
    }

    // =========================================================================
    // Keyboard routing
    // =========================================================================

    pub fn keyboard(&self) -> &KeyboardConfig {
        &self.keyboard
    }

    pub fn set_keyboard(&mut self, keyboard: KeyboardConfig) {
        if keyboard.channel != self.keyboard.channel {
            self.note_map.invalidate();
        }
        self.keyboard = keyboard;
    }

    pub fn set_keyboard_channel(&mut self, channel: KeyboardChannel) {
        let keyboard = KeyboardConfig {
            channel,
            ..self.keyboard.clone()
        };
        self.set_keyboard(keyboard);
    }

    pub fn enable_mmc(&self) -> bool {
        self.enable_mmc
    }

    /// Note suppression map, rebuilt if stale
    pub fn note_map(&self) -> Arc<NoteMap> {
        self.note_map.get_or_build(&self.slots, self.keyboard.channel)
    }

    pub fn note_map_reader(&self) -> NoteMapReader {
        self.note_map.reader()
    }

    // =========================================================================
    // Value feedback
    // =========================================================================

    /// Immediate echo for `send_value_when_received` slots
    pub fn echo(&self, index: usize, value: ControlValue) -> Option<Vec<u8>> {
        let slot = self.slots.get(index)?;
        if !slot.send_value_when_received {
            return None;
        }
        slot.feedback(value.as_7bit()?)
    }

    /// Messages for absolute `send_value` slots whose host value changed
    pub fn collect_feedback(&mut self, host: &dyn Host) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            if !slot.is_active() || !slot.send_value || slot.knob_mode.is_relative() {
                continue;
            }
            let Some(value) = host.command_value(slot.command) else {
                continue;
            };
            if self.feedback_shadow[index] == Some(value) {
                continue;
            }
            if let Some(bytes) = slot.feedback(value) {
                self.feedback_shadow[index] = Some(value);
                out.push(bytes);
            }
        }
        out
    }

    pub fn clear_feedback_shadow(&mut self) {
        self.feedback_shadow.iter_mut().for_each(|v| *v = None);
    }

    // =========================================================================
    // Import / export
    // =========================================================================

    pub fn export_properties(&self) -> Properties {
        let mut props = Properties::new();
        for (i, slot) in self.slots.iter().enumerate() {
            let prefix = format!("SLOT{}_", i);
            props.set(format!("{prefix}TYPE"), slot.slot_type.persisted().to_string());
            props.set(format!("{prefix}NUMBER"), slot.number.to_string());
            props.set(format!("{prefix}MIDI_CHANNEL"), slot.midi_channel.to_string());
            props.set(format!("{prefix}KNOB_MODE"), slot.knob_mode.index().to_string());
            props.set(format!("{prefix}COMMAND"), slot.command.name());
            props.set(format!("{prefix}SEND_VALUE"), slot.send_value.to_string());
            props.set(
                format!("{prefix}SEND_VALUE_WHEN_RECEIVED"),
                slot.send_value_when_received.to_string(),
            );
        }
        props
    }

    pub fn export_string(&self) -> String {
        self.export_properties().write(Some(EXPORT_COMMENT))
    }

    /// Parse a mapping without touching the current table
    pub fn parse_mapping(&self, text: &str) -> Result<Vec<CommandSlot>, ImportError> {
        let props = Properties::parse(text)?;
        (0..self.slots.len()).map(|i| parse_slot(&props, i)).collect()
    }

    /// Replace the table from mapping text; on error nothing changes
    pub fn import_str(&mut self, text: &str, scheduler: &dyn Scheduler) -> Result<(), ImportError> {
        let slots = self.parse_mapping(text)?;
        self.slots = slots;
        self.toggles.iter_mut().for_each(|t| *t = ToggleState::default());
        self.clear_feedback_shadow();
        self.note_map.invalidate();
        self.select_slot(0, scheduler);
        info!("Imported {} slots", self.slots.len());
        Ok(())
    }

    /// Write the mapping file
    pub async fn export_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        tokio::fs::write(path, self.export_string())
            .await
            .with_context(|| format!("Failed to write mapping file: {}", path.display()))?;
        info!("💾 Exported {} slots to {}", self.slots.len(), path.display());
        Ok(())
    }

    /// Read the mapping file text; apply it with [`Self::import_str`]
    pub async fn read_mapping(path: impl AsRef<Path>) -> Result<String, ImportError> {
        Ok(tokio::fs::read_to_string(path).await?)
    }
}

/// Trigger commands only work with absolute push semantics on relative
/// knobs and on MMC
fn fix_knob_mode(slot: &mut CommandSlot) {
    if slot.command.is_trigger() && (slot.knob_mode.is_relative() || slot.slot_type == SlotType::Mmc) {
        slot.knob_mode = KnobMode::AbsolutePushDown;
    }
}

fn require<'a>(props: &'a Properties, key: &str) -> Result<&'a str, ImportError> {
    props.get(key).ok_or_else(|| ImportError::MissingKey {
        key: key.to_string(),
    })
}

fn parse_int(props: &Properties, key: &str, range: std::ops::RangeInclusive<i64>) -> Result<i64, ImportError> {
    let text = require(props, key)?;
    let value = text
        .trim()
        .parse::<i64>()
        .map_err(|_| ImportError::InvalidNumber {
            key: key.to_string(),
            value: text.to_string(),
        })?;
    if !range.contains(&value) {
        return Err(ImportError::OutOfRange {
            key: key.to_string(),
            value,
        });
    }
    Ok(value)
}

fn parse_bool(props: &Properties, key: &str) -> Result<bool, ImportError> {
    Ok(require(props, key)?.trim().eq_ignore_ascii_case("true"))
}

fn parse_slot(props: &Properties, index: usize) -> Result<CommandSlot, ImportError> {
    let prefix = format!("SLOT{}_", index);

    let command_key = format!("{prefix}COMMAND");
    let name = require(props, &command_key)?;
    let command = FlexiCommand::lookup_by_name(name).ok_or_else(|| ImportError::UnknownCommand {
        name: name.to_string(),
    })?;

    let type_key = format!("{prefix}TYPE");
    let type_value = parse_int(props, &type_key, -1..=4)?;
    let mut slot_type = SlotType::from_persisted(type_value).ok_or(ImportError::OutOfRange {
        key: type_key,
        value: type_value,
    })?;
    if command.is_off() {
        slot_type = SlotType::Off;
    }

    let number = parse_int(props, &format!("{prefix}NUMBER"), 0..=127)? as u8;
    let midi_channel = parse_int(props, &format!("{prefix}MIDI_CHANNEL"), 0..=OMNI_CHANNEL as i64)? as u8;

    let knob_key = format!("{prefix}KNOB_MODE");
    let knob_value = parse_int(props, &knob_key, 0..=(KnobMode::ALL.len() as i64 - 1))?;
    let knob_mode = KnobMode::from_index(knob_value as usize).ok_or(ImportError::OutOfRange {
        key: knob_key,
        value: knob_value,
    })?;

    Ok(CommandSlot {
        slot_type,
        number,
        midi_channel,
        knob_mode,
        command,
        send_value: parse_bool(props, &format!("{prefix}SEND_VALUE"))?,
        send_value_when_received: parse_bool(props, &format!("{prefix}SEND_VALUE_WHEN_RECEIVED"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    fn engine() -> FlexiMappingEngine {
        FlexiMappingEngine::new(&FlexiConfig::default(), KeyboardConfig::default())
    }

    fn slot(slot_type: SlotType, number: u8, channel: u8, command: FlexiCommand) -> CommandSlot {
        CommandSlot {
            slot_type,
            number,
            midi_channel: channel,
            command,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_slot_lowest_index_wins() {
        let mut engine = engine();
        engine.assign(9, slot(SlotType::Cc, 70, 0, FlexiCommand::TransportStop));
        engine.assign(4, slot(SlotType::Cc, 70, 0, FlexiCommand::TransportPlay));
        engine.assign(2, slot(SlotType::Cc, 70, 0, FlexiCommand::Off));

        assert_eq!(engine.find_slot(SlotType::Cc, 70, 0), Some(4));
        assert_eq!(engine.find_slot(SlotType::Cc, 70, 1), None);
    }

    #[test]
    fn test_trigger_command_forces_absolute() {
        let mut engine = engine();
        engine.set_slot_type(SlotType::Cc);
        engine.set_knob_mode(KnobMode::Relative2);
        engine.set_command(FlexiCommand::TransportPlay);
        assert_eq!(engine.selected_slot().knob_mode, KnobMode::AbsolutePushDown);

        // Toggle is fine for CC but not for MMC
        engine.set_knob_mode(KnobMode::AbsoluteToggle);
        assert_eq!(engine.selected_slot().knob_mode, KnobMode::AbsoluteToggle);
        engine.set_slot_type(SlotType::Mmc);
        assert_eq!(engine.selected_slot().knob_mode, KnobMode::AbsolutePushDown);

        // Continuous commands keep relative laws
        engine.set_slot_type(SlotType::Cc);
        engine.set_command(FlexiCommand::TrackSetVolume);
        engine.set_knob_mode(KnobMode::Relative1);
        assert_eq!(engine.selected_slot().knob_mode, KnobMode::Relative1);
    }

    #[test]
    fn test_export_import_normalizes_off_commands() {
        let scheduler = ManualScheduler::new();
        let mut source = engine();
        source.assign(0, slot(SlotType::Note, 60, 0, FlexiCommand::TransportPlay));
        source.assign(
            1,
            CommandSlot {
                knob_mode: KnobMode::Relative3,
                send_value: true,
                ..slot(SlotType::Cc, 16, 15, FlexiCommand::TrackSetVolume)
            },
        );
        // Stored type is kept on export but dropped on import
        source.assign(2, slot(SlotType::PitchBend, 0, 3, FlexiCommand::Off));

        let text = source.export_string();
        let mut target = engine();
        target.import_str(&text, &scheduler).unwrap();

        for i in 0..source.num_slots() {
            let mut expected = *source.slot(i).unwrap();
            if expected.command.is_off() {
                expected.slot_type = SlotType::Off;
            }
            assert_eq!(target.slot(i), Some(&expected), "slot {}", i);
        }
        assert_eq!(target.slot(2).unwrap().slot_type, SlotType::Off);
        assert_eq!(target.selected_index(), 0);
    }

    #[test]
    fn test_failed_import_keeps_state() {
        let scheduler = ManualScheduler::new();
        let mut engine = engine();
        engine.assign(5, slot(SlotType::Cc, 70, 0, FlexiCommand::TransportPlay));
        let good = engine.export_string();
        let before = engine.slots().to_vec();

        let bad_number = good.replace("SLOT7_NUMBER=0", "SLOT7_NUMBER=abc");
        assert!(matches!(
            engine.import_str(&bad_number, &scheduler),
            Err(ImportError::InvalidNumber { .. })
        ));

        let out_of_range = good.replace("SLOT7_MIDI_CHANNEL=0", "SLOT7_MIDI_CHANNEL=17");
        assert!(matches!(
            engine.import_str(&out_of_range, &scheduler),
            Err(ImportError::OutOfRange { .. })
        ));

        let unknown = good.replace("SLOT5_COMMAND=Transport\\: Play", "SLOT5_COMMAND=Transport\\: Fly");
        assert!(matches!(
            engine.import_str(&unknown, &scheduler),
            Err(ImportError::UnknownCommand { .. })
        ));

        let missing: String = good
            .lines()
            .filter(|line| !line.starts_with("SLOT199_KNOB_MODE"))
            .map(|line| format!("{}\n", line))
            .collect();
        assert!(matches!(
            engine.import_str(&missing, &scheduler),
            Err(ImportError::MissingKey { .. })
        ));

        assert_eq!(engine.slots(), before.as_slice());
    }

    #[test]
    fn test_learn_commit_writes_selected_slot() {
        let scheduler = ManualScheduler::new();
        let mut engine = engine();
        engine.select_slot(5, &scheduler);
        engine.set_command(FlexiCommand::TransportPlay);

        assert!(!engine.capture_learn(SlotType::Cc, 1, 0));
        engine.start_learn(&scheduler);
        assert!(engine.capture_learn(SlotType::Cc, 1, 0));
        assert!(engine.capture_learn(SlotType::Cc, 70, 0));
        // Nothing written before commit
        assert_eq!(engine.slot(5).unwrap().slot_type, SlotType::Off);

        assert!(engine.commit_learn());
        let slot = engine.slot(5).unwrap();
        assert_eq!((slot.slot_type, slot.number, slot.midi_channel), (SlotType::Cc, 70, 0));
        assert_eq!(engine.find_slot(SlotType::Cc, 70, 0), Some(5));
        assert!(!engine.is_learning());
    }

    #[test]
    fn test_retargeted_slot_starts_toggled_off() {
        let scheduler = ManualScheduler::new();
        let mut engine = engine();
        engine.assign(
            0,
            CommandSlot {
                knob_mode: KnobMode::AbsoluteToggle,
                ..slot(SlotType::Cc, 70, 0, FlexiCommand::TrackToggleMute)
            },
        );
        assert_eq!(engine.decode_value(0, 127), Some(ControlValue::Absolute(127)));
        assert_eq!(engine.decode_value(0, 0), None);

        // Learned control: first press switches on
        engine.start_learn(&scheduler);
        assert!(engine.capture_learn(SlotType::Cc, 71, 0));
        assert!(engine.commit_learn());
        assert_eq!(engine.selected_slot().knob_mode, KnobMode::AbsoluteToggle);
        assert_eq!(engine.decode_value(0, 127), Some(ControlValue::Absolute(127)));

        // Same for a number edit
        engine.set_number(72);
        assert_eq!(engine.decode_value(0, 127), Some(ControlValue::Absolute(127)));
        assert_eq!(engine.decode_value(0, 127), Some(ControlValue::Absolute(0)));

        // Unrelated edits keep the state
        engine.set_send_value_when_received(true);
        assert_eq!(engine.decode_value(0, 127), Some(ControlValue::Absolute(127)));
    }

    #[test]
    fn test_learn_timeout() {
        let scheduler = ManualScheduler::new();
        let config = FlexiConfig {
            learn_timeout_ms: Some(5000),
            ..Default::default()
        };
        let mut engine = FlexiMappingEngine::new(&config, KeyboardConfig::default());
        engine.start_learn(&scheduler);

        let tasks = scheduler.advance(Duration::from_secs(5));
        assert_eq!(tasks, vec![Task::LearnExpired { generation: 1 }]);
        engine.expire_learn(1);
        assert!(!engine.is_learning());
    }

    #[test]
    fn test_selectors_follow_selected_slot() {
        let scheduler = ManualScheduler::new();
        let mut engine = engine();
        engine.assign(3, slot(SlotType::Cc, 1, 0, FlexiCommand::TrackSetVolume));

        engine.select_slot(3, &scheduler);
        assert_eq!(engine.selector(CommandCategory::Track), FlexiCommand::TrackSetVolume);
        assert_eq!(engine.selector(CommandCategory::Transport), FlexiCommand::Off);

        // Echoes of the selector writes are ignored while settling
        assert!(engine.is_settling());
        assert!(!engine.on_function_selected(CommandCategory::Track, FlexiCommand::Off, &scheduler));
        assert_eq!(engine.slot(3).unwrap().command, FlexiCommand::TrackSetVolume);

        let tasks = scheduler.advance(Duration::from_millis(600));
        let Some(Task::CommandSettled { generation }) = tasks.first().copied() else {
            panic!("expected settle task, got {:?}", tasks);
        };
        engine.finish_settle(generation);
        assert!(!engine.is_settling());

        // Picking a command in another category resets the old selector
        assert!(engine.on_function_selected(
            CommandCategory::Transport,
            FlexiCommand::TransportPlay,
            &scheduler
        ));
        assert_eq!(engine.slot(3).unwrap().command, FlexiCommand::TransportPlay);
        assert_eq!(engine.selector(CommandCategory::Track), FlexiCommand::Off);
        assert_eq!(engine.selector(CommandCategory::Transport), FlexiCommand::TransportPlay);

        // The reset echo does not clear the new command
        assert!(!engine.on_function_selected(CommandCategory::Track, FlexiCommand::Off, &scheduler));
        assert_eq!(engine.slot(3).unwrap().command, FlexiCommand::TransportPlay);
    }

    #[test]
    fn test_zero_settle_disables_window() {
        let scheduler = ManualScheduler::new();
        let config = FlexiConfig {
            command_settle_ms: 0,
            ..Default::default()
        };
        let mut engine = FlexiMappingEngine::new(&config, KeyboardConfig::default());
        engine.select_slot(1, &scheduler);
        assert!(!engine.is_settling());
        assert_eq!(scheduler.pending(), 0);
        assert!(engine.on_function_selected(CommandCategory::Clip, FlexiCommand::ClipPlay, &scheduler));
    }

    #[test]
    fn test_note_map_follows_slot_changes() {
        let mut engine = engine();
        engine.assign(0, slot(SlotType::Note, 60, 0, FlexiCommand::TransportPlay));

        let map = engine.note_map();
        assert_eq!(map[60], crate::flexi::SUPPRESSED);
        assert!((0..128).filter(|&n| n != 60).all(|n| map[n] == n as i16));

        engine.set_keyboard_channel(KeyboardChannel::Channel(1));
        assert_eq!(engine.note_map()[60], 60);
    }

    #[test]
    fn test_mapped_commands() {
        let mut engine = engine();
        engine.assign(0, slot(SlotType::Cc, 1, 0, FlexiCommand::TransportPlay));
        engine.assign(1, slot(SlotType::Cc, 2, 0, FlexiCommand::TransportPlay));
        engine.assign(2, slot(SlotType::Cc, 3, 0, FlexiCommand::ClipStop));

        let commands: Vec<_> = engine.mapped_commands().into_iter().collect();
        assert_eq!(commands, vec![FlexiCommand::TransportPlay, FlexiCommand::ClipStop]);
    }

    #[tokio::test]
    async fn test_export_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.properties");
        let scheduler = ManualScheduler::new();

        let mut engine = engine();
        engine.assign(7, slot(SlotType::ProgramChange, 3, 2, FlexiCommand::SceneLaunch1));
        engine.export_to(&path).await.unwrap();

        let text = FlexiMappingEngine::read_mapping(&path).await.unwrap();
        assert!(text.starts_with("#Generic Flexi"));
        let mut other = self::engine();
        other.import_str(&text, &scheduler).unwrap();
        assert_eq!(other.slot(7), engine.slot(7));
    }
}
