//! Surface layout loader
//!
//! Parses a layout CSV describing every control of a surface and builds the
//! control registry plus the initial bindings from it.
//!
//! Columns: `control_id,kind,group,index,channel,message,law` where `channel`
//! is 1-based and `message` is one of `cc=70`, `note=94`, `pc=3` or `pb`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

use crate::config::SurfaceConfig;
use crate::control::binding::{BindingTable, Selector};
use crate::control::encoder::KnobMode;
use crate::control::registry::{ControlKind, ControlRegistry};
use crate::midi::MidiKind;

/// One row of the layout CSV
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutRow {
    pub control_id: String,
    pub kind: ControlKind,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub index: Option<usize>,
    pub channel: u8,
    pub message: String,
    #[serde(default)]
    pub law: Option<KnobMode>,
}

/// Parsed MIDI message specification (without channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiSpec {
    /// Control Change: cc=number
    ControlChange { cc: u8 },
    /// Note: note=number
    Note { note: u8 },
    /// Program change: pc=number
    ProgramChange { program: u8 },
    /// PitchBend: pb
    PitchBend,
}

impl MidiSpec {
    /// Parse a MIDI spec string like "cc=70", "note=110", "pc=3", "pb"
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();

        if let Some(cc_str) = spec.strip_prefix("cc=") {
            let cc = parse_7bit(cc_str).with_context(|| format!("Invalid CC number: {}", cc_str))?;
            Ok(MidiSpec::ControlChange { cc })
        } else if let Some(note_str) = spec.strip_prefix("note=") {
            let note = parse_7bit(note_str).with_context(|| format!("Invalid note number: {}", note_str))?;
            Ok(MidiSpec::Note { note })
        } else if let Some(pc_str) = spec.strip_prefix("pc=") {
            let program = parse_7bit(pc_str).with_context(|| format!("Invalid program number: {}", pc_str))?;
            Ok(MidiSpec::ProgramChange { program })
        } else if spec == "pb" {
            Ok(MidiSpec::PitchBend)
        } else {
            anyhow::bail!("Unknown MIDI spec format: {}", spec);
        }
    }

    /// Build a selector on a 0-based channel
    pub fn selector(&self, channel: u8) -> Selector {
        match *self {
            MidiSpec::ControlChange { cc } => Selector::new(MidiKind::Cc, channel, cc),
            MidiSpec::Note { note } => Selector::new(MidiKind::Note, channel, note),
            MidiSpec::ProgramChange { program } => Selector::new(MidiKind::ProgramChange, channel, program),
            MidiSpec::PitchBend => Selector::new(MidiKind::PitchBend, channel, 0),
        }
    }
}

fn parse_7bit(text: &str) -> Result<u8> {
    let value = text.trim().parse::<u8>()?;
    if value > 127 {
        anyhow::bail!("{} is out of range (0-127)", value);
    }
    Ok(value)
}

/// Registry and bindings built from a layout
#[derive(Debug, Default)]
pub struct SurfaceLayout {
    pub registry: ControlRegistry,
    pub bindings: BindingTable,
}

impl SurfaceLayout {
    /// Load a layout from a CSV file
    pub async fn load_from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let csv_content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read layout file: {}", path.display()))?;

        Self::load_from_string(&csv_content)
    }

    /// Load from an in-memory CSV string
    pub fn load_from_string(csv_content: &str) -> Result<Self> {
        let rows = parse_rows(csv_content)?;
        Ok(Self::from_rows(&rows))
    }

    /// The configured layout file, or the embedded default
    pub async fn from_config(config: &SurfaceConfig) -> Result<Self> {
        match &config.layout_csv {
            Some(path) => Self::load_from_csv(path).await,
            None => load_default_layout(),
        }
    }

    /// Build registry and bindings from already validated rows
    pub fn from_rows(rows: &[LayoutRow]) -> Self {
        let mut layout = SurfaceLayout::default();

        for row in rows {
            // Rows were validated by parse_rows
            let Ok(spec) = MidiSpec::parse(&row.message) else {
                continue;
            };
            let selector = spec.selector(row.channel.saturating_sub(1));
            let group = row.group.clone().map(|g| (g, row.index.unwrap_or(0)));
            let output = match row.kind {
                ControlKind::Continuous => None,
                ControlKind::Button | ControlKind::Light => Some(selector),
            };

            let id = layout.registry.register(row.control_id.clone(), row.kind, group, output);

            // Lights are output-only
            if row.kind != ControlKind::Light {
                layout.bindings.bind(id, selector, row.law.unwrap_or_default());
            }
        }

        info!(
            "Loaded surface layout: {} controls, {} bindings",
            layout.registry.len(),
            layout.bindings.len()
        );

        layout
    }
}

/// Parse and validate CSV rows
fn parse_rows(csv_content: &str) -> Result<Vec<LayoutRow>> {
    let mut reader = csv::Reader::from_reader(csv_content.as_bytes());
    let mut rows = Vec::new();

    for result in reader.deserialize() {
        let row: LayoutRow = result.context("Failed to parse layout CSV row")?;

        MidiSpec::parse(&row.message)
            .with_context(|| format!("Invalid message for {}", row.control_id))?;
        if !(1..=16).contains(&row.channel) {
            anyhow::bail!(
                "Control '{}' has invalid MIDI channel {} (must be 1-16)",
                row.control_id,
                row.channel
            );
        }

        rows.push(row);
    }

    Ok(rows)
}

/// Default embedded layout (generic transport + pads + knobs + faders)
pub const DEFAULT_LAYOUT_CSV: &str = include_str!("../../docs/default-layout.csv");

static DEFAULT_ROWS: OnceLock<Vec<LayoutRow>> = OnceLock::new();

/// Build the default layout (CSV parsed once and cached)
pub fn load_default_layout() -> Result<SurfaceLayout> {
    if let Some(rows) = DEFAULT_ROWS.get() {
        return Ok(SurfaceLayout::from_rows(rows));
    }

    let rows = parse_rows(DEFAULT_LAYOUT_CSV)?;
    let layout = SurfaceLayout::from_rows(&rows);
    // Ignore error if another thread set it first
    let _ = DEFAULT_ROWS.set(rows);
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_spec_parsing() {
        assert_eq!(MidiSpec::parse("cc=70").unwrap(), MidiSpec::ControlChange { cc: 70 });
        assert_eq!(MidiSpec::parse("note=110").unwrap(), MidiSpec::Note { note: 110 });
        assert_eq!(MidiSpec::parse("pc=3").unwrap(), MidiSpec::ProgramChange { program: 3 });
        assert_eq!(MidiSpec::parse(" pb ").unwrap(), MidiSpec::PitchBend);
        assert!(MidiSpec::parse("cc=200").is_err());
        assert!(MidiSpec::parse("sysex").is_err());
    }

    #[test]
    fn test_load_default_layout() {
        let layout = load_default_layout().unwrap();
        let registry = &layout.registry;

        let play = registry.find("play").unwrap();
        assert_eq!(registry.get(play).unwrap().kind(), ControlKind::Button);
        assert_eq!(
            layout.bindings.resolve(&Selector::new(MidiKind::Note, 0, 94)),
            Some(play)
        );

        // Faders on pitch bend, one channel each
        let fader3 = registry.find("fader3").unwrap();
        assert_eq!(
            layout.bindings.resolve(&Selector::new(MidiKind::PitchBend, 2, 0)),
            Some(fader3)
        );

        // Knobs carry their relative law
        let knob1 = registry.find("knob1").unwrap();
        assert_eq!(layout.bindings.binding(knob1).unwrap().law, KnobMode::Relative1);

        // Pads are grouped in order
        assert_eq!(registry.group("pad").len(), 8);

        // Lights are output-only
        let click = registry.find("click_led").unwrap();
        assert!(layout.bindings.binding(click).is_none());
        assert!(registry.get(click).unwrap().has_light());
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let csv = "control_id,kind,group,index,channel,message,law\nx,button,,,17,note=1,\n";
        assert!(SurfaceLayout::load_from_string(csv).is_err());
    }
}
