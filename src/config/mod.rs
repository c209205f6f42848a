//! Configuration for the control surface
//!
//! Loads, validates and saves the YAML settings file. Every section and field
//! has a default, so an empty file is a valid configuration.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::flexi::{KeyboardChannel, DEFAULT_NUM_SLOTS};

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SurfaceConfig {
    #[serde(default)]
    pub keyboard: KeyboardConfig,
    #[serde(default)]
    pub flexi: FlexiConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    /// Layout CSV; the embedded default layout is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_csv: Option<String>,
}

/// Keyboard note input routing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyboardConfig {
    /// -1 = off, 0-15 = MIDI channel, 16 = all channels
    #[serde(default)]
    pub channel: KeyboardChannel,
    /// Pass CC 1 straight to note input
    #[serde(default = "default_true")]
    pub route_modulation: bool,
    /// Pass CC 64 straight to note input
    #[serde(default = "default_true")]
    pub route_sustain: bool,
    #[serde(default = "default_true")]
    pub route_pitchbend: bool,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            channel: KeyboardChannel::default(),
            route_modulation: true,
            route_sustain: true,
            route_pitchbend: true,
        }
    }
}

/// Slot mapping settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlexiConfig {
    #[serde(default = "default_num_slots")]
    pub num_slots: usize,
    /// Match MMC SysEx against MMC slots
    #[serde(default = "default_true")]
    pub enable_mmc: bool,
    /// Mapping file loaded at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_file: Option<String>,
    /// Window in which echoed selector events are ignored (0 disables)
    #[serde(default = "default_command_settle_ms")]
    pub command_settle_ms: u64,
    /// Disarm learn mode after this long without input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learn_timeout_ms: Option<u64>,
}

impl Default for FlexiConfig {
    fn default() -> Self {
        Self {
            num_slots: default_num_slots(),
            enable_mmc: true,
            mapping_file: None,
            command_settle_ms: default_command_settle_ms(),
            learn_timeout_ms: None,
        }
    }
}

/// Scheduling delays
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Delay between a flush request and the refresh
    #[serde(default = "default_flush_tick_ms")]
    pub flush_tick_ms: u64,
    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            flush_tick_ms: default_flush_tick_ms(),
            long_press_ms: default_long_press_ms(),
        }
    }
}

/// Text display geometry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_rows")]
    pub rows: usize,
    #[serde(default = "default_display_cells")]
    pub cells: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            rows: default_display_rows(),
            cells: default_display_cells(),
        }
    }
}

impl SurfaceConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Failed to load config: {}", path.display()))?;

        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document deserializes to unit, not an empty map
        let config: SurfaceConfig = if contents.trim().is_empty() {
            SurfaceConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.flexi.num_slots == 0 {
            anyhow::bail!("flexi.num_slots must be at least 1");
        }
        if self.flexi.learn_timeout_ms == Some(0) {
            anyhow::bail!("flexi.learn_timeout_ms must be positive (omit it to disable)");
        }
        if let Some(file) = &self.flexi.mapping_file {
            if file.trim().is_empty() {
                anyhow::bail!("flexi.mapping_file cannot be empty");
            }
        }
        if self.timing.long_press_ms == 0 {
            anyhow::bail!("timing.long_press_ms must be positive");
        }
        if self.display.rows == 0 || self.display.cells == 0 {
            anyhow::bail!(
                "display must have at least one cell (rows={}, cells={})",
                self.display.rows,
                self.display.cells
            );
        }
        if let Some(layout) = &self.layout_csv {
            if layout.trim().is_empty() {
                anyhow::bail!("layout_csv cannot be empty");
            }
        }

        Ok(())
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_num_slots() -> usize { DEFAULT_NUM_SLOTS }
fn default_command_settle_ms() -> u64 { 600 }
fn default_flush_tick_ms() -> u64 { 1 }
fn default_long_press_ms() -> u64 { 400 }
fn default_display_rows() -> usize { 2 }
fn default_display_cells() -> usize { 8 }
