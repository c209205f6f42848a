//! Control-surface dispatch core
//!
//! Turns raw MIDI from a hardware controller into host actions. Bound controls
//! go to the active View or Mode, everything else can be mapped through a
//! table of learnable Flexi slots. Feedback to the controller is coalesced
//! into one flush per tick.
//!
//! ```ignore
//! let config = SurfaceConfig::load("surface.yaml").await?;
//! let layout = SurfaceLayout::from_config(&config).await?;
//! let handle = SurfaceActor::spawn(layout, config, Box::new(host), |surface| {
//!     surface.register_view(ViewId("mixer"), Box::new(MixerView::default()));
//!     surface.set_active_view(ViewId("mixer"));
//! });
//! handle.on_midi(0x90, 94, 127);
//! ```

pub mod actor;
pub mod config;
pub mod control;
pub mod error;
pub mod featuregroup;
pub mod flexi;
pub mod host;
pub mod logging;
pub mod midi;
pub mod scheduler;
pub mod surface;

pub use actor::{SurfaceActor, SurfaceHandle};
pub use config::SurfaceConfig;
pub use control::SurfaceLayout;
pub use error::ImportError;
pub use featuregroup::{ModeId, SurfaceHandler, ViewId};
pub use flexi::{FlexiCommand, FlexiMappingEngine};
pub use host::Host;
pub use surface::{ControlSurface, SettingsEvent};
