//! Controls, bindings and value laws
//!
//! - [`registry`]: the logical controls of a surface
//! - [`binding`]: raw message selectors to controls
//! - [`encoder`]: absolute and relative knob laws
//! - [`layout`]: CSV surface definitions

pub mod binding;
pub mod encoder;
pub mod layout;
pub mod registry;

pub use binding::{Binding, BindingTable, Selector};
pub use encoder::{ControlValue, KnobMode, ToggleState};
pub use layout::{load_default_layout, MidiSpec, SurfaceLayout};
pub use registry::{ControlId, ControlKind, ControlRegistry, ControlState, LogicalControl};
