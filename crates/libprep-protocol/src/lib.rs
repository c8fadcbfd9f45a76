//! Shared machine-readable contracts between the libprep orchestration core
//! and whatever drives the physical deck: well addressing, relative
//! locations, pipette models and thermal-cycler programs.

pub mod geometry;
pub mod instrument;
pub mod thermal;

pub use geometry::{Anchor, Location, Point, WellId};
pub use instrument::{PipetteModel, TipSlot, Tool};
pub use thermal::{CyclerCommand, ThermalProfile, ThermalStep};
