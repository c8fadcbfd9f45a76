//! Volume to vertical offset mapping for the two well geometries on the deck.
//!
//! Offsets are measured upward from the well's calibrated reference point and
//! are additive: callers add a fixed approach clearance (in volume-equivalent
//! units, see [`clearance_offset`]) to hover above the surface for blow-out.

use serde::{Deserialize, Serialize};

/// Slope of the shallow magnetic-plate curve up to [`MAG_WELL_BREAKPOINT`].
pub const MAG_WELL_LOW_RATE: f64 = 0.08;
/// Slope beyond the breakpoint, where the well widens.
pub const MAG_WELL_HIGH_RATE: f64 = 0.045;
pub const MAG_WELL_BREAKPOINT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WellGeometry {
    /// Shallow 96-well plate seated on the magnetic module.
    ShallowMagnetic,
    /// Reservoir troughs, tube strips and PCR plate wells.
    DeepTube,
}

impl WellGeometry {
    pub fn height_offset(self, volume: f64) -> f64 {
        match self {
            Self::ShallowMagnetic => mag_well_height(volume),
            Self::DeepTube => tube_height(volume),
        }
    }
}

pub fn mag_well_height(volume: f64) -> f64 {
    if volume.is_nan() || volume <= 0.0 {
        return 0.0;
    }
    if volume <= MAG_WELL_BREAKPOINT {
        volume * MAG_WELL_LOW_RATE
    } else {
        MAG_WELL_LOW_RATE * MAG_WELL_BREAKPOINT + (volume - MAG_WELL_BREAKPOINT) * MAG_WELL_HIGH_RATE
    }
}

/// Tube and reservoir wells are not height-corrected in the 8-channel deck
/// configuration; aspiration happens at the fixed calibrated bottom offset.
/// A measured curve exists for 1.5 ml tubes (0.031/µL to 500 µL, then 0.019)
/// but it must not be enabled without a guard against crushing the tip near
/// zero volume.
pub fn tube_height(_volume: f64) -> f64 {
    0.0
}

/// Offset that places the tip `clearance` volume-units above the surface of a
/// well holding `volume`.
pub fn clearance_offset(geometry: WellGeometry, volume: f64, clearance: f64) -> f64 {
    geometry.height_offset(volume + clearance)
}
