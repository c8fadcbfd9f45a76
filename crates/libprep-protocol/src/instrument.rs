use serde::{Deserialize, Serialize};
use std::fmt;

/// The two gang pipettes mounted on the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    P20,
    P300,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipetteModel {
    pub tool: Tool,
    pub channels: u32,
    pub max_volume: f64,
    /// Largest single draw the protocol allows, below `max_volume` to leave
    /// headroom for air gaps and blow-out.
    pub working_ceiling: f64,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::P20 => "p20_multi",
            Self::P300 => "p300_multi",
        }
    }

    pub const fn model(self) -> PipetteModel {
        match self {
            Self::P20 => PipetteModel {
                tool: self,
                channels: 8,
                max_volume: 20.0,
                working_ceiling: 20.0,
            },
            Self::P300 => PipetteModel {
                tool: self,
                channels: 8,
                max_volume: 300.0,
                working_ceiling: 230.0,
            },
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A specific tip position in a tip rack, used for tips that are returned and
/// picked up again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TipSlot {
    pub rack: usize,
    pub well: String,
}

impl TipSlot {
    pub fn new(rack: usize, well: &str) -> Self {
        Self {
            rack,
            well: well.to_string(),
        }
    }
}

impl fmt::Display for TipSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rack{}:{}", self.rack, self.well)
    }
}
