use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalStep {
    pub celsius: f64,
    pub hold_seconds: u32,
}

impl ThermalStep {
    pub const fn new(celsius: f64, hold_seconds: u32) -> Self {
        Self {
            celsius,
            hold_seconds,
        }
    }
}

/// An ordered list of temperature holds repeated a fixed number of cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalProfile {
    pub steps: Vec<ThermalStep>,
    pub repetitions: u32,
}

impl ThermalProfile {
    pub fn new(steps: Vec<ThermalStep>, repetitions: u32) -> Self {
        Self { steps, repetitions }
    }

    pub fn cycle_seconds(&self) -> u64 {
        self.steps.iter().map(|s| s.hold_seconds as u64).sum()
    }

    /// Nominal hold time, ignoring ramp time between steps.
    pub fn total_seconds(&self) -> u64 {
        self.cycle_seconds() * self.repetitions as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclerCommand {
    OpenLid,
    CloseLid,
    SetLid {
        celsius: f64,
    },
    DeactivateLid,
    SetBlock {
        celsius: f64,
        #[serde(default)]
        hold_seconds: Option<u32>,
        #[serde(default)]
        max_volume: Option<f64>,
    },
    Profile {
        profile: ThermalProfile,
        max_volume: f64,
    },
}

impl CyclerCommand {
    pub fn block(celsius: f64) -> Self {
        Self::SetBlock {
            celsius,
            hold_seconds: None,
            max_volume: None,
        }
    }

    pub fn block_hold(celsius: f64, hold_seconds: u32, max_volume: f64) -> Self {
        Self::SetBlock {
            celsius,
            hold_seconds: Some(hold_seconds),
            max_volume: Some(max_volume),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::OpenLid => "open lid".to_string(),
            Self::CloseLid => "close lid".to_string(),
            Self::SetLid { celsius } => format!("lid to {celsius}C"),
            Self::DeactivateLid => "deactivate lid".to_string(),
            Self::SetBlock {
                celsius,
                hold_seconds: Some(hold),
                ..
            } => format!("block to {celsius}C, hold {hold}s"),
            Self::SetBlock { celsius, .. } => format!("block to {celsius}C"),
            Self::Profile { profile, .. } => format!(
                "profile of {} step(s) x {} cycle(s), ~{}s",
                profile.steps.len(),
                profile.repetitions,
                profile.total_seconds()
            ),
        }
    }
}
