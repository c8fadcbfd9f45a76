//! Run configuration: loaded stock volumes, stage selection, cycle counts and
//! the physical calibration of this deck.

use crate::error::{ErrorCode, ProtocolError, ProtocolResult};
use crate::layout::DeckLayout;
use crate::ledger::{Stock, StockGroup, VolumeLedger};
use crate::stages::StageKind;
use libprep_protocol::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SPRI: &str = "spri";
pub const EB: &str = "eb";
pub const ELUTION: &str = "elution";
pub const DYNABEADS: &str = "dynabeads";
pub const ETHANOL: &str = "ethanol";

pub const MIN_INDEX_PCR_CYCLES: u32 = 5;
pub const MAX_INDEX_PCR_CYCLES: u32 = 20;

/// Empirical constants of one deck. They are tied to the motion timings and
/// labware offsets of the hardware they were measured on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub magnet_height: f64,
    /// Offset from a magnetic well's top to its bottom with the magnet down.
    pub no_magnet_offset: Point,
    /// Offset beside the pellet with the magnet engaged.
    pub magnet_offset: Point,
    /// Volume-equivalent height added above the surface for blow-out.
    pub approach_clearance: f64,
    /// Seconds that pass between ethanol removal and the start of the dry
    /// delay, subtracted from every programmed dry time.
    pub dry_elapsed_offset: f64,
    pub settle_secs: f64,
    pub wash_hold_secs: f64,
    pub wash_settle_secs: f64,
    pub wash_air_gap: f64,
    /// Volume left above the pellet when a wash is drawn off.
    pub wash_residual_margin: f64,
    /// Volume split off the first supernatant draw for the multiplex path.
    pub multiplex_diversion: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            magnet_height: 16.0,
            no_magnet_offset: Point::new(0.0, 0.0, -19.8),
            magnet_offset: Point::new(-0.1, 0.5, -16.7),
            approach_clearance: 80.0,
            dry_elapsed_offset: 39.0,
            settle_secs: 1.0,
            wash_hold_secs: 20.0,
            wash_settle_secs: 10.0,
            wash_air_gap: 20.0,
            wash_residual_margin: 10.0,
            multiplex_diversion: 75.0,
        }
    }
}

impl Calibration {
    /// Seconds left to wait after ethanol removal for a pellet that needs
    /// `dry_secs` in total.
    pub fn dry_delay(&self, dry_secs: f64) -> f64 {
        (dry_secs - self.dry_elapsed_offset).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockVolumes {
    pub spri: f64,
    pub eb: f64,
    pub elution: f64,
    pub dynabeads: f64,
    /// One entry per physical ethanol reservoir, drawn down in order.
    pub ethanol: Vec<f64>,
    pub ethanol_floor: f64,
}

impl Default for StockVolumes {
    fn default() -> Self {
        Self {
            spri: 4000.0,
            eb: 4000.0,
            elution: 2000.0,
            dynabeads: 2000.0,
            ethanol: vec![10000.0, 10000.0, 10000.0],
            ethanol_floor: 500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub multiplex: bool,
    /// 0 means "ask the operator when the stage is reached".
    pub index_pcr_cycles: u32,
    pub multiplex_index_pcr_cycles: u32,
    pub dna_amplification_cycles: u32,
    pub stocks: StockVolumes,
    pub stages: Vec<StageKind>,
    /// Per-well volumes present before the run, keyed by layout role.
    pub initial_wells: BTreeMap<String, f64>,
    pub calibration: Calibration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        let initial_wells = [
            ("cdna_amp_tc", 100.0),
            ("dyn_cleanup", 90.0),
            ("amp_rxn_mix", 71.5),
            ("frag_mix", 15.0),
            ("ada_lig_mix", 50.0),
            ("amp_mix", 55.0),
            ("dual_ind_tt", 20.0),
            ("dual_ind_nn", 20.0),
            ("multiplex_ind_pcr", 70.0),
        ]
        .into_iter()
        .map(|(role, volume)| (role.to_string(), volume))
        .collect();
        Self {
            multiplex: true,
            index_pcr_cycles: 0,
            multiplex_index_pcr_cycles: 6,
            dna_amplification_cycles: 12,
            stocks: StockVolumes::default(),
            stages: StageKind::default_order(),
            initial_wells,
            calibration: Calibration::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn load_from_path(path: &str) -> ProtocolResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::new(
                ErrorCode::Io,
                format!("Could not read config file '{path}': {e}"),
            )
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            ProtocolError::new(
                ErrorCode::InvalidInput,
                format!("Could not parse config JSON '{path}': {e}"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &str) -> ProtocolResult<()> {
        let text = serde_json::to_string_pretty(self).map_err(|e| {
            ProtocolError::new(
                ErrorCode::Internal,
                format!("Could not serialize config: {e}"),
            )
        })?;
        std::fs::write(path, text).map_err(|e| {
            ProtocolError::new(
                ErrorCode::Io,
                format!("Could not write config file '{path}': {e}"),
            )
        })
    }

    pub fn validate(&self) -> ProtocolResult<()> {
        let cycles = self.index_pcr_cycles;
        if cycles != 0 && !(MIN_INDEX_PCR_CYCLES..=MAX_INDEX_PCR_CYCLES).contains(&cycles) {
            return Err(ProtocolError::new(
                ErrorCode::InvalidInput,
                format!(
                    "index_pcr_cycles must be 0 (ask) or between {MIN_INDEX_PCR_CYCLES} and {MAX_INDEX_PCR_CYCLES}, got {cycles}"
                ),
            ));
        }
        if self.multiplex_index_pcr_cycles == 0 || self.dna_amplification_cycles == 0 {
            return Err(ProtocolError::new(
                ErrorCode::InvalidInput,
                "Cycle counts must be positive",
            ));
        }
        if self.stocks.ethanol.is_empty() {
            return Err(ProtocolError::new(
                ErrorCode::InvalidInput,
                "At least one ethanol reservoir is required",
            ));
        }
        for (idx, stage) in self.stages.iter().enumerate() {
            if self.stages[..idx].contains(stage) {
                return Err(ProtocolError::new(
                    ErrorCode::InvalidInput,
                    format!("Stage '{}' is listed twice", stage.as_str()),
                ));
            }
        }
        Ok(())
    }

    /// Registers every stock at its layout position and seeds the
    /// pre-loaded wells.
    pub fn build_ledger(&self, layout: &DeckLayout) -> ProtocolResult<VolumeLedger> {
        let mut ledger = VolumeLedger::new();
        let stocks = &self.stocks;
        for (id, role, volume) in [
            (SPRI, "spri_stock", stocks.spri),
            (EB, "eb_stock", stocks.eb),
            (ELUTION, "elution_stock", stocks.elution),
            (DYNABEADS, "dynabead_stock", stocks.dynabeads),
        ] {
            ledger.add_stock(Stock::new(id, layout.well(role)?, volume))?;
        }

        let mut members = vec![];
        for (idx, volume) in stocks.ethanol.iter().enumerate() {
            let id = format!("{ETHANOL}_{}", idx + 1);
            let well = layout.well(&id)?;
            ledger.add_stock(Stock::new(&id, well, *volume).with_floor(stocks.ethanol_floor))?;
            members.push(id);
        }
        ledger.add_group(StockGroup {
            id: ETHANOL.to_string(),
            members,
        })?;

        for (role, volume) in &self.initial_wells {
            ledger.add_to_well(&layout.well(role)?, *volume);
        }
        Ok(ledger)
    }
}
