//! Protocol-wide liquid bookkeeping: finite reagent stocks and the advisory
//! volume of every well that liquid has been moved into.
//!
//! Nothing here is sensed. The ledger assumes every programmed transfer moves
//! exactly its nominal volume and is passed by `&mut` into every primitive
//! that moves liquid.

use crate::error::{ErrorCode, ProtocolError, ProtocolResult};
use libprep_protocol::WellId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub type StockId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub id: StockId,
    pub well: WellId,
    /// Tracked volume summed over every channel that draws from the stock.
    pub volume: f64,
    pub initial_volume: f64,
    /// Volume below which the stock is too shallow to draw from reliably.
    #[serde(default)]
    pub floor: f64,
}

impl Stock {
    pub fn new(id: &str, well: WellId, volume: f64) -> Self {
        Self {
            id: id.to_string(),
            well,
            volume,
            initial_volume: volume,
            floor: 0.0,
        }
    }

    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = floor;
        self
    }

    pub fn consumed(&self) -> f64 {
        self.initial_volume - self.volume
    }
}

/// Physical reservoirs backing one logical reagent, in the order they are
/// drawn down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockGroup {
    pub id: String,
    pub members: Vec<StockId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub stock: StockId,
    pub amount: f64,
    pub remaining: f64,
}

#[derive(Debug, Clone, Default)]
pub struct VolumeLedger {
    stocks: BTreeMap<StockId, Stock>,
    groups: BTreeMap<String, StockGroup>,
    wells: BTreeMap<WellId, f64>,
    journal: Vec<ConsumptionRecord>,
}

impl VolumeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stock(&mut self, stock: Stock) -> ProtocolResult<()> {
        if !stock.volume.is_finite() || stock.volume < 0.0 {
            return Err(ProtocolError::invalid_volume(format!(
                "Stock '{}' cannot start with volume {}",
                stock.id, stock.volume
            )));
        }
        if self.stocks.contains_key(&stock.id) {
            return Err(ProtocolError::new(
                ErrorCode::InvalidInput,
                format!("Stock '{}' is already registered", stock.id),
            ));
        }
        self.stocks.insert(stock.id.clone(), stock);
        Ok(())
    }

    pub fn add_group(&mut self, group: StockGroup) -> ProtocolResult<()> {
        if group.members.is_empty() {
            return Err(ProtocolError::new(
                ErrorCode::InvalidInput,
                format!("Stock group '{}' has no members", group.id),
            ));
        }
        for member in &group.members {
            self.stock(member)?;
        }
        self.groups.insert(group.id.clone(), group);
        Ok(())
    }

    pub fn stock(&self, id: &str) -> ProtocolResult<&Stock> {
        self.stocks
            .get(id)
            .ok_or_else(|| ProtocolError::not_found(format!("Stock '{id}' not found")))
    }

    pub fn stocks(&self) -> impl Iterator<Item = &Stock> {
        self.stocks.values()
    }

    pub fn volume(&self, id: &str) -> ProtocolResult<f64> {
        Ok(self.stock(id)?.volume)
    }

    /// Fails unless `amount` can be drawn from `id` without going negative.
    /// Used before any motion so that a shortfall aborts the run while the
    /// liquid is still where it was.
    pub fn ensure_available(&self, id: &str, amount: f64) -> ProtocolResult<()> {
        Self::check_amount(id, amount)?;
        let stock = self.stock(id)?;
        if stock.volume - amount < 0.0 {
            return Err(ProtocolError::new(
                ErrorCode::StockExhausted,
                format!(
                    "Stock '{id}' holds {} but {amount} is required",
                    stock.volume
                ),
            ));
        }
        Ok(())
    }

    /// Decrements a stock by one physical draw. A draw that would leave the
    /// stock negative is rejected and the tracked volume is left untouched.
    pub fn consume(&mut self, id: &str, amount: f64) -> ProtocolResult<f64> {
        self.ensure_available(id, amount)?;
        let stock = self
            .stocks
            .get_mut(id)
            .ok_or_else(|| ProtocolError::not_found(format!("Stock '{id}' not found")))?;
        let before = stock.volume;
        stock.volume -= amount;
        let remaining = stock.volume;
        info!(stock = id, before, after = remaining, "stock consumed");
        self.journal.push(ConsumptionRecord {
            stock: id.to_string(),
            amount,
            remaining,
        });
        Ok(remaining)
    }

    /// Picks the first reservoir of a group that can serve `amount` and still
    /// stay at or above its floor.
    pub fn select_active(&self, group_id: &str, amount: f64) -> ProtocolResult<StockId> {
        let group = self.groups.get(group_id).ok_or_else(|| {
            ProtocolError::not_found(format!("Stock group '{group_id}' not found"))
        })?;
        for (idx, member) in group.members.iter().enumerate() {
            let stock = self.stock(member)?;
            if stock.volume - amount >= stock.floor {
                if idx > 0 {
                    warn!(group = group_id, active = member.as_str(), "escalated to backup reservoir");
                }
                return Ok(member.clone());
            }
        }
        Err(ProtocolError::new(
            ErrorCode::StockExhausted,
            format!("No reservoir in group '{group_id}' can supply {amount}"),
        ))
    }

    pub fn group_volume(&self, group_id: &str) -> ProtocolResult<f64> {
        let group = self.groups.get(group_id).ok_or_else(|| {
            ProtocolError::not_found(format!("Stock group '{group_id}' not found"))
        })?;
        let mut total = 0.0;
        for member in &group.members {
            total += self.stock(member)?.volume;
        }
        Ok(total)
    }

    pub fn journal(&self) -> &[ConsumptionRecord] {
        &self.journal
    }

    pub fn well_volume(&self, well: &WellId) -> f64 {
        self.wells.get(well).copied().unwrap_or(0.0)
    }

    pub fn wells(&self) -> &BTreeMap<WellId, f64> {
        &self.wells
    }

    pub fn add_to_well(&mut self, well: &WellId, volume: f64) -> f64 {
        if well.is_trash() {
            return 0.0;
        }
        let entry = self.wells.entry(well.clone()).or_insert(0.0);
        *entry += volume.max(0.0);
        *entry
    }

    /// Removes up to `volume` from a well and returns what was actually taken.
    /// Drawing more than is tracked empties the well.
    pub fn remove_from_well(&mut self, well: &WellId, volume: f64) -> f64 {
        let Some(current) = self.wells.get_mut(well) else {
            return 0.0;
        };
        let taken = volume.max(0.0).min(*current);
        *current -= taken;
        if *current <= f64::EPSILON {
            *current = 0.0;
        }
        taken
    }

    /// Moves tracked liquid from one well to another. The destination always
    /// receives the programmed `volume`; the source clamps at empty.
    pub fn move_between(&mut self, from: &WellId, to: &WellId, volume: f64) -> f64 {
        let taken = self.remove_from_well(from, volume);
        self.add_to_well(to, volume);
        taken
    }

    pub fn empty_well(&mut self, well: &WellId) -> f64 {
        self.wells.insert(well.clone(), 0.0).unwrap_or(0.0)
    }

    fn check_amount(id: &str, amount: f64) -> ProtocolResult<()> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ProtocolError::invalid_volume(format!(
                "Cannot draw {amount} from stock '{id}'"
            )));
        }
        Ok(())
    }
}
