//! Named deck positions. Stages address wells by role ("purified_cdna"), and
//! the layout resolves a role to a labware well and its geometry class.

use crate::error::{ErrorCode, ProtocolError, ProtocolResult};
use crate::liquid_height::WellGeometry;
use lazy_static::lazy_static;
use libprep_protocol::{TipSlot, WellId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const BUILTIN_LAYOUT_JSON: &str = include_str!("../assets/deck_layout.json");

lazy_static! {
    pub static ref DEFAULT_LAYOUT: DeckLayout =
        DeckLayout::from_json(BUILTIN_LAYOUT_JSON).expect("Invalid built-in deck layout");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Labware {
    pub id: String,
    pub slot: u32,
    pub kind: String,
    pub geometry: WellGeometry,
}

#[derive(Debug, Clone, Deserialize)]
struct RawLayout {
    labware: Vec<Labware>,
    reusable_tip: TipSlot,
    roles: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeckLayout {
    labware: BTreeMap<String, Labware>,
    roles: BTreeMap<String, WellId>,
    reusable_tip: TipSlot,
}

impl DeckLayout {
    pub fn from_json(text: &str) -> ProtocolResult<Self> {
        let raw: RawLayout = serde_json::from_str(text)?;
        let mut labware = BTreeMap::new();
        for item in raw.labware {
            if labware.insert(item.id.clone(), item.clone()).is_some() {
                return Err(ProtocolError::new(
                    ErrorCode::InvalidInput,
                    format!("Labware '{}' is defined twice", item.id),
                ));
            }
        }
        let mut roles = BTreeMap::new();
        for (role, target) in raw.roles {
            let well: WellId = target
                .parse()
                .map_err(|e: String| ProtocolError::new(ErrorCode::InvalidInput, e))?;
            if !labware.contains_key(&well.labware) {
                return Err(ProtocolError::not_found(format!(
                    "Role '{role}' refers to unknown labware '{}'",
                    well.labware
                )));
            }
            roles.insert(role, well);
        }
        Ok(Self {
            labware,
            roles,
            reusable_tip: raw.reusable_tip,
        })
    }

    pub fn well(&self, role: &str) -> ProtocolResult<WellId> {
        self.roles
            .get(role)
            .cloned()
            .ok_or_else(|| ProtocolError::not_found(format!("No well assigned to role '{role}'")))
    }

    pub fn geometry(&self, well: &WellId) -> WellGeometry {
        self.labware
            .get(&well.labware)
            .map(|l| l.geometry)
            .unwrap_or(WellGeometry::DeepTube)
    }

    pub fn labware(&self) -> impl Iterator<Item = &Labware> {
        self.labware.values()
    }

    pub fn roles(&self) -> &BTreeMap<String, WellId> {
        &self.roles
    }

    /// Tip kept for mixing the bead stock.
    pub fn reusable_tip(&self) -> &TipSlot {
        &self.reusable_tip
    }
}

impl Default for DeckLayout {
    fn default() -> Self {
        DEFAULT_LAYOUT.clone()
    }
}
