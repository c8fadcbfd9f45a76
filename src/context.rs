use crate::config::{Calibration, ProtocolConfig};
use crate::error::ProtocolResult;
use crate::hardware::{OperatorConsole, Robot};
use crate::layout::DeckLayout;
use crate::ledger::VolumeLedger;
use libprep_protocol::WellId;

/// Everything one protocol run mutates or consults, passed by `&mut` into
/// each stage.
pub struct ProtocolContext {
    pub robot: Robot,
    pub ledger: VolumeLedger,
    pub calibration: Calibration,
    pub layout: DeckLayout,
    pub console: Box<dyn OperatorConsole>,
}

impl ProtocolContext {
    pub fn new(
        robot: Robot,
        console: Box<dyn OperatorConsole>,
        config: &ProtocolConfig,
        layout: DeckLayout,
    ) -> ProtocolResult<Self> {
        config.validate()?;
        let ledger = config.build_ledger(&layout)?;
        Ok(Self {
            robot,
            ledger,
            calibration: config.calibration.clone(),
            layout,
            console,
        })
    }

    pub fn well(&self, role: &str) -> ProtocolResult<WellId> {
        self.layout.well(role)
    }
}
