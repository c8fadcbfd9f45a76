//! Ethanol washes of a magnet-held pellet and resuspension of the dried
//! pellet in elution buffer.

use crate::config::Calibration;
use crate::error::{ProtocolError, ProtocolResult};
use crate::hardware::Robot;
use crate::ledger::VolumeLedger;
use crate::liquid_height::{clearance_offset, WellGeometry};
use crate::transfer::{COLUMN_MULTIPLICITY, LARGE_TOOL_SAFE_CEILING};
use libprep_protocol::{Location, Tool, WellId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Largest wash stage, delivered as two passes at the tool's safe ceiling.
pub const MAX_WASH_VOLUME: f64 = 2.0 * LARGE_TOOL_SAFE_CEILING;
pub const RESUSPEND_STROKES: u32 = 30;
/// Volume subtracted from a mix volume for the gentler agitation strokes.
pub const AGITATION_MARGIN: f64 = 20.0;

const STOCK_DRAW_CLEARANCE: f64 = 2.0;
const STOCK_EXIT_HEIGHT: f64 = 5.0;
const DRIP_SECS: f64 = 3.0;
const GENTLE_RATE: f64 = 0.2;
const REMOVAL_LIFT: f64 = 2.0;
const REMOVAL_SPEED: f64 = 1.0;
const RESUSPEND_RISE_SPEED: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WashStageReport {
    pub volume: f64,
    pub stock: String,
    pub consumed: f64,
    pub agitation_cycles: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WashReport {
    pub stages: Vec<WashStageReport>,
}

impl WashReport {
    pub fn consumed(&self) -> f64 {
        self.stages.iter().map(|s| s.consumed).sum()
    }
}

pub(crate) fn check_stages(stages: &[f64], air_gap: f64) -> ProtocolResult<()> {
    for w in stages {
        if *w == 0.0 {
            continue;
        }
        if w.is_nan() || *w <= air_gap || *w > MAX_WASH_VOLUME {
            return Err(ProtocolError::invalid_volume(format!(
                "wash volume must be 0 or between {air_gap} and {MAX_WASH_VOLUME}, got {w}"
            )));
        }
    }
    Ok(())
}

/// Runs one ethanol wash per entry of `stages` on the pellet in `well`,
/// drawing from the stock `group`. Zero entries are skipped. The magnet
/// must already be engaged and the large tool must not carry a tip.
pub fn wash(
    robot: &mut Robot,
    ledger: &mut VolumeLedger,
    calibration: &Calibration,
    group: &str,
    well: &WellId,
    stages: &[f64],
) -> ProtocolResult<WashReport> {
    check_stages(stages, calibration.wash_air_gap)?;
    let beside_pellet = Location::top(well).moved(calibration.magnet_offset);
    let top = Location::top(well);
    let mut report = WashReport::default();

    for (idx, w) in stages.iter().copied().enumerate() {
        if w == 0.0 {
            debug!(stage = idx + 1, "wash stage skipped");
            continue;
        }
        let draw = w * COLUMN_MULTIPLICITY;
        let stock_id = ledger.select_active(group, draw)?;
        ledger.ensure_available(&stock_id, draw)?;
        let stock_well = ledger.stock(&stock_id)?.well.clone();
        info!(stage = idx + 1, volume = w, stock = stock_id.as_str(), well = %well, "ethanol wash");

        let passes = if w <= LARGE_TOOL_SAFE_CEILING {
            vec![w]
        } else {
            vec![w / 2.0; 2]
        };
        robot.p300.pick_up_tip()?;
        for (pass_idx, pass) in passes.iter().copied().enumerate() {
            robot
                .p300
                .aspirate(pass, &Location::bottom_z(&stock_well, STOCK_DRAW_CLEARANCE), 1.0)?;
            robot
                .p300
                .move_to(&Location::top_z(&stock_well, STOCK_EXIT_HEIGHT), None)?;
            robot.p300.air_gap(calibration.wash_air_gap)?;
            robot.p300.touch_tip()?;
            robot.delay(DRIP_SECS);
            let p300 = &mut *robot.p300;
            p300.move_to(&top, None)?;
            p300.dispense(pass, &beside_pellet, GENTLE_RATE)?;
            p300.move_to(&top, None)?;
            p300.blow_out(None)?;
            if passes.len() > 1 && pass_idx == 0 {
                p300.drop_tip()?;
                p300.pick_up_tip()?;
            }
        }
        ledger.add_to_well(well, w);
        ledger.consume(&stock_id, draw)?;

        let agitation = if w < LARGE_TOOL_SAFE_CEILING {
            w - AGITATION_MARGIN
        } else {
            LARGE_TOOL_SAFE_CEILING
        };
        let hold = robot.hold(Tool::P300, calibration.wash_hold_secs, |p| {
            p.aspirate(agitation, &beside_pellet, GENTLE_RATE)?;
            p.dispense(agitation, &beside_pellet, GENTLE_RATE)
        })?;
        robot.delay(calibration.wash_settle_secs);

        // leave the residual margin above the pellet
        let removal = (ledger.well_volume(well) - calibration.wash_residual_margin).max(0.0);
        let lifted = Location::bottom_z(well, REMOVAL_LIFT);
        if removal == 0.0 {
            debug!(stage = idx + 1, well = %well, "nothing above the residual margin");
        } else if removal <= LARGE_TOOL_SAFE_CEILING {
            robot.p300.aspirate(removal, &beside_pellet, GENTLE_RATE)?;
            robot.delay(calibration.settle_secs);
            robot.p300.move_to(&lifted, Some(REMOVAL_SPEED))?;
            ledger.remove_from_well(well, removal);
        } else {
            let trash = Location::bottom(&WellId::trash());
            for _ in 0..2 {
                let take = removal / 2.0;
                robot.p300.aspirate(take, &beside_pellet, GENTLE_RATE)?;
                robot.delay(calibration.settle_secs);
                robot.p300.move_to(&lifted, Some(REMOVAL_SPEED))?;
                robot.p300.dispense(take, &trash, 1.0)?;
                ledger.remove_from_well(well, take);
            }
        }
        robot.p300.drop_tip()?;

        report.stages.push(WashStageReport {
            volume: w,
            stock: stock_id,
            consumed: draw,
            agitation_cycles: hold.cycles,
        });
    }
    info!(well = %well, consumed = report.consumed(), "pellet air dry started");
    Ok(report)
}

/// Resuspension of a pellet in elution buffer, followed by re-separation.
#[derive(Debug, Clone, PartialEq)]
pub struct Resuspension {
    pub well: WellId,
    pub mix_volume: f64,
    pub total_volume: f64,
    pub incubate_secs: f64,
    pub magnet_secs: f64,
}

impl Resuspension {
    pub fn validate(&self) -> ProtocolResult<()> {
        let ceiling = Tool::P300.model().working_ceiling;
        if self.mix_volume.is_nan()
            || self.mix_volume <= AGITATION_MARGIN
            || self.mix_volume > ceiling
        {
            return Err(ProtocolError::invalid_volume(format!(
                "resuspension mix volume must be between {AGITATION_MARGIN} and {ceiling}, got {}",
                self.mix_volume
            )));
        }
        Ok(())
    }
}

/// Mixes the pellet back into solution with the magnet down, incubates with
/// gentle agitation, then engages the magnet and waits for the beads to
/// re-pellet. The large tool ends without a tip.
pub fn resuspend(
    robot: &mut Robot,
    calibration: &Calibration,
    step: &Resuspension,
) -> ProtocolResult<()> {
    step.validate()?;
    let bottom = Location::top(&step.well).moved(calibration.no_magnet_offset);
    let above = bottom.raised(clearance_offset(
        WellGeometry::ShallowMagnetic,
        step.total_volume,
        calibration.approach_clearance,
    ));
    info!(well = %step.well, mix = step.mix_volume, "resuspending pellet");

    robot.p300.pick_up_tip()?;
    robot
        .p300
        .mix(RESUSPEND_STROKES, step.mix_volume, &bottom, 1.0)?;
    robot.delay(calibration.settle_secs);
    robot.p300.move_to(&above, Some(RESUSPEND_RISE_SPEED))?;
    robot.delay(calibration.settle_secs);
    robot.p300.blow_out(None)?;

    let agitation = step.mix_volume - AGITATION_MARGIN;
    robot.hold(Tool::P300, step.incubate_secs, |p| {
        p.aspirate(agitation, &bottom, GENTLE_RATE)?;
        p.dispense(agitation, &bottom, GENTLE_RATE)
    })?;

    robot.p300.move_to(&above, Some(RESUSPEND_RISE_SPEED))?;
    robot.delay(calibration.settle_secs);
    robot.p300.blow_out(None)?;

    info!(height = calibration.magnet_height, "magnet engaged");
    robot.magnet.engage(calibration.magnet_height)?;
    robot.p300.drop_tip()?;
    robot.delay(step.magnet_secs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::ledger::{Stock, StockGroup};
    use crate::simulator::{Motion, Simulator};
    use std::time::Duration;

    fn ledger_with_ethanol(volumes: &[f64], floor: f64) -> VolumeLedger {
        let mut ledger = VolumeLedger::new();
        let mut members = vec![];
        for (idx, volume) in volumes.iter().enumerate() {
            let id = format!("ethanol_{}", idx + 1);
            let well = WellId::new("r15", &format!("A{}", idx + 8));
            ledger
                .add_stock(Stock::new(&id, well, *volume).with_floor(floor))
                .unwrap();
            members.push(id);
        }
        ledger
            .add_group(StockGroup {
                id: "ethanol".to_string(),
                members,
            })
            .unwrap();
        ledger
    }

    #[test]
    fn test_two_stage_wash_consumes_exactly() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        let mut ledger = ledger_with_ethanol(&[20000.0], 0.0);
        let cal = Calibration::default();
        let well = WellId::new("mag_plate", "A11");
        robot.magnet.engage(cal.magnet_height).unwrap();

        let report = wash(&mut robot, &mut ledger, &cal, "ethanol", &well, &[200.0, 200.0]).unwrap();
        assert_eq!(report.consumed(), 3200.0);
        assert_eq!(ledger.volume("ethanol_1").unwrap(), 20000.0 - 3200.0);
        assert_eq!(ledger.well_volume(&well), cal.wash_residual_margin);
        // the second stage also takes the first stage's leftover
        assert_eq!(
            sim.aspirations(Tool::P300)
                .into_iter()
                .filter(|v| *v == 190.0 || *v == 200.0)
                .count(),
            4
        );
        assert_eq!(report.stages.len(), 2);
        assert!(report.stages.iter().all(|s| s.agitation_cycles >= 1));
        assert!(!robot.p300.has_tip());
        assert_eq!(
            sim.count(|m| matches!(m, Motion::AirGap { volume, .. } if *volume == 20.0)),
            2
        );
    }

    #[test]
    fn test_wash_holds_at_least_configured_time() {
        let sim = Simulator::new(Duration::from_millis(100));
        let mut robot = sim.robot();
        let mut ledger = ledger_with_ethanol(&[20000.0], 0.0);
        let cal = Calibration::default();
        let well = WellId::new("mag_plate", "A11");
        wash(&mut robot, &mut ledger, &cal, "ethanol", &well, &[200.0]).unwrap();
        // hold + settle + drip + motion costs
        assert!(sim.elapsed() >= Duration::from_secs(33));
    }

    #[test]
    fn test_large_wash_splits_and_drains_to_trash() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        let mut ledger = ledger_with_ethanol(&[10000.0], 0.0);
        let cal = Calibration::default();
        let well = WellId::new("mag_plate", "A4");
        wash(&mut robot, &mut ledger, &cal, "ethanol", &well, &[260.0]).unwrap();
        assert_eq!(sim.fresh_tip_pickups(Tool::P300), 2);
        assert_eq!(sim.dispenses_into(Tool::P300, &WellId::trash()), vec![125.0, 125.0]);
        assert_eq!(ledger.well_volume(&well), cal.wash_residual_margin);
        assert_eq!(ledger.volume("ethanol_1").unwrap(), 10000.0 - 2080.0);
    }

    #[test]
    fn test_zero_stages_skipped() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        let mut ledger = ledger_with_ethanol(&[1000.0], 0.0);
        let cal = Calibration::default();
        let well = WellId::new("mag_plate", "A10");
        let report = wash(&mut robot, &mut ledger, &cal, "ethanol", &well, &[0.0, 0.0]).unwrap();
        assert!(report.stages.is_empty());
        assert_eq!(sim.motion_count(), 0);
    }

    #[test]
    fn test_oversized_stage_rejected_before_motion() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        let mut ledger = ledger_with_ethanol(&[20000.0], 0.0);
        let cal = Calibration::default();
        let well = WellId::new("mag_plate", "A10");
        let err = wash(&mut robot, &mut ledger, &cal, "ethanol", &well, &[200.0, 500.0]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidVolume);
        assert_eq!(sim.motion_count(), 0);
        assert_eq!(ledger.volume("ethanol_1").unwrap(), 20000.0);
    }

    #[test]
    fn test_wash_escalates_to_next_reservoir() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        let mut ledger = ledger_with_ethanol(&[2000.0, 10000.0], 500.0);
        let cal = Calibration::default();
        let well = WellId::new("mag_plate", "A11");
        let report = wash(&mut robot, &mut ledger, &cal, "ethanol", &well, &[150.0, 150.0]).unwrap();
        assert_eq!(report.stages[0].stock, "ethanol_1");
        assert_eq!(report.stages[1].stock, "ethanol_2");
        assert_eq!(ledger.volume("ethanol_1").unwrap(), 800.0);
        assert_eq!(ledger.volume("ethanol_2").unwrap(), 8800.0);
    }

    #[test]
    fn test_resuspend_ends_on_magnet_without_tips() {
        let sim = Simulator::new(Duration::from_millis(500));
        let mut robot = sim.robot();
        let cal = Calibration::default();
        let step = Resuspension {
            well: WellId::new("mag_plate", "A11"),
            mix_volume: 31.0,
            total_volume: 41.0,
            incubate_secs: 120.0,
            magnet_secs: 120.0,
        };
        resuspend(&mut robot, &cal, &step).unwrap();
        assert!(robot.magnet.is_engaged());
        assert!(!robot.p300.has_tip());
        let strokes = sim.aspirations(Tool::P300);
        assert_eq!(strokes.iter().filter(|v| **v == 31.0).count(), 30);
        assert!(strokes.iter().any(|v| *v == 11.0));
        assert!(sim.elapsed() >= Duration::from_secs(240));
    }

    #[test]
    fn test_resuspend_rejects_tiny_mix() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        let step = Resuspension {
            well: WellId::new("mag_plate", "A11"),
            mix_volume: 15.0,
            total_volume: 25.0,
            incubate_secs: 10.0,
            magnet_secs: 10.0,
        };
        assert_eq!(
            resuspend(&mut robot, &Calibration::default(), &step)
                .unwrap_err()
                .code,
            ErrorCode::InvalidVolume
        );
        assert_eq!(sim.motion_count(), 0);
    }
}
