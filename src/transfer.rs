//! Bulk liquid moves between stocks and wells.
//!
//! Every transfer picks its tool and pass split from the volume alone, takes a
//! fresh tip per pass and finishes each pass with the same anti-drip sequence:
//! settle, rise to the approach clearance, blow out, touch the surface and
//! retreat. Stock draws are checked before the first motion and booked after
//! every pass together with the destination, scaled by the column
//! multiplicity.

use crate::config::Calibration;
use crate::error::{ErrorCode, ProtocolError, ProtocolResult};
use crate::hardware::Robot;
use crate::ledger::{StockId, VolumeLedger};
use crate::liquid_height::{clearance_offset, tube_height, WellGeometry};
use libprep_protocol::{Anchor, Location, Point, TipSlot, Tool, WellId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const MAX_TRANSFER_VOLUME: f64 = 250.0;
pub const SMALL_TOOL_LIMIT: f64 = 20.0;
pub const SMALL_TOOL_SPLIT_LIMIT: f64 = 40.0;
pub const LARGE_TOOL_SAFE_CEILING: f64 = 230.0;
/// Channels on each gang pipette. One draw from a shared stock feeds all of
/// them, and both tools carry the same count.
pub const COLUMN_MULTIPLICITY: f64 = Tool::P300.model().channels as f64;

const SOURCE_EXIT_SPEED: f64 = 10.0;
const CLEARANCE_SPEED: f64 = 4.4;
const WELL_SOURCE_CLEARANCE: f64 = 0.5;
const TUBE_DISPENSE_HEIGHT: f64 = 1.0;
const VACUUM_SETTLE_SECS: f64 = 0.5;
const VACUUM_LIFT: f64 = 3.0;
const VACUUM_LIFT_SPEED: f64 = 1.0;

pub fn validate_volume(volume: f64) -> ProtocolResult<()> {
    if volume.is_nan() || !(0.0..=MAX_TRANSFER_VOLUME).contains(&volume) {
        return Err(ProtocolError::invalid_volume(format!(
            "volume must be between 0 and {MAX_TRANSFER_VOLUME}, got {volume}"
        )));
    }
    Ok(())
}

/// Tool choice and per-pass volumes for one transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPlan {
    pub tool: Tool,
    pub passes: Vec<f64>,
}

impl TransferPlan {
    pub fn for_volume(volume: f64) -> ProtocolResult<Self> {
        validate_volume(volume)?;
        let (tool, passes) = if volume <= SMALL_TOOL_LIMIT {
            (Tool::P20, vec![volume])
        } else if volume <= SMALL_TOOL_SPLIT_LIMIT {
            (Tool::P20, vec![volume / 2.0; 2])
        } else if volume > LARGE_TOOL_SAFE_CEILING {
            (Tool::P300, vec![volume / 2.0; 2])
        } else {
            (Tool::P300, vec![volume])
        };
        Ok(Self { tool, passes })
    }

    pub fn total(&self) -> f64 {
        self.passes.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Stock(StockId),
    Well(WellId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub source: Source,
    pub dest: WellId,
    pub volume: f64,
    /// Volume already in `dest`, used for the post-dispense liquid height.
    pub dest_existing_volume: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferOptions {
    pub pre_wet: bool,
    pub dest_geometry: WellGeometry,
    /// Reference point inside the destination that liquid heights are added to.
    pub dest_anchor: Anchor,
    pub dest_offset: Point,
}

impl TransferOptions {
    /// Dispensing into a magnetic-plate well with the magnet down.
    pub fn magnetic_well(calibration: &Calibration) -> Self {
        Self {
            pre_wet: true,
            dest_geometry: WellGeometry::ShallowMagnetic,
            dest_anchor: Anchor::Top,
            dest_offset: calibration.no_magnet_offset,
        }
    }

    /// Dispensing just above the bottom of a tube or PCR well.
    pub fn tube_bottom(z: f64) -> Self {
        Self {
            pre_wet: false,
            dest_geometry: WellGeometry::DeepTube,
            dest_anchor: Anchor::Bottom,
            dest_offset: Point::z(z),
        }
    }

    /// Options for a destination of the given geometry class.
    pub fn for_geometry(geometry: WellGeometry, calibration: &Calibration) -> Self {
        match geometry {
            WellGeometry::ShallowMagnetic => Self::magnetic_well(calibration),
            WellGeometry::DeepTube => Self::tube_bottom(TUBE_DISPENSE_HEIGHT),
        }
    }

    fn reference(&self, dest: &WellId) -> Location {
        Location {
            well: dest.clone(),
            anchor: self.dest_anchor,
            offset: self.dest_offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReport {
    pub tool: Tool,
    pub passes: Vec<f64>,
    pub stock_consumed: f64,
}

fn rates(tool: Tool) -> (f64, f64) {
    match tool {
        Tool::P20 => (0.25, 1.0),
        Tool::P300 => (0.2, 0.2),
    }
}

/// Moves `request.volume` into `request.dest`, one fresh tip per pass. The
/// chosen pipette must not carry a tip on entry.
pub fn transfer(
    robot: &mut Robot,
    ledger: &mut VolumeLedger,
    calibration: &Calibration,
    request: &TransferRequest,
    options: &TransferOptions,
) -> ProtocolResult<TransferReport> {
    let plan = TransferPlan::for_volume(request.volume)?;
    let stock_draw = request.volume * COLUMN_MULTIPLICITY;
    let source_well = match &request.source {
        Source::Stock(id) => {
            ledger.ensure_available(id, stock_draw)?;
            ledger.stock(id)?.well.clone()
        }
        Source::Well(well) => well.clone(),
    };
    info!(
        source = %source_well,
        dest = %request.dest,
        volume = request.volume,
        tool = plan.tool.as_str(),
        passes = plan.passes.len(),
        "transfer"
    );

    let mut stock_consumed = 0.0;
    if request.volume > 0.0 {
        let (aspirate_rate, dispense_rate) = rates(plan.tool);
        let reference = options.reference(&request.dest);
        let mut dest_volume = request.dest_existing_volume;
        let mut source_volume = match &request.source {
            Source::Stock(id) => ledger.volume(id)? / COLUMN_MULTIPLICITY,
            Source::Well(well) => ledger.well_volume(well),
        };
        for (idx, pass) in plan.passes.iter().copied().enumerate() {
            debug!(pass = idx + 1, volume = pass, "transfer pass");
            let source = match &request.source {
                Source::Stock(_) => Location::bottom_z(&source_well, tube_height(source_volume - pass)),
                Source::Well(_) => Location::bottom_z(&source_well, WELL_SOURCE_CLEARANCE),
            };
            let before = dest_volume;
            dest_volume += pass;
            let surface = reference.raised(options.dest_geometry.height_offset(dest_volume));
            let above = reference.raised(clearance_offset(
                options.dest_geometry,
                dest_volume,
                calibration.approach_clearance,
            ));
            let merge = reference.raised(options.dest_geometry.height_offset(before));

            let pipette = robot.pipette(plan.tool);
            pipette.pick_up_tip()?;
            if options.pre_wet && idx == 0 {
                let wet = match plan.tool {
                    Tool::P20 => SMALL_TOOL_LIMIT,
                    Tool::P300 => pass,
                };
                pipette.aspirate(wet, &source, 1.0)?;
                pipette.dispense(wet, &source, 1.0)?;
            }
            pipette.aspirate(pass, &source, aspirate_rate)?;
            robot.delay(calibration.settle_secs);
            let pipette = robot.pipette(plan.tool);
            pipette.move_to(&Location::top(&source_well), Some(SOURCE_EXIT_SPEED))?;
            pipette.dispense(pass, &surface, dispense_rate)?;
            robot.delay(calibration.settle_secs);
            robot
                .pipette(plan.tool)
                .move_to(&above, Some(CLEARANCE_SPEED))?;
            robot.delay(calibration.settle_secs);
            let pipette = robot.pipette(plan.tool);
            pipette.blow_out(None)?;
            pipette.move_to(&merge, Some(CLEARANCE_SPEED))?;
            pipette.move_to(&Location::top(&request.dest), None)?;
            pipette.touch_tip()?;
            pipette.drop_tip()?;

            source_volume -= pass;
            match &request.source {
                Source::Stock(id) => {
                    let draw = pass * COLUMN_MULTIPLICITY;
                    ledger.consume(id, draw)?;
                    ledger.add_to_well(&request.dest, pass);
                    stock_consumed += draw;
                }
                Source::Well(well) => {
                    ledger.move_between(well, &request.dest, pass);
                }
            }
        }
    }

    Ok(TransferReport {
        tool: plan.tool,
        passes: plan.passes,
        stock_consumed,
    })
}

/// Homogenises a settling bead stock with the reusable tip at `slot` and puts
/// the tip back afterwards.
pub fn mix_bead_stock(
    robot: &mut Robot,
    ledger: &VolumeLedger,
    calibration: &Calibration,
    stock: &str,
    slot: &TipSlot,
) -> ProtocolResult<()> {
    let stock = ledger.stock(stock)?;
    let (strokes, volume) = if stock.volume < 2000.0 {
        (20, stock.volume / COLUMN_MULTIPLICITY - 10.0)
    } else {
        (30, 240.0)
    };
    info!(stock = stock.id.as_str(), strokes, volume, "mixing bead stock");
    let bottom = Location::bottom_z(&stock.well, 1.0);
    let top = Location::top(&stock.well);

    robot.p300.pick_up_tip_from(slot)?;
    if volume > 0.0 {
        robot.p300.mix(strokes, volume, &bottom, 2.0)?;
    }
    robot.p300.move_to(&top, None)?;
    robot.delay(calibration.settle_secs);
    let p300 = &mut *robot.p300;
    p300.touch_tip()?;
    p300.blow_out(None)?;
    p300.touch_tip()?;
    p300.return_tip()
}

/// One small-tool draw repeated `reps` times: slow aspirate, slow lift out of
/// the liquid, dispense, blow out away from the liquid.
#[derive(Debug, Clone, PartialEq)]
pub struct VacuumTransfer {
    pub source: Location,
    pub rate: f64,
    pub volume: f64,
    pub dest: Location,
    pub blow_out_at: Location,
    pub reps: u32,
}

/// Runs a [`VacuumTransfer`] with the tip already mounted on the small tool.
pub fn vacuum_transfer(
    robot: &mut Robot,
    ledger: &mut VolumeLedger,
    step: &VacuumTransfer,
) -> ProtocolResult<f64> {
    let ceiling = Tool::P20.model().working_ceiling;
    if step.volume.is_nan() || step.volume < 0.0 || step.volume > ceiling {
        return Err(ProtocolError::invalid_volume(format!(
            "volume must be between 0 and {ceiling} for a small-tool transfer, got {}",
            step.volume
        )));
    }
    if !robot.p20.has_tip() {
        return Err(ProtocolError::new(
            ErrorCode::NoTip,
            "Small-tool transfer started without a mounted tip",
        ));
    }
    debug!(
        source = %step.source.well,
        dest = %step.dest.well,
        volume = step.volume,
        reps = step.reps,
        "vacuum transfer"
    );
    let lifted = step.source.raised(VACUUM_LIFT);
    for _ in 0..step.reps {
        robot.p20.aspirate(step.volume, &step.source, step.rate)?;
        robot.delay(VACUUM_SETTLE_SECS);
        robot.p20.move_to(&lifted, Some(VACUUM_LIFT_SPEED))?;
        robot.p20.dispense(step.volume, &step.dest, 1.0)?;
        robot.delay(VACUUM_SETTLE_SECS);
        robot.p20.blow_out(Some(&step.blow_out_at))?;
        robot.p20.touch_tip()?;
        ledger.move_between(&step.source.well, &step.dest.well, step.volume);
    }
    Ok(step.volume * step.reps as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Pipette;
    use crate::ledger::Stock;
    use crate::simulator::{Motion, Simulator};

    fn setup(stock_volume: f64) -> (Simulator, Robot, VolumeLedger, Calibration) {
        let sim = Simulator::default();
        let robot = sim.robot();
        let mut ledger = VolumeLedger::new();
        ledger
            .add_stock(Stock::new("spri", WellId::new("r15", "A3"), stock_volume))
            .unwrap();
        (sim, robot, ledger, Calibration::default())
    }

    fn stock_request(volume: f64, dest: &WellId) -> TransferRequest {
        TransferRequest {
            source: Source::Stock("spri".to_string()),
            dest: dest.clone(),
            volume,
            dest_existing_volume: 0.0,
        }
    }

    #[test]
    fn test_plan_tiers() {
        let cases: [(f64, Tool, usize); 9] = [
            (0.0, Tool::P20, 1),
            (5.0, Tool::P20, 1),
            (20.0, Tool::P20, 1),
            (20.5, Tool::P20, 2),
            (40.0, Tool::P20, 2),
            (40.5, Tool::P300, 1),
            (230.0, Tool::P300, 1),
            (231.0, Tool::P300, 2),
            (250.0, Tool::P300, 2),
        ];
        for (volume, tool, passes) in cases {
            let plan = TransferPlan::for_volume(volume).unwrap();
            assert_eq!(plan.tool, tool, "tool for {volume}");
            assert_eq!(plan.passes.len(), passes, "passes for {volume}");
            assert!((plan.total() - volume).abs() < 1e-9);
            for pass in &plan.passes {
                assert!(*pass <= tool.model().working_ceiling);
            }
        }
    }

    #[test]
    fn test_plan_never_exceeds_ceiling() {
        let mut volume = 0.0;
        while volume <= MAX_TRANSFER_VOLUME {
            let plan = TransferPlan::for_volume(volume).unwrap();
            let ceiling = plan.tool.model().working_ceiling;
            assert!(plan.passes.iter().all(|p| *p <= ceiling), "{volume}");
            volume += 0.25;
        }
    }

    #[test]
    fn test_out_of_range_rejected_without_consumption() {
        for volume in [-0.1, 250.5, 400.0, f64::NAN] {
            let (sim, mut robot, mut ledger, cal) = setup(4000.0);
            let dest = WellId::new("mag_plate", "A11");
            let err = transfer(
                &mut robot,
                &mut ledger,
                &cal,
                &stock_request(volume, &dest),
                &TransferOptions::magnetic_well(&cal),
            )
            .unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidVolume);
            assert!(err.message.contains("volume must be between 0 and 250"));
            assert_eq!(ledger.volume("spri").unwrap(), 4000.0);
            assert_eq!(sim.motion_count(), 0);
        }
    }

    #[test]
    fn test_stock_transfer_consumes_times_eight() {
        let (sim, mut robot, mut ledger, cal) = setup(4000.0);
        let dest = WellId::new("mag_plate", "A11");
        let mut request = stock_request(60.0, &dest);
        request.dest_existing_volume = 100.0;
        let report = transfer(
            &mut robot,
            &mut ledger,
            &cal,
            &request,
            &TransferOptions::magnetic_well(&cal),
        )
        .unwrap();
        assert_eq!(report.tool, Tool::P300);
        assert_eq!(report.stock_consumed, 480.0);
        assert_eq!(ledger.volume("spri").unwrap(), 3520.0);
        assert_eq!(ledger.well_volume(&dest), 60.0);
        // pre-wet plus the real draw
        assert_eq!(sim.aspirations(Tool::P300), vec![60.0, 60.0]);
        assert_eq!(sim.fresh_tip_pickups(Tool::P300), 1);
        assert!(!robot.p300.has_tip());
    }

    #[test]
    fn test_medium_volume_splits_with_fresh_tips() {
        let (sim, mut robot, mut ledger, cal) = setup(4000.0);
        let dest = WellId::new("mag_plate", "A11");
        let report = transfer(
            &mut robot,
            &mut ledger,
            &cal,
            &stock_request(30.0, &dest),
            &TransferOptions::magnetic_well(&cal),
        )
        .unwrap();
        assert_eq!(report.passes, vec![15.0, 15.0]);
        assert_eq!(sim.fresh_tip_pickups(Tool::P20), 2);
        assert_eq!(sim.aspirations(Tool::P20), vec![20.0, 15.0, 15.0]);
        assert_eq!(ledger.volume("spri").unwrap(), 4000.0 - 240.0);
    }

    /// Delegates to a simulated pipette until its `fail_at`-th aspiration.
    struct FailingAspirate {
        inner: Box<dyn Pipette>,
        aspirations: usize,
        fail_at: usize,
    }

    impl Pipette for FailingAspirate {
        fn tool(&self) -> Tool {
            self.inner.tool()
        }
        fn has_tip(&self) -> bool {
            self.inner.has_tip()
        }
        fn pick_up_tip(&mut self) -> ProtocolResult<()> {
            self.inner.pick_up_tip()
        }
        fn pick_up_tip_from(&mut self, slot: &TipSlot) -> ProtocolResult<()> {
            self.inner.pick_up_tip_from(slot)
        }
        fn return_tip(&mut self) -> ProtocolResult<()> {
            self.inner.return_tip()
        }
        fn drop_tip(&mut self) -> ProtocolResult<()> {
            self.inner.drop_tip()
        }
        fn aspirate(&mut self, volume: f64, location: &Location, rate: f64) -> ProtocolResult<()> {
            self.aspirations += 1;
            if self.aspirations == self.fail_at {
                return Err(ProtocolError::new(ErrorCode::Hardware, "plunger stalled"));
            }
            self.inner.aspirate(volume, location, rate)
        }
        fn dispense(&mut self, volume: f64, location: &Location, rate: f64) -> ProtocolResult<()> {
            self.inner.dispense(volume, location, rate)
        }
        fn move_to(&mut self, location: &Location, speed: Option<f64>) -> ProtocolResult<()> {
            self.inner.move_to(location, speed)
        }
        fn blow_out(&mut self, location: Option<&Location>) -> ProtocolResult<()> {
            self.inner.blow_out(location)
        }
        fn touch_tip(&mut self) -> ProtocolResult<()> {
            self.inner.touch_tip()
        }
        fn air_gap(&mut self, volume: f64) -> ProtocolResult<()> {
            self.inner.air_gap(volume)
        }
    }

    #[test]
    fn test_failed_pass_leaves_stock_and_well_in_step() {
        let (sim, _robot, mut ledger, cal) = setup(4000.0);
        let Robot {
            p20,
            p300,
            magnet,
            cycler,
            clock,
        } = sim.robot();
        // pre-wet, first pass, then the second pass stalls
        let mut robot = Robot {
            p20: Box::new(FailingAspirate {
                inner: p20,
                aspirations: 0,
                fail_at: 3,
            }),
            p300,
            magnet,
            cycler,
            clock,
        };
        let dest = WellId::new("mag_plate", "A11");
        let err = transfer(
            &mut robot,
            &mut ledger,
            &cal,
            &stock_request(30.0, &dest),
            &TransferOptions::magnetic_well(&cal),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::Hardware);
        let drawn = 4000.0 - ledger.volume("spri").unwrap();
        assert_eq!(ledger.well_volume(&dest), 15.0);
        assert_eq!(drawn, ledger.well_volume(&dest) * COLUMN_MULTIPLICITY);
        assert_eq!(ledger.journal().len(), 1);
    }

    #[test]
    fn test_multiplicity_matches_both_tools() {
        for tool in [Tool::P20, Tool::P300] {
            assert_eq!(tool.model().channels as f64, COLUMN_MULTIPLICITY);
        }
    }

    #[test]
    fn test_tube_destination_dispenses_from_bottom() {
        let (sim, mut robot, mut ledger, cal) = setup(4000.0);
        let dest = WellId::new("tc_plate", "A5");
        let options = TransferOptions::for_geometry(WellGeometry::DeepTube, &cal);
        assert!(!options.pre_wet);
        transfer(&mut robot, &mut ledger, &cal, &stock_request(10.0, &dest), &options).unwrap();
        let dispense = sim
            .motions()
            .into_iter()
            .find_map(|m| match m {
                Motion::Dispense { location, .. } => Some(location),
                _ => None,
            })
            .unwrap();
        assert_eq!(dispense.anchor, Anchor::Bottom);
        assert_eq!(dispense.offset.z, TUBE_DISPENSE_HEIGHT);
        // no pre-wet draw
        assert_eq!(sim.aspirations(Tool::P20), vec![10.0]);
        assert_eq!(
            TransferOptions::for_geometry(WellGeometry::ShallowMagnetic, &cal),
            TransferOptions::magnetic_well(&cal)
        );
    }

    #[test]
    fn test_dispense_heights_follow_filling_well() {
        let (sim, mut robot, mut ledger, cal) = setup(4000.0);
        let dest = WellId::new("mag_plate", "A11");
        let mut request = stock_request(30.0, &dest);
        request.dest_existing_volume = 100.0;
        let options = TransferOptions {
            pre_wet: false,
            ..TransferOptions::magnetic_well(&cal)
        };
        transfer(&mut robot, &mut ledger, &cal, &request, &options).unwrap();
        let heights: Vec<f64> = sim
            .motions()
            .into_iter()
            .filter_map(|m| match m {
                Motion::Dispense { location, .. } => Some(location.offset.z),
                _ => None,
            })
            .collect();
        // 115 and 130 in the well, on the high branch of the curve
        assert_eq!(heights.len(), 2);
        assert!((heights[0] - (-19.8 + 8.0 + 15.0 * 0.045)).abs() < 1e-9);
        assert!((heights[1] - (-19.8 + 8.0 + 30.0 * 0.045)).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_stock_fails_before_motion() {
        let (sim, mut robot, mut ledger, cal) = setup(100.0);
        let dest = WellId::new("mag_plate", "A11");
        let err = transfer(
            &mut robot,
            &mut ledger,
            &cal,
            &stock_request(20.0, &dest),
            &TransferOptions::magnetic_well(&cal),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::StockExhausted);
        assert_eq!(sim.motion_count(), 0);
    }

    #[test]
    fn test_well_to_well_moves_tracked_volume() {
        let (_sim, mut robot, mut ledger, cal) = setup(4000.0);
        let source = WellId::new("tc_plate", "A5");
        let dest = WellId::new("mag_plate", "A11");
        ledger.add_to_well(&source, 100.0);
        let report = transfer(
            &mut robot,
            &mut ledger,
            &cal,
            &TransferRequest {
                source: Source::Well(source.clone()),
                dest: dest.clone(),
                volume: 100.0,
                dest_existing_volume: 0.0,
            },
            &TransferOptions::magnetic_well(&cal),
        )
        .unwrap();
        assert_eq!(report.stock_consumed, 0.0);
        assert_eq!(ledger.well_volume(&source), 0.0);
        assert_eq!(ledger.well_volume(&dest), 100.0);
        assert_eq!(ledger.volume("spri").unwrap(), 4000.0);
    }

    #[test]
    fn test_mix_bead_stock_returns_reusable_tip() {
        let (sim, mut robot, ledger, cal) = setup(4000.0);
        let slot = TipSlot::new(0, "A1");
        mix_bead_stock(&mut robot, &ledger, &cal, "spri", &slot).unwrap();
        assert_eq!(sim.aspirations(Tool::P300), vec![240.0; 30]);
        assert!(!robot.p300.has_tip());
        assert_eq!(sim.fresh_tip_pickups(Tool::P300), 0);
        assert_eq!(ledger.volume("spri").unwrap(), 4000.0);
    }

    #[test]
    fn test_mix_low_bead_stock_scales_stroke() {
        let (sim, mut robot, ledger, cal) = setup(1200.0);
        mix_bead_stock(&mut robot, &ledger, &cal, "spri", &TipSlot::new(0, "A1")).unwrap();
        assert_eq!(sim.aspirations(Tool::P300), vec![140.0; 20]);
    }

    #[test]
    fn test_vacuum_transfer_requires_tip() {
        let (_sim, mut robot, mut ledger, _cal) = setup(4000.0);
        let a = WellId::new("temp_plate", "A8");
        let b = WellId::new("tc_plate", "A8");
        let step = VacuumTransfer {
            source: Location::bottom_z(&a, 0.1),
            rate: 0.2,
            volume: 15.0,
            dest: Location::bottom_z(&b, 1.0),
            blow_out_at: Location::top(&b),
            reps: 2,
        };
        let err = vacuum_transfer(&mut robot, &mut ledger, &step).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoTip);

        ledger.add_to_well(&a, 30.0);
        robot.p20.pick_up_tip().unwrap();
        assert_eq!(vacuum_transfer(&mut robot, &mut ledger, &step).unwrap(), 30.0);
        assert_eq!(ledger.well_volume(&a), 0.0);
        assert_eq!(ledger.well_volume(&b), 30.0);
    }

    #[test]
    fn test_vacuum_transfer_rejects_large_volume() {
        let (_sim, mut robot, mut ledger, _cal) = setup(4000.0);
        let a = WellId::new("temp_plate", "A8");
        robot.p20.pick_up_tip().unwrap();
        let step = VacuumTransfer {
            source: Location::bottom(&a),
            rate: 0.2,
            volume: 25.0,
            dest: Location::bottom(&a),
            blow_out_at: Location::top(&a),
            reps: 1,
        };
        assert_eq!(
            vacuum_transfer(&mut robot, &mut ledger, &step)
                .unwrap_err()
                .code,
            ErrorCode::InvalidVolume
        );
    }
}
