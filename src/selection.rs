//! Bead-based size selection on the magnetic plate.
//!
//! A [`SizeSelection`] is a record of one cleanup: which well, how much bead
//! reagent and sample, the timing of binding and separation, whether the
//! pellet is kept (washed and eluted) or discarded, and where the clarified
//! liquid goes. [`SizeSelection::run`] walks it through
//!
//! ```text
//! Loaded -> BeadAdded -> Mixed -> Incubated -> Separated
//!        -> PelletWashed | PelletSkipped
//!        -> Resuspended  | ResuspendSkipped
//!        -> Routed -> Done
//! ```
//!
//! Every parameter is checked before the first motion. Once running, any
//! error aborts the selection where it stands; nothing is rolled back.

use crate::config::{Calibration, EB, ETHANOL, SPRI};
use crate::context::ProtocolContext;
use crate::error::{ProtocolError, ProtocolResult};
use crate::liquid_height::{clearance_offset, mag_well_height, WellGeometry};
use crate::transfer::{
    mix_bead_stock, transfer, vacuum_transfer, validate_volume, Source, TransferOptions,
    TransferRequest, VacuumTransfer,
};
use crate::wash::{self, Resuspension, WashReport, AGITATION_MARGIN};
use libprep_protocol::{Location, Tool, WellId};
use serde::{Deserialize, Serialize};
use tracing::info;

const MIX_SETTLE_SECS: f64 = 0.5;
const MIX_LIFT: f64 = 0.5;
const MIX_DISPENSE_RATE: f64 = 2.0;
const INCUBATION_RATE: f64 = 0.1;
const CLEARANCE_SPEED: f64 = 4.4;
const SUPERNATANT_RATE: f64 = 0.2;
const SUPERNATANT_OVERDRAW: f64 = 10.0;
const SUPERNATANT_LIFT: f64 = 10.0;
const SUPERNATANT_LIFT_SPEED: f64 = 2.5;
const ROUTE_RATE: f64 = 0.2;
/// Elution buffer not taken up by the resuspension mix strokes.
const ELUTION_MIX_MARGIN: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionState {
    Loaded,
    BeadAdded,
    Mixed,
    Incubated,
    Separated,
    PelletWashed,
    PelletSkipped,
    Resuspended,
    ResuspendSkipped,
    Routed,
    Done,
}

impl SelectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::BeadAdded => "bead_added",
            Self::Mixed => "mixed",
            Self::Incubated => "incubated",
            Self::Separated => "separated",
            Self::PelletWashed => "pellet_washed",
            Self::PelletSkipped => "pellet_skipped",
            Self::Resuspended => "resuspended",
            Self::ResuspendSkipped => "resuspend_skipped",
            Self::Routed => "routed",
            Self::Done => "done",
        }
    }
}

/// Where the sample comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// Moved into the selection well from another well first.
    Transfer { from: WellId },
    /// Already in the selection well, routed there by an earlier selection.
    OnMagnet,
}

/// Part of the first supernatant draw set aside for a parallel path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diversion {
    pub volume: f64,
    pub to: WellId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PelletCleanup {
    pub wash_stages: Vec<f64>,
    pub dry_secs: f64,
    pub elution_volume: f64,
    pub elution_incubate_secs: f64,
    pub elution_magnet_secs: f64,
    #[serde(default)]
    pub divert: Option<Diversion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub dest: WellId,
    pub volume: f64,
    pub reps: u32,
    /// Destination is a magnetic-plate well; dispense heights follow its curve.
    pub to_magnet: bool,
}

impl Route {
    pub fn total(&self) -> f64 {
        self.volume * self.reps as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReagents {
    pub beads: String,
    pub elution: String,
    pub wash_group: String,
}

impl Default for SelectionReagents {
    fn default() -> Self {
        Self {
            beads: SPRI.to_string(),
            elution: EB.to_string(),
            wash_group: ETHANOL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeSelection {
    pub label: String,
    pub well: WellId,
    pub sample: SampleSource,
    pub bead_volume: f64,
    pub sample_volume: f64,
    pub mix_volume: f64,
    pub mix_reps: u32,
    pub incubate_secs: f64,
    pub magnet_secs: f64,
    /// `None` discards the pellet and routes the supernatant.
    pub pellet: Option<PelletCleanup>,
    pub route: Route,
    #[serde(default)]
    pub reagents: SelectionReagents,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    pub label: String,
    pub trace: Vec<SelectionState>,
    pub bead_consumed: f64,
    pub elution_consumed: f64,
    pub wash: Option<WashReport>,
    pub routed_volume: f64,
    pub routed_passes: u32,
}

impl SelectionReport {
    fn advance(&mut self, state: SelectionState) {
        info!(selection = self.label.as_str(), state = state.as_str(), "selection state");
        self.trace.push(state);
    }
}

impl SizeSelection {
    pub fn validate(&self) -> ProtocolResult<()> {
        validate_volume(self.bead_volume)?;
        if matches!(self.sample, SampleSource::Transfer { .. }) {
            validate_volume(self.sample_volume)?;
        }
        let large = Tool::P300.model();
        if self.mix_volume.is_nan()
            || self.mix_volume <= AGITATION_MARGIN
            || self.mix_volume > large.working_ceiling
        {
            return Err(ProtocolError::invalid_volume(format!(
                "{}: mix volume must be between {AGITATION_MARGIN} and {}, got {}",
                self.label, large.working_ceiling, self.mix_volume
            )));
        }

        let small = Tool::P20.model();
        let route = &self.route;
        if route.volume.is_nan()
            || route.volume <= 0.0
            || route.volume > small.working_ceiling
            || route.reps == 0
        {
            return Err(ProtocolError::invalid_volume(format!(
                "{}: route needs at least one pass of up to {}, got {} x {}",
                self.label, small.working_ceiling, route.reps, route.volume
            )));
        }

        if let Some(pellet) = &self.pellet {
            let supernatant = self.bead_volume + self.sample_volume + SUPERNATANT_OVERDRAW;
            if supernatant > large.max_volume {
                return Err(ProtocolError::invalid_volume(format!(
                    "{}: supernatant draw of {supernatant} exceeds {}",
                    self.label, large.max_volume
                )));
            }
            if let Some(divert) = &pellet.divert {
                if divert.volume.is_nan()
                    || divert.volume <= 0.0
                    || divert.volume > large.working_ceiling
                {
                    return Err(ProtocolError::invalid_volume(format!(
                        "{}: diversion volume must be between 0 and {}, got {}",
                        self.label, large.working_ceiling, divert.volume
                    )));
                }
            }
            wash::check_stages(&pellet.wash_stages, AGITATION_MARGIN)?;
            validate_volume(pellet.elution_volume)?;
            self.resuspension(pellet).validate()?;
        }
        Ok(())
    }

    fn resuspension(&self, pellet: &PelletCleanup) -> Resuspension {
        Resuspension {
            well: self.well.clone(),
            mix_volume: pellet.elution_volume - ELUTION_MIX_MARGIN,
            total_volume: pellet.elution_volume,
            incubate_secs: pellet.elution_incubate_secs,
            magnet_secs: pellet.elution_magnet_secs,
        }
    }

    pub fn run(&self, ctx: &mut ProtocolContext) -> ProtocolResult<SelectionReport> {
        self.validate()?;
        let mut report = SelectionReport {
            label: self.label.clone(),
            trace: vec![],
            bead_consumed: 0.0,
            elution_consumed: 0.0,
            wash: None,
            routed_volume: 0.0,
            routed_passes: 0,
        };
        let ProtocolContext {
            robot,
            ledger,
            calibration,
            layout,
            ..
        } = ctx;
        let cal: &Calibration = calibration;
        let bottom = Location::top(&self.well).moved(cal.no_magnet_offset);
        let beside_pellet = Location::top(&self.well).moved(cal.magnet_offset);
        let top = Location::top(&self.well);
        let into_well = TransferOptions::for_geometry(layout.geometry(&self.well), cal);

        robot.magnet.disengage()?;
        report.advance(SelectionState::Loaded);

        if let SampleSource::Transfer { from } = &self.sample {
            transfer(
                robot,
                ledger,
                cal,
                &TransferRequest {
                    source: Source::Well(from.clone()),
                    dest: self.well.clone(),
                    volume: self.sample_volume,
                    dest_existing_volume: 0.0,
                },
                &into_well,
            )?;
        }
        mix_bead_stock(robot, ledger, cal, &self.reagents.beads, layout.reusable_tip())?;
        let beads = transfer(
            robot,
            ledger,
            cal,
            &TransferRequest {
                source: Source::Stock(self.reagents.beads.clone()),
                dest: self.well.clone(),
                volume: self.bead_volume,
                dest_existing_volume: self.sample_volume,
            },
            &into_well,
        )?;
        report.bead_consumed = beads.stock_consumed;
        report.advance(SelectionState::BeadAdded);

        let mix_at = bottom.raised(MIX_LIFT);
        robot.p300.pick_up_tip()?;
        for _ in 0..self.mix_reps {
            robot.p300.aspirate(self.mix_volume, &mix_at, 1.0)?;
            robot.delay(MIX_SETTLE_SECS);
            robot
                .p300
                .dispense(self.mix_volume, &mix_at, MIX_DISPENSE_RATE)?;
            robot.delay(MIX_SETTLE_SECS);
        }
        robot.p300.move_to(&top, None)?;
        report.advance(SelectionState::Mixed);

        let agitation = self.mix_volume - AGITATION_MARGIN;
        robot.hold(Tool::P300, self.incubate_secs, |p| {
            p.aspirate(agitation, &bottom, INCUBATION_RATE)?;
            p.dispense(agitation, &bottom, INCUBATION_RATE)
        })?;
        let total = self.bead_volume + self.sample_volume;
        let above = bottom.raised(clearance_offset(
            WellGeometry::ShallowMagnetic,
            total,
            cal.approach_clearance,
        ));
        robot.p300.move_to(&above, Some(CLEARANCE_SPEED))?;
        robot.delay(cal.settle_secs);
        robot.p300.blow_out(None)?;
        robot
            .p300
            .move_to(&bottom.raised(mag_well_height(total)), None)?;
        robot.p300.move_to(&top, None)?;
        report.advance(SelectionState::Incubated);

        info!(height = cal.magnet_height, "magnet engaged");
        robot.magnet.engage(cal.magnet_height)?;
        robot.p300.drop_tip()?;
        robot.delay(self.magnet_secs);
        report.advance(SelectionState::Separated);

        match &self.pellet {
            Some(pellet) => {
                let lifted = beside_pellet.raised(SUPERNATANT_LIFT);
                robot.p300.pick_up_tip()?;
                if let Some(divert) = &pellet.divert {
                    info!(volume = divert.volume, to = %divert.to, "diverting supernatant");
                    robot
                        .p300
                        .aspirate(divert.volume, &beside_pellet, SUPERNATANT_RATE)?;
                    robot.delay(cal.settle_secs);
                    let p300 = &mut *robot.p300;
                    p300.move_to(&lifted, Some(SUPERNATANT_LIFT_SPEED))?;
                    p300.move_to(&top, None)?;
                    p300.dispense(
                        divert.volume,
                        &Location::bottom_z(&divert.to, 1.0),
                        SUPERNATANT_RATE,
                    )?;
                    ledger.move_between(&self.well, &divert.to, divert.volume);
                }
                let supernatant = total + SUPERNATANT_OVERDRAW;
                robot
                    .p300
                    .aspirate(supernatant, &beside_pellet, SUPERNATANT_RATE)?;
                robot.delay(cal.settle_secs);
                let p300 = &mut *robot.p300;
                p300.move_to(&lifted, Some(SUPERNATANT_LIFT_SPEED))?;
                p300.move_to(&top, None)?;
                p300.drop_tip()?;
                ledger.remove_from_well(&self.well, supernatant);

                report.wash = Some(wash::wash(
                    robot,
                    ledger,
                    cal,
                    &self.reagents.wash_group,
                    &self.well,
                    &pellet.wash_stages,
                )?);
                report.advance(SelectionState::PelletWashed);

                robot.delay(cal.dry_delay(pellet.dry_secs));
                robot.magnet.disengage()?;
                let elution = transfer(
                    robot,
                    ledger,
                    cal,
                    &TransferRequest {
                        source: Source::Stock(self.reagents.elution.clone()),
                        dest: self.well.clone(),
                        volume: pellet.elution_volume,
                        dest_existing_volume: 0.0,
                    },
                    &into_well,
                )?;
                report.elution_consumed = elution.stock_consumed;
                wash::resuspend(robot, cal, &self.resuspension(pellet))?;
                report.advance(SelectionState::Resuspended);
            }
            None => {
                report.advance(SelectionState::PelletSkipped);
                report.advance(SelectionState::ResuspendSkipped);
            }
        }

        let route = &self.route;
        let existing = ledger.well_volume(&route.dest);
        let dest_top = Location::top(&route.dest);
        robot.p20.pick_up_tip()?;
        for rep in 0..route.reps {
            let dest = if route.to_magnet {
                dest_top
                    .moved(cal.magnet_offset)
                    .raised(mag_well_height(existing + (rep + 1) as f64 * route.volume))
            } else {
                Location::bottom(&route.dest)
            };
            report.routed_volume += vacuum_transfer(
                robot,
                ledger,
                &VacuumTransfer {
                    source: beside_pellet.clone(),
                    rate: ROUTE_RATE,
                    volume: route.volume,
                    dest,
                    blow_out_at: dest_top.clone(),
                    reps: 1,
                },
            )?;
            report.routed_passes += 1;
        }
        robot.p20.drop_tip()?;
        report.advance(SelectionState::Routed);

        robot.magnet.disengage()?;
        report.advance(SelectionState::Done);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::error::ErrorCode;
    use crate::layout::DeckLayout;
    use crate::simulator::{Motion, ScriptedConsole, Simulator};
    use libprep_protocol::Anchor;

    fn context(sim: &Simulator, spri: f64) -> ProtocolContext {
        let mut config = ProtocolConfig::default();
        config.stocks.spri = spri;
        ProtocolContext::new(
            sim.robot(),
            Box::new(ScriptedConsole::default()),
            &config,
            DeckLayout::default(),
        )
        .unwrap()
    }

    fn cdna_cleanup(ctx: &ProtocolContext) -> SizeSelection {
        SizeSelection {
            label: "cdna_cleanup".to_string(),
            well: ctx.well("cdna_cleanup").unwrap(),
            sample: SampleSource::Transfer {
                from: ctx.well("cdna_amp_tc").unwrap(),
            },
            bead_volume: 60.0,
            sample_volume: 100.0,
            mix_volume: 130.0,
            mix_reps: 30,
            incubate_secs: 300.0,
            magnet_secs: 240.0,
            pellet: Some(PelletCleanup {
                wash_stages: vec![200.0, 200.0],
                dry_secs: 120.0,
                elution_volume: 41.0,
                elution_incubate_secs: 120.0,
                elution_magnet_secs: 120.0,
                divert: None,
            }),
            route: Route {
                dest: ctx.well("purified_cdna").unwrap(),
                volume: 20.0,
                reps: 2,
                to_magnet: true,
            },
            reagents: SelectionReagents::default(),
        }
    }

    #[test]
    fn test_pellet_selection_end_to_end() {
        let sim = Simulator::default();
        let mut ctx = context(&sim, 4000.0);
        let selection = cdna_cleanup(&ctx);
        let report = selection.run(&mut ctx).unwrap();

        assert_eq!(report.bead_consumed, 480.0);
        assert_eq!(ctx.ledger.volume(SPRI).unwrap(), 3520.0);
        assert_eq!(report.routed_volume, 40.0);
        assert_eq!(report.routed_passes, 2);
        let dest = ctx.well("purified_cdna").unwrap();
        assert_eq!(sim.dispenses_into(Tool::P20, &dest), vec![20.0, 20.0]);
        assert_eq!(ctx.ledger.well_volume(&dest), 40.0);
        assert_eq!(report.elution_consumed, 41.0 * 8.0);
        assert_eq!(report.wash.as_ref().map(|w| w.consumed()), Some(3200.0));
        assert_eq!(
            report.trace,
            vec![
                SelectionState::Loaded,
                SelectionState::BeadAdded,
                SelectionState::Mixed,
                SelectionState::Incubated,
                SelectionState::Separated,
                SelectionState::PelletWashed,
                SelectionState::Resuspended,
                SelectionState::Routed,
                SelectionState::Done,
            ]
        );
        assert!(!ctx.robot.magnet.is_engaged());
        assert!(!ctx.robot.p20.has_tip());
        assert!(!ctx.robot.p300.has_tip());
    }

    #[test]
    fn test_holds_meet_programmed_times() {
        let sim = Simulator::default();
        let mut ctx = context(&sim, 4000.0);
        cdna_cleanup(&ctx).run(&mut ctx).unwrap();
        // incubate + separate + two washes + dry + elution incubate + separate
        let floor = 300.0 + 240.0 + 2.0 * (20.0 + 10.0) + 81.0 + 120.0 + 120.0;
        assert!(sim.elapsed().as_secs_f64() >= floor);
    }

    #[test]
    fn test_supernatant_route_skips_pellet_branch() {
        let sim = Simulator::default();
        let mut ctx = context(&sim, 4000.0);
        let mut selection = cdna_cleanup(&ctx);
        selection.pellet = None;
        selection.route = Route {
            dest: ctx.well("size_sel_0_cdna").unwrap(),
            volume: 18.75,
            reps: 4,
            to_magnet: true,
        };
        let ethanol_before = ctx.ledger.group_volume(ETHANOL).unwrap();
        let report = selection.run(&mut ctx).unwrap();
        assert_eq!(
            &report.trace[5..],
            &[
                SelectionState::PelletSkipped,
                SelectionState::ResuspendSkipped,
                SelectionState::Routed,
                SelectionState::Done,
            ]
        );
        assert_eq!(report.routed_volume, 75.0);
        assert_eq!(ctx.ledger.group_volume(ETHANOL).unwrap(), ethanol_before);
        assert_eq!(ctx.ledger.volume(EB).unwrap(), 4000.0);
        assert!(!ctx.robot.magnet.is_engaged());

        // magnet-plate destination heights rise with every sub-transfer
        let dest = ctx.well("size_sel_0_cdna").unwrap();
        let heights: Vec<f64> = sim
            .motions()
            .into_iter()
            .filter_map(|m| match m {
                Motion::Dispense { tool: Tool::P20, location, .. } if location.well == dest => {
                    Some(location.offset.z)
                }
                _ => None,
            })
            .collect();
        assert_eq!(heights.len(), 4);
        assert!(heights.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_loading_follows_layout_geometry() {
        let sim = Simulator::default();
        let layout = DeckLayout::from_json(
            &include_str!("../assets/deck_layout.json").replace("shallow_magnetic", "deep_tube"),
        )
        .unwrap();
        let mut ctx = ProtocolContext::new(
            sim.robot(),
            Box::new(ScriptedConsole::default()),
            &ProtocolConfig::default(),
            layout,
        )
        .unwrap();
        let mut selection = cdna_cleanup(&ctx);
        selection.pellet = None;
        selection.run(&mut ctx).unwrap();

        let well = ctx.well("cdna_cleanup").unwrap();
        let anchors: Vec<Anchor> = sim
            .motions()
            .into_iter()
            .filter_map(|m| match m {
                Motion::Dispense { tool: Tool::P300, location, .. } if location.well == well => {
                    Some(location.anchor)
                }
                _ => None,
            })
            .collect();
        // sample and beads land from the tube bottom, mixing stays at the calibrated offset
        assert_eq!(&anchors[..3], &[Anchor::Bottom, Anchor::Bottom, Anchor::Top]);
    }

    #[test]
    fn test_diversion_fills_holding_well() {
        let sim = Simulator::default();
        let mut ctx = context(&sim, 4000.0);
        let mut selection = cdna_cleanup(&ctx);
        let holding = ctx.well("mult_cleanup").unwrap();
        if let Some(pellet) = selection.pellet.as_mut() {
            pellet.divert = Some(Diversion {
                volume: 75.0,
                to: holding.clone(),
            });
        }
        selection.run(&mut ctx).unwrap();
        assert_eq!(ctx.ledger.well_volume(&holding), 75.0);
        assert_eq!(sim.dispenses_into(Tool::P300, &holding), vec![75.0]);
    }

    #[test]
    fn test_invalid_volume_aborts_before_motion() {
        let sim = Simulator::default();
        let mut ctx = context(&sim, 4000.0);
        let mut selection = cdna_cleanup(&ctx);
        selection.bead_volume = 260.0;
        let err = selection.run(&mut ctx).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidVolume);
        assert_eq!(sim.motion_count(), 0);
        assert_eq!(ctx.ledger.volume(SPRI).unwrap(), 4000.0);
    }

    #[test]
    fn test_route_over_small_tool_rejected() {
        let sim = Simulator::default();
        let ctx = context(&sim, 4000.0);
        let mut selection = cdna_cleanup(&ctx);
        selection.route.volume = 25.0;
        assert_eq!(
            selection.validate().unwrap_err().code,
            ErrorCode::InvalidVolume
        );
    }

    #[test]
    fn test_exhausted_bead_stock_aborts_mid_run() {
        let sim = Simulator::default();
        let mut ctx = context(&sim, 400.0);
        let err = cdna_cleanup(&ctx).run(&mut ctx).unwrap_err();
        assert_eq!(err.code, ErrorCode::StockExhausted);
        // the sample had already moved and stays moved
        assert_eq!(
            ctx.ledger.well_volume(&ctx.well("cdna_cleanup").unwrap()),
            100.0
        );
        assert_eq!(ctx.ledger.volume(SPRI).unwrap(), 400.0);
    }
}
