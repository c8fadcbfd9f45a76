//! The protocol stages. Each stage binds the size-selection machinery and
//! the cycler programs to fixed deck roles and volumes.

use crate::config::{ProtocolConfig, DYNABEADS, EB, ELUTION, ETHANOL};
use crate::context::ProtocolContext;
use crate::cycler::{self, nominal_seconds, run_program};
use crate::error::ProtocolResult;
use crate::hardware::Robot;
use crate::ledger::VolumeLedger;
use crate::liquid_height::{clearance_offset, mag_well_height, WellGeometry};
use crate::operator::resolve_index_cycles;
use crate::selection::{
    Diversion, PelletCleanup, Route, SampleSource, SelectionReagents, SelectionReport,
    SizeSelection,
};
use crate::transfer::{vacuum_transfer, VacuumTransfer, COLUMN_MULTIPLICITY};
use crate::wash;
use libprep_protocol::{CyclerCommand, Location, Tool, WellId};
use serde::{Deserialize, Serialize};
use tracing::info;

const ELUTION_INCUBATE_SECS: f64 = 120.0;
const ELUTION_MAGNET_SECS: f64 = 120.0;
const BINDING_SECS: f64 = 300.0;
const SEPARATION_SECS: f64 = 240.0;
const REACTION_SETTLE_SECS: f64 = 4.0;
const ASSEMBLY_CLEARANCE: f64 = 0.1;
const ASSEMBLY_RATE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    DynabeadCleanupAmplification,
    CdnaCleanup,
    FragmentationSizeSelection,
    LigationCleanup,
    IndexPcrSizeSelection,
    MultiplexIndexPcr,
}

impl StageKind {
    pub const ALL: [StageKind; 6] = [
        Self::DynabeadCleanupAmplification,
        Self::CdnaCleanup,
        Self::FragmentationSizeSelection,
        Self::LigationCleanup,
        Self::IndexPcrSizeSelection,
        Self::MultiplexIndexPcr,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DynabeadCleanupAmplification => "dynabead_cleanup_amplification",
            Self::CdnaCleanup => "cdna_cleanup",
            Self::FragmentationSizeSelection => "fragmentation_size_selection",
            Self::LigationCleanup => "ligation_cleanup",
            Self::IndexPcrSizeSelection => "index_pcr_size_selection",
            Self::MultiplexIndexPcr => "multiplex_index_pcr",
        }
    }

    /// Every stage except the GEM cleanup, which is usually done by hand.
    pub fn default_order() -> Vec<StageKind> {
        Self::ALL[1..].to_vec()
    }

    /// Only meaningful on the multiplex path.
    pub fn is_multiplex_only(self) -> bool {
        self == Self::MultiplexIndexPcr
    }

    pub fn run(self, ctx: &mut ProtocolContext, config: &ProtocolConfig) -> ProtocolResult<StageReport> {
        let mut report = StageReport::new(self);
        match self {
            Self::DynabeadCleanupAmplification => dynabead_cleanup_amplification(ctx, config, &mut report)?,
            Self::CdnaCleanup => cdna_cleanup(ctx, config, &mut report)?,
            Self::FragmentationSizeSelection => fragmentation_size_selection(ctx, &mut report)?,
            Self::LigationCleanup => ligation_cleanup(ctx, &mut report)?,
            Self::IndexPcrSizeSelection => index_pcr_size_selection(ctx, config, &mut report)?,
            Self::MultiplexIndexPcr => multiplex_index_pcr(ctx, config, &mut report)?,
        }
        Ok(report)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub selections: Vec<SelectionReport>,
    pub cycler_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_cycles: Option<u32>,
}

impl StageReport {
    fn new(stage: StageKind) -> Self {
        Self {
            stage,
            selections: vec![],
            cycler_seconds: 0,
            index_cycles: None,
        }
    }

    fn program(
        &mut self,
        ctx: &mut ProtocolContext,
        name: &str,
        program: &[CyclerCommand],
    ) -> ProtocolResult<()> {
        run_program(&mut *ctx.robot.cycler, name, program)?;
        self.cycler_seconds += nominal_seconds(program);
        Ok(())
    }

    fn select(&mut self, ctx: &mut ProtocolContext, selection: SizeSelection) -> ProtocolResult<()> {
        let report = selection.run(ctx)?;
        self.selections.push(report);
        Ok(())
    }
}

fn pellet(wash_stages: [f64; 2], dry_secs: f64, elution_volume: f64) -> PelletCleanup {
    PelletCleanup {
        wash_stages: wash_stages.to_vec(),
        dry_secs,
        elution_volume,
        elution_incubate_secs: ELUTION_INCUBATE_SECS,
        elution_magnet_secs: ELUTION_MAGNET_SECS,
        divert: None,
    }
}

fn route(ctx: &ProtocolContext, role: &str, volume: f64, reps: u32, to_magnet: bool) -> ProtocolResult<Route> {
    Ok(Route {
        dest: ctx.well(role)?,
        volume,
        reps,
        to_magnet,
    })
}

fn from_well(ctx: &ProtocolContext, role: &str) -> ProtocolResult<SampleSource> {
    Ok(SampleSource::Transfer {
        from: ctx.well(role)?,
    })
}

/// Draws `volume` per channel from a stock with the small tool and books it.
fn draw_stock_small(
    robot: &mut Robot,
    ledger: &mut VolumeLedger,
    stock: &str,
    volume: f64,
    dest: &Location,
) -> ProtocolResult<()> {
    let draw = volume * COLUMN_MULTIPLICITY;
    ledger.ensure_available(stock, draw)?;
    let well = ledger.stock(stock)?.well.clone();
    robot.p20.aspirate(volume, &Location::bottom(&well), 0.25)?;
    robot.delay(1.0);
    robot.p20.move_to(&Location::top(&well), Some(10.0))?;
    robot.p20.dispense(volume, dest, 1.0)?;
    ledger.consume(stock, draw)?;
    ledger.add_to_well(&dest.well, volume);
    Ok(())
}

/// Small-tool assembly of a reaction from several pre-loaded wells with one
/// tip.
fn assemble(ctx: &mut ProtocolContext, dest_role: &str, parts: &[(&str, f64, u32)]) -> ProtocolResult<()> {
    let dest = ctx.well(dest_role)?;
    info!(dest = %dest, parts = parts.len(), "assembling reaction");
    let mut steps = vec![];
    for (role, volume, reps) in parts {
        steps.push(VacuumTransfer {
            source: Location::bottom_z(&ctx.well(role)?, ASSEMBLY_CLEARANCE),
            rate: ASSEMBLY_RATE,
            volume: *volume,
            dest: Location::bottom_z(&dest, 1.0),
            blow_out_at: Location::top(&dest),
            reps: *reps,
        });
    }
    ctx.robot.p20.pick_up_tip()?;
    for step in &steps {
        vacuum_transfer(&mut ctx.robot, &mut ctx.ledger, step)?;
    }
    ctx.robot.p20.drop_tip()
}

/// Homogenises an assembled reaction in its cycler well.
fn mix_reaction(robot: &mut Robot, well: &WellId, strokes: u32, volume: f64, z: f64) -> ProtocolResult<()> {
    let top = Location::top(well);
    robot.p300.pick_up_tip()?;
    robot.p300.mix(strokes, volume, &Location::bottom_z(well, z), 1.0)?;
    robot.p300.move_to(&top, None)?;
    robot.delay(REACTION_SETTLE_SECS);
    let p300 = &mut *robot.p300;
    p300.touch_tip()?;
    p300.blow_out(Some(&top))?;
    p300.touch_tip()?;
    p300.drop_tip()
}

fn dynabead_cleanup_amplification(
    ctx: &mut ProtocolContext,
    config: &ProtocolConfig,
    report: &mut StageReport,
) -> ProtocolResult<()> {
    let well = ctx.well("dyn_cleanup")?;
    let tc_well = ctx.well("cdna_amp_tc")?;
    let amp_mix = ctx.well("amp_rxn_mix")?;
    ctx.console.announce(&format!(
        "Load 90ul GEM sample and 125ul recovery agent in {well}, wait for separation, \
         then slowly remove 125ul recovery agent from the bottom of the tube"
    ));
    ctx.console
        .acknowledge("Recovery agent removed, continue with dynabead cleanup")?;

    let cal = ctx.calibration.clone();
    let top = Location::top(&well);
    let bottom = top.moved(cal.no_magnet_offset);
    let beside_pellet = top.moved(cal.magnet_offset);
    let trash = Location::bottom(&WellId::trash());
    let ProtocolContext { robot, ledger, .. } = &mut *ctx;

    robot.magnet.disengage()?;
    robot.p300.pick_up_tip()?;
    robot.p20.pick_up_tip()?;

    let bead_draw = 200.0 * COLUMN_MULTIPLICITY;
    ledger.ensure_available(DYNABEADS, bead_draw)?;
    let stock_well = ledger.stock(DYNABEADS)?.well.clone();
    robot.p300.mix(30, 180.0, &Location::bottom(&stock_well), 2.0)?;
    robot.p300.aspirate(200.0, &Location::bottom(&stock_well), 0.2)?;
    robot.delay(4.0);
    robot.p300.move_to(&Location::top(&stock_well), None)?;
    robot.delay(4.0);
    robot.p300.touch_tip()?;
    robot.p300.dispense(200.0, &top, 0.2)?;
    robot.delay(1.0);
    ledger.consume(DYNABEADS, bead_draw)?;
    ledger.add_to_well(&well, 200.0);

    robot.hold(Tool::P300, 600.0, |p| {
        p.aspirate(200.0, &beside_pellet, 1.0)?;
        p.dispense(200.0, &beside_pellet, 1.0)
    })?;
    robot.p300.move_to(&Location::top_z(&well, 4.0), Some(4.4))?;
    robot.magnet.engage(cal.magnet_height)?;
    robot.delay(20.0);
    robot.p300.blow_out(None)?;
    robot.delay(220.0);
    for _ in 0..2 {
        robot.p300.aspirate(200.0, &beside_pellet, 0.2)?;
        robot.p300.move_to(&beside_pellet.raised(2.0), Some(1.0))?;
        robot.p300.dispense(200.0, &trash, 1.0)?;
        ledger.remove_from_well(&well, 200.0);
    }
    robot.p300.drop_tip()?;

    wash::wash(robot, ledger, &cal, ETHANOL, &well, &[260.0, 250.0])?;
    robot.delay(30.0);
    robot.magnet.disengage()?;

    let elution = 36.0;
    let elution_draw = elution * COLUMN_MULTIPLICITY;
    ledger.ensure_available(ELUTION, elution_draw)?;
    let elution_well = ledger.stock(ELUTION)?.well.clone();
    for i in 0..2 {
        let filled = (i + 1) as f64 * elution / 2.0;
        robot
            .p20
            .aspirate(elution / 2.0, &Location::bottom(&elution_well), 1.0)?;
        robot
            .p20
            .dispense(elution / 2.0, &bottom.raised(mag_well_height(filled)), 1.0)?;
        robot
            .p20
            .move_to(&bottom.raised(mag_well_height(filled + 40.0)), Some(4.4))?;
        robot.p20.blow_out(None)?;
        robot.p20.move_to(&top, None)?;
    }
    ledger.consume(ELUTION, elution_draw)?;
    ledger.add_to_well(&well, elution);

    robot.p300.pick_up_tip()?;
    let low = bottom.raised(-0.5);
    let high = bottom.raised(0.5);
    robot.hold(Tool::P300, 140.0, |p| {
        p.aspirate(30.0, &low, 2.0)?;
        p.move_to(&high, Some(1.0))?;
        p.dispense(30.0, &high, 2.0)
    })?;
    robot.delay(1.0);
    let above = bottom.raised(clearance_offset(
        WellGeometry::ShallowMagnetic,
        35.0,
        cal.approach_clearance,
    ));
    robot.p300.move_to(&above, Some(2.0))?;
    robot.delay(1.0);
    robot.p300.blow_out(None)?;
    robot.p300.drop_tip()?;
    robot.magnet.engage(cal.magnet_height)?;
    robot.cycler.open_lid()?;

    let mix_at = Location::bottom_z(&amp_mix, 0.5);
    robot.p300.pick_up_tip()?;
    robot.p300.mix(30, 40.0, &mix_at, 1.0)?;
    robot.p300.aspirate(65.0, &mix_at, 0.2)?;
    robot.delay(0.5);
    robot
        .p300
        .move_to(&Location::bottom_z(&amp_mix, 2.0), Some(1.0))?;
    robot
        .p300
        .dispense(65.0, &Location::bottom_z(&tc_well, 1.0), 0.2)?;
    robot.delay(0.5);
    robot
        .p300
        .move_to(&Location::bottom_z(&tc_well, 10.0), Some(1.0))?;
    robot.p300.move_to(&Location::top(&tc_well), None)?;
    robot.p300.blow_out(None)?;
    robot.p300.drop_tip()?;
    ledger.move_between(&amp_mix, &tc_well, 65.0);

    robot.p300.pick_up_tip()?;
    vacuum_transfer(
        robot,
        ledger,
        &VacuumTransfer {
            source: beside_pellet.clone(),
            rate: 0.2,
            volume: 17.5,
            dest: Location::bottom(&tc_well),
            blow_out_at: Location::top(&tc_well),
            reps: 2,
        },
    )?;
    robot.magnet.disengage()?;
    robot.p20.drop_tip()?;

    let tc_bottom = Location::bottom_z(&tc_well, 1.0);
    robot.p300.aspirate(65.0, &tc_bottom, 1.0)?;
    for _ in 0..30 {
        robot.p300.dispense(60.0, &tc_bottom, 1.0)?;
        robot.p300.aspirate(60.0, &tc_bottom, 1.0)?;
    }
    robot.p300.dispense(65.0, &tc_bottom, 1.0)?;
    robot.p300.move_to(&Location::top(&tc_well), None)?;
    robot.delay(1.0);
    robot.p300.blow_out(None)?;
    robot.p300.drop_tip()?;

    let program = cycler::dna_amplification(config.dna_amplification_cycles)?;
    report.program(ctx, "cdna_amplification", &program)
}

fn cdna_cleanup(ctx: &mut ProtocolContext, config: &ProtocolConfig, report: &mut StageReport) -> ProtocolResult<()> {
    let diversion = ctx.calibration.multiplex_diversion;
    let mut cleanup = pellet([200.0, 200.0], 120.0, 41.0);
    if config.multiplex {
        cleanup.divert = Some(Diversion {
            volume: diversion,
            to: ctx.well("mult_cleanup")?,
        });
    }
    let selection = SizeSelection {
        label: "cdna_cleanup".to_string(),
        well: ctx.well("cdna_cleanup")?,
        sample: from_well(ctx, "cdna_amp_tc")?,
        bead_volume: 60.0,
        sample_volume: 100.0,
        mix_volume: 130.0,
        mix_reps: 30,
        incubate_secs: BINDING_SECS,
        magnet_secs: SEPARATION_SECS,
        pellet: Some(cleanup),
        route: route(ctx, "purified_cdna", 20.0, 2, true)?,
        reagents: SelectionReagents::default(),
    };
    report.select(ctx, selection)?;

    if config.multiplex {
        let selection = SizeSelection {
            label: "multiplex_cleanup".to_string(),
            well: ctx.well("mult_cleanup")?,
            sample: SampleSource::OnMagnet,
            bead_volume: 70.0,
            sample_volume: diversion,
            mix_volume: 130.0,
            mix_reps: 30,
            incubate_secs: BINDING_SECS,
            magnet_secs: 300.0,
            pellet: Some(pellet([230.0, 230.0], 120.0, 41.0)),
            route: route(ctx, "multiplex_cln", 20.0, 2, false)?,
            reagents: SelectionReagents::default(),
        };
        report.select(ctx, selection)?;
    }
    Ok(())
}

fn fragmentation_size_selection(ctx: &mut ProtocolContext, report: &mut StageReport) -> ProtocolResult<()> {
    let frag_mix = ctx.well("frag_mix")?;
    let frag_tc = ctx.well("frag_mix_tc")?;
    let purified = ctx.well("purified_cdna")?;
    report.program(ctx, "fragmentation_precool", &cycler::fragmentation_precool())?;

    {
        let ProtocolContext { robot, ledger, .. } = &mut *ctx;
        let tc_top = Location::top(&frag_tc);
        robot.p20.pick_up_tip()?;
        draw_stock_small(robot, ledger, EB, 15.0, &Location::bottom_z(&frag_tc, 0.2))?;
        robot.delay(0.5);
        robot
            .p20
            .move_to(&Location::bottom_z(&frag_tc, 4.0), Some(4.4))?;
        robot.delay(0.5);
        robot.p20.move_to(&tc_top, None)?;
        robot.p20.blow_out(None)?;
        robot.p20.touch_tip()?;
        robot.p20.drop_tip()?;

        robot.p20.pick_up_tip()?;
        robot
            .p20
            .mix(15, 14.0, &Location::bottom_z(&frag_mix, 0.1), 1.0)?;
        vacuum_transfer(
            robot,
            ledger,
            &VacuumTransfer {
                source: Location::bottom_z(&frag_mix, 0.1),
                rate: 0.2,
                volume: 15.0,
                dest: Location::bottom(&frag_tc),
                blow_out_at: tc_top.clone(),
                reps: 1,
            },
        )?;
        robot.p20.drop_tip()?;

        robot.p20.pick_up_tip()?;
        vacuum_transfer(
            robot,
            ledger,
            &VacuumTransfer {
                source: Location::bottom_z(&purified, 0.2),
                rate: 0.2,
                volume: 20.0,
                dest: Location::bottom(&frag_tc),
                blow_out_at: tc_top.clone(),
                reps: 1,
            },
        )?;
        robot.p20.drop_tip()?;

        mix_reaction(robot, &frag_tc, 30, 30.0, 0.2)?;
    }
    report.program(ctx, "fragmentation", &cycler::fragmentation())?;

    let selection = SizeSelection {
        label: "fragment_size_selection_upper".to_string(),
        well: ctx.well("treated_cdna")?,
        sample: from_well(ctx, "frag_mix_tc")?,
        bead_volume: 30.0,
        sample_volume: 50.0,
        mix_volume: 50.0,
        mix_reps: 30,
        incubate_secs: BINDING_SECS,
        magnet_secs: SEPARATION_SECS,
        pellet: None,
        route: route(ctx, "size_sel_0_cdna", 18.75, 4, true)?,
        reagents: SelectionReagents::default(),
    };
    report.select(ctx, selection)?;

    let selection = SizeSelection {
        label: "fragment_size_selection_lower".to_string(),
        well: ctx.well("size_sel_0_cdna")?,
        sample: SampleSource::OnMagnet,
        bead_volume: 10.0,
        sample_volume: 75.0,
        mix_volume: 55.0,
        mix_reps: 30,
        incubate_secs: BINDING_SECS,
        magnet_secs: SEPARATION_SECS,
        pellet: Some(pellet([125.0, 125.0], 60.0, 51.0)),
        route: route(ctx, "ada_lig_mix", 16.67, 3, false)?,
        reagents: SelectionReagents::default(),
    };
    report.select(ctx, selection)
}

fn ligation_cleanup(ctx: &mut ProtocolContext, report: &mut StageReport) -> ProtocolResult<()> {
    let lig_mix = ctx.well("ada_lig_mix")?;
    let lig_tc = ctx.well("ada_lig_mix_tc")?;
    report.program(ctx, "ligation_precool", &cycler::ligation_precool())?;

    {
        let ProtocolContext { robot, ledger, .. } = &mut *ctx;
        let mix_at = Location::bottom_z(&lig_mix, 0.3);
        let tc_top = Location::top(&lig_tc);
        robot.p300.pick_up_tip()?;
        robot.p300.mix(30, 70.0, &mix_at, 1.0)?;
        robot.p300.mix(1, 90.0, &mix_at, 1.0)?;
        robot.p300.aspirate(90.0, &mix_at, 0.2)?;
        robot.delay(1.0);
        robot
            .p300
            .move_to(&Location::bottom_z(&lig_mix, 2.0), Some(1.0))?;
        robot.p300.move_to(&Location::top(&lig_mix), None)?;
        robot
            .p300
            .dispense(90.0, &Location::bottom_z(&lig_tc, 0.3), 1.0)?;
        robot.p300.move_to(&tc_top, None)?;
        robot.delay(REACTION_SETTLE_SECS);
        robot.p300.blow_out(Some(&tc_top))?;
        robot.p300.touch_tip()?;
        robot.p300.drop_tip()?;
        ledger.move_between(&lig_mix, &lig_tc, 90.0);

        robot.p20.pick_up_tip()?;
        vacuum_transfer(
            robot,
            ledger,
            &VacuumTransfer {
                source: Location::bottom(&lig_mix),
                rate: 1.0,
                volume: 16.67,
                dest: Location::top_z(&lig_tc, -2.0),
                blow_out_at: tc_top,
                reps: 1,
            },
        )?;
        robot.p20.drop_tip()?;
    }
    report.program(ctx, "ligation", &cycler::ligation())?;

    let selection = SizeSelection {
        label: "ligation_cleanup".to_string(),
        well: ctx.well("lig_cleanup_0")?,
        sample: from_well(ctx, "ada_lig_mix_tc")?,
        bead_volume: 80.0,
        sample_volume: 100.0,
        mix_volume: 140.0,
        mix_reps: 30,
        incubate_secs: BINDING_SECS,
        magnet_secs: SEPARATION_SECS,
        pellet: Some(pellet([200.0, 200.0], 120.0, 31.0)),
        route: route(ctx, "postlig_cleanup", 15.0, 2, false)?,
        reagents: SelectionReagents::default(),
    };
    report.select(ctx, selection)
}

fn index_pcr_size_selection(
    ctx: &mut ProtocolContext,
    config: &ProtocolConfig,
    report: &mut StageReport,
) -> ProtocolResult<()> {
    let reaction = ctx.well("samp_index_pcr")?;
    assemble(
        ctx,
        "samp_index_pcr",
        &[("postlig_cleanup", 15.0, 2), ("amp_mix", 16.67, 3), ("dual_ind_tt", 20.0, 1)],
    )?;
    mix_reaction(&mut ctx.robot, &reaction, 10, 70.0, 0.3)?;
    report.program(ctx, "index_pcr_setup", &cycler::index_pcr_setup())?;
    let cycles = resolve_index_cycles(config.index_pcr_cycles, &mut *ctx.console)?;
    report.index_cycles = Some(cycles);
    report.program(ctx, "index_pcr", &cycler::index_pcr(cycles)?)?;

    let selection = SizeSelection {
        label: "index_size_selection_upper".to_string(),
        well: ctx.well("indexed_cdna")?,
        sample: from_well(ctx, "samp_index_pcr")?,
        bead_volume: 60.0,
        sample_volume: 100.0,
        mix_volume: 120.0,
        mix_reps: 30,
        incubate_secs: BINDING_SECS,
        magnet_secs: SEPARATION_SECS,
        pellet: None,
        route: route(ctx, "size_sel_0_ind_cdna", 18.75, 8, true)?,
        reagents: SelectionReagents::default(),
    };
    report.select(ctx, selection)?;

    let selection = SizeSelection {
        label: "index_size_selection_lower".to_string(),
        well: ctx.well("size_sel_0_ind_cdna")?,
        sample: SampleSource::OnMagnet,
        bead_volume: 20.0,
        sample_volume: 150.0,
        mix_volume: 150.0,
        mix_reps: 60,
        incubate_secs: BINDING_SECS,
        magnet_secs: SEPARATION_SECS,
        pellet: Some(pellet([200.0, 200.0], 39.0, 36.0)),
        route: route(ctx, "final_product", 18.0, 2, false)?,
        reagents: SelectionReagents::default(),
    };
    report.select(ctx, selection)
}

fn multiplex_index_pcr(
    ctx: &mut ProtocolContext,
    config: &ProtocolConfig,
    report: &mut StageReport,
) -> ProtocolResult<()> {
    let reaction = ctx.well("mult_index_pcr")?;
    assemble(
        ctx,
        "mult_index_pcr",
        &[("multiplex_cln", 10.0, 1), ("multiplex_ind_pcr", 17.5, 4), ("dual_ind_nn", 20.0, 1)],
    )?;
    mix_reaction(&mut ctx.robot, &reaction, 10, 80.0, 0.3)?;
    report.program(ctx, "index_pcr_setup", &cycler::index_pcr_setup())?;
    let cycles = config.multiplex_index_pcr_cycles;
    report.index_cycles = Some(cycles);
    report.program(ctx, "multiplex_index_pcr", &cycler::index_pcr(cycles)?)?;

    let selection = SizeSelection {
        label: "multiplex_size_selection".to_string(),
        well: ctx.well("mult_size_sel")?,
        sample: from_well(ctx, "mult_index_pcr")?,
        bead_volume: 120.0,
        sample_volume: 100.0,
        mix_volume: 150.0,
        mix_reps: 60,
        incubate_secs: BINDING_SECS,
        magnet_secs: 360.0,
        pellet: Some(pellet([260.0, 260.0], 120.0, 41.0)),
        route: route(ctx, "multiplex_fin", 20.0, 2, false)?,
        reagents: SelectionReagents::default(),
    };
    report.select(ctx, selection)
}
