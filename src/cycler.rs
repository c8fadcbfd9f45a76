//! Thermal-cycler programs used by the stages, kept as data so they can be
//! inspected, logged and timed before they run.

use crate::error::{ErrorCode, ProtocolError, ProtocolResult};
use crate::hardware::ThermalCycler;
use libprep_protocol::{CyclerCommand, ThermalProfile, ThermalStep};
use tracing::info;

pub const REACTION_VOLUME: f64 = 100.0;
pub const FRAGMENTATION_VOLUME: f64 = 50.0;
const HOT_LID: f64 = 105.0;
const HOLD_TEMPERATURE: f64 = 4.0;

/// Sends `program` to the cycler in order, logging each command first.
pub fn run_program(
    cycler: &mut dyn ThermalCycler,
    name: &str,
    program: &[CyclerCommand],
) -> ProtocolResult<()> {
    info!(program = name, commands = program.len(), "cycler program starting");
    for (idx, command) in program.iter().enumerate() {
        info!(program = name, step = idx + 1, command = %command.describe(), "cycler");
        cycler.run_command(command)?;
    }
    info!(program = name, "cycler program finished");
    Ok(())
}

/// Nominal seconds of programmed holds, ignoring ramps.
pub fn nominal_seconds(program: &[CyclerCommand]) -> u64 {
    program
        .iter()
        .map(|c| match c {
            CyclerCommand::SetBlock {
                hold_seconds: Some(hold),
                ..
            } => *hold as u64,
            CyclerCommand::Profile { profile, .. } => profile.total_seconds(),
            _ => 0,
        })
        .sum()
}

fn check_cycles(name: &str, cycles: u32) -> ProtocolResult<()> {
    if cycles == 0 {
        return Err(ProtocolError::new(
            ErrorCode::InvalidInput,
            format!("{name} needs at least one cycle"),
        ));
    }
    Ok(())
}

pub fn dna_amplification(cycles: u32) -> ProtocolResult<Vec<CyclerCommand>> {
    check_cycles("cDNA amplification", cycles)?;
    Ok(vec![
        CyclerCommand::CloseLid,
        CyclerCommand::SetLid { celsius: HOT_LID },
        CyclerCommand::block_hold(98.0, 180, REACTION_VOLUME),
        CyclerCommand::Profile {
            profile: ThermalProfile::new(
                vec![
                    ThermalStep::new(98.0, 15),
                    ThermalStep::new(63.0, 20),
                    ThermalStep::new(72.0, 60),
                ],
                cycles,
            ),
            max_volume: REACTION_VOLUME,
        },
        CyclerCommand::block_hold(72.0, 60, REACTION_VOLUME),
        CyclerCommand::block(HOLD_TEMPERATURE),
        CyclerCommand::OpenLid,
    ])
}

/// Pre-cool before the fragmentation mix is assembled in the block.
pub fn fragmentation_precool() -> Vec<CyclerCommand> {
    vec![CyclerCommand::block(HOLD_TEMPERATURE), CyclerCommand::OpenLid]
}

/// Fragmentation, end repair and A-tailing. Leaves the lid cooling for
/// ligation.
pub fn fragmentation() -> Vec<CyclerCommand> {
    vec![
        CyclerCommand::SetLid { celsius: 65.0 },
        CyclerCommand::CloseLid,
        CyclerCommand::block_hold(32.0, 300, FRAGMENTATION_VOLUME),
        CyclerCommand::block_hold(65.0, 1800, FRAGMENTATION_VOLUME),
        CyclerCommand::block(HOLD_TEMPERATURE),
        CyclerCommand::OpenLid,
        CyclerCommand::SetLid { celsius: 37.0 },
    ]
}

pub fn ligation_precool() -> Vec<CyclerCommand> {
    vec![CyclerCommand::block(20.0)]
}

pub fn ligation() -> Vec<CyclerCommand> {
    vec![
        CyclerCommand::CloseLid,
        CyclerCommand::SetLid { celsius: 37.0 },
        CyclerCommand::block_hold(20.0, 900, REACTION_VOLUME),
        CyclerCommand::block(HOLD_TEMPERATURE),
        CyclerCommand::OpenLid,
    ]
}

/// Block at 20, hot lid, lid closed. Runs before the cycle count is known.
pub fn index_pcr_setup() -> Vec<CyclerCommand> {
    vec![
        CyclerCommand::block(20.0),
        CyclerCommand::SetLid { celsius: HOT_LID },
        CyclerCommand::CloseLid,
    ]
}

pub fn index_pcr(cycles: u32) -> ProtocolResult<Vec<CyclerCommand>> {
    check_cycles("index PCR", cycles)?;
    Ok(vec![
        CyclerCommand::block_hold(98.0, 45, REACTION_VOLUME),
        CyclerCommand::Profile {
            profile: ThermalProfile::new(
                vec![
                    ThermalStep::new(98.0, 20),
                    ThermalStep::new(54.0, 30),
                    ThermalStep::new(72.0, 20),
                ],
                cycles,
            ),
            max_volume: REACTION_VOLUME,
        },
        CyclerCommand::block_hold(72.0, 60, REACTION_VOLUME),
        CyclerCommand::block(HOLD_TEMPERATURE),
        CyclerCommand::OpenLid,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{Motion, Simulator};

    #[test]
    fn test_index_pcr_program() {
        let program = index_pcr(12).unwrap();
        assert_eq!(nominal_seconds(&program), 45 + 12 * 70 + 60);
        assert_eq!(program.last(), Some(&CyclerCommand::OpenLid));
        assert_eq!(
            index_pcr(0).unwrap_err().code,
            ErrorCode::InvalidInput
        );
    }

    #[test]
    fn test_fragmentation_holds() {
        assert_eq!(nominal_seconds(&fragmentation()), 2100);
        assert_eq!(nominal_seconds(&dna_amplification(12).unwrap()), 180 + 12 * 95 + 60);
    }

    #[test]
    fn test_run_program_executes_in_order() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        let program = ligation();
        run_program(&mut *robot.cycler, "ligation", &program).unwrap();
        let sent: Vec<CyclerCommand> = sim
            .motions()
            .into_iter()
            .filter_map(|m| match m {
                Motion::Cycler(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(sent, program);
        assert!(sim.elapsed().as_secs() >= 900);
    }
}
