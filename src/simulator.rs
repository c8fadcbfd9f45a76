//! Deterministic stand-ins for every deck collaborator.
//!
//! All devices share one [`MotionLog`] and one [`SimulatedClock`]. Each motion
//! advances the clock by a fixed cost and every delay or thermal hold advances
//! it by its nominal duration, so a multi-hour protocol simulates instantly
//! while timed holds still see time pass.

use crate::error::{ErrorCode, ProtocolError, ProtocolResult};
use crate::hardware::{Clock, MagneticModule, OperatorConsole, Pipette, Robot, ThermalCycler};
use libprep_protocol::{CyclerCommand, Location, ThermalProfile, TipSlot, Tool};
use serde::Serialize;
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    time::Duration,
};

const VOLUME_EPSILON: f64 = 1e-6;
pub const DEFAULT_MOTION_COST: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
pub struct SimulatedClock {
    now: Cell<Duration>,
}

impl SimulatedClock {
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    PickUpTip { tool: Tool, slot: Option<TipSlot> },
    ReturnTip { tool: Tool, slot: Option<TipSlot> },
    DropTip { tool: Tool },
    Aspirate { tool: Tool, volume: f64, location: Location, rate: f64 },
    Dispense { tool: Tool, volume: f64, location: Location, rate: f64 },
    MoveTo { tool: Tool, location: Location, speed: Option<f64> },
    BlowOut { tool: Tool, location: Option<Location> },
    TouchTip { tool: Tool },
    AirGap { tool: Tool, volume: f64 },
    MagnetEngage { height: f64 },
    MagnetDisengage,
    Cycler(CyclerCommand),
}

pub type MotionLog = Rc<RefCell<Vec<Motion>>>;

pub struct SimulatedPipette {
    tool: Tool,
    /// `Some(origin)` while a tip is mounted; the origin is `None` for a
    /// fresh tip from the rack.
    mounted: Option<Option<TipSlot>>,
    held: f64,
    fresh_tips: usize,
    log: MotionLog,
    clock: Rc<SimulatedClock>,
    motion_cost: Duration,
}

impl SimulatedPipette {
    pub fn new(tool: Tool, log: MotionLog, clock: Rc<SimulatedClock>, motion_cost: Duration) -> Self {
        Self {
            tool,
            mounted: None,
            held: 0.0,
            fresh_tips: 0,
            log,
            clock,
            motion_cost,
        }
    }

    fn record(&self, motion: Motion) {
        self.log.borrow_mut().push(motion);
        self.clock.advance(self.motion_cost);
    }

    fn require_tip(&self, action: &str) -> ProtocolResult<()> {
        if self.mounted.is_none() {
            return Err(ProtocolError::new(
                ErrorCode::NoTip,
                format!("{} cannot {action} without a tip", self.tool),
            ));
        }
        Ok(())
    }

    fn require_no_tip(&self) -> ProtocolResult<()> {
        if self.mounted.is_some() {
            return Err(ProtocolError::new(
                ErrorCode::TipAlreadyMounted,
                format!("{} already carries a tip", self.tool),
            ));
        }
        Ok(())
    }

    fn take_in(&mut self, volume: f64, what: &str) -> ProtocolResult<()> {
        let max = self.tool.model().max_volume;
        if !volume.is_finite() || volume < 0.0 || self.held + volume > max + VOLUME_EPSILON {
            return Err(ProtocolError::invalid_volume(format!(
                "{} cannot {what} {volume} while holding {} (max {max})",
                self.tool, self.held
            )));
        }
        self.held += volume;
        Ok(())
    }
}

impl Pipette for SimulatedPipette {
    fn tool(&self) -> Tool {
        self.tool
    }

    fn has_tip(&self) -> bool {
        self.mounted.is_some()
    }

    fn pick_up_tip(&mut self) -> ProtocolResult<()> {
        self.require_no_tip()?;
        self.mounted = Some(None);
        self.fresh_tips += 1;
        self.record(Motion::PickUpTip {
            tool: self.tool,
            slot: None,
        });
        Ok(())
    }

    fn pick_up_tip_from(&mut self, slot: &TipSlot) -> ProtocolResult<()> {
        self.require_no_tip()?;
        self.mounted = Some(Some(slot.clone()));
        self.record(Motion::PickUpTip {
            tool: self.tool,
            slot: Some(slot.clone()),
        });
        Ok(())
    }

    fn return_tip(&mut self) -> ProtocolResult<()> {
        self.require_tip("return a tip")?;
        let slot = self.mounted.take().flatten();
        self.held = 0.0;
        self.record(Motion::ReturnTip {
            tool: self.tool,
            slot,
        });
        Ok(())
    }

    fn drop_tip(&mut self) -> ProtocolResult<()> {
        self.require_tip("drop a tip")?;
        self.mounted = None;
        self.held = 0.0;
        self.record(Motion::DropTip { tool: self.tool });
        Ok(())
    }

    fn aspirate(&mut self, volume: f64, location: &Location, rate: f64) -> ProtocolResult<()> {
        self.require_tip("aspirate")?;
        self.take_in(volume, "aspirate")?;
        self.record(Motion::Aspirate {
            tool: self.tool,
            volume,
            location: location.clone(),
            rate,
        });
        Ok(())
    }

    fn dispense(&mut self, volume: f64, location: &Location, rate: f64) -> ProtocolResult<()> {
        self.require_tip("dispense")?;
        if !volume.is_finite() || volume < 0.0 || volume > self.held + VOLUME_EPSILON {
            return Err(ProtocolError::new(
                ErrorCode::Hardware,
                format!(
                    "{} cannot dispense {volume} while holding {}",
                    self.tool, self.held
                ),
            ));
        }
        self.held = (self.held - volume).max(0.0);
        self.record(Motion::Dispense {
            tool: self.tool,
            volume,
            location: location.clone(),
            rate,
        });
        Ok(())
    }

    fn move_to(&mut self, location: &Location, speed: Option<f64>) -> ProtocolResult<()> {
        self.record(Motion::MoveTo {
            tool: self.tool,
            location: location.clone(),
            speed,
        });
        Ok(())
    }

    fn blow_out(&mut self, location: Option<&Location>) -> ProtocolResult<()> {
        self.require_tip("blow out")?;
        self.held = 0.0;
        self.record(Motion::BlowOut {
            tool: self.tool,
            location: location.cloned(),
        });
        Ok(())
    }

    fn touch_tip(&mut self) -> ProtocolResult<()> {
        self.require_tip("touch tip")?;
        self.record(Motion::TouchTip { tool: self.tool });
        Ok(())
    }

    fn air_gap(&mut self, volume: f64) -> ProtocolResult<()> {
        self.require_tip("draw an air gap")?;
        self.take_in(volume, "draw an air gap of")?;
        self.record(Motion::AirGap {
            tool: self.tool,
            volume,
        });
        Ok(())
    }
}

pub struct SimulatedMagnet {
    engaged: Option<f64>,
    log: MotionLog,
}

impl SimulatedMagnet {
    pub fn new(log: MotionLog) -> Self {
        Self { engaged: None, log }
    }
}

impl MagneticModule for SimulatedMagnet {
    fn engage(&mut self, height: f64) -> ProtocolResult<()> {
        self.engaged = Some(height);
        self.log.borrow_mut().push(Motion::MagnetEngage { height });
        Ok(())
    }

    fn disengage(&mut self) -> ProtocolResult<()> {
        self.engaged = None;
        self.log.borrow_mut().push(Motion::MagnetDisengage);
        Ok(())
    }

    fn is_engaged(&self) -> bool {
        self.engaged.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CyclerState {
    pub lid_open: bool,
    pub lid_celsius: Option<f64>,
    pub block_celsius: Option<f64>,
}

pub struct SimulatedCycler {
    state: Rc<Cell<CyclerState>>,
    log: MotionLog,
    clock: Rc<SimulatedClock>,
}

impl SimulatedCycler {
    pub fn new(log: MotionLog, clock: Rc<SimulatedClock>) -> Self {
        Self {
            state: Rc::new(Cell::new(CyclerState::default())),
            log,
            clock,
        }
    }

    fn update(&self, command: CyclerCommand, change: impl FnOnce(&mut CyclerState)) {
        let mut state = self.state.get();
        change(&mut state);
        self.state.set(state);
        self.log.borrow_mut().push(Motion::Cycler(command));
    }
}

impl ThermalCycler for SimulatedCycler {
    fn open_lid(&mut self) -> ProtocolResult<()> {
        self.update(CyclerCommand::OpenLid, |s| s.lid_open = true);
        Ok(())
    }

    fn close_lid(&mut self) -> ProtocolResult<()> {
        self.update(CyclerCommand::CloseLid, |s| s.lid_open = false);
        Ok(())
    }

    fn set_lid_temperature(&mut self, celsius: f64) -> ProtocolResult<()> {
        self.update(CyclerCommand::SetLid { celsius }, |s| {
            s.lid_celsius = Some(celsius)
        });
        Ok(())
    }

    fn deactivate_lid(&mut self) -> ProtocolResult<()> {
        self.update(CyclerCommand::DeactivateLid, |s| s.lid_celsius = None);
        Ok(())
    }

    fn set_block_temperature(
        &mut self,
        celsius: f64,
        hold_seconds: Option<u32>,
        max_volume: Option<f64>,
    ) -> ProtocolResult<()> {
        self.update(
            CyclerCommand::SetBlock {
                celsius,
                hold_seconds,
                max_volume,
            },
            |s| s.block_celsius = Some(celsius),
        );
        if let Some(hold) = hold_seconds {
            self.clock.advance(Duration::from_secs(hold as u64));
        }
        Ok(())
    }

    fn execute_profile(&mut self, profile: &ThermalProfile, max_volume: f64) -> ProtocolResult<()> {
        if profile.steps.is_empty() {
            return Err(ProtocolError::new(
                ErrorCode::InvalidInput,
                "Thermal profile has no steps",
            ));
        }
        let last = profile.steps.last().map(|s| s.celsius);
        self.update(
            CyclerCommand::Profile {
                profile: profile.clone(),
                max_volume,
            },
            |s| s.block_celsius = last,
        );
        self.clock.advance(Duration::from_secs(profile.total_seconds()));
        Ok(())
    }
}

/// Answers prompts from a fixed script and acknowledges every checkpoint.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    answers: VecDeque<String>,
    transcript: Vec<String>,
}

impl ScriptedConsole {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: vec![],
        }
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }
}

impl OperatorConsole for ScriptedConsole {
    fn announce(&mut self, message: &str) {
        self.transcript.push(message.to_string());
    }

    fn acknowledge(&mut self, message: &str) -> ProtocolResult<()> {
        self.transcript.push(message.to_string());
        Ok(())
    }

    fn prompt(&mut self, message: &str) -> ProtocolResult<String> {
        self.transcript.push(message.to_string());
        self.answers.pop_front().ok_or_else(|| {
            ProtocolError::new(
                ErrorCode::InvalidInput,
                format!("No scripted answer for prompt '{message}'"),
            )
        })
    }
}

/// Builds simulated robots and keeps handles on their shared log and clock.
#[derive(Clone)]
pub struct Simulator {
    log: MotionLog,
    clock: Rc<SimulatedClock>,
    motion_cost: Duration,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(DEFAULT_MOTION_COST)
    }
}

impl Simulator {
    pub fn new(motion_cost: Duration) -> Self {
        Self {
            log: Rc::new(RefCell::new(vec![])),
            clock: Rc::new(SimulatedClock::default()),
            motion_cost,
        }
    }

    pub fn robot(&self) -> Robot {
        Robot {
            p20: Box::new(SimulatedPipette::new(
                Tool::P20,
                self.log.clone(),
                self.clock.clone(),
                self.motion_cost,
            )),
            p300: Box::new(SimulatedPipette::new(
                Tool::P300,
                self.log.clone(),
                self.clock.clone(),
                self.motion_cost,
            )),
            magnet: Box::new(SimulatedMagnet::new(self.log.clone())),
            cycler: Box::new(SimulatedCycler::new(self.log.clone(), self.clock.clone())),
            clock: Box::new(self.clock.clone()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now()
    }

    pub fn motions(&self) -> Vec<Motion> {
        self.log.borrow().clone()
    }

    pub fn motion_count(&self) -> usize {
        self.log.borrow().len()
    }

    /// Volumes of every aspiration by `tool`, in order.
    pub fn aspirations(&self, tool: Tool) -> Vec<f64> {
        self.log
            .borrow()
            .iter()
            .filter_map(|m| match m {
                Motion::Aspirate { tool: t, volume, .. } if *t == tool => Some(*volume),
                _ => None,
            })
            .collect()
    }

    pub fn dispenses_into(&self, tool: Tool, well: &libprep_protocol::WellId) -> Vec<f64> {
        self.log
            .borrow()
            .iter()
            .filter_map(|m| match m {
                Motion::Dispense {
                    tool: t,
                    volume,
                    location,
                    ..
                } if *t == tool && &location.well == well => Some(*volume),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Motion) -> bool) -> usize {
        self.log.borrow().iter().filter(|m| pred(m)).count()
    }

    pub fn fresh_tip_pickups(&self, tool: Tool) -> usize {
        self.count(|m| matches!(m, Motion::PickUpTip { tool: t, slot: None } if *t == tool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libprep_protocol::WellId;

    fn loc() -> Location {
        Location::bottom(&WellId::new("r15", "A3"))
    }

    #[test]
    fn test_aspirate_without_tip_is_fatal() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        let err = robot.p20.aspirate(10.0, &loc(), 1.0).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoTip);
    }

    #[test]
    fn test_double_pickup_is_fatal() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        robot.p300.pick_up_tip().unwrap();
        let err = robot.p300.pick_up_tip().unwrap_err();
        assert_eq!(err.code, ErrorCode::TipAlreadyMounted);
    }

    #[test]
    fn test_tool_capacity_enforced() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        robot.p20.pick_up_tip().unwrap();
        robot.p20.aspirate(15.0, &loc(), 1.0).unwrap();
        let err = robot.p20.aspirate(6.0, &loc(), 1.0).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidVolume);
    }

    #[test]
    fn test_return_tip_reports_origin() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        let slot = TipSlot::new(0, "A1");
        robot.p300.pick_up_tip_from(&slot).unwrap();
        robot.p300.return_tip().unwrap();
        assert!(!robot.p300.has_tip());
        assert_eq!(
            sim.motions().last(),
            Some(&Motion::ReturnTip {
                tool: Tool::P300,
                slot: Some(slot)
            })
        );
        assert_eq!(sim.fresh_tip_pickups(Tool::P300), 0);
    }

    #[test]
    fn test_disengage_is_idempotent() {
        let sim = Simulator::default();
        let mut robot = sim.robot();
        robot.magnet.engage(16.0).unwrap();
        robot.magnet.disengage().unwrap();
        let once = robot.magnet.is_engaged();
        robot.magnet.disengage().unwrap();
        assert_eq!(robot.magnet.is_engaged(), once);
        assert!(!once);
    }

    #[test]
    fn test_motions_and_holds_advance_clock() {
        let sim = Simulator::new(Duration::from_secs(1));
        let mut robot = sim.robot();
        robot.p300.pick_up_tip().unwrap();
        robot
            .cycler
            .run_command(&CyclerCommand::block_hold(98.0, 45, 100.0))
            .unwrap();
        robot.delay(2.5);
        assert_eq!(sim.elapsed(), Duration::from_millis(48_500));
    }

    #[test]
    fn test_scripted_console_runs_out() {
        let mut console = ScriptedConsole::new(["12"]);
        assert_eq!(console.prompt("cycles").unwrap(), "12");
        assert_eq!(
            console.prompt("cycles").unwrap_err().code,
            ErrorCode::InvalidInput
        );
        assert_eq!(console.transcript().len(), 2);
    }
}
