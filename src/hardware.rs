//! Capabilities the orchestration core consumes from the deck. The core never
//! implements motion, temperature control or operator I/O itself; it drives
//! these traits, and the driver (or the [`crate::simulator`]) carries them out.

use crate::error::ProtocolResult;
use crate::hold::{hold, HoldReport};
use libprep_protocol::{CyclerCommand, Location, ThermalProfile, TipSlot, Tool};
use std::{
    rc::Rc,
    time::{Duration, Instant},
};

/// Monotonic time source. Abstracted so holds can be driven by a simulated
/// clock in tests.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// One gang pipette. Implementations must refuse liquid handling without a
/// mounted tip and refuse a pick-up while one is mounted.
pub trait Pipette {
    fn tool(&self) -> Tool;
    fn has_tip(&self) -> bool;
    fn pick_up_tip(&mut self) -> ProtocolResult<()>;
    fn pick_up_tip_from(&mut self, slot: &TipSlot) -> ProtocolResult<()>;
    /// Puts the mounted tip back where it was picked up.
    fn return_tip(&mut self) -> ProtocolResult<()>;
    fn drop_tip(&mut self) -> ProtocolResult<()>;
    fn aspirate(&mut self, volume: f64, location: &Location, rate: f64) -> ProtocolResult<()>;
    fn dispense(&mut self, volume: f64, location: &Location, rate: f64) -> ProtocolResult<()>;
    fn move_to(&mut self, location: &Location, speed: Option<f64>) -> ProtocolResult<()>;
    /// Blows out at `location`, or in place when `None`.
    fn blow_out(&mut self, location: Option<&Location>) -> ProtocolResult<()>;
    fn touch_tip(&mut self) -> ProtocolResult<()>;
    fn air_gap(&mut self, volume: f64) -> ProtocolResult<()>;

    fn mix(&mut self, strokes: u32, volume: f64, location: &Location, rate: f64) -> ProtocolResult<()> {
        for _ in 0..strokes {
            self.aspirate(volume, location, rate)?;
            self.dispense(volume, location, rate)?;
        }
        Ok(())
    }
}

pub trait MagneticModule {
    fn engage(&mut self, height: f64) -> ProtocolResult<()>;
    /// Must be idempotent.
    fn disengage(&mut self) -> ProtocolResult<()>;
    fn is_engaged(&self) -> bool;
}

pub trait ThermalCycler {
    fn open_lid(&mut self) -> ProtocolResult<()>;
    fn close_lid(&mut self) -> ProtocolResult<()>;
    fn set_lid_temperature(&mut self, celsius: f64) -> ProtocolResult<()>;
    fn deactivate_lid(&mut self) -> ProtocolResult<()>;
    fn set_block_temperature(
        &mut self,
        celsius: f64,
        hold_seconds: Option<u32>,
        max_volume: Option<f64>,
    ) -> ProtocolResult<()>;
    fn execute_profile(&mut self, profile: &ThermalProfile, max_volume: f64) -> ProtocolResult<()>;

    fn run_command(&mut self, command: &CyclerCommand) -> ProtocolResult<()> {
        match command {
            CyclerCommand::OpenLid => self.open_lid(),
            CyclerCommand::CloseLid => self.close_lid(),
            CyclerCommand::SetLid { celsius } => self.set_lid_temperature(*celsius),
            CyclerCommand::DeactivateLid => self.deactivate_lid(),
            CyclerCommand::SetBlock {
                celsius,
                hold_seconds,
                max_volume,
            } => self.set_block_temperature(*celsius, *hold_seconds, *max_volume),
            CyclerCommand::Profile {
                profile,
                max_volume,
            } => self.execute_profile(profile, *max_volume),
        }
    }
}

/// Blocking operator interaction at designated checkpoints.
pub trait OperatorConsole {
    fn announce(&mut self, message: &str);
    fn acknowledge(&mut self, message: &str) -> ProtocolResult<()>;
    fn prompt(&mut self, message: &str) -> ProtocolResult<String>;
}

pub fn seconds(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// Every device on the deck, owned together so primitives can borrow the
/// pieces they need at once.
pub struct Robot {
    pub p20: Box<dyn Pipette>,
    pub p300: Box<dyn Pipette>,
    pub magnet: Box<dyn MagneticModule>,
    pub cycler: Box<dyn ThermalCycler>,
    pub clock: Box<dyn Clock>,
}

impl Robot {
    pub fn pipette(&mut self, tool: Tool) -> &mut dyn Pipette {
        match tool {
            Tool::P20 => &mut *self.p20,
            Tool::P300 => &mut *self.p300,
        }
    }

    pub fn delay(&self, secs: f64) {
        self.clock.sleep(seconds(secs));
    }

    /// Runs a timed agitation hold with `tool`, see [`hold`].
    pub fn hold<F>(&mut self, tool: Tool, secs: f64, mut agitate: F) -> ProtocolResult<HoldReport>
    where
        F: FnMut(&mut dyn Pipette) -> ProtocolResult<()>,
    {
        let Robot {
            p20, p300, clock, ..
        } = self;
        let pipette: &mut dyn Pipette = match tool {
            Tool::P20 => &mut **p20,
            Tool::P300 => &mut **p300,
        };
        hold(&**clock, seconds(secs), || agitate(&mut *pipette))
    }
}
