//! Timed agitation holds.
//!
//! A hold repeats a caller-supplied micro-cycle until the wall clock says the
//! requested duration has passed. Exit is bound to elapsed time only, never to
//! an iteration count, and there is no early-exit path: binding and separation
//! chemistry always gets at least its programmed time.

use crate::error::ProtocolResult;
use crate::hardware::Clock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldReport {
    pub cycles: u64,
    pub elapsed: Duration,
}

/// Invokes `agitate` at least once, then again until `clock` reports that
/// `duration` has elapsed since the hold started. An error from `agitate`
/// aborts the hold and is returned as-is.
pub fn hold<F>(clock: &dyn Clock, duration: Duration, mut agitate: F) -> ProtocolResult<HoldReport>
where
    F: FnMut() -> ProtocolResult<()>,
{
    info!(seconds = duration.as_secs_f64(), "hold starting");
    let start = clock.now();
    let mut cycles = 0u64;
    loop {
        agitate()?;
        cycles += 1;
        let elapsed = clock.now().saturating_sub(start);
        if elapsed >= duration {
            info!(cycles, elapsed = elapsed.as_secs_f64(), "hold finished");
            return Ok(HoldReport { cycles, elapsed });
        }
        debug!(cycles, elapsed = elapsed.as_secs_f64(), "hold cycle");
    }
}
