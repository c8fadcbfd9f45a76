//! Operator-supplied values that the run cannot proceed without.

use crate::config::{MAX_INDEX_PCR_CYCLES, MIN_INDEX_PCR_CYCLES};
use crate::error::{ErrorCode, ProtocolError, ProtocolResult};
use crate::hardware::OperatorConsole;
use tracing::{info, warn};

/// Upper bound on re-prompts before the run gives up on the operator.
pub const MAX_PROMPT_ATTEMPTS: usize = 10;

/// Parses an operator's cycle-count answer. Decimal answers are truncated
/// ("12.7" is 12); anything outside the accepted range is rejected.
pub fn parse_cycles(answer: &str) -> Option<u32> {
    let value: f64 = answer.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let cycles = value.trunc();
    if cycles < MIN_INDEX_PCR_CYCLES as f64 || cycles > MAX_INDEX_PCR_CYCLES as f64 {
        return None;
    }
    Some(cycles as u32)
}

/// Uses `configured` when set, otherwise asks the operator until a valid
/// count is entered. Invalid answers are never replaced by a default.
pub fn resolve_index_cycles(
    configured: u32,
    console: &mut dyn OperatorConsole,
) -> ProtocolResult<u32> {
    if configured != 0 {
        info!(cycles = configured, "index PCR cycles from configuration");
        return Ok(configured);
    }
    for attempt in 1..=MAX_PROMPT_ATTEMPTS {
        let answer = console.prompt(&format!(
            "Index PCR: enter total cycles ({MIN_INDEX_PCR_CYCLES}-{MAX_INDEX_PCR_CYCLES}) calculated from cDNA input"
        ))?;
        match parse_cycles(&answer) {
            Some(cycles) => {
                info!(cycles, attempt, "index PCR cycles entered");
                return Ok(cycles);
            }
            None => {
                warn!(answer = answer.as_str(), attempt, "invalid cycle count");
                console.announce("invalid input");
            }
        }
    }
    Err(ProtocolError::new(
        ErrorCode::InvalidInput,
        format!("No valid index PCR cycle count after {MAX_PROMPT_ATTEMPTS} attempts"),
    ))
}
