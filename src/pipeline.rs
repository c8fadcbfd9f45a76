//! Ordered execution of the configured stages and the report of a run.

use crate::config::ProtocolConfig;
use crate::context::ProtocolContext;
use crate::error::ProtocolResult;
use crate::stages::{StageKind, StageReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockUsage {
    pub id: String,
    pub well: String,
    pub initial: f64,
    pub remaining: f64,
    pub consumed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub multiplex: bool,
    pub stages: Vec<StageReport>,
    pub skipped: Vec<StageKind>,
    pub stocks: Vec<StockUsage>,
    /// Final tracked volume per well, keyed `labware:well`.
    pub wells: BTreeMap<String, f64>,
    pub elapsed_seconds: f64,
    /// Filled in by callers that can count motions (the simulator).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motions: Option<usize>,
}

impl RunReport {
    pub fn stock(&self, id: &str) -> Option<&StockUsage> {
        self.stocks.iter().find(|s| s.id == id)
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == kind)
    }
}

pub struct StagePipeline {
    config: ProtocolConfig,
}

impl StagePipeline {
    pub fn new(config: ProtocolConfig) -> ProtocolResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Stages that will actually run, in order.
    pub fn planned(&self) -> Vec<StageKind> {
        self.config
            .stages
            .iter()
            .copied()
            .filter(|s| self.config.multiplex || !s.is_multiplex_only())
            .collect()
    }

    /// Runs every planned stage against `ctx`, waiting for the operator
    /// between stages. Stops at the first error.
    pub fn run(&self, ctx: &mut ProtocolContext) -> ProtocolResult<RunReport> {
        let started = ctx.robot.clock.now();
        let planned = self.planned();
        let skipped = self
            .config
            .stages
            .iter()
            .copied()
            .filter(|s| !planned.contains(s))
            .collect::<Vec<_>>();
        for stage in &skipped {
            info!(stage = stage.as_str(), "stage skipped, multiplex is off");
        }

        let mut stages = vec![];
        for (idx, stage) in planned.iter().enumerate() {
            if idx > 0 {
                ctx.console
                    .acknowledge(&format!("Proceed to {}", stage.as_str()))?;
            }
            info!(stage = stage.as_str(), "stage starting");
            let report = stage.run(ctx, &self.config)?;
            info!(
                stage = stage.as_str(),
                selections = report.selections.len(),
                cycler_seconds = report.cycler_seconds,
                "stage finished"
            );
            stages.push(report);
        }

        let stocks = ctx
            .ledger
            .stocks()
            .map(|s| StockUsage {
                id: s.id.clone(),
                well: s.well.to_string(),
                initial: s.initial_volume,
                remaining: s.volume,
                consumed: s.consumed(),
            })
            .collect();
        let wells = ctx
            .ledger
            .wells()
            .iter()
            .map(|(well, volume)| (well.to_string(), *volume))
            .collect();
        let elapsed = ctx.robot.clock.now().saturating_sub(started);
        Ok(RunReport {
            multiplex: self.config.multiplex,
            stages,
            skipped,
            stocks,
            wells,
            elapsed_seconds: elapsed.as_secs_f64(),
            motions: None,
        })
    }
}
