//! Orchestration core for an automated NGS library-preparation protocol.
//!
//! The crate drives external collaborators (pipettes, a magnetic module, a
//! thermal cycler, an operator console) through the traits in [`hardware`],
//! while tracking reagent stocks and well volumes in a [`ledger::VolumeLedger`].
//! [`pipeline::StagePipeline`] runs the configured stages; [`simulator`]
//! provides deterministic stand-ins for every collaborator.

pub mod about;
pub mod config;
pub mod context;
pub mod cycler;
pub mod error;
pub mod hardware;
pub mod hold;
pub mod layout;
pub mod ledger;
pub mod liquid_height;
pub mod operator;
pub mod pipeline;
pub mod selection;
pub mod simulator;
pub mod stages;
pub mod transfer;
pub mod wash;

pub use config::{Calibration, ProtocolConfig};
pub use context::ProtocolContext;
pub use error::{ErrorCode, ProtocolError, ProtocolResult};
pub use layout::DeckLayout;
pub use pipeline::{RunReport, StagePipeline};
pub use stages::StageKind;
