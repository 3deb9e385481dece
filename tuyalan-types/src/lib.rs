//! Type definitions for tuyalan
//!
//! Datapoint snapshots plus the per-model RoboVac command tables.

pub mod datapoints;
pub mod error;
pub mod models;

pub use datapoints::Datapoints;
pub use error::{Error, Result};
pub use models::{CommandSpec, ModelCommands, RoboVacFeatures, RobovacCommand};
