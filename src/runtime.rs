//! Runtime glue that wires configuration, run coordination, telemetry, and
//! signal-aware runner orchestration.

pub mod config;
pub mod coordinator;
pub mod runner;
pub mod telemetry;
