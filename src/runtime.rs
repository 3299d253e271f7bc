//! Runtime glue that wires configuration, persisted state, conflict
//! reporting, and telemetry.

pub mod config;
pub mod conflict;
pub mod state_store;
pub mod telemetry;
