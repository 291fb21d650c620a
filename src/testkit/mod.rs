//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`worker`] - [`ScriptedWorker`](worker::ScriptedWorker), a process-free
//!   [`Worker`](crate::port::Worker) with scripted exit codes.
//! - [`fixture`] - Base configs and job specs on disk or in memory.

pub mod fixture;
pub mod worker;
