//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! # Available Ports
//!
//! - [`Worker`] - External execution of the shared setup step and of jobs

pub mod worker;

pub use worker::Worker;
