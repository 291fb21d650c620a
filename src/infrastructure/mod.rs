//! Infrastructure layer.
//!
//! Provides technical concerns that support the application without containing
//! orchestration logic: configuration files, host resource probing, overlay
//! files on disk and external worker processes.
//!
//! # Submodules
//!
//! - [`config`] - Base config, settings and logging
//! - [`overlay`] - Overlay directory probe and fragment writer
//! - [`resource`] - Usable CPU detection
//! - [`worker`] - Process-backed worker (direct or docker compose)

pub mod config;
pub mod overlay;
pub mod resource;
pub mod worker;
