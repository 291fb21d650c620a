//! Infrastructure configuration modules.

pub mod base;
pub mod logging;
pub mod settings;
