//! Configuration module
//!
//! Handles CLI argument parsing, environment fallbacks,
//! and runtime configuration for job runs.

mod settings;

pub use settings::*;
