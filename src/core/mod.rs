//! Core job orchestration module
//!
//! Ties scratch management, probe execution and result
//! collection into one sequential job run.

mod pipeline;

pub use pipeline::*;
