//! System integration module
//!
//! SLURM job descriptors and submission, plus the native
//! environment probe run on compute nodes.

pub mod hpc;
pub mod probe;

pub use hpc::{ArrayInfo, JobConfig, JobId, JobInfo, JobScheduler};
pub use probe::{EnvironmentProbe, ProbeConfig, ProbeReport};
