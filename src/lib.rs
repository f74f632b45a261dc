//! # slurmprobe - Environment probe wrapper for SLURM jobs
//!
//! slurmprobe runs a probe program on an HPC compute node the way a batch
//! job should: on fast node-local scratch, optionally inside a container,
//! with results copied back to where the job was submitted from.
//!
//! ## Features
//!
//! - **Scratch management**: unique per-job directory under `$TMPDIR`
//! - **Direct or containerized execution**: host runtime or
//!   Singularity/Apptainer with scratch bind-mounted
//! - **Result collection**: best-effort copy of `results/` back to the
//!   submission directory
//! - **Exit status propagation**: the job exits with the probe's status
//! - **Batch script generation**: `#SBATCH` directives and `sbatch` submission
//! - **Image recipe**: Singularity definition, build and self-test
//! - **Native probe**: cores, memory, OS banner, interpreter and packages
//!
//! ## Quick Start
//!
//! ```no_run
//! use slurmprobe::config::RunConfig;
//! use slurmprobe::core::JobPipeline;
//! use slurmprobe::system::JobId;
//!
//! let mut config = RunConfig::new(JobId::new("12345")?, "/tmp", "/home/user/probe");
//! config.inputs = vec!["/home/user/probe/test.py".into()];
//!
//! let report = JobPipeline::new(config).execute()?;
//! report.print_summary();
//! std::process::exit(report.exit_code);
//! # Ok::<(), slurmprobe::SlurmProbeError>(())
//! ```
//!
//! ## Batch Script
//!
//! ```
//! use slurmprobe::system::{hpc::generate_slurm_script, JobConfig};
//!
//! let config = JobConfig { array_size: 4, ..Default::default() };
//! let script = generate_slurm_script(&config, &["--runner".into(), "container".into()]);
//! assert!(script.contains("#SBATCH --array=0-3"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collect;
pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod image;
pub mod runner;
pub mod scratch;
pub mod system;

// Re-export commonly used types
pub use crate::config::{RunConfig, RunnerKind};
pub use crate::core::{JobPipeline, JobReport};
pub use crate::error::{Result, SlurmProbeError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use slurmprobe::prelude::*;
    //! ```

    pub use crate::collect::{CollectOutcome, ResultCollector};
    pub use crate::config::{RunConfig, RunnerKind};
    pub use crate::core::{JobPipeline, JobReport};
    pub use crate::error::{Result, SlurmProbeError};
    pub use crate::image::{ImageBuilder, ImageRecipe};
    pub use crate::runner::{ContainerRunner, DirectRunner, JobRunner, ProbeCommand, RunContext};
    pub use crate::scratch::ScratchDir;
    pub use crate::system::{EnvironmentProbe, JobConfig, JobId, JobInfo, JobScheduler};
}
