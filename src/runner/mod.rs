//! Probe execution
//!
//! A [`JobRunner`] launches the probe program inside the scratch directory
//! with the job identifier as its only argument and waits for it to exit.
//! [`DirectRunner`] uses the host runtime; [`ContainerRunner`] goes through
//! Singularity/Apptainer with the scratch directory bind-mounted.

mod container;
mod direct;

pub use container::ContainerRunner;
pub use direct::DirectRunner;

use crate::error::{Result, SlurmProbeError};
use crate::system::JobId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{Duration, Instant};

/// What the runner executes: `[interpreter] program <job_id>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeCommand {
    /// Interpreter prefix (e.g. `python3`); `None` runs `program` directly
    pub interpreter: Option<String>,
    /// Program path, relative to the working directory
    pub program: String,
}

impl Default for ProbeCommand {
    fn default() -> Self {
        Self {
            interpreter: Some("python3".to_string()),
            program: "test.py".to_string(),
        }
    }
}

impl ProbeCommand {
    /// Executable followed by its arguments, job id last
    pub fn argv(&self, job_id: &JobId) -> Vec<String> {
        let mut argv = Vec::with_capacity(3);
        if let Some(interpreter) = &self.interpreter {
            argv.push(interpreter.clone());
        }
        argv.push(self.program.clone());
        argv.push(job_id.to_string());
        argv
    }
}

/// Per-invocation inputs shared by every runner
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Job being run
    pub job_id: JobId,
    /// Host-side scratch directory
    pub scratch: PathBuf,
}

impl RunContext {
    /// Create a context for the given job and scratch directory
    pub fn new(job_id: JobId, scratch: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            scratch: scratch.into(),
        }
    }
}

/// Result of a probe invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Process exit code (`128 + signal` when killed by a signal)
    pub exit_code: i32,
    /// Wall-clock time spent waiting for the probe
    pub duration: Duration,
}

impl RunOutcome {
    /// Check whether the probe exited cleanly
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the probe program for one job
pub trait JobRunner {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Build the command line without running it
    fn command(&self, ctx: &RunContext) -> Result<Command>;

    /// Run the probe to completion
    fn run(&self, ctx: &RunContext) -> Result<RunOutcome> {
        let mut command = self.command(ctx)?;
        tracing::info!("Running probe ({}) for job {}: {:?}", self.name(), ctx.job_id, command);
        execute(&mut command)
    }
}

/// Spawn a command, inherit stdio, and wait for it
pub(crate) fn execute(command: &mut Command) -> Result<RunOutcome> {
    let program = command.get_program().to_string_lossy().into_owned();
    let start = Instant::now();

    let status = command
        .status()
        .map_err(|e| SlurmProbeError::spawn(program, e))?;

    let outcome = RunOutcome {
        exit_code: exit_code(status),
        duration: start.elapsed(),
    };
    tracing::info!(
        "Probe exited with status {} after {}",
        outcome.exit_code,
        humantime::format_duration(Duration::from_secs(outcome.duration.as_secs()))
    );
    Ok(outcome)
}

/// Map an exit status to a shell-style exit code
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

fn ensure_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(SlurmProbeError::NotFound(path.to_path_buf()))
    }
}
