//! Job pipeline
//!
//! Runs one job instance end to end: create scratch, stage inputs, run the
//! probe, collect results, remove scratch. Steps run strictly in order and
//! the probe's exit status becomes the job's exit status.

use crate::collect::{CollectOutcome, ResultCollector};
use crate::config::RunConfig;
use crate::error::{Result, SlurmProbeError};
use crate::runner::{ContainerRunner, DirectRunner, JobRunner, RunContext};
use crate::scratch::ScratchDir;
use crate::system::JobId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Exit code used when the probe could not be started at all
pub const EXIT_SPAWN_FAILED: i32 = 127;

/// Outcome of a full job run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// Job that ran
    pub job_id: JobId,
    /// Scratch directory used
    pub scratch: PathBuf,
    /// Probe exit code, which is also the job's exit code
    pub exit_code: i32,
    /// Result collection outcome
    pub collect: CollectOutcome,
    /// Whether scratch was removed afterwards
    pub scratch_removed: bool,
    /// Total duration
    pub duration: Duration,
}

impl JobReport {
    /// Check if the probe succeeded
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Job Summary ===");
        println!("Job ID:          {}", self.job_id);
        println!("Scratch:         {}", self.scratch.display());
        println!("Exit code:       {}", self.exit_code);
        match &self.collect {
            CollectOutcome::Collected { destination, files, bytes } => println!(
                "Results:         {} file(s), {} -> {}",
                files,
                humansize::format_size(*bytes, humansize::BINARY),
                destination.display()
            ),
            CollectOutcome::Absent => println!("Results:         none produced"),
            CollectOutcome::Failed { message } => println!("Results:         collection failed: {}", message),
        }
        println!("Scratch removed: {}", self.scratch_removed);
        println!("Duration:        {:.2?}", self.duration);
    }
}

/// Sequential stage → run → collect → clean up orchestration
pub struct JobPipeline {
    config: RunConfig,
    runner: Box<dyn JobRunner>,
    collector: ResultCollector,
}

impl JobPipeline {
    /// Create a pipeline, choosing the runner from the configuration
    pub fn new(config: RunConfig) -> Self {
        let runner: Box<dyn JobRunner> = match &config.container {
            Some(container) => Box::new(
                ContainerRunner::new(container.image.clone(), config.probe.clone())
                    .with_runtime(container.runtime.clone())
                    .with_mount_point(container.mount_point.clone()),
            ),
            None => Box::new(DirectRunner::new(config.probe.clone())),
        };
        let collector = ResultCollector::new(config.results_dir.clone());

        Self {
            config,
            runner,
            collector,
        }
    }

    /// Replace the runner
    pub fn with_runner(mut self, runner: Box<dyn JobRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute the job.
    ///
    /// Setup failures (scratch creation, staging, a runner that cannot build
    /// its command line) are returned as errors and the probe never runs. Once the probe has been attempted, collection
    /// and cleanup always run and the result is a [`JobReport`].
    pub fn execute(&self) -> Result<JobReport> {
        let start_time = Instant::now();
        let job_id = &self.config.job_id;

        tracing::info!("Starting job {} using the {} runner", job_id, self.runner.name());
        let scratch = ScratchDir::create(&self.config.tmp_root, job_id)?;

        if let Err(e) = scratch.stage(&self.config.inputs) {
            tracing::error!("Staging failed: {}", e);
            self.cleanup(scratch);
            return Err(e);
        }

        let ctx = RunContext::new(job_id.clone(), scratch.path());
        let exit_code = match self.runner.run(&ctx) {
            Ok(outcome) => outcome.exit_code,
            Err(e @ SlurmProbeError::Spawn { .. }) => {
                tracing::error!("Probe did not run: {}", e);
                EXIT_SPAWN_FAILED
            }
            Err(e) => {
                tracing::error!("Runner setup failed: {}", e);
                self.cleanup(scratch);
                return Err(e);
            }
        };

        let collect = self.collector.collect(scratch.path(), &self.config.submit_dir);

        let scratch_path = scratch.path().to_path_buf();
        let scratch_removed = self.cleanup(scratch);

        Ok(JobReport {
            job_id: job_id.clone(),
            scratch: scratch_path,
            exit_code,
            collect,
            scratch_removed,
            duration: start_time.elapsed(),
        })
    }

    fn cleanup(&self, scratch: ScratchDir) -> bool {
        if self.config.keep_scratch {
            scratch.keep();
            return false;
        }
        match scratch.remove() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Scratch cleanup failed: {}", e);
                false
            }
        }
    }
}
