//! Containerized probe execution through Singularity/Apptainer

use super::{ensure_dir, JobRunner, ProbeCommand, RunContext};
use crate::error::{Result, SlurmProbeError};
use std::path::PathBuf;
use std::process::Command;

/// Default in-container mount point for the scratch directory
pub const DEFAULT_MOUNT_POINT: &str = "/mnt";

/// Runs the probe inside a container image staged into scratch
#[derive(Debug, Clone)]
pub struct ContainerRunner {
    /// Container tool (`singularity` or `apptainer`)
    runtime: String,
    /// Image file name, relative to the scratch directory
    image: PathBuf,
    /// Where scratch is mounted inside the container
    mount_point: String,
    probe: ProbeCommand,
}

impl ContainerRunner {
    /// Create a runner using `image` from the scratch directory
    pub fn new(image: impl Into<PathBuf>, probe: ProbeCommand) -> Self {
        Self {
            runtime: "singularity".to_string(),
            image: image.into(),
            mount_point: DEFAULT_MOUNT_POINT.to_string(),
            probe,
        }
    }

    /// Use a different container tool
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Mount scratch somewhere other than `/mnt`
    pub fn with_mount_point(mut self, mount_point: impl Into<String>) -> Self {
        self.mount_point = mount_point.into();
        self
    }
}

impl JobRunner for ContainerRunner {
    fn name(&self) -> &'static str {
        "container"
    }

    fn command(&self, ctx: &RunContext) -> Result<Command> {
        ensure_dir(&ctx.scratch)?;

        // The image is only looked up inside scratch; it has to be staged.
        let image_name = self.image.file_name().unwrap_or(self.image.as_os_str());
        let image = ctx.scratch.join(image_name);
        if !image.is_file() {
            return Err(SlurmProbeError::ImageMissing(image));
        }

        let mut command = Command::new(&self.runtime);
        command
            .arg("exec")
            .arg("--bind")
            .arg(format!("{}:{}", ctx.scratch.display(), self.mount_point))
            .arg("--pwd")
            .arg(&self.mount_point)
            .arg(&image)
            .args(self.probe.argv(&ctx.job_id))
            .current_dir(&ctx.scratch);
        Ok(command)
    }
}
