//! Host-runtime probe execution

use super::{ensure_dir, JobRunner, ProbeCommand, RunContext};
use crate::error::Result;
use std::process::Command;

/// Runs the probe with the host's installed runtime
#[derive(Debug, Clone, Default)]
pub struct DirectRunner {
    probe: ProbeCommand,
}

impl DirectRunner {
    /// Create a runner for the given probe command
    pub fn new(probe: ProbeCommand) -> Self {
        Self { probe }
    }
}

impl JobRunner for DirectRunner {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn command(&self, ctx: &RunContext) -> Result<Command> {
        ensure_dir(&ctx.scratch)?;

        let argv = self.probe.argv(&ctx.job_id);
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]).current_dir(&ctx.scratch);
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::JobId;
    use std::ffi::OsStr;
    use tempfile::TempDir;

    #[test]
    fn test_direct_command_line() {
        let scratch = TempDir::new().unwrap();
        let ctx = RunContext::new(JobId::new("42").unwrap(), scratch.path());

        let command = DirectRunner::default().command(&ctx).unwrap();

        assert_eq!(command.get_program(), OsStr::new("python3"));
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, vec![OsStr::new("test.py"), OsStr::new("42")]);
        assert_eq!(command.get_current_dir(), Some(scratch.path()));
    }

    #[test]
    fn test_direct_requires_scratch() {
        let ctx = RunContext::new(JobId::new("42").unwrap(), "/nonexistent/scratch/42");
        assert!(DirectRunner::default().command(&ctx).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_direct_run_in_scratch() {
        let scratch = TempDir::new().unwrap();
        std::fs::write(
            scratch.path().join("probe.sh"),
            "mkdir -p results && echo \"$1\" > results/id.txt\nexit 2\n",
        )
        .unwrap();

        let runner = DirectRunner::new(ProbeCommand {
            interpreter: Some("sh".to_string()),
            program: "probe.sh".to_string(),
        });
        let outcome = runner
            .run(&RunContext::new(JobId::new("555").unwrap(), scratch.path()))
            .unwrap();

        assert_eq!(outcome.exit_code, 2);
        assert!(!outcome.is_success());
        assert_eq!(std::fs::read_to_string(scratch.path().join("results/id.txt")).unwrap(), "555\n");
    }
}
