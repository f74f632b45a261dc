//! Configuration settings for slurmprobe
//!
//! Defines CLI arguments, environment fallbacks, and the runtime
//! configuration derived from them.

use crate::collect::DEFAULT_RESULTS_DIR;
use crate::error::{Result, SlurmProbeError};
use crate::runner::ProbeCommand;
use crate::system::hpc::{parse_slurm_time, JobConfig};
use crate::system::JobId;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// slurmprobe - stage, run and collect an environment probe on SLURM nodes
#[derive(Parser, Debug, Clone)]
#[command(name = "slurmprobe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run an environment probe inside a SLURM job, optionally in a container")]
#[command(long_about = r#"
slurmprobe wraps a probe program for SLURM batch jobs.

Inside a job it creates a node-local scratch directory, stages the inputs,
runs the probe (directly or through Singularity/Apptainer), copies a
results/ directory back to the submission directory and removes scratch.
The job exits with the probe's exit status.

Examples:
  slurmprobe run                                # inside a job, direct runner
  slurmprobe run --runner container             # same, inside probe.sif
  slurmprobe script --array 4 --partition short # print the batch script
  slurmprobe script --submit -- --runner container
  slurmprobe image build probe.sif --fakeroot   # build the probe image
  slurmprobe probe --target 0s                  # native probe, no idling
"#)]
pub struct CliArgs {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Output format for reports
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Stage inputs, run the probe, collect results, clean up
    #[command(name = "run")]
    Run(RunArgs),

    /// Probe the node environment in-process
    #[command(name = "probe")]
    Probe(ProbeArgs),

    /// Print or submit the SLURM batch script
    #[command(name = "script")]
    Script(ScriptArgs),

    /// Container image recipe, build and self-test
    #[command(name = "image")]
    Image {
        /// Image action
        #[command(subcommand)]
        command: ImageCommand,
    },

    /// Show the SLURM job descriptor of the current environment
    #[command(name = "env")]
    Env,
}

/// Arguments of `run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Job identifier
    #[arg(long, env = "SLURM_JOB_ID", value_name = "ID")]
    pub job_id: Option<String>,

    /// Node-local temporary root (defaults to the OS temp dir)
    #[arg(long, env = "TMPDIR", value_name = "PATH")]
    pub tmp_root: Option<PathBuf>,

    /// Submission directory (defaults to the current directory)
    #[arg(long, env = "SLURM_SUBMIT_DIR", value_name = "PATH")]
    pub submit_dir: Option<PathBuf>,

    /// How to run the probe
    #[arg(long, value_enum, default_value = "direct", env = "SLURMPROBE_RUNNER")]
    pub runner: RunnerKind,

    /// Container image file (staged into scratch)
    #[arg(long, default_value = "probe.sif", value_name = "PATH")]
    pub image: PathBuf,

    /// Container tool
    #[arg(long, default_value = "singularity", value_name = "CMD")]
    pub container_runtime: String,

    /// Scratch mount point inside the container
    #[arg(long, default_value = "/mnt", value_name = "PATH")]
    pub mount_point: String,

    /// Interpreter for the probe program (empty to run it directly)
    #[arg(long, default_value = "python3", value_name = "CMD")]
    pub interpreter: String,

    /// Probe program, relative to scratch
    #[arg(long, default_value = "test.py", value_name = "PATH")]
    pub program: String,

    /// Input to stage (repeatable; defaults to the program and, for the
    /// container runner, the image, taken from the submission directory)
    #[arg(long = "input", value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    /// Name of the results directory the probe writes
    #[arg(long, default_value = DEFAULT_RESULTS_DIR, value_name = "NAME")]
    pub results_dir: String,

    /// Leave the scratch directory in place
    #[arg(long)]
    pub keep_scratch: bool,
}

/// Arguments of `probe`
#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Job identifier to record in the report
    #[arg(value_name = "JOB_ID")]
    pub job_id: Option<String>,

    /// Minimum total runtime (e.g. 30s, 3m; 0s disables idling)
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub target: Duration,

    /// Interpreter whose version is reported
    #[arg(long, default_value = "python3", value_name = "CMD")]
    pub interpreter: String,

    /// Also write probe_<job_id>.json into this directory
    #[arg(long, value_name = "DIR", num_args = 0..=1, default_missing_value = DEFAULT_RESULTS_DIR)]
    pub write_results: Option<PathBuf>,
}

/// Arguments of `script`
#[derive(Args, Debug, Clone)]
pub struct ScriptArgs {
    /// Job name
    #[arg(long, default_value = "probe")]
    pub name: String,

    /// Wall-clock limit (SLURM format like 00:05:00, or 5m)
    #[arg(long, default_value = "00:05:00")]
    pub time: String,

    /// Number of array tasks
    #[arg(long, default_value = "1")]
    pub array: u32,

    /// CPUs per task
    #[arg(long, default_value = "1")]
    pub cpus_per_task: u32,

    /// Memory per CPU (e.g. 1G, 512M)
    #[arg(long, default_value = "1G")]
    pub mem_per_cpu: String,

    /// Output file pattern
    #[arg(long, default_value = "probe_%j.out")]
    pub output: String,

    /// Partition
    #[arg(long)]
    pub partition: Option<String>,

    /// Pipe the script to sbatch instead of printing it
    #[arg(long)]
    pub submit: bool,

    /// Arguments passed through to `slurmprobe run`
    #[arg(last = true, value_name = "RUN_ARGS")]
    pub run_args: Vec<String>,
}

/// Image subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ImageCommand {
    /// Print the Singularity definition file
    #[command(name = "recipe")]
    Recipe,

    /// Build the image
    #[command(name = "build")]
    Build {
        /// Output image path
        #[arg(default_value = "probe.sif")]
        output: PathBuf,
        /// Container tool
        #[arg(long, default_value = "singularity")]
        runtime: String,
        /// Build without root
        #[arg(long)]
        fakeroot: bool,
    },

    /// Run the image self-test
    #[command(name = "test")]
    Test {
        /// Image path
        #[arg(default_value = "probe.sif")]
        image: PathBuf,
        /// Container tool
        #[arg(long, default_value = "singularity")]
        runtime: String,
    },
}

/// Probe execution variant
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// Host runtime
    #[default]
    Direct,
    /// Singularity/Apptainer container
    Container,
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Container settings for the container runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image file name inside scratch
    pub image: PathBuf,
    /// Container tool
    pub runtime: String,
    /// Scratch mount point inside the container
    pub mount_point: String,
}

/// Runtime configuration of a job pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Job identifier
    pub job_id: JobId,
    /// Node-local temporary root
    pub tmp_root: PathBuf,
    /// Submission directory
    pub submit_dir: PathBuf,
    /// Probe command line
    pub probe: ProbeCommand,
    /// Container settings when running containerized
    pub container: Option<ContainerConfig>,
    /// Inputs staged into scratch
    pub inputs: Vec<PathBuf>,
    /// Results directory name
    pub results_dir: String,
    /// Keep scratch after the run
    pub keep_scratch: bool,
}

impl RunConfig {
    /// Create a direct-runner config with defaults for everything else
    pub fn new(job_id: JobId, tmp_root: impl Into<PathBuf>, submit_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            tmp_root: tmp_root.into(),
            submit_dir: submit_dir.into(),
            probe: ProbeCommand::default(),
            container: None,
            inputs: Vec::new(),
            results_dir: DEFAULT_RESULTS_DIR.to_string(),
            keep_scratch: false,
        }
    }

    /// Create config from CLI arguments
    pub fn from_cli(args: &RunArgs) -> Result<Self> {
        let job_id = args
            .job_id
            .as_deref()
            .ok_or_else(|| SlurmProbeError::config("job id required: pass --job-id or set SLURM_JOB_ID"))?;
        let job_id = JobId::new(job_id)?;

        let tmp_root = args.tmp_root.clone().unwrap_or_else(std::env::temp_dir);
        let submit_dir = match &args.submit_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| SlurmProbeError::config(format!("cannot determine submission directory: {}", e)))?,
        };

        if !is_plain_name(&args.results_dir) {
            return Err(SlurmProbeError::config(format!(
                "results directory must be a plain name, got '{}'",
                args.results_dir
            )));
        }

        let interpreter = Some(args.interpreter.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        // Default staging flattens the program to its file name in scratch
        let program = if args.inputs.is_empty() {
            staged_program(&args.program, interpreter.is_none())?
        } else {
            args.program.clone()
        };

        let probe = ProbeCommand { interpreter, program };

        let container = match args.runner {
            RunnerKind::Direct => None,
            RunnerKind::Container => Some(ContainerConfig {
                image: args.image.clone(),
                runtime: args.container_runtime.clone(),
                mount_point: args.mount_point.clone(),
            }),
        };

        let inputs = if args.inputs.is_empty() {
            let mut inputs = vec![submit_dir.join(&args.program)];
            if let Some(container) = &container {
                inputs.push(submit_dir.join(&container.image));
            }
            inputs
        } else {
            args.inputs
                .iter()
                .map(|p| if p.is_absolute() { p.clone() } else { submit_dir.join(p) })
                .collect()
        };

        Ok(Self {
            job_id,
            tmp_root,
            submit_dir,
            probe,
            container,
            inputs,
            results_dir: args.results_dir.clone(),
            keep_scratch: args.keep_scratch,
        })
    }
}

impl JobConfig {
    /// Create a submission config from CLI arguments
    pub fn from_cli(args: &ScriptArgs) -> Result<Self> {
        if args.array == 0 {
            return Err(SlurmProbeError::config("array size must be at least 1"));
        }
        if args.cpus_per_task == 0 {
            return Err(SlurmProbeError::config("cpus per task must be at least 1"));
        }

        let config = Self {
            name: args.name.clone(),
            time_limit: parse_time_limit(&args.time)?,
            array_size: args.array,
            cpus_per_task: args.cpus_per_task,
            memory_per_cpu: parse_size(&args.mem_per_cpu)
                .map_err(|e| SlurmProbeError::config(format!("Invalid memory per CPU: {}", e)))?,
            output: args.output.clone(),
            partition: args.partition.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// A single directory entry name that cannot escape its parent
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Program path as seen from scratch once `<submit_dir>/<program>` is staged
fn staged_program(program: &str, bare: bool) -> Result<String> {
    let name = Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SlurmProbeError::config(format!("program must name a file, got '{}'", program)))?;

    // Without an interpreter the program is exec'd, so keep it off PATH lookup
    Ok(if bare { format!("./{}", name) } else { name.to_string() })
}

/// Parse a wall-clock limit in SLURM or humantime notation
pub fn parse_time_limit(s: &str) -> Result<u64> {
    if let Some(secs) = parse_slurm_time(s.to_string()) {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs())
        .map_err(|e| SlurmProbeError::config(format!("Invalid time limit '{}': {}", s, e)))
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        (size.trim_end_matches(['T', 'B']), 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if !num.is_finite() || num < 0.0 {
        return Err(format!("Size must be a non-negative number: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}
