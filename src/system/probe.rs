//! Node environment probe
//!
//! Reports what a job actually sees on its compute node: allocated cores,
//! visible memory, the OS banner, the Python interpreter and its installed
//! packages. Optionally idles so the job reaches a minimum wall-clock time,
//! which is useful for checking accounting and node allocation.

use crate::error::{IoResultExt, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use sysinfo::System;

/// SLURM variables consulted for the core count, in priority order
const CPU_ENV_VARS: [&str; 3] = ["SLURM_CPUS_ON_NODE", "SLURM_CPUS_PER_TASK", "SLURM_NPROCS"];

const ISSUE_PATH: &str = "/etc/issue";

/// Probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Minimum wall-clock time for the whole probe (zero disables idling)
    pub target_runtime: Duration,
    /// Interpreter whose version is reported
    pub interpreter: String,
    /// Package manager listing command
    pub package_lister: Vec<String>,
    /// Directory to write `probe_<job_id>.json` into, relative to cwd
    pub results_dir: Option<PathBuf>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target_runtime: Duration::from_secs(30),
            interpreter: "python3".to_string(),
            package_lister: vec!["pip3".to_string(), "list".to_string(), "--format=columns".to_string()],
            results_dir: None,
        }
    }
}

/// Snapshot of the node environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    /// Host name
    pub hostname: String,
    /// Job id passed on the command line
    pub job_id: Option<String>,
    /// Allocated CPU cores
    pub cpu_cores: usize,
    /// Total memory visible to the process (bytes)
    pub total_memory: u64,
    /// Contents of /etc/issue, or why it could not be read
    pub os_banner: String,
    /// Interpreter version banner
    pub interpreter_version: String,
    /// Installed package listing
    pub packages: String,
    /// When the probe started
    pub started_at: DateTime<Utc>,
    /// Total probe runtime, including idling
    pub runtime: Duration,
}

impl ProbeReport {
    /// Print the report to console
    pub fn print_summary(&self) {
        println!("# SLURM environment probe\n");
        if let Some(id) = &self.job_id {
            println!("Job ID                     : {}", id);
        }
        println!("Host                       : {}", self.hostname);
        println!("Allocated CPU cores        : {}", self.cpu_cores);
        println!(
            "Total visible memory       : {:.2} GiB\n",
            self.total_memory as f64 / (1u64 << 30) as f64
        );

        println!("# Python interpreter\n");
        println!("{}\n", self.interpreter_version);

        println!("# {} contents\n", ISSUE_PATH);
        println!("{}\n", self.os_banner);

        println!("# Python packages\n");
        println!("{}", self.packages);

        println!(
            "\nDone. Total runtime: {}",
            humantime::format_duration(Duration::from_secs(self.runtime.as_secs()))
        );
    }

    /// Write the report as JSON to `<dir>/probe_<job_id>.json`
    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).with_path(dir)?;
        let name = format!("probe_{}.json", self.job_id.as_deref().unwrap_or("local"));
        let path = dir.join(name);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_path(&path)?;
        Ok(path)
    }
}

/// Runs the probe
pub struct EnvironmentProbe {
    config: ProbeConfig,
}

impl EnvironmentProbe {
    /// Create a probe with the given settings
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Collect the report, idling until the target runtime is reached
    pub fn run(&self, job_id: Option<&str>) -> Result<ProbeReport> {
        let start = Instant::now();
        let started_at = Utc::now();

        let mut report = self.collect(job_id, started_at);

        let elapsed = start.elapsed();
        if let Some(remaining) = self.config.target_runtime.checked_sub(elapsed) {
            if !remaining.is_zero() {
                tracing::info!(
                    "Idling for {} to reach the target wall-clock",
                    humantime::format_duration(Duration::from_secs(remaining.as_secs()))
                );
                std::thread::sleep(remaining);
            }
        }

        report.runtime = start.elapsed();

        if let Some(dir) = &self.config.results_dir {
            let path = report.write_json(dir)?;
            tracing::info!("Wrote probe report to {}", path.display());
        }

        Ok(report)
    }

    fn collect(&self, job_id: Option<&str>, started_at: DateTime<Utc>) -> ProbeReport {
        let mut sys = System::new();
        sys.refresh_memory();

        ProbeReport {
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            job_id: job_id.map(|s| s.to_string()),
            cpu_cores: cpu_count(|key| std::env::var(key).ok()),
            total_memory: sys.total_memory(),
            os_banner: read_issue(Path::new(ISSUE_PATH)),
            interpreter_version: command_output(&[self.config.interpreter.clone(), "--version".to_string()]),
            packages: command_output(&self.config.package_lister),
            started_at,
            runtime: Duration::ZERO,
        }
    }
}

impl Default for EnvironmentProbe {
    fn default() -> Self {
        Self::new(ProbeConfig::default())
    }
}

/// Core count allotted by SLURM if exported, otherwise the logical CPU count
pub fn cpu_count<F>(lookup: F) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    CPU_ENV_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .find_map(|value| value.trim().parse::<usize>().ok().filter(|n| *n > 0))
        .unwrap_or_else(num_cpus::get)
}

/// Read an OS banner file, describing the problem instead of failing
pub fn read_issue(path: &Path) -> String {
    if !path.is_file() {
        return format!("(No {} found on this system)", path.display());
    }
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(e) => format!("(Could not read {}: {})", path.display(), e),
    }
}

/// Run a command and return its trimmed output, or an inline failure note
pub fn command_output(argv: &[String]) -> String {
    let Some((program, args)) = argv.split_first() else {
        return "(no command configured)".to_string();
    };
    let display = argv.join(" ");

    match Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {
            // Old interpreters print their version on stderr
            let text = if output.stdout.is_empty() { &output.stderr } else { &output.stdout };
            String::from_utf8_lossy(text).trim_end().to_string()
        }
        Ok(output) => format!(
            "({} failed: exit status {})",
            display,
            crate::runner::exit_code(output.status)
        ),
        Err(e) => format!("({} failed: {})", display, e),
    }
}
