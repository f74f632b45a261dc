//! SLURM job integration
//!
//! Reads the job descriptor the resource manager exports into the job's
//! environment, and generates/submits the batch script that runs
//! `slurmprobe run` on a compute node.

use crate::error::{Result, SlurmProbeError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;

/// Validated job identifier.
///
/// Used verbatim as the leaf name of the scratch directory, so it must not
/// contain path separators or be a relative path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Validate and wrap a job identifier
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();

        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains('/')
            || trimmed.contains('\\')
            || trimmed.contains('\0')
        {
            return Err(SlurmProbeError::InvalidJobId(id));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = SlurmProbeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for JobId {
    type Error = SlurmProbeError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Job information exported by SLURM into the job environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job ID
    pub job_id: Option<String>,
    /// Job name
    pub job_name: Option<String>,
    /// CPUs per task
    pub cpus_per_task: Option<u32>,
    /// CPUs allocated on this node
    pub cpus_on_node: Option<u32>,
    /// Memory per CPU (bytes)
    pub memory_per_cpu: Option<u64>,
    /// Time limit (seconds)
    pub time_limit: Option<u64>,
    /// Partition
    pub partition: Option<String>,
    /// Submission directory
    pub submit_dir: Option<PathBuf>,
    /// Node list
    pub node_list: Vec<String>,
    /// Job array info
    pub array_info: Option<ArrayInfo>,
}

/// Job array information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayInfo {
    /// Array job ID
    pub array_job_id: String,
    /// Task ID within array
    pub task_id: u32,
    /// Total tasks in array
    pub task_count: Option<u32>,
}

impl JobInfo {
    /// Collect job information from the process environment
    pub fn collect() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Collect job information through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_u32 = |key: &str| lookup(key).and_then(|s| s.trim().parse().ok());

        let array_info = lookup("SLURM_ARRAY_JOB_ID").map(|array_job_id| ArrayInfo {
            array_job_id,
            task_id: parse_u32("SLURM_ARRAY_TASK_ID").unwrap_or(0),
            task_count: parse_u32("SLURM_ARRAY_TASK_COUNT"),
        });

        Self {
            job_id: lookup("SLURM_JOB_ID"),
            job_name: lookup("SLURM_JOB_NAME"),
            cpus_per_task: parse_u32("SLURM_CPUS_PER_TASK"),
            cpus_on_node: parse_u32("SLURM_CPUS_ON_NODE"),
            memory_per_cpu: lookup("SLURM_MEM_PER_CPU").and_then(parse_memory),
            time_limit: lookup("SLURM_TIMELIMIT").and_then(parse_slurm_time),
            partition: lookup("SLURM_JOB_PARTITION"),
            submit_dir: lookup("SLURM_SUBMIT_DIR").map(PathBuf::from),
            node_list: lookup("SLURM_NODELIST")
                .map(|s| expand_node_list(&s))
                .unwrap_or_default(),
            array_info,
        }
    }

    /// Check if running inside a job
    pub fn is_job(&self) -> bool {
        self.job_id.is_some()
    }

    /// Print the descriptor to console
    pub fn print_summary(&self) {
        println!("=== SLURM Job ===\n");
        if !self.is_job() {
            println!("Not running inside a SLURM job.");
            return;
        }

        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        println!("Job ID:        {}", show(&self.job_id));
        println!("Job name:      {}", show(&self.job_name));
        println!("Partition:     {}", show(&self.partition));
        if let Some(cpus) = self.cpus_per_task {
            println!("CPUs/task:     {}", cpus);
        }
        if let Some(mem) = self.memory_per_cpu {
            println!("Memory/CPU:    {}", humansize::format_size(mem, humansize::BINARY));
        }
        if let Some(limit) = self.time_limit {
            println!("Time limit:    {}", format_slurm_time(limit));
        }
        if let Some(dir) = &self.submit_dir {
            println!("Submit dir:    {}", dir.display());
        }
        if !self.node_list.is_empty() {
            println!("Nodes:         {}", self.node_list.join(","));
        }
        if let Some(array) = &self.array_info {
            println!(
                "Array:         {} task {} of {}",
                array.array_job_id,
                array.task_id,
                array.task_count.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string())
            );
        }
    }
}

/// Job submission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name
    pub name: String,
    /// Wall-clock limit (seconds)
    pub time_limit: u64,
    /// Number of array tasks (1 = plain batch job)
    pub array_size: u32,
    /// CPUs per task
    pub cpus_per_task: u32,
    /// Memory per CPU (bytes)
    pub memory_per_cpu: u64,
    /// Output file pattern (SLURM filename pattern)
    pub output: String,
    /// Partition
    pub partition: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: "probe".to_string(),
            time_limit: 300,
            array_size: 1,
            cpus_per_task: 1,
            memory_per_cpu: 1024 * 1024 * 1024, // 1GB
            output: "probe_%j.out".to_string(),
            partition: None,
        }
    }
}

impl JobConfig {
    /// Check that every value renders as a single well-formed `#SBATCH` directive
    pub fn validate(&self) -> Result<()> {
        let directive = |flag: &str, value: &str| {
            if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
                Err(SlurmProbeError::config(format!(
                    "--{} must be a non-empty value without whitespace, got '{}'",
                    flag, value
                )))
            } else {
                Ok(())
            }
        };

        directive("job-name", &self.name)?;
        directive("output", &self.output)?;
        if let Some(partition) = &self.partition {
            directive("partition", partition)?;
        }
        if self.array_size == 0 || self.cpus_per_task == 0 {
            return Err(SlurmProbeError::config("array size and cpus per task must be at least 1"));
        }
        if self.memory_per_cpu == 0 {
            return Err(SlurmProbeError::config("memory per CPU must be greater than zero"));
        }
        Ok(())
    }
}

/// Render the batch script for a job
pub fn generate_slurm_script(config: &JobConfig, run_args: &[String]) -> String {
    let mut script = String::from("#!/bin/bash\n");

    script.push_str(&format!("#SBATCH --job-name={}\n", config.name));
    script.push_str(&format!("#SBATCH --time={}\n", format_slurm_time(config.time_limit)));
    if config.array_size > 1 {
        script.push_str(&format!("#SBATCH --array=0-{}\n", config.array_size - 1));
    }
    script.push_str(&format!("#SBATCH --cpus-per-task={}\n", config.cpus_per_task));
    script.push_str(&format!("#SBATCH --mem-per-cpu={}M\n", config.memory_per_cpu.div_ceil(1024 * 1024)));
    script.push_str(&format!("#SBATCH --output={}\n", config.output));
    if let Some(ref partition) = config.partition {
        script.push_str(&format!("#SBATCH --partition={}\n", partition));
    }

    script.push_str("\nset -u\n");
    script.push_str("\n# Stage, run, collect, clean up\n");
    script.push_str("slurmprobe run");
    for arg in run_args {
        script.push(' ');
        script.push_str(&shell_quote(arg));
    }
    script.push('\n');

    script
}

/// Submits batch scripts through `sbatch`
pub struct JobScheduler {
    sbatch: String,
}

impl JobScheduler {
    /// Create a scheduler interface using `sbatch` from PATH
    pub fn new() -> Self {
        Self {
            sbatch: "sbatch".to_string(),
        }
    }

    /// Use a specific sbatch executable
    pub fn with_command(sbatch: impl Into<String>) -> Self {
        Self { sbatch: sbatch.into() }
    }

    /// Submit a job, returning the SLURM job id
    pub fn submit(&self, config: &JobConfig, run_args: &[String]) -> Result<String> {
        config.validate()?;
        let script = generate_slurm_script(config, run_args);

        let mut child = Command::new(&self.sbatch)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SlurmProbeError::spawn(&self.sbatch, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .map_err(|e| SlurmProbeError::spawn(&self.sbatch, e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| SlurmProbeError::spawn(&self.sbatch, e))?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            // "Submitted batch job 12345"
            parse_submitted_id(&stdout).ok_or_else(|| {
                SlurmProbeError::Submission(format!("unexpected sbatch output: {}", stdout.trim()))
            })
        } else {
            Err(SlurmProbeError::Submission(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_submitted_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find(|line| line.starts_with("Submitted batch job"))
        .and_then(|line| line.split_whitespace().last())
        .map(|s| s.to_string())
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:%,+@".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Parse a SLURM memory value (`4G`, `512M`, `1024K`, plain MB count)
pub fn parse_memory(s: String) -> Option<u64> {
    let s = s.trim().to_uppercase();
    let (num_str, mult) = if let Some(n) = s.strip_suffix('T') {
        (n, 1024 * 1024 * 1024 * 1024u64)
    } else if let Some(n) = s.strip_suffix('G') {
        (n, 1024 * 1024 * 1024u64)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, 1024 * 1024u64)
    } else if let Some(n) = s.strip_suffix('K') {
        (n, 1024u64)
    } else {
        // SLURM reports bare numbers in megabytes
        (s.as_str(), 1024 * 1024u64)
    };

    num_str.parse::<u64>().ok().map(|n| n * mult)
}

/// Parse a SLURM time limit (`D-HH:MM:SS`, `HH:MM:SS`, `MM:SS`, `MM`)
pub fn parse_slurm_time(s: String) -> Option<u64> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("UNLIMITED") {
        return None;
    }

    let (days, time_str) = match s.split_once('-') {
        Some((d, rest)) => (d.parse::<u64>().ok()?, rest),
        None => (0, s),
    };

    let fields = time_str
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let (hours, minutes, seconds) = match (days > 0, fields.as_slice()) {
        (_, [h, m, s]) => (*h, *m, *s),
        (true, [h, m]) => (*h, *m, 0),
        (true, [h]) => (*h, 0, 0),
        (false, [m, s]) => (0, *m, *s),
        (false, [m]) => (0, *m, 0),
        _ => return None,
    };

    Some(days * 86400 + hours * 3600 + minutes * 60 + seconds)
}

/// Format seconds as a SLURM time limit
pub fn format_slurm_time(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}-{:02}:{:02}:{:02}", days, hours, minutes, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    }
}

/// Expand a SLURM host list such as `node[01-04],gpu[1-2],login1`
///
/// Groups that cannot be parsed are returned as written.
pub fn expand_node_list(nodelist: &str) -> Vec<String> {
    split_host_groups(nodelist)
        .into_iter()
        .flat_map(expand_host_group)
        .collect()
}

/// Split on commas that are not inside brackets
fn split_host_groups(nodelist: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in nodelist.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                groups.push(&nodelist[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    groups.push(&nodelist[start..]);

    groups.into_iter().map(str::trim).filter(|g| !g.is_empty()).collect()
}

/// Expand one `prefix[ranges]suffix` group
fn expand_host_group(group: &str) -> Vec<String> {
    let Some(open) = group.find('[') else {
        return vec![group.to_string()];
    };
    let Some(close) = group[open..].find(']').map(|offset| open + offset) else {
        return vec![group.to_string()];
    };
    if group[..open].contains(']') {
        return vec![group.to_string()];
    }

    let prefix = &group[..open];
    let suffix = &group[close + 1..];
    let mut nodes = Vec::new();

    for part in group[open + 1..close].split(',').map(str::trim) {
        match part.split_once('-') {
            Some((start, end)) => match (start.parse::<u32>(), end.parse::<u32>()) {
                (Ok(s), Ok(e)) if s <= e => {
                    let width = start.len();
                    nodes.extend((s..=e).map(|i| format!("{}{:0width$}{}", prefix, i, suffix, width = width)));
                }
                _ => return vec![group.to_string()],
            },
            None if !part.is_empty() => nodes.push(format!("{}{}{}", prefix, part, suffix)),
            None => return vec![group.to_string()],
        }
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_job_id_validation() {
        assert_eq!(JobId::new("12345").unwrap().as_str(), "12345");
        assert_eq!(JobId::new(" 77_3 ").unwrap().as_str(), "77_3");
        assert!(JobId::new("").is_err());
        assert!(JobId::new("..").is_err());
        assert!(JobId::new("a/b").is_err());
        assert!(JobId::new("x\0y").is_err());
    }

    #[test]
    fn test_job_info_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("SLURM_JOB_ID", "12345"),
            ("SLURM_JOB_NAME", "probe"),
            ("SLURM_CPUS_PER_TASK", "4"),
            ("SLURM_MEM_PER_CPU", "2048"),
            ("SLURM_TIMELIMIT", "00:05:00"),
            ("SLURM_SUBMIT_DIR", "/home/user/probe"),
            ("SLURM_NODELIST", "node[01-02]"),
            ("SLURM_ARRAY_JOB_ID", "12340"),
            ("SLURM_ARRAY_TASK_ID", "2"),
            ("SLURM_ARRAY_TASK_COUNT", "4"),
        ]
        .into_iter()
        .collect();

        let info = JobInfo::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert!(info.is_job());
        assert_eq!(info.cpus_per_task, Some(4));
        assert_eq!(info.memory_per_cpu, Some(2048 * 1024 * 1024));
        assert_eq!(info.time_limit, Some(300));
        assert_eq!(info.submit_dir, Some(PathBuf::from("/home/user/probe")));
        assert_eq!(info.node_list, vec!["node01", "node02"]);
        let array = info.array_info.unwrap();
        assert_eq!(array.task_id, 2);
        assert_eq!(array.task_count, Some(4));
    }

    #[test]
    fn test_job_info_outside_job() {
        let info = JobInfo::from_lookup(|_| None);
        assert!(!info.is_job());
        assert!(info.array_info.is_none());
    }

    #[test]
    fn test_generate_script_with_array() {
        let config = JobConfig {
            array_size: 4,
            cpus_per_task: 2,
            partition: Some("short".to_string()),
            ..Default::default()
        };
        let script = generate_slurm_script(&config, &["--runner".into(), "container".into()]);

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("#SBATCH --job-name=probe\n"));
        assert!(script.contains("#SBATCH --time=00:05:00\n"));
        assert!(script.contains("#SBATCH --array=0-3\n"));
        assert!(script.contains("#SBATCH --cpus-per-task=2\n"));
        assert!(script.contains("#SBATCH --mem-per-cpu=1024M\n"));
        assert!(script.contains("#SBATCH --output=probe_%j.out\n"));
        assert!(script.contains("#SBATCH --partition=short\n"));
        assert!(script.contains("slurmprobe run --runner container\n"));
    }

    #[test]
    fn test_generate_script_single_job() {
        let script = generate_slurm_script(&JobConfig::default(), &["--input".into(), "my file.py".into()]);
        assert!(!script.contains("--array"));
        assert!(!script.contains("--partition"));
        assert!(script.contains("slurmprobe run --input 'my file.py'\n"));
    }

    #[test]
    fn test_parse_submitted_id() {
        assert_eq!(parse_submitted_id("Submitted batch job 98765\n"), Some("98765".to_string()));
        assert_eq!(parse_submitted_id("garbage"), None);
    }

    #[test]
    fn test_parse_slurm_time() {
        assert_eq!(parse_slurm_time("00:05:00".into()), Some(300));
        assert_eq!(parse_slurm_time("1-01:01:01".into()), Some(90061));
        assert_eq!(parse_slurm_time("1-02".into()), Some(86400 + 7200));
        assert_eq!(parse_slurm_time("10:30".into()), Some(630));
        assert_eq!(parse_slurm_time("15".into()), Some(900));
        assert_eq!(parse_slurm_time("UNLIMITED".into()), None);
        assert_eq!(parse_slurm_time("x:y".into()), None);
    }

    #[test]
    fn test_format_slurm_time() {
        assert_eq!(format_slurm_time(3600), "01:00:00");
        assert_eq!(format_slurm_time(90061), "1-01:01:01");
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(parse_memory("4G".to_string()), Some(4 * 1024 * 1024 * 1024));
        assert_eq!(parse_memory("512M".to_string()), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory("1024K".to_string()), Some(1024 * 1024));
        assert_eq!(parse_memory("100".to_string()), Some(100 * 1024 * 1024));
    }

    #[test]
    fn test_expand_node_list() {
        assert_eq!(expand_node_list("node[01-04]"), vec!["node01", "node02", "node03", "node04"]);
        assert_eq!(expand_node_list("n[1-2,7]"), vec!["n1", "n2", "n7"]);
        assert_eq!(expand_node_list("node1,node2,node3"), vec!["node1", "node2", "node3"]);
    }

    #[test]
    fn test_expand_node_list_multiple_groups() {
        assert_eq!(
            expand_node_list("node[01-02],gpu[1-2]"),
            vec!["node01", "node02", "gpu1", "gpu2"]
        );
        assert_eq!(expand_node_list("node[1-2],login1"), vec!["node1", "node2", "login1"]);
        assert_eq!(expand_node_list("rack[1-2]-ib"), vec!["rack1-ib", "rack2-ib"]);
    }

    #[test]
    fn test_expand_node_list_malformed() {
        assert_eq!(expand_node_list("a]b[c"), vec!["a]b[c"]);
        assert_eq!(expand_node_list("a]b[c]"), vec!["a]b[c]"]);
        assert_eq!(expand_node_list("n[3-1]"), vec!["n[3-1]"]);
        assert_eq!(expand_node_list("n[x-2],m1"), vec!["n[x-2]", "m1"]);
        assert!(expand_node_list("").is_empty());
    }

    #[test]
    fn test_job_config_validate() {
        assert!(JobConfig::default().validate().is_ok());

        let spaced = JobConfig {
            name: "my probe".to_string(),
            ..Default::default()
        };
        assert!(matches!(spaced.validate(), Err(SlurmProbeError::ConfigError(_))));

        let partition = JobConfig {
            partition: Some("short\n#SBATCH --exclusive".to_string()),
            ..Default::default()
        };
        assert!(partition.validate().is_err());

        let no_memory = JobConfig {
            memory_per_cpu: 0,
            ..Default::default()
        };
        assert!(no_memory.validate().is_err());
    }

    #[test]
    fn test_submit_rejects_invalid_config_before_spawning() {
        let config = JobConfig {
            name: "two words".to_string(),
            ..Default::default()
        };
        let err = JobScheduler::with_command("definitely-not-sbatch")
            .submit(&config, &[])
            .unwrap_err();
        assert!(matches!(err, SlurmProbeError::ConfigError(_)));
    }
}
