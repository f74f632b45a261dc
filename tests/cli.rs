//! End-to-end tests driving the slurmprobe binary

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn slurmprobe(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_slurmprobe"))
        .args(args)
        .env_remove("SLURM_JOB_ID")
        .env_remove("SLURM_SUBMIT_DIR")
        .env_remove("SLURMPROBE_RUNNER")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn run_job(tmp_root: &Path, submit: &Path, job_id: &str) -> Output {
    slurmprobe(&[
        "run",
        "--job-id",
        job_id,
        "--tmp-root",
        tmp_root.to_str().unwrap(),
        "--submit-dir",
        submit.to_str().unwrap(),
        "--interpreter",
        "sh",
        "--program",
        "probe.sh",
    ])
}

#[cfg(unix)]
#[test]
fn test_run_propagates_probe_exit_status() {
    let tmp_root = TempDir::new().unwrap();
    let submit = TempDir::new().unwrap();
    std::fs::write(submit.path().join("probe.sh"), "echo \"probing $1\"\nexit 2\n").unwrap();

    let output = run_job(tmp_root.path(), submit.path(), "12345");

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stdout).contains("probing 12345"));
    assert!(!tmp_root.path().join("12345").exists());
}

#[cfg(unix)]
#[test]
fn test_run_collects_results() {
    let tmp_root = TempDir::new().unwrap();
    let submit = TempDir::new().unwrap();
    std::fs::write(
        submit.path().join("probe.sh"),
        "mkdir -p results/logs\npwd > results/logs/cwd.txt\n",
    )
    .unwrap();

    let output = run_job(tmp_root.path(), submit.path(), "777");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let cwd = std::fs::read_to_string(submit.path().join("results/logs/cwd.txt")).unwrap();
    assert!(cwd.trim_end().ends_with("777"));
    assert!(!tmp_root.path().join("777").exists());
}

#[test]
fn test_run_missing_input_is_setup_error() {
    let tmp_root = TempDir::new().unwrap();
    let submit = TempDir::new().unwrap();

    let output = run_job(tmp_root.path(), submit.path(), "1");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Path not found"));
    assert!(!tmp_root.path().join("1").exists());
}

#[test]
fn test_run_container_without_staged_image_is_setup_error() {
    let tmp_root = TempDir::new().unwrap();
    let submit = TempDir::new().unwrap();
    std::fs::write(submit.path().join("probe.sh"), "exit 0\n").unwrap();

    let output = slurmprobe(&[
        "run",
        "--job-id",
        "5",
        "--tmp-root",
        tmp_root.path().to_str().unwrap(),
        "--submit-dir",
        submit.path().to_str().unwrap(),
        "--runner",
        "container",
        "--interpreter",
        "sh",
        "--program",
        "probe.sh",
        "--input",
        "probe.sh",
    ]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Container image not found"));
    assert!(!tmp_root.path().join("5").exists());
}

#[cfg(unix)]
#[test]
fn test_run_stages_nested_program() {
    let tmp_root = TempDir::new().unwrap();
    let submit = TempDir::new().unwrap();
    std::fs::create_dir(submit.path().join("scripts")).unwrap();
    std::fs::write(submit.path().join("scripts/probe.sh"), "exit 4\n").unwrap();

    let output = slurmprobe(&[
        "run",
        "--job-id",
        "6",
        "--tmp-root",
        tmp_root.path().to_str().unwrap(),
        "--submit-dir",
        submit.path().to_str().unwrap(),
        "--interpreter",
        "sh",
        "--program",
        "scripts/probe.sh",
    ]);

    assert_eq!(output.status.code(), Some(4), "stderr: {}", String::from_utf8_lossy(&output.stderr));
}

#[cfg(unix)]
#[test]
fn test_verbose_config_goes_to_stderr() {
    let tmp_root = TempDir::new().unwrap();
    let submit = TempDir::new().unwrap();
    std::fs::write(submit.path().join("probe.sh"), "echo payload\n").unwrap();

    let output = slurmprobe(&[
        "-v",
        "run",
        "--job-id",
        "8",
        "--tmp-root",
        tmp_root.path().to_str().unwrap(),
        "--submit-dir",
        submit.path().to_str().unwrap(),
        "--interpreter",
        "sh",
        "--program",
        "probe.sh",
    ]);

    assert!(output.status.success());
    assert!(!String::from_utf8_lossy(&output.stdout).contains("=== Configuration ==="));
    assert!(String::from_utf8_lossy(&output.stderr).contains("=== Configuration ==="));
}

#[test]
fn test_run_without_job_id_fails() {
    let output = slurmprobe(&["run"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("job id required"));
}

#[test]
fn test_script_for_array_job() {
    let output = slurmprobe(&["script", "--array", "4", "--", "--runner", "container"]);

    assert!(output.status.success());
    let script = String::from_utf8_lossy(&output.stdout);
    assert!(script.contains("#SBATCH --array=0-3"));
    assert!(script.contains("#SBATCH --output=probe_%j.out"));
    assert!(script.contains("slurmprobe run --runner container"));
}

#[test]
fn test_image_recipe() {
    let output = slurmprobe(&["image", "recipe"]);

    assert!(output.status.success());
    let recipe = String::from_utf8_lossy(&output.stdout);
    assert!(recipe.starts_with("Bootstrap: docker"));
    assert!(recipe.contains("%test"));
}

#[test]
fn test_probe_json() {
    let output = slurmprobe(&["probe", "42", "--target", "0s", "--format", "json"]);

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["job_id"], "42");
    assert!(report["cpu_cores"].as_u64().unwrap() > 0);
}
