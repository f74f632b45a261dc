//! slurmprobe CLI - environment probe wrapper for SLURM jobs

use clap::Parser;
use slurmprobe::config::{CliArgs, Commands, ImageCommand, OutputFormat, ProbeArgs, RunArgs, RunConfig, ScriptArgs};
use slurmprobe::core::JobPipeline;
use slurmprobe::error::Result;
use slurmprobe::image::{ImageBuilder, ImageRecipe};
use slurmprobe::system::hpc::generate_slurm_script;
use slurmprobe::system::{EnvironmentProbe, JobConfig, JobInfo, JobScheduler, ProbeConfig};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr; stdout belongs to the probe
fn init_logging(args: &CliArgs) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: CliArgs) -> Result<i32> {
    match &args.command {
        Commands::Run(run_args) => cmd_run(run_args, &args),
        Commands::Probe(probe_args) => cmd_probe(probe_args, args.format),
        Commands::Script(script_args) => cmd_script(script_args),
        Commands::Image { command } => cmd_image(command),
        Commands::Env => cmd_env(args.format),
    }
}

fn cmd_run(run_args: &RunArgs, args: &CliArgs) -> Result<i32> {
    let config = RunConfig::from_cli(run_args)?;

    if args.verbose > 0 {
        print_config(&config);
    }

    let report = JobPipeline::new(config).execute()?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text if !args.quiet => report.print_summary(),
        OutputFormat::Text => {}
    }

    Ok(report.exit_code)
}

fn cmd_probe(probe_args: &ProbeArgs, format: OutputFormat) -> Result<i32> {
    let config = ProbeConfig {
        target_runtime: probe_args.target,
        interpreter: probe_args.interpreter.clone(),
        results_dir: probe_args.write_results.clone(),
        ..Default::default()
    };

    let report = EnvironmentProbe::new(config).run(probe_args.job_id.as_deref())?;

    match format {
        OutputFormat::Text => report.print_summary(),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(0)
}

fn cmd_script(script_args: &ScriptArgs) -> Result<i32> {
    let config = JobConfig::from_cli(script_args)?;

    if script_args.submit {
        let job_id = JobScheduler::new().submit(&config, &script_args.run_args)?;
        println!("Submitted batch job {}", job_id);
    } else {
        print!("{}", generate_slurm_script(&config, &script_args.run_args));
    }

    Ok(0)
}

fn cmd_image(command: &ImageCommand) -> Result<i32> {
    let recipe = ImageRecipe::default();

    match command {
        ImageCommand::Recipe => {
            print!("{}", recipe.render());
            Ok(0)
        }
        ImageCommand::Build { output, runtime, fakeroot } => {
            let builder = ImageBuilder::new(runtime.clone()).with_fakeroot(*fakeroot);
            let image = builder.build(&recipe, output)?;
            println!("Built {}", image.display());
            Ok(0)
        }
        ImageCommand::Test { image, runtime } => cmd_image_test(image, runtime),
    }
}

fn cmd_image_test(image: &Path, runtime: &str) -> Result<i32> {
    let outcome = ImageBuilder::new(runtime).verify(image)?;

    if outcome.passed {
        println!("Self-test passed: {}", image.display());
        Ok(0)
    } else {
        eprintln!("Self-test FAILED for {} (exit {})", image.display(), outcome.exit_code);
        Ok(outcome.exit_code.max(1))
    }
}

fn cmd_env(format: OutputFormat) -> Result<i32> {
    let info = JobInfo::collect();

    match format {
        OutputFormat::Text => info.print_summary(),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
    }

    Ok(0)
}

/// Dump the resolved configuration to stderr
fn print_config(config: &RunConfig) {
    eprintln!("=== Configuration ===");
    eprintln!("Job ID:      {}", config.job_id);
    eprintln!("Temp root:   {:?}", config.tmp_root);
    eprintln!("Submit dir:  {:?}", config.submit_dir);
    eprintln!("Probe:       {:?} {}", config.probe.interpreter, config.probe.program);
    match &config.container {
        Some(container) => {
            eprintln!("Runner:      container ({})", container.runtime);
            eprintln!("Image:       {:?}", container.image);
            eprintln!("Mount point: {}", container.mount_point);
        }
        None => eprintln!("Runner:      direct"),
    }
    eprintln!("Inputs:      {:?}", config.inputs);
    eprintln!("Results dir: {}", config.results_dir);
    eprintln!();
}
