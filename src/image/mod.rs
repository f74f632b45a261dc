//! Container image recipe
//!
//! Declarative description of the probe image: a base OS, a set of system
//! packages, a set of Python libraries, and a fixed environment. Renders a
//! Singularity definition file, builds it with the container tool, and
//! runs the image's self-test.

use crate::error::{IoResultExt, Result, SlurmProbeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Declarative image definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecipe {
    /// Bootstrap agent (`docker`, `library`, ...)
    pub bootstrap: String,
    /// Base image reference
    pub from: String,
    /// OS packages installed with apt
    pub system_packages: Vec<String>,
    /// Python libraries installed with pip
    pub python_packages: Vec<String>,
    /// Variables exported for every execution of the image
    pub environment: Vec<(String, String)>,
    /// Labels recorded in the image metadata
    pub labels: Vec<(String, String)>,
}

impl Default for ImageRecipe {
    fn default() -> Self {
        Self {
            bootstrap: "docker".to_string(),
            from: "ubuntu:22.04".to_string(),
            system_packages: vec!["python3".to_string(), "python3-pip".to_string()],
            python_packages: vec!["numpy".to_string(), "scipy".to_string(), "psutil".to_string()],
            environment: vec![
                ("PATH".to_string(), "/usr/local/bin:$PATH".to_string()),
                ("LC_ALL".to_string(), "C.UTF-8".to_string()),
                ("LANG".to_string(), "C.UTF-8".to_string()),
            ],
            labels: vec![
                ("org.opencontainers.image.title".to_string(), "slurmprobe".to_string()),
                ("org.opencontainers.image.version".to_string(), crate::VERSION.to_string()),
            ],
        }
    }
}

impl ImageRecipe {
    /// Render the Singularity definition file
    pub fn render(&self) -> String {
        let mut def = String::new();

        def.push_str(&format!("Bootstrap: {}\n", self.bootstrap));
        def.push_str(&format!("From: {}\n", self.from));

        def.push_str("\n%labels\n");
        for (key, value) in &self.labels {
            def.push_str(&format!("    {} {}\n", key, value));
        }

        def.push_str("\n%post\n");
        def.push_str("    set -e\n");
        def.push_str("    export DEBIAN_FRONTEND=noninteractive\n");
        def.push_str("    apt-get update\n");
        if !self.system_packages.is_empty() {
            def.push_str(&format!(
                "    apt-get install -y --no-install-recommends {}\n",
                self.system_packages.join(" ")
            ));
        }
        if !self.python_packages.is_empty() {
            def.push_str(&format!(
                "    pip3 install --no-cache-dir {}\n",
                self.python_packages.join(" ")
            ));
        }
        def.push_str("    apt-get clean\n");
        def.push_str("    rm -rf /var/lib/apt/lists/*\n");

        def.push_str("\n%environment\n");
        for (key, value) in &self.environment {
            def.push_str(&format!("    export {}={}\n", key, value));
        }

        def.push_str("\n%runscript\n");
        def.push_str("    exec python3 \"$@\"\n");

        def.push_str("\n%test\n");
        def.push_str(&format!("    python3 -c \"{}\"\n", self.self_test_snippet()));

        def
    }

    /// Python one-liner importing every library and printing its version
    fn self_test_snippet(&self) -> String {
        let mut code = String::from("import sys; print('python', sys.version.split()[0])");
        for package in &self.python_packages {
            let module = package.replace('-', "_");
            code.push_str(&format!(
                "; import {m}; print('{m}', getattr({m}, '__version__', 'unknown'))",
                m = module
            ));
        }
        code
    }
}

/// Outcome of an image self-test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    /// Whether every import succeeded
    pub passed: bool,
    /// Exit code of the test run
    pub exit_code: i32,
}

/// Drives the container tool
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    runtime: String,
    fakeroot: bool,
}

impl ImageBuilder {
    /// Use the given container tool
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            fakeroot: false,
        }
    }

    /// Build without root privileges
    pub fn with_fakeroot(mut self, fakeroot: bool) -> Self {
        self.fakeroot = fakeroot;
        self
    }

    /// Path of the definition file written next to `output`
    pub fn definition_path(output: &Path) -> PathBuf {
        output.with_extension("def")
    }

    /// Build command line for `output` from `definition`
    pub fn build_command(&self, output: &Path, definition: &Path) -> Command {
        let mut command = Command::new(&self.runtime);
        command.arg("build");
        if self.fakeroot {
            command.arg("--fakeroot");
        }
        command.arg("--force").arg(output).arg(definition);
        command
    }

    /// Write the definition and build the image. Any failing step aborts.
    pub fn build(&self, recipe: &ImageRecipe, output: &Path) -> Result<PathBuf> {
        let definition = Self::definition_path(output);
        std::fs::write(&definition, recipe.render()).with_path(&definition)?;
        tracing::info!("Wrote image definition {}", definition.display());

        let mut command = self.build_command(output, &definition);
        tracing::info!("Building image: {:?}", command);
        let status = command
            .status()
            .map_err(|e| SlurmProbeError::spawn(&self.runtime, e))?;

        if !status.success() {
            return Err(SlurmProbeError::ImageBuild(format!(
                "{} build exited with status {}",
                self.runtime,
                crate::runner::exit_code(status)
            )));
        }

        tracing::info!("Image built at {}", output.display());
        Ok(output.to_path_buf())
    }

    /// Run the image's `%test` section
    pub fn verify(&self, image: &Path) -> Result<VerifyOutcome> {
        if !image.is_file() {
            return Err(SlurmProbeError::NotFound(image.to_path_buf()));
        }

        let status = Command::new(&self.runtime)
            .arg("test")
            .arg(image)
            .status()
            .map_err(|e| SlurmProbeError::spawn(&self.runtime, e))?;

        let outcome = VerifyOutcome {
            passed: status.success(),
            exit_code: crate::runner::exit_code(status),
        };
        if outcome.passed {
            tracing::info!("Image self-test passed for {}", image.display());
        } else {
            tracing::warn!(
                "Image self-test failed for {} (exit {})",
                image.display(),
                outcome.exit_code
            );
        }
        Ok(outcome)
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new("singularity")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_default_recipe() {
        let def = ImageRecipe::default().render();

        assert!(def.starts_with("Bootstrap: docker\nFrom: ubuntu:22.04\n"));
        assert!(def.contains("apt-get install -y --no-install-recommends python3 python3-pip\n"));
        assert!(def.contains("pip3 install --no-cache-dir numpy scipy psutil\n"));
        assert!(def.contains("rm -rf /var/lib/apt/lists/*\n"));
        assert!(def.contains("export LC_ALL=C.UTF-8\n"));
        assert!(def.contains("export PATH=/usr/local/bin:$PATH\n"));
        assert!(def.contains("%runscript\n    exec python3 \"$@\"\n"));
        assert!(def.contains("import numpy; print('numpy'"));
        assert!(def.contains("import psutil"));
    }

    #[test]
    fn test_section_order() {
        let def = ImageRecipe::default().render();
        let post = def.find("%post").unwrap();
        let env = def.find("%environment").unwrap();
        let test = def.find("%test").unwrap();
        assert!(post < env && env < test);
    }

    #[test]
    fn test_build_command_line() {
        let builder = ImageBuilder::new("apptainer").with_fakeroot(true);
        let command = builder.build_command(Path::new("probe.sif"), Path::new("probe.def"));

        assert_eq!(command.get_program(), "apptainer");
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["build", "--fakeroot", "--force", "probe.sif", "probe.def"]);
        assert_eq!(ImageBuilder::definition_path(Path::new("/img/probe.sif")), PathBuf::from("/img/probe.def"));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("probe.sif");

        let err = ImageBuilder::new("false").build(&ImageRecipe::default(), &output).unwrap_err();

        assert!(matches!(err, SlurmProbeError::ImageBuild(_)));
        assert!(dir.path().join("probe.def").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_reports_failure() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("probe.sif");
        std::fs::write(&image, b"SIF").unwrap();

        let outcome = ImageBuilder::new("false").verify(&image).unwrap();
        assert_eq!(outcome, VerifyOutcome { passed: false, exit_code: 1 });

        let outcome = ImageBuilder::new("true").verify(&image).unwrap();
        assert!(outcome.passed);
    }
}
