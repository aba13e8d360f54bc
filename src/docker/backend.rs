use crate::docker::context::stage_context;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Everything a backend needs to build one image.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub repo: &'a str,
    /// The image's source directory
    pub source: &'a Path,
    /// Rendered build instructions
    pub instructions: &'a str,
    /// Full tag, e.g. `acme/worker:v004`
    pub tag: &'a str,
}

/// Performs image builds and publishes. Each call is one atomic step.
pub trait BuildBackend: Send + Sync {
    fn build(&self, request: &BuildRequest<'_>) -> Result<()>;
    fn publish(&self, tag: &str) -> Result<()>;
}

/// Backend that shells out to the docker CLI.
pub struct DockerCli {
    program: String,
    build_dir: PathBuf,
}

impl DockerCli {
    pub fn new(program: impl Into<String>, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            build_dir: build_dir.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        tracing::debug!(program = %self.program, ?args, "Running container CLI");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("failed to start {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} {} exited with {}: {}",
                self.program,
                args.first().copied().unwrap_or_default(),
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr.trim()
            );
        }
        Ok(())
    }
}

impl BuildBackend for DockerCli {
    fn build(&self, request: &BuildRequest<'_>) -> Result<()> {
        let context = stage_context(&self.build_dir, request.repo, request.source, request.instructions)?;
        let context = context.to_string_lossy();
        self.run(&["build", "-t", request.tag, context.as_ref()])
    }

    fn publish(&self, tag: &str) -> Result<()> {
        self.run(&["push", tag])
    }
}
