//! Structured invocation of the native calibration and geocoding programs

use crate::types::{RadiocalError, RadiocalResult};
use std::path::{Path, PathBuf};
use std::process::Command;

/// A single external program call with an explicit argument list
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl Invocation {
    pub fn new<P: AsRef<Path>, W: AsRef<Path>>(program: P, working_dir: W) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    pub fn arg<S: ToString>(mut self, arg: S) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// A `-flag value` pair
    pub fn flag<S: ToString>(self, flag: &str, value: S) -> Self {
        self.arg(flag).arg(value)
    }

    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Value following `flag`, if present
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|s| s.as_str())
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of an external call
#[derive(Debug, Clone, Default)]
pub struct InvocationOutput {
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs. Blocks until the program exits; there is no timeout.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> RadiocalResult<InvocationOutput>;
}

/// Runs programs as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> RadiocalResult<InvocationOutput> {
        log::debug!("Executing: {}", invocation.command_line());

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .output()
            .map_err(|e| RadiocalError::ExternalProgram {
                program: invocation.program_name(),
                status: None,
                stderr: format!("failed to start: {}", e),
            })?;

        Ok(InvocationOutput {
            status: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run an invocation, log its textual output and turn a non-zero exit into an error
pub fn run_checked(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
) -> RadiocalResult<InvocationOutput> {
    let output = runner.run(invocation)?;
    let program = invocation.program_name();

    for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
        log::info!("[{}] {}", program, line);
    }
    for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
        log::warn!("[{}] {}", program, line);
    }

    if !output.success {
        return Err(RadiocalError::ExternalProgram {
            program,
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}
