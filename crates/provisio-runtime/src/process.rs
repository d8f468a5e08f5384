//! Spawning engine processes.
//!
//! The engine's own stdout/stderr stay the primary diagnostic surface; this
//! module never parses or suppresses them. A non-zero exit becomes
//! [`RuntimeError::EngineFailed`] carrying the full command line and working
//! directory, and nothing is retried.

use crate::operation::Operation;
use crate::provisioner::{EngineInput, Provisioner, RunOptions};
use crate::RuntimeError;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// How the engine's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoMode {
    /// Inherit stdin, stdout and stderr so prompts reach the operator.
    #[default]
    Interactive,
    /// Close stdin and capture stdout; stderr is still inherited.
    Captured,
}

/// One engine process to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub dir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: dir.into(),
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Command line for diagnostics. Environment values are never included.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push_str(&format!("'{arg}'"));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineOutput {
    /// Captured stdout of every invocation, in run order; `None` in
    /// interactive mode.
    pub stdout: Option<String>,
}

pub fn run(invocation: &Invocation, io_mode: IoMode) -> Result<EngineOutput, RuntimeError> {
    let command_line = invocation.command_line();
    tracing::info!("running {command_line} in {}", invocation.dir.display());

    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .current_dir(&invocation.dir)
        .envs(invocation.env.iter().map(|(k, v)| (k, v)));

    let spawn_err = |e: std::io::Error| {
        if e.kind() == std::io::ErrorKind::NotFound && invocation.dir.is_dir() {
            RuntimeError::BinaryNotFound(invocation.program.display().to_string())
        } else {
            RuntimeError::Spawn {
                command: command_line.clone(),
                source: e,
            }
        }
    };

    let (status, stdout) = match io_mode {
        IoMode::Interactive => {
            let status = cmd
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(spawn_err)?;
            (status, None)
        }
        IoMode::Captured => {
            let output = cmd
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .output()
                .map_err(spawn_err)?;
            (
                output.status,
                Some(String::from_utf8_lossy(&output.stdout).into_owned()),
            )
        }
    };

    if status.success() {
        Ok(EngineOutput { stdout })
    } else {
        Err(RuntimeError::EngineFailed {
            command: command_line,
            dir: invocation.dir.clone(),
            code: status.code(),
        })
    }
}

/// Prepare the module and run every invocation for `operation` in order,
/// stopping at the first failure.
pub fn execute(
    provisioner: &dyn Provisioner,
    module_dir: &std::path::Path,
    operation: Operation,
    input: &EngineInput,
    options: &RunOptions,
) -> Result<EngineOutput, RuntimeError> {
    if !provisioner.supports(operation) {
        return Err(RuntimeError::UnsupportedOperation {
            engine: provisioner.name().to_owned(),
            operation: operation.as_str().to_owned(),
        });
    }
    provisioner.prepare(module_dir, input, options)?;
    let invocations = provisioner.invocations(module_dir, operation, input, options)?;
    let mut stdout: Option<String> = None;
    for invocation in &invocations {
        if let Some(text) = run(invocation, options.io_mode)?.stdout {
            stdout.get_or_insert_with(String::new).push_str(&text);
        }
    }
    Ok(EngineOutput { stdout })
}
