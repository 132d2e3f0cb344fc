use std::io;
use std::process::{Command, Output, Stdio};

use tracing::debug;

use crate::{BackendError, ExecutionError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs a prepared command to completion and captures its output. Spawn
/// failures surface as `io::Error` so callers can tell a missing binary apart
/// from a failing one.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &mut Command) -> io::Result<CommandOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &mut Command) -> io::Result<CommandOutput> {
        let output = command.stdin(Stdio::null()).output()?;
        Ok(output.into())
    }
}

pub fn describe_command(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned()),
    );
    parts.join(" ")
}

pub(crate) fn execute(
    runner: &dyn CommandRunner,
    command: &mut Command,
) -> Result<CommandOutput, BackendError> {
    let description = describe_command(command);
    debug!(command = %description, "running native command");
    runner
        .run(command)
        .map_err(|source| BackendError::Spawn {
            command: description,
            source,
        })
}

pub(crate) fn execute_checked(
    runner: &dyn CommandRunner,
    command: &mut Command,
) -> Result<CommandOutput, BackendError> {
    let output = execute(runner, command)?;
    if output.success() {
        return Ok(output);
    }
    Err(execution_error(command, &output).into())
}

pub(crate) fn execution_error(command: &Command, output: &CommandOutput) -> ExecutionError {
    ExecutionError {
        command: describe_command(command),
        exit_code: output.code,
        stderr: output.stderr.trim_end().to_string(),
    }
}
