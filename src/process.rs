//! Subprocess seam for the external CLIs this tool drives (`kind`, `docker`,
//! `ssh`, `kubectl`).
//!
//! Children are spawned with `kill_on_drop`, so dropping a command future
//! after cancellation also stops the process.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Exit code rendered for messages, `unknown` when the process was
    /// terminated by a signal.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Failure to start a subprocess.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProcessError {
    /// The program could not be spawned or awaited.
    #[error("failed to run {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        message: String,
    },
}

/// Future returned by [`CommandRunner::run`].
pub type CommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, ProcessError>> + Send + 'a>>;

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with the given arguments.
    ///
    /// # Errors
    ///
    /// Resolves to [`ProcessError::Spawn`] if the command cannot be started.
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a>;
}

/// Runner that captures stdout and stderr of the child process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a> {
        Box::pin(async move {
            tracing::debug!(program, args = ?args, "running command");
            let output = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|err| spawn_error(program, &err))?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// Runner that inherits the parent's stdio so output streams live.
///
/// The returned [`CommandOutput`] carries only the exit code.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamingCommandRunner;

impl CommandRunner for StreamingCommandRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a> {
        Box::pin(async move {
            tracing::debug!(program, args = ?args, "running command with inherited stdio");
            let status = Command::new(program)
                .args(args)
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .status()
                .await
                .map_err(|err| spawn_error(program, &err))?;

            Ok(CommandOutput {
                code: status.code(),
                stdout: String::new(),
                stderr: String::new(),
            })
        })
    }
}

fn spawn_error(program: &str, err: &std::io::Error) -> ProcessError {
    ProcessError::Spawn {
        program: program.to_owned(),
        message: err.to_string(),
    }
}
