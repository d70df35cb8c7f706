//! External command execution with captured output.

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Default per-command wall-clock limit.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors produced while launching a command.
///
/// A command that runs and exits non-zero is not an error; see
/// [`CommandOutput::status`].
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("command has no program to run")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error while reading command output: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runner operations.
pub type RunnerResult<T> = std::result::Result<T, RunnerError>;

/// How commands are executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Wall-clock limit per command. `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// Append stderr after stdout in the captured output.
    pub capture_stderr: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_COMMAND_TIMEOUT),
            capture_stderr: true,
        }
    }
}

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitOutcome {
    /// Exited on its own with this code.
    Exited(i32),

    /// Terminated by a signal.
    Signaled,

    /// Killed after exceeding the configured timeout.
    TimedOut,
}

impl ExitOutcome {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }

    fn from_status(status: ExitStatus) -> Self {
        status
            .code()
            .map(ExitOutcome::Exited)
            .unwrap_or(ExitOutcome::Signaled)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exit code {code}"),
            ExitOutcome::Signaled => f.write_str("terminated by signal"),
            ExitOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Captured result of a command run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Stdout, followed by stderr when configured.
    pub output: Vec<u8>,

    /// Exit outcome.
    pub status: ExitOutcome,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

/// Spawns external commands and captures their output.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    config: RunnerConfig,
}

impl CommandRunner {
    /// Create a runner with the given configuration.
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// The configuration this runner was built with.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `argv` to completion (or timeout) and capture its output.
    ///
    /// Only a failure to start the process is an error. Non-zero exits,
    /// signals and timeouts are reported through [`CommandOutput::status`]
    /// together with whatever output was produced.
    pub async fn run(&self, argv: &[String]) -> RunnerResult<CommandOutput> {
        let start = Instant::now();
        let (program, args) = argv.split_first().ok_or(RunnerError::EmptyCommand)?;

        debug!(program = %program, args = ?args, "Running command");

        let stderr_mode = if self.config.capture_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(stderr_mode)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.clone(),
                source,
            })?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let collect = async {
            let (out, err, status) = tokio::join!(
                drain(stdout_pipe.as_mut(), &mut stdout),
                drain(stderr_pipe.as_mut(), &mut stderr),
                child.wait(),
            );
            out.and(err).and(status)
        };

        let finished = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.ok(),
            None => Some(collect.await),
        };

        let status = match finished {
            Some(status) => ExitOutcome::from_status(status?),
            None => {
                warn!(
                    program = %program,
                    timeout_secs = self.config.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                    "Command timed out; keeping partial output"
                );
                if let Err(err) = child.start_kill() {
                    debug!(program = %program, error = %err, "Failed to kill timed out command");
                }
                ExitOutcome::TimedOut
            }
        };

        stdout.extend_from_slice(&stderr);

        Ok(CommandOutput {
            output: stdout,
            status,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<&mut R>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    match pipe {
        Some(pipe) => pipe.read_to_end(buf).await.map(|_| ()),
        None => Ok(()),
    }
}
