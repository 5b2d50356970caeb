//! Validate-then-apply reload of the dependent proxy process.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Stderr beyond this many bytes is dropped.
const MAX_STDERR_BYTES: usize = 16 * 1024;
/// How long stderr is read after the command exits. A background process the
/// command started can keep the pipe open indefinitely.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// An external command: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable to run.
    pub program: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a command from a program and its arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a whitespace-separated command line. Returns `None` when empty.
    pub fn from_words<I, S>(words: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut words = words.into_iter().map(Into::into);
        let program = words.next()?;
        if program.is_empty() {
            return None;
        }
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How a single command run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// The command ran to completion.
    Exited {
        /// Whether the exit status was zero.
        success: bool,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// The command did not finish within the deadline and was killed.
    TimedOut,
    /// The command could not be started.
    SpawnFailed(String),
}

impl CommandStatus {
    /// A zero exit status.
    pub fn success() -> Self {
        Self::Exited {
            success: true,
            code: Some(0),
            stderr: String::new(),
        }
    }

    /// A non-zero exit status with the given stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self::Exited {
            success: false,
            code: Some(code),
            stderr: stderr.into(),
        }
    }
}

/// Runs external commands. Mocked in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command`, killing it if it exceeds `deadline`.
    async fn run(&self, command: &CommandSpec, deadline: Option<Duration>) -> CommandStatus;
}

/// Runs commands as child processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &CommandSpec, deadline: Option<Duration>) -> CommandStatus {
        let mut child = match Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return CommandStatus::SpawnFailed(e.to_string()),
        };

        let stderr_handle = child.stderr.take();
        let mut stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(reader) = stderr_handle {
                reader
                    .take(MAX_STDERR_BYTES as u64)
                    .read_to_end(&mut buf)
                    .await?;
            }
            Ok::<Vec<u8>, std::io::Error>(buf)
        });

        let waited = match deadline {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return CommandStatus::TimedOut;
                }
            },
            None => child.wait().await,
        };

        let status = match waited {
            Ok(status) => status,
            Err(e) => return CommandStatus::SpawnFailed(format!("wait failed: {}", e)),
        };

        let stderr = match timeout(STDERR_DRAIN_TIMEOUT, &mut stderr_task).await {
            Ok(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Ok(Err(e))) => format!("<stderr unavailable: {}>", e),
            Ok(Err(e)) => format!("<stderr unavailable: {}>", e),
            Err(_) => {
                stderr_task.abort();
                debug!(command = %command, "stderr still open after exit");
                "<stderr still open after exit>".to_string()
            }
        };

        CommandStatus::Exited {
            success: status.success(),
            code: status.code(),
            stderr,
        }
    }
}

/// Which step of the reload pipeline a result refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadPhase {
    /// The configuration test command.
    Validate,
    /// The reload command.
    Apply,
}

impl fmt::Display for ReloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validate => write!(f, "validate"),
            Self::Apply => write!(f, "apply"),
        }
    }
}

/// Result of one reload attempt. Reported, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The configuration test failed; the reload command was not run.
    ValidationFailed {
        /// Stderr or spawn error of the test command.
        detail: String,
    },
    /// The configuration test passed but the reload command failed.
    ApplyFailed {
        /// Stderr or spawn error of the reload command.
        detail: String,
    },
    /// A command exceeded the deadline and was killed.
    TimedOut {
        /// The step that hung.
        phase: ReloadPhase,
    },
    /// Both commands exited with status zero.
    Succeeded,
}

impl ReloadOutcome {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ValidationFailed { .. } => "validation_failed",
            Self::ApplyFailed { .. } => "apply_failed",
            Self::TimedOut { .. } => "timed_out",
            Self::Succeeded => "succeeded",
        }
    }

    /// Whether the proxy picked up the new configuration.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

enum StepResult {
    Passed,
    Failed(String),
    TimedOut,
}

/// Runs the validate command and, only if it succeeds, the apply command.
///
/// # Examples
///
/// ```rust,no_run
/// use proxy_config_sync::core::{CommandSpec, ReloadInvoker};
/// use std::time::Duration;
///
/// # async fn example() {
/// let invoker = ReloadInvoker::new(
///     CommandSpec::new("nginx", ["-t"]),
///     CommandSpec::new("nginx", ["-s", "reload"]),
/// )
/// .with_timeout(Duration::from_secs(30));
///
/// let outcome = invoker.reload().await;
/// println!("reload: {}", outcome.label());
/// # }
/// ```
#[derive(Clone)]
pub struct ReloadInvoker {
    validate: CommandSpec,
    apply: CommandSpec,
    deadline: Option<Duration>,
    runner: Arc<dyn CommandRunner>,
}

impl ReloadInvoker {
    /// Create an invoker that runs real child processes with no deadline.
    pub fn new(validate: CommandSpec, apply: CommandSpec) -> Self {
        Self {
            validate,
            apply,
            deadline: None,
            runner: Arc::new(SystemCommandRunner),
        }
    }

    /// Kill either command if it runs longer than `deadline`.
    pub fn with_timeout(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Use a custom command runner.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// The configuration test command.
    pub fn validate_command(&self) -> &CommandSpec {
        &self.validate
    }

    /// The reload command.
    pub fn apply_command(&self) -> &CommandSpec {
        &self.apply
    }

    /// Run the two-phase reload.
    pub async fn reload(&self) -> ReloadOutcome {
        match self.step(ReloadPhase::Validate, &self.validate).await {
            StepResult::Passed => {}
            StepResult::Failed(detail) => return ReloadOutcome::ValidationFailed { detail },
            StepResult::TimedOut => {
                return ReloadOutcome::TimedOut {
                    phase: ReloadPhase::Validate,
                };
            }
        }

        match self.step(ReloadPhase::Apply, &self.apply).await {
            StepResult::Passed => {
                info!(command = %self.apply, "proxy reloaded");
                ReloadOutcome::Succeeded
            }
            StepResult::Failed(detail) => ReloadOutcome::ApplyFailed { detail },
            StepResult::TimedOut => ReloadOutcome::TimedOut {
                phase: ReloadPhase::Apply,
            },
        }
    }

    async fn step(&self, phase: ReloadPhase, command: &CommandSpec) -> StepResult {
        debug!(%phase, command = %command, "running reload step");
        match self.runner.run(command, self.deadline).await {
            CommandStatus::Exited { success: true, .. } => StepResult::Passed,
            CommandStatus::Exited { code, stderr, .. } => {
                error!(
                    %phase,
                    command = %command,
                    ?code,
                    stderr = %stderr.trim_end(),
                    "reload step failed"
                );
                StepResult::Failed(stderr)
            }
            CommandStatus::TimedOut => {
                error!(
                    %phase,
                    command = %command,
                    deadline = ?self.deadline,
                    "reload step timed out"
                );
                StepResult::TimedOut
            }
            CommandStatus::SpawnFailed(reason) => {
                error!(%phase, command = %command, %reason, "reload step could not start");
                StepResult::Failed(reason)
            }
        }
    }
}

impl fmt::Debug for ReloadInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadInvoker")
            .field("validate", &self.validate)
            .field("apply", &self.apply)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
