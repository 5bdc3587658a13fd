//! Runtime command construction.
//!
//! A centralized builder for invocations of the container runtime CLI, so
//! every call site assembles argument vectors the same way and maps
//! failures consistently. Arguments are handed to the process spawner as a
//! list; nothing here passes through a shell.

use std::time::Duration;

use tracing::debug;

use devc_core::error::{DevcError, Result};
use devc_core::runner::{self, AsyncHandle, CommandResult, RunOpts, StreamHandlers};

pub const DEFAULT_RUNTIME_BINARY: &str = "docker";

/// Handle to the configured runtime binary (docker or a podman-compatible
/// CLI).
#[derive(Debug, Clone)]
pub struct RuntimeCli {
    binary: String,
}

impl RuntimeCli {
    /// Wrap a binary name without touching the PATH. Useful when the caller
    /// has already validated the runtime, and in tests.
    pub fn new<S: Into<String>>(binary: S) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Wrap a binary name, failing early when it is not installed.
    pub fn detect<S: Into<String>>(binary: S) -> Result<Self> {
        let binary = binary.into();
        if !runner::is_tool_installed(&binary) {
            return Err(DevcError::Dependency(binary));
        }
        Ok(Self { binary })
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn command(&self) -> RuntimeCommand {
        RuntimeCommand::new(&self.binary)
    }

    /// Check that the daemon is reachable, classifying the failure from the
    /// runtime's stderr.
    pub fn check_daemon(&self) -> Result<()> {
        let result = self.command().subcommand("info").run();
        if result.success {
            return Ok(());
        }
        if result.exit_code == runner::EXIT_CODE_NO_PROCESS {
            return Err(DevcError::Dependency(self.binary.clone()));
        }
        if result.stderr.to_lowercase().contains("permission denied") {
            return Err(DevcError::DaemonPermission);
        }
        Err(DevcError::DaemonNotRunning)
    }
}

/// Fluent builder for one runtime invocation.
#[derive(Debug, Clone)]
pub struct RuntimeCommand {
    binary: String,
    subcommand: Option<String>,
    args: Vec<String>,
    opts: RunOpts,
}

impl RuntimeCommand {
    fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            subcommand: None,
            args: Vec::new(),
            opts: RunOpts::default(),
        }
    }

    /// Set the runtime subcommand (e.g. "create", "exec", "inspect").
    pub fn subcommand<S: Into<String>>(mut self, cmd: S) -> Self {
        self.subcommand = Some(cmd.into());
        self
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Async-only: force-terminate the invocation after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = Some(timeout);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.opts.verbose = verbose;
        self
    }

    /// The argument vector handed to the spawner, binary excluded.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        if let Some(subcommand) = &self.subcommand {
            args.push(subcommand.clone());
        }
        args.extend(self.args.iter().cloned());
        args
    }

    /// Execute, blocking, capturing both streams.
    pub fn run(self) -> CommandResult {
        let args = self.build_args();
        debug!(binary = %self.binary, args = %args.join(" "), "runtime command");
        runner::run(&self.binary, &args, &self.opts)
    }

    /// Execute in the background; `on_done` receives the captured result.
    pub fn run_async<F>(self, handlers: StreamHandlers, on_done: F) -> AsyncHandle
    where
        F: FnOnce(CommandResult) + Send + 'static,
    {
        let args = self.build_args();
        debug!(binary = %self.binary, args = %args.join(" "), "runtime command (async)");
        runner::run_async(&self.binary, &args, &self.opts, handlers, on_done)
    }

    /// Execute and return stdout, or an error carrying the runtime's own
    /// stderr so the failure is diagnosable without re-running the command.
    pub fn run_checked(self) -> Result<String> {
        let label = format!("{} {}", self.binary, self.build_args().join(" "));
        let result = self.run();
        if result.success {
            Ok(result.stdout)
        } else {
            Err(DevcError::Command(format!(
                "'{}' failed (exit {}): {}",
                label,
                result.exit_code,
                result.stderr.trim()
            )))
        }
    }

    /// Execute with combined output streamed into the log. For long-running
    /// build/pull style commands.
    pub fn stream(self) -> Result<()> {
        let args = self.build_args();
        runner::stream(&self.binary, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assembles_argv_in_order() {
        let command = RuntimeCli::new("docker")
            .command()
            .subcommand("ps")
            .arg("-a")
            .args(["--format", "{{.Names}}"]);
        assert_eq!(
            command.build_args(),
            vec!["ps", "-a", "--format", "{{.Names}}"]
        );
    }

    #[test]
    fn run_maps_missing_binary_to_spawn_failure() {
        let result = RuntimeCli::new("devc-test-no-such-runtime")
            .command()
            .subcommand("ps")
            .run();
        assert!(!result.success);
        assert_eq!(result.exit_code, runner::EXIT_CODE_NO_PROCESS);
        assert!(result.stderr.contains("failed to spawn"));
    }

    #[test]
    fn run_checked_carries_stderr_in_error() {
        let err = RuntimeCli::new("sh")
            .command()
            .subcommand("-c")
            .arg("echo broken >&2; exit 7")
            .run_checked()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exit 7"));
        assert!(message.contains("broken"));
    }

    #[test]
    fn detect_validates_the_path() {
        assert!(RuntimeCli::detect("sh").is_ok());
        assert!(RuntimeCli::detect("devc-test-no-such-runtime").is_err());
    }

    #[test]
    fn check_daemon_reports_missing_binary_as_dependency() {
        let err = RuntimeCli::new("devc-test-no-such-runtime")
            .check_daemon()
            .unwrap_err();
        assert!(matches!(err, DevcError::Dependency(_)));
    }
}
