//! Start/stop/kill/remove against an existing container.

use std::sync::Arc;

use tracing::{debug, warn};

use devc_core::error::{DevcError, Result};
use devc_core::runner::{AsyncHandle, CommandResult, StreamHandlers, EXIT_CODE_NO_PROCESS};

use super::LifecycleManager;
use crate::status::ContainerStatus;

const DEFAULT_STOP_GRACE_SECONDS: u64 = 10;

impl LifecycleManager {
    pub fn start(&self, container_id: &str) -> Result<()> {
        let result = self
            .cli
            .command()
            .subcommand("start")
            .arg(container_id)
            .run();
        if result.success {
            self.statuses.record(container_id, ContainerStatus::Running);
            Ok(())
        } else {
            Err(DevcError::Runtime(format!(
                "failed to start container '{}': {}",
                container_id,
                result.stderr.trim()
            )))
        }
    }

    /// Stop with a grace period, passed through to the runtime; it escalates
    /// to SIGKILL after the period expires.
    pub fn stop(&self, container_id: &str, grace_seconds: Option<u64>) -> Result<()> {
        let grace = grace_seconds.unwrap_or(DEFAULT_STOP_GRACE_SECONDS);
        let result = self
            .cli
            .command()
            .subcommand("stop")
            .arg("-t")
            .arg(grace.to_string())
            .arg(container_id)
            .run();
        if result.success || is_absent_or_stopped(&result) {
            self.statuses.record(container_id, ContainerStatus::Stopped);
            Ok(())
        } else {
            Err(DevcError::Runtime(format!(
                "failed to stop container '{}': {}",
                container_id,
                result.stderr.trim()
            )))
        }
    }

    /// Force-kill, bypassing graceful shutdown. A container that is already
    /// stopped or absent is a no-op success, not a failure.
    pub fn kill(&self, container_id: &str) -> Result<()> {
        let result = self
            .cli
            .command()
            .subcommand("kill")
            .arg(container_id)
            .run();
        if result.success || is_absent_or_stopped(&result) {
            if is_absent_or_stopped(&result) {
                debug!(container_id, "kill was a no-op, container already gone");
            }
            self.statuses.record(container_id, ContainerStatus::Stopped);
            Ok(())
        } else {
            Err(DevcError::Runtime(format!(
                "failed to kill container '{}': {}",
                container_id,
                result.stderr.trim()
            )))
        }
    }

    /// Remove the container, optionally forcing a running one. An absent
    /// container is a no-op success; the shell cache entry dies with the
    /// container.
    pub fn remove(&self, container_id: &str, force: bool) -> Result<()> {
        let mut command = self.cli.command().subcommand("rm");
        if force {
            command = command.arg("-f");
        }
        let result = command.arg(container_id).run();

        if result.success || is_absent(&result) {
            self.statuses.record(container_id, ContainerStatus::Removed);
            self.shells.clear(Some(container_id));
            Ok(())
        } else {
            Err(DevcError::Runtime(format!(
                "failed to remove container '{}': {}",
                container_id,
                result.stderr.trim()
            )))
        }
    }

    pub fn start_async<F>(&self, container_id: &str, on_done: F) -> AsyncHandle
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let statuses = Arc::clone(&self.statuses);
        let id = container_id.to_string();
        self.cli
            .command()
            .subcommand("start")
            .arg(container_id)
            .run_async(StreamHandlers::none(), move |result| {
                if result.success {
                    statuses.record(&id, ContainerStatus::Running);
                    on_done(Ok(()));
                } else {
                    on_done(Err(DevcError::Runtime(format!(
                        "failed to start container '{}': {}",
                        id,
                        result.stderr.trim()
                    ))));
                }
            })
    }

    pub fn stop_async<F>(
        &self,
        container_id: &str,
        grace_seconds: Option<u64>,
        on_done: F,
    ) -> AsyncHandle
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let grace = grace_seconds.unwrap_or(DEFAULT_STOP_GRACE_SECONDS);
        let statuses = Arc::clone(&self.statuses);
        let id = container_id.to_string();
        self.cli
            .command()
            .subcommand("stop")
            .arg("-t")
            .arg(grace.to_string())
            .arg(container_id)
            .run_async(StreamHandlers::none(), move |result| {
                if result.success || is_absent_or_stopped(&result) {
                    statuses.record(&id, ContainerStatus::Stopped);
                    on_done(Ok(()));
                } else {
                    on_done(Err(DevcError::Runtime(format!(
                        "failed to stop container '{}': {}",
                        id,
                        result.stderr.trim()
                    ))));
                }
            })
    }

    pub fn kill_async<F>(&self, container_id: &str, on_done: F) -> AsyncHandle
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let statuses = Arc::clone(&self.statuses);
        let id = container_id.to_string();
        self.cli
            .command()
            .subcommand("kill")
            .arg(container_id)
            .run_async(StreamHandlers::none(), move |result| {
                if result.success || is_absent_or_stopped(&result) {
                    statuses.record(&id, ContainerStatus::Stopped);
                    on_done(Ok(()));
                } else {
                    on_done(Err(DevcError::Runtime(format!(
                        "failed to kill container '{}': {}",
                        id,
                        result.stderr.trim()
                    ))));
                }
            })
    }

    pub fn remove_async<F>(&self, container_id: &str, force: bool, on_done: F) -> AsyncHandle
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let statuses = Arc::clone(&self.statuses);
        let shells = Arc::clone(&self.shells);
        let id = container_id.to_string();
        let mut command = self.cli.command().subcommand("rm");
        if force {
            command = command.arg("-f");
        }
        command
            .arg(container_id)
            .run_async(StreamHandlers::none(), move |result| {
                if result.success || is_absent(&result) {
                    statuses.record(&id, ContainerStatus::Removed);
                    shells.clear(Some(&id));
                    on_done(Ok(()));
                } else {
                    on_done(Err(DevcError::Runtime(format!(
                        "failed to remove container '{}': {}",
                        id,
                        result.stderr.trim()
                    ))));
                }
            })
    }

    /// Recent log lines from a container.
    pub fn logs(&self, container_id: &str, tail: Option<u32>) -> Result<String> {
        let mut command = self.cli.command().subcommand("logs");
        if let Some(lines) = tail {
            command = command.arg("--tail").arg(lines.to_string());
        }
        command.arg(container_id).run_checked().map_err(|e| {
            warn!(container_id, "log retrieval failed");
            e
        })
    }
}

/// Stderr that means the container does not exist. A spawn failure is not
/// absence; the runtime never got to answer.
fn is_absent(result: &CommandResult) -> bool {
    if result.exit_code == EXIT_CODE_NO_PROCESS {
        return false;
    }
    let stderr = result.stderr.to_lowercase();
    stderr.contains("no such container") || stderr.contains("no such object")
}

/// Absent, or present but already stopped.
fn is_absent_or_stopped(result: &CommandResult) -> bool {
    is_absent(result) || result.stderr.to_lowercase().contains("is not running")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> CommandResult {
        CommandResult {
            success: false,
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn missing_container_stderr_counts_as_absent() {
        let result = failed("Error response from daemon: No such container: missing-id");
        assert!(is_absent(&result));
        assert!(is_absent_or_stopped(&result));
    }

    #[test]
    fn already_stopped_container_counts_for_kill() {
        let result = failed(
            "Error response from daemon: Cannot kill container: abc: container \
             abc is not running",
        );
        assert!(!is_absent(&result));
        assert!(is_absent_or_stopped(&result));
    }

    #[test]
    fn spawn_failure_is_not_absence() {
        let result = CommandResult {
            success: false,
            exit_code: EXIT_CODE_NO_PROCESS,
            stdout: String::new(),
            stderr: "failed to spawn 'docker': No such file or directory".to_string(),
        };
        assert!(!is_absent(&result));
        assert!(!is_absent_or_stopped(&result));
    }

    #[test]
    fn genuine_failures_are_not_masked() {
        let result = failed("Error response from daemon: driver failed programming ports");
        assert!(!is_absent_or_stopped(&result));
    }

    #[cfg(unix)]
    #[test]
    fn kill_and_remove_on_missing_container_are_no_op_successes() {
        use super::super::test_support::stub_runtime;
        use super::super::LifecycleManager;

        let dir = tempfile::tempdir().expect("tempdir");
        let cli = stub_runtime(
            dir.path(),
            "echo 'Error response from daemon: No such container: missing-id' >&2\nexit 1",
        );
        let manager = LifecycleManager::with_runtime(cli);

        assert!(manager.kill("missing-id").is_ok());
        assert!(manager.remove("missing-id", false).is_ok());
        // Start has no idempotent escape hatch; a missing container is a
        // real failure there.
        assert!(manager.start("missing-id").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn stop_failure_carries_the_runtime_stderr() {
        use super::super::test_support::stub_runtime;
        use super::super::LifecycleManager;

        let dir = tempfile::tempdir().expect("tempdir");
        let cli = stub_runtime(
            dir.path(),
            "echo 'Error response from daemon: cannot stop: disk I/O error' >&2\nexit 1",
        );
        let manager = LifecycleManager::with_runtime(cli);

        let err = manager.stop("abc", Some(5)).unwrap_err();
        assert!(err.to_string().contains("disk I/O error"));
    }
}
