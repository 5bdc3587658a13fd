//! Exec inside a container, and the shell detection backing script commands.

use indexmap::IndexMap;
use std::time::Duration;

use tracing::{debug, warn};

use devc_core::runner::{AsyncHandle, CommandResult, StreamHandlers};

use super::LifecycleManager;
use crate::shell::{FALLBACK_SHELL, SHELL_PREFERENCE};
use crate::status::ContainerStatus;

/// What to run inside the container.
///
/// Argv vectors pass to the runtime verbatim. A script string is the single
/// code path with shell semantics: it runs via the probed shell's `-c`.
#[derive(Debug, Clone)]
pub enum ExecCommand {
    Argv(Vec<String>),
    Script(String),
}

/// Options recognized by the exec operations.
#[derive(Debug, Clone, Default)]
pub struct ExecOpts {
    pub user: Option<String>,
    pub workdir: Option<String>,
    pub env: IndexMap<String, String>,
    /// Async modes only; a sync exec blocks until the command exits.
    pub timeout: Option<Duration>,
}

impl LifecycleManager {
    /// Detect the usable interactive shell for a container.
    ///
    /// Cached per container id, so a second call issues no processes. A
    /// container that is not running degrades to the fallback shell without
    /// probing and without caching, since a later start may change the
    /// answer.
    pub fn detect_shell(&self, container_id: &str) -> String {
        if let Some(shell) = self.shells.get(container_id) {
            return shell;
        }

        if self.get_status(container_id) != Some(ContainerStatus::Running) {
            return FALLBACK_SHELL.to_string();
        }

        for candidate in SHELL_PREFERENCE {
            let result = self
                .cli
                .command()
                .subcommand("exec")
                .arg(container_id)
                .arg(candidate)
                .arg("-c")
                .arg("exit 0")
                .run();
            if result.success {
                debug!(container_id, shell = candidate, "detected container shell");
                self.shells.insert(container_id, candidate);
                return candidate.to_string();
            }
        }

        // No candidate answered; remember the fallback so every exec does
        // not repeat the full probe round.
        self.shells.insert(container_id, FALLBACK_SHELL);
        FALLBACK_SHELL.to_string()
    }

    /// Run a command inside the container, blocking until it exits.
    ///
    /// Every outcome, spawn failure included, is reported through the
    /// returned [`CommandResult`].
    pub fn exec(
        &self,
        container_id: &str,
        command: &ExecCommand,
        opts: &ExecOpts,
    ) -> CommandResult {
        let shell = self.exec_shell_for(container_id, command);
        let args = build_exec_args(container_id, command, opts, &shell);
        self.cli.command().args(args).run()
    }

    /// Run a command inside the container, returning immediately; the
    /// captured result is delivered to `on_done`.
    pub fn exec_async<F>(
        &self,
        container_id: &str,
        command: &ExecCommand,
        opts: &ExecOpts,
        handlers: StreamHandlers,
        on_done: F,
    ) -> AsyncHandle
    where
        F: FnOnce(CommandResult) + Send + 'static,
    {
        let shell = self.exec_shell_for(container_id, command);
        let args = build_exec_args(container_id, command, opts, &shell);
        let mut runtime_command = self.cli.command().args(args);
        if let Some(timeout) = opts.timeout {
            runtime_command = runtime_command.timeout(timeout);
        }
        runtime_command.run_async(handlers, on_done)
    }

    /// Fire-and-forget exec: no result is delivered to the caller, failures
    /// are only logged.
    pub fn exec_detached(
        &self,
        container_id: &str,
        command: &ExecCommand,
        opts: &ExecOpts,
    ) -> AsyncHandle {
        let label = format!("detached exec in '{}'", container_id);
        self.exec_async(
            container_id,
            command,
            opts,
            StreamHandlers::none(),
            move |result| {
                if !result.success {
                    warn!(
                        "{} failed (exit {}): {}",
                        label,
                        result.exit_code,
                        result.stderr.trim()
                    );
                }
            },
        )
    }

    /// Script commands need the probed shell; argv commands never touch it.
    fn exec_shell_for(&self, container_id: &str, command: &ExecCommand) -> String {
        match command {
            ExecCommand::Script(_) => self.detect_shell(container_id),
            ExecCommand::Argv(_) => FALLBACK_SHELL.to_string(),
        }
    }
}

fn build_exec_args(
    container_id: &str,
    command: &ExecCommand,
    opts: &ExecOpts,
    shell: &str,
) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    if let Some(user) = &opts.user {
        args.push("-u".to_string());
        args.push(user.clone());
    }
    if let Some(workdir) = &opts.workdir {
        args.push("-w".to_string());
        args.push(workdir.clone());
    }
    for (key, value) in &opts.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(container_id.to_string());

    match command {
        ExecCommand::Argv(argv) => args.extend(argv.iter().cloned()),
        ExecCommand::Script(script) => {
            args.push(shell.to_string());
            args.push("-c".to_string());
            args.push(script.clone());
        }
    }
    args
}
