//! Child-process execution for the container runtime CLI.
//!
//! Every runtime invocation in the workspace goes through this module, either
//! blocking (`run`), in the background with a completion callback
//! (`run_async`), or streamed line-by-line to the log for long-running
//! commands (`stream`). Output is captured uniformly as a [`CommandResult`];
//! a command that cannot even be spawned is reported through the same shape
//! rather than as an error.

// Standard library
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// External crates
use duct::cmd;
use tracing::{debug, info};
use which::which;

use crate::error::Result;

/// Exit code reported when the child never produced one: spawn failure,
/// timeout, or cancellation before exit.
pub const EXIT_CODE_NO_PROCESS: i32 = -1;

const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Captured outcome of a single runtime-CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn spawn_failure(program: &str, err: &std::io::Error) -> Self {
        Self {
            success: false,
            exit_code: EXIT_CODE_NO_PROCESS,
            stdout: String::new(),
            stderr: format!("failed to spawn '{}': {}", program, err),
        }
    }

    fn from_parts(status: ExitStatus, stdout: String, mut stderr: String) -> Self {
        let exit_code = match status.code() {
            Some(code) => code,
            None => signal_exit_code(status, &mut stderr),
        };
        Self {
            success: status.success(),
            exit_code,
            stdout,
            stderr,
        }
    }

    fn aborted(stdout: String, mut stderr: String, reason: String) -> Self {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&reason);
        Self {
            success: false,
            exit_code: EXIT_CODE_NO_PROCESS,
            stdout,
            stderr,
        }
    }
}

#[cfg(unix)]
fn signal_exit_code(status: ExitStatus, stderr: &mut String) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("process terminated by signal {}", signal));
            128 + signal
        }
        None => EXIT_CODE_NO_PROCESS,
    }
}

#[cfg(not(unix))]
fn signal_exit_code(_status: ExitStatus, _stderr: &mut String) -> i32 {
    EXIT_CODE_NO_PROCESS
}

/// Options recognized by [`run`] and [`run_async`].
///
/// `timeout` only applies to the async path; a blocking call is expected to
/// be a short-lived query bounded by the runtime's own timeouts.
#[derive(Debug, Clone, Default)]
pub struct RunOpts {
    pub cwd: Option<PathBuf>,
    pub verbose: bool,
    pub timeout: Option<Duration>,
}

type LineSink = Box<dyn FnMut(&str) + Send>;

/// Optional per-line callbacks for incremental async output.
#[derive(Default)]
pub struct StreamHandlers {
    pub on_stdout: Option<LineSink>,
    pub on_stderr: Option<LineSink>,
}

impl StreamHandlers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn stdout<F: FnMut(&str) + Send + 'static>(callback: F) -> Self {
        Self {
            on_stdout: Some(Box::new(callback)),
            on_stderr: None,
        }
    }
}

/// Tracking handle for an in-flight [`run_async`] invocation.
///
/// Dropping the handle does not stop the command; `cancel` does. The
/// completion callback fires exactly once on every exit path.
pub struct AsyncHandle {
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncHandle {
    /// Request termination of the child. The completion callback still fires,
    /// with a cancellation-flavored failure result.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Block until the command has completed and its callback has returned.
    pub fn wait(&self) {
        let handle = match self.monitor.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

/// Run a command to completion, capturing stdout and stderr separately.
///
/// Never returns an error: a binary that cannot be spawned yields
/// `success=false, exit_code=-1` with a "failed to spawn" stderr, so callers
/// classify every outcome from one shape.
pub fn run(program: &str, args: &[String], opts: &RunOpts) -> CommandResult {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = &opts.cwd {
        command.current_dir(dir);
    }
    if opts.verbose {
        debug!(program, args = %args.join(" "), "running command");
    }

    match command.output() {
        Ok(output) => CommandResult::from_parts(
            output.status,
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ),
        Err(e) => CommandResult::spawn_failure(program, &e),
    }
}

/// Spawn a command in the background and deliver its [`CommandResult`] to
/// `on_done` when it exits, times out, or is cancelled.
///
/// Reader threads drain stdout/stderr as the child produces them, feeding
/// `handlers` line-by-line; a monitor thread supervises the child with a
/// try-wait poll loop and force-kills it on timeout or cancellation. All
/// pipes and the process handle are reaped before the callback fires, on
/// every exit path.
pub fn run_async<F>(
    program: &str,
    args: &[String],
    opts: &RunOpts,
    handlers: StreamHandlers,
    on_done: F,
) -> AsyncHandle
where
    F: FnOnce(CommandResult) + Send + 'static,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &opts.cwd {
        command.current_dir(dir);
    }

    let label = format!("{} {}", program, args.join(" "));
    if opts.verbose {
        debug!(command = %label, "spawning background command");
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            let result = CommandResult::spawn_failure(program, &e);
            finished.store(true, Ordering::SeqCst);
            on_done(result);
            return AsyncHandle {
                cancelled,
                finished,
                monitor: Mutex::new(None),
            };
        }
    };

    let stdout_reader = spawn_line_reader(child.stdout.take(), handlers.on_stdout);
    let stderr_reader = spawn_line_reader(child.stderr.take(), handlers.on_stderr);

    let timeout = opts.timeout;
    let cancelled_flag = Arc::clone(&cancelled);
    let finished_flag = Arc::clone(&finished);
    let monitor = thread::spawn(move || {
        let started = Instant::now();
        let outcome = loop {
            if cancelled_flag.load(Ordering::SeqCst) {
                let _ = child.kill();
                let _ = child.wait();
                break Err(format!("command cancelled: {}", label));
            }

            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(format!(
                        "command timed out after {:.1}s: {}",
                        limit.as_secs_f64(),
                        label
                    ));
                }
            }

            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => thread::sleep(MONITOR_POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(format!("failed waiting for command '{}': {}", label, e));
                }
            }
        };

        // The child is reaped on every path above, so both readers see EOF
        // and drain before we assemble the result.
        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);

        let result = match outcome {
            Ok(status) => CommandResult::from_parts(status, stdout, stderr),
            Err(reason) => CommandResult::aborted(stdout, stderr, reason),
        };

        finished_flag.store(true, Ordering::SeqCst);
        on_done(result);
    });

    AsyncHandle {
        cancelled,
        finished,
        monitor: Mutex::new(Some(monitor)),
    }
}

fn spawn_line_reader<R>(pipe: Option<R>, mut sink: Option<LineSink>) -> Option<JoinHandle<String>>
where
    R: Read + Send + 'static,
{
    let pipe = pipe?;
    Some(thread::spawn(move || {
        let mut collected = String::new();
        for line in BufReader::new(pipe).lines() {
            let Ok(line) = line else { break };
            if let Some(callback) = sink.as_mut() {
                callback(&line);
            }
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    }))
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn with_buildkit(program: &str, args: &[String]) -> duct::Expression {
    let mut expr = cmd(program, args);
    if program == "docker" {
        expr = expr
            .env("DOCKER_BUILDKIT", "1")
            .env("BUILDKIT_PROGRESS", "plain");
    }
    expr
}

/// Stream a long-running command's combined output into the log, line by
/// line. Used for build/pull style commands where progress matters more than
/// captured output; a non-zero exit surfaces as an error from the reader.
pub fn stream(program: &str, args: &[String]) -> Result<()> {
    let reader = with_buildkit(program, args).stderr_to_stdout().reader()?;
    for line in BufReader::new(reader).lines() {
        info!("{}", line?);
    }
    Ok(())
}

/// Checks if a command-line tool is available in the system's PATH.
pub fn is_tool_installed(tool_name: &str) -> bool {
    which(tool_name).is_ok()
}
