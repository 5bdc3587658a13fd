//! Container readiness polling.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use super::LifecycleManager;
use crate::status::ContainerStatus;

/// Bounded fixed-interval retry. The constants are configuration, not
/// contract; callers with different patience pass their own.
#[derive(Debug, Clone)]
pub struct ReadinessOpts {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessOpts {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(2),
        }
    }
}

impl LifecycleManager {
    /// Wait until the container both reports `running` and answers a trivial
    /// exec probe. A container can report `running` before its init process
    /// accepts exec calls, so the status alone is not readiness.
    ///
    /// Exhausting the attempts is not an error; the container is just not
    /// ready.
    pub fn wait_until_ready(&self, container_id: &str, max_attempts: u32) -> bool {
        self.wait_until_ready_with_opts(
            container_id,
            &ReadinessOpts {
                max_attempts,
                ..Default::default()
            },
        )
    }

    /// Each poll is issued only after the previous attempt's result is
    /// known; there is no overlap between attempts.
    pub fn wait_until_ready_with_opts(&self, container_id: &str, opts: &ReadinessOpts) -> bool {
        for attempt in 1..=opts.max_attempts {
            if self.get_status(container_id) == Some(ContainerStatus::Running)
                && self.exec_probe(container_id)
            {
                debug!(container_id, attempt, "container ready");
                return true;
            }
            if attempt < opts.max_attempts {
                std::thread::sleep(opts.interval);
            }
        }
        debug!(
            container_id,
            attempts = opts.max_attempts,
            "container not ready, attempts exhausted"
        );
        false
    }

    /// Async variant of the readiness wait: the caller returns immediately
    /// and the verdict is delivered to `on_done`, which fires exactly once.
    /// Polling runs on a background thread, one attempt after another.
    pub fn wait_until_ready_async<F>(
        self: Arc<Self>,
        container_id: &str,
        opts: ReadinessOpts,
        on_done: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let id = container_id.to_string();
        thread::spawn(move || {
            let ready = self.wait_until_ready_with_opts(&id, &opts);
            on_done(ready);
        })
    }

    fn exec_probe(&self, container_id: &str) -> bool {
        self.cli
            .command()
            .subcommand("exec")
            .arg(container_id)
            .arg("echo")
            .arg("ready")
            .run()
            .success
    }
}
