//! Cooperative shutdown of long-lived background tasks.
//!
//! One [`CancellationToken`] is shared by every task. Shutting down cancels
//! it, waits a grace period for the tasks to finish on their own, then
//! aborts the stragglers and gives them a short bound to unwind.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long tasks get to exit after the stop signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);
/// How long an aborted task gets to unwind.
pub const ABORT_WAIT: Duration = Duration::from_secs(1);

/// What happened to each task during shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Exited on their own within the grace period.
    pub finished: Vec<String>,
    /// Aborted after the grace period.
    pub aborted: Vec<String>,
    /// Still running after abort; left behind.
    pub stuck: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty() && self.stuck.is_empty()
    }
}

/// Owns a set of named tasks and the token that stops them.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
    grace: Duration,
    abort_wait: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            grace: SHUTDOWN_GRACE,
            abort_wait: ABORT_WAIT,
        }
    }

    #[must_use]
    pub fn with_timings(mut self, grace: Duration, abort_wait: Duration) -> Self {
        self.grace = grace;
        self.abort_wait = abort_wait;
        self
    }

    /// Token observed by every managed task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a managed task.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.tasks.lock().push((name.into(), handle));
    }

    /// Signal every task, wait for them, and force-stop the rest.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.token.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        info!(task_count = tasks.len(), grace_secs = self.grace.as_secs(), "Shutting down background tasks");

        let mut report = ShutdownReport::default();
        let deadline = Instant::now() + self.grace;
        let mut overdue = Vec::new();

        for (name, mut handle) in tasks {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.finished.push(name),
                Ok(Err(e)) => {
                    warn!(task = %name, error = %e, "Task ended abnormally during shutdown");
                    report.finished.push(name);
                }
                Err(_) => overdue.push((name, handle)),
            }
        }

        for (name, handle) in overdue {
            warn!(task = %name, "Task did not stop within the grace period; aborting");
            handle.abort();
            match timeout(self.abort_wait, handle).await {
                Ok(_) => report.aborted.push(name),
                Err(_) => {
                    error!(task = %name, "Task still running after abort; giving up on it");
                    report.stuck.push(name);
                }
            }
        }

        info!(
            finished = report.finished.len(),
            aborted = report.aborted.len(),
            stuck = report.stuck.len(),
            "Background task shutdown complete"
        );
        report
    }
}
