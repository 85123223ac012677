//! Graceful shutdown coordination
//!
//! An attack stops in two phases. `Graceful` tells workers to stop taking new
//! work while requests already on the wire finish; if they have not drained
//! within the grace period, `Forced` tells workers to abandon them.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

/// Shutdown signal types with escalating urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Stop issuing new requests, let in-flight ones complete
    Graceful,
    /// Abandon in-flight requests
    Forced,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Forced => write!(f, "forced"),
        }
    }
}

/// Graceful shutdown coordinator
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<ShutdownSignal>,
    is_shutting_down: AtomicBool,
    stop_requested: AtomicBool,
    stop_notify: Notify,
    active_tasks: AtomicU32,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator with a 5 second grace period
    pub fn new() -> Self {
        Self::with_grace_period(Duration::from_secs(5))
    }

    pub fn with_grace_period(grace_period: Duration) -> Self {
        let (sender, _) = broadcast::channel(16);

        Self {
            sender,
            is_shutting_down: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            active_tasks: AtomicU32::new(0),
            grace_period,
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Subscribe to shutdown signals
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
            last: if self.is_shutting_down() {
                Some(ShutdownSignal::Graceful)
            } else {
                None
            },
        }
    }

    /// Check if shutdown is in progress
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::Acquire)
    }

    /// Ask whoever owns the attack to stop early (e.g. on Ctrl-C)
    pub fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::AcqRel) {
            info!("Stop requested, attack will wind down");
        }
        self.stop_notify.notify_waiters();
        self.stop_notify.notify_one();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolves once `request_stop` has been called
    pub async fn stop_requested(&self) {
        loop {
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Register an in-flight unit of work; it is released when the guard drops
    pub fn track(self: &Arc<Self>) -> InFlightGuard {
        self.task_started();
        InFlightGuard {
            coordinator: Arc::clone(self),
        }
    }

    /// Increment active task counter
    pub fn task_started(&self) {
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement active task counter
    pub fn task_completed(&self) {
        let _ = self
            .active_tasks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
    }

    /// Get current active task count
    pub fn active_task_count(&self) -> u32 {
        self.active_tasks.load(Ordering::Acquire)
    }

    /// Stop with the coordinator's own grace period
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        self.shutdown_within(self.grace_period).await
    }

    /// Stop the attack: signal `Graceful`, wait up to `grace_period` for
    /// in-flight work, then escalate to `Forced`.
    ///
    /// Returns `TasksRemaining` when the drain had to be cut short.
    pub async fn shutdown_within(&self, grace_period: Duration) -> Result<(), ShutdownError> {
        // Prevent multiple simultaneous shutdowns
        if self.is_shutting_down.swap(true, Ordering::AcqRel) {
            return Err(ShutdownError::AlreadyShuttingDown);
        }

        debug!(
            in_flight = self.active_task_count(),
            grace_ms = grace_period.as_millis() as u64,
            "Starting graceful shutdown"
        );

        // No subscribers just means nobody is left to tell
        let _ = self.sender.send(ShutdownSignal::Graceful);

        if self.wait_for_tasks(grace_period).await {
            debug!("Graceful shutdown completed");
            return Ok(());
        }

        let remaining = self.active_task_count();
        warn!(
            remaining,
            "Grace period elapsed, abandoning in-flight requests"
        );
        let _ = self.sender.send(ShutdownSignal::Forced);

        Err(ShutdownError::TasksRemaining(remaining))
    }

    /// Wait for all tasks to complete within the given timeout
    async fn wait_for_tasks(&self, timeout_duration: Duration) -> bool {
        let start = tokio::time::Instant::now();

        loop {
            if self.active_task_count() == 0 {
                return true;
            }
            if start.elapsed() >= timeout_duration {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases one in-flight slot on drop
pub struct InFlightGuard {
    coordinator: Arc<ShutdownCoordinator>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.coordinator.task_completed();
    }
}

/// Per-task view of the shutdown signals that remembers the strongest
/// signal seen, so a signal consumed while waiting for one phase is not lost
/// for the next.
pub struct ShutdownListener {
    receiver: broadcast::Receiver<ShutdownSignal>,
    last: Option<ShutdownSignal>,
}

impl ShutdownListener {
    /// Resolves on any shutdown signal
    pub async fn stopped(&mut self) -> ShutdownSignal {
        if let Some(signal) = self.last {
            return signal;
        }
        self.next().await
    }

    /// Resolves only once in-flight work must be abandoned
    pub async fn forced(&mut self) {
        while self.last != Some(ShutdownSignal::Forced) {
            self.next().await;
        }
    }

    pub fn last_signal(&self) -> Option<ShutdownSignal> {
        self.last
    }

    async fn next(&mut self) -> ShutdownSignal {
        let signal = match self.receiver.recv().await {
            Ok(signal) => signal,
            Err(broadcast::error::RecvError::Closed) => ShutdownSignal::Forced,
            Err(broadcast::error::RecvError::Lagged(_)) => {
                warn!("Shutdown signal lagged, assuming forced shutdown");
                ShutdownSignal::Forced
            }
        };
        if self.last != Some(ShutdownSignal::Forced) {
            self.last = Some(signal);
        }
        signal
    }
}

/// Shutdown error types
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// Shutdown already in progress
    #[error("Shutdown already in progress")]
    AlreadyShuttingDown,

    /// Work still in flight when the grace period ran out
    #[error("Grace period elapsed with {0} requests still in flight")]
    TasksRemaining(u32),
}
