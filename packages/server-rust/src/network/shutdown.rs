//! Server lifecycle and in-flight query accounting.
//!
//! The lifecycle state lives in an `ArcSwap` so health checks read it without
//! locking. Each running query holds an [`InFlightGuard`]; the last guard
//! to drop wakes anyone waiting for the drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Notify;

/// Lifecycle of the HTTP server: Starting -> Ready -> Draining -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Listener bound; not serving yet.
    Starting,
    /// Serving queries.
    Ready,
    /// Shutdown requested; running queries may finish.
    Draining,
    /// Every running query finished after shutdown.
    Stopped,
}

impl HealthState {
    /// Name reported by the health endpoints.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Default)]
struct QueryTracker {
    running: AtomicU64,
    idle: Notify,
}

/// Shared between the router state and the server loop.
#[derive(Debug)]
pub struct ShutdownController {
    queries: Arc<QueryTracker>,
    health_state: ArcSwap<HealthState>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state with no running queries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queries: Arc::new(QueryTracker::default()),
            health_state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    /// Moves to `Ready`; readiness checks start passing.
    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Readiness fails from here on; running queries are left alone.
    pub fn trigger_shutdown(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
    }

    /// Current lifecycle state, read without locking.
    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Marks one query as running until the guard drops.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.queries.running.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            queries: Arc::clone(&self.queries),
        }
    }

    /// Number of queries currently holding a guard.
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.queries.running.load(Ordering::Acquire)
    }

    /// Waits for every running query to finish, at most `timeout`.
    ///
    /// On success the state becomes `Stopped` and `true` is returned. On
    /// timeout the state is left untouched.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                // Register before checking so a concurrent final drop is not missed.
                let idle = self.queries.idle.notified();
                if self.in_flight_count() == 0 {
                    return;
                }
                idle.await;
            }
        })
        .await
        .is_ok();

        if drained {
            self.health_state.store(Arc::new(HealthState::Stopped));
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by a request handler for the duration of one query.
#[derive(Debug)]
pub struct InFlightGuard {
    queries: Arc<QueryTracker>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.queries.running.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.queries.idle.notify_waiters();
        }
    }
}
