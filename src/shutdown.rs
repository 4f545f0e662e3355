// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Graceful-shutdown coordination.
//!
//! In-flight work registers a guard via `track()`; once shutdown is
//! initiated no new guards are issued and `initiate()` waits (bounded) for
//! outstanding guards to drop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Outcome of a drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownResult {
    /// All in-flight work finished inside the grace period.
    Complete,
    /// The grace period expired with work still outstanding.
    Timeout { remaining: usize },
}

/// Shared shutdown state.
pub struct ShutdownCoordinator {
    shutting_down: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            shutting_down: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Register in-flight work. Returns `None` once shutdown has begun.
    pub fn track(self: &Arc<Self>) -> Option<InFlightGuard> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        // Re-check to close the race with a concurrent initiate().
        if self.shutting_down.load(Ordering::SeqCst) {
            self.release();
            return None;
        }
        Some(InFlightGuard {
            coordinator: Arc::clone(self),
        })
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Begin shutdown and wait up to `grace` for in-flight work to drain.
    pub async fn initiate(&self, grace: Duration) -> ShutdownResult {
        self.shutting_down.store(true, Ordering::SeqCst);

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            // Register for the wakeup before reading the counter; a guard
            // dropped in between would notify no one and strand this
            // waiter until the deadline.
            let drained = self.drained.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return ShutdownResult::Complete;
            }
            match tokio::time::timeout_at(deadline, drained).await {
                Ok(()) => continue,
                Err(_) => {
                    return ShutdownResult::Timeout {
                        remaining: self.in_flight.load(Ordering::SeqCst),
                    };
                }
            }
        }
    }

    fn release(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one unit of in-flight work.
pub struct InFlightGuard {
    coordinator: Arc<ShutdownCoordinator>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.coordinator.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_with_no_work_completes() {
        tokio_test::block_on(async {
            let coordinator = Arc::new(ShutdownCoordinator::new());
            let result = coordinator.initiate(Duration::from_millis(50)).await;
            assert_eq!(result, ShutdownResult::Complete);
        });
    }

    #[tokio::test]
    async fn test_track_refused_after_initiate() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        coordinator.initiate(Duration::from_millis(10)).await;
        assert!(coordinator.track().is_none());
    }

    #[tokio::test]
    async fn test_drain_waits_for_guard_drop() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let guard = coordinator.track().unwrap();
        assert_eq!(coordinator.in_flight(), 1);

        let waiter = Arc::clone(&coordinator);
        let handle =
            tokio::spawn(async move { waiter.initiate(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        let result = handle.await.unwrap();
        assert_eq!(result, ShutdownResult::Complete);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_timeout_reports_remaining() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let _guard = coordinator.track().unwrap();

        let result = coordinator.initiate(Duration::from_millis(30)).await;
        assert_eq!(result, ShutdownResult::Timeout { remaining: 1 });
    }
}
