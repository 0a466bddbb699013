//! Concurrent Admission Limiter
//!
//! This module bounds in-flight chain executions to protect downstream
//! resources (CPU, upstream servers, socket budgets) while capping the
//! memory cost of overload with a bounded wait queue.
//!
//! # Admission protocol
//!
//! ```text
//!                  ┌──── waiters full ────► SHED (drop)
//!                  │
//! IN ──► WAIT ─────┼──── run slot won ────► RUN ──► DONE
//!                  │
//!                  └──── deadline fired ──► ABANDON
//! ```
//!
//! A caller first reserves one of `max_waiting` wait slots ([`try_wait`]);
//! failure to reserve is load shedding, not an error. It then queues for
//! one of `max_running` run slots ([`run`]), racing the acquisition
//! against its deadline. Winning the run slot retires the wait slot — the
//! wait counter tracks queries queued behind the runners, so a full
//! system holds `max_running` runners plus `max_waiting` waiters. Both
//! slot types are RAII permits: dropping them is the release, which makes
//! every abandonment path leak-free.
//!
//! Run slots are granted in arrival order; tokio's semaphore queues
//! acquirers FIFO, so no waiter starves while slots free up.
//!
//! [`try_wait`]: ConcurrentLimiter::try_wait
//! [`run`]: ConcurrentLimiter::run

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Wait-queue capacity as a multiple of the run capacity
pub const DEFAULT_WAIT_RATIO: usize = 8;

/// A reserved wait slot; dropping it releases the slot
#[derive(Debug)]
pub struct WaitSlot {
    _permit: OwnedSemaphorePermit,
}

/// An acquired run slot; dropping it releases the slot
#[derive(Debug)]
pub struct RunSlot {
    _permit: OwnedSemaphorePermit,
}

/// FIFO admission gate bounding running and waiting queries
///
/// The limiter itself cannot fail: admission either proceeds, sheds, or
/// is abandoned by the caller's deadline.
#[derive(Debug)]
pub struct ConcurrentLimiter {
    /// Run slots, capacity R
    run: Arc<Semaphore>,
    /// Wait slots, capacity W
    wait: Arc<Semaphore>,
    /// Maximum concurrent runners (R)
    max_running: usize,
    /// Maximum queued waiters (W)
    max_waiting: usize,
}

impl ConcurrentLimiter {
    /// Create a limiter with `max_running` run slots and the default
    /// `8 * max_running` wait slots.
    ///
    /// # Panics
    ///
    /// Panics if `max_running` is zero; a disabled limiter is expressed
    /// by not constructing one.
    #[must_use]
    pub fn new(max_running: usize) -> Self {
        Self::with_max_waiting(max_running, max_running.saturating_mul(DEFAULT_WAIT_RATIO))
    }

    /// Create a limiter with explicit run and wait capacities.
    ///
    /// # Panics
    ///
    /// Panics if either capacity is zero.
    #[must_use]
    pub fn with_max_waiting(max_running: usize, max_waiting: usize) -> Self {
        assert!(max_running > 0, "limiter requires at least one run slot");
        assert!(max_waiting > 0, "limiter requires at least one wait slot");
        Self {
            run: Arc::new(Semaphore::new(max_running)),
            wait: Arc::new(Semaphore::new(max_waiting)),
            max_running,
            max_waiting,
        }
    }

    /// Reserve a wait slot.
    ///
    /// Returns `None` when the wait queue is saturated; the caller sheds
    /// the query silently.
    #[must_use]
    pub fn try_wait(&self) -> Option<WaitSlot> {
        Arc::clone(&self.wait)
            .try_acquire_owned()
            .ok()
            .map(|permit| WaitSlot { _permit: permit })
    }

    /// Queue for a run slot, FIFO by arrival.
    ///
    /// The caller races this against its deadline and drops the future if
    /// the deadline wins; the pending acquisition is then withdrawn.
    pub async fn run(&self) -> RunSlot {
        // The semaphores are never closed, so acquisition cannot fail
        let permit = Arc::clone(&self.run)
            .acquire_owned()
            .await
            .expect("run semaphore closed");
        RunSlot { _permit: permit }
    }

    /// Maximum concurrent runners (R)
    #[must_use]
    pub fn max_running(&self) -> usize {
        self.max_running
    }

    /// Maximum queued waiters (W)
    #[must_use]
    pub fn max_waiting(&self) -> usize {
        self.max_waiting
    }

    /// Number of run slots currently held
    #[must_use]
    pub fn running(&self) -> usize {
        self.max_running - self.run.available_permits()
    }

    /// Number of wait slots currently held
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.max_waiting - self.wait.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_capacities() {
        let limiter = ConcurrentLimiter::new(4);
        assert_eq!(limiter.max_running(), 4);
        assert_eq!(limiter.max_waiting(), 32);

        let limiter = ConcurrentLimiter::with_max_waiting(2, 5);
        assert_eq!(limiter.max_waiting(), 5);
    }

    #[test]
    #[should_panic(expected = "at least one run slot")]
    fn test_zero_runners_rejected() {
        let _ = ConcurrentLimiter::new(0);
    }

    #[tokio::test]
    async fn test_admission_ladder() {
        let limiter = Arc::new(ConcurrentLimiter::with_max_waiting(1, 8));

        // 1st admission: reserves, wins the run slot, retires its wait slot
        let wait = limiter.try_wait().expect("first reservation");
        let runner = limiter.run().await;
        drop(wait);
        assert_eq!(limiter.running(), 1);
        assert_eq!(limiter.waiting(), 0);

        // Admissions 2..=9 reserve wait slots and queue behind the runner
        let mut queued = Vec::new();
        for i in 2..=9 {
            let slot = limiter.try_wait();
            assert!(slot.is_some(), "admission {i} should wait, not shed");
            queued.push(slot.unwrap());
        }
        assert_eq!(limiter.waiting(), 8);

        // The 10th is shed
        assert!(limiter.try_wait().is_none());

        // Nobody can run while the runner holds the slot
        assert!(timeout(Duration::from_millis(10), limiter.run())
            .await
            .is_err());

        // Runner releases: exactly one waiter progresses
        drop(runner);
        let next = timeout(Duration::from_millis(10), limiter.run())
            .await
            .expect("one waiter should progress");
        drop(queued.pop());
        assert_eq!(limiter.running(), 1);
        assert!(timeout(Duration::from_millis(10), limiter.run())
            .await
            .is_err());
        drop(next);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_restores_counts() {
        let limiter = Arc::new(ConcurrentLimiter::with_max_waiting(1, 2));

        let _wait = limiter.try_wait().unwrap();
        let runner = limiter.run().await;

        let before = limiter.waiting();
        {
            let wait = limiter.try_wait().unwrap();
            assert_eq!(limiter.waiting(), before + 1);
            // Deadline fires while queued: the run future and the wait
            // slot are both dropped
            let abandoned = timeout(Duration::from_millis(10), limiter.run()).await;
            assert!(abandoned.is_err());
            drop(wait);
        }
        assert_eq!(limiter.waiting(), before);

        // The abandoned acquisition must not have consumed the run slot
        drop(runner);
        let _slot = timeout(Duration::from_millis(10), limiter.run())
            .await
            .expect("run slot free again");
    }

    #[tokio::test]
    async fn test_fifo_grant_order() {
        let limiter = Arc::new(ConcurrentLimiter::with_max_waiting(1, 8));
        let runner = limiter.run().await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut tasks = Vec::new();
        for i in 0..4u32 {
            let limiter = Arc::clone(&limiter);
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move {
                let slot = limiter.run().await;
                tx.send(i).unwrap();
                drop(slot);
            }));
            // Let task i reach the semaphore queue before spawning i+1
            tokio::task::yield_now().await;
        }

        drop(runner);
        for expected in 0..4u32 {
            let got = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("grant in time")
                .expect("sender alive");
            assert_eq!(got, expected, "run slots must drain FIFO");
        }
        for t in tasks {
            t.await.unwrap();
        }
    }
}
