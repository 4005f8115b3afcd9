//! Cancellation token shared between the execution controller and the script executor.
//!
//! The executor polls [`CancelToken::checkpoint`] at every script operation. A run is
//! cancelled when
//!
//! - an interrupt was requested for exactly this run (a pending flag, consumed at the next
//!   checkpoint, so requests issued before the first checkpoint are not lost),
//! - the run exceeded its timeout, or
//! - the continuation callback, polled every `interval` operations, returned `false`.
//!
//! Interrupt requests name the run they target, so a request racing with the end of one run
//! never cancels the next one.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Predicate polled during a run; returning `false` cancels it
pub type ContinuationCallback = Arc<dyn Fn() -> bool + Send + Sync>;

/// Operations between two deadline checks
const DEADLINE_CHECK_INTERVAL: u64 = 64;

/// Why a run was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CancelReason {
    /// [`crate::ScriptEngine::interrupt`] was called
    Interrupted,
    /// The continuation callback returned `false`
    Declined,
    /// The run exceeded its timeout, in milliseconds
    TimedOut(u64),
}

/// Shared cancellation state of one engine
pub struct CancelToken {
    next_run: AtomicU64,
    current: AtomicU64,
    pending: AtomicU64,
    timeout_ms: AtomicU64,
    deadline: Mutex<Option<Instant>>,
    continuation: RwLock<Option<ContinuationCallback>>,
    interval: u64,
}

impl CancelToken {
    /// Create a token polling the continuation callback every `interval` operations
    #[must_use]
    pub fn new(interval: u64) -> Self {
        CancelToken {
            next_run: AtomicU64::new(1),
            current: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            timeout_ms: AtomicU64::new(0),
            deadline: Mutex::new(None),
            continuation: RwLock::new(None),
            interval: interval.max(1),
        }
    }

    /// Mark a new run as active, returns its id
    pub(crate) fn begin(&self, timeout_ms: u64) -> u64 {
        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        self.timeout_ms.store(timeout_ms, Ordering::Relaxed);
        *self.deadline.lock() =
            (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms));
        self.current.store(run, Ordering::SeqCst);
        run
    }

    /// Mark `run` as finished; stale interrupt requests for it are dropped
    pub(crate) fn end(&self, run: u64) {
        let _ = self
            .current
            .compare_exchange(run, 0, Ordering::AcqRel, Ordering::Acquire);
        let _ = self
            .pending
            .compare_exchange(run, 0, Ordering::AcqRel, Ordering::Acquire);
        *self.deadline.lock() = None;
    }

    /// Id of the active run, `None` when idle
    #[must_use]
    pub fn current_run(&self) -> Option<u64> {
        match self.current.load(Ordering::SeqCst) {
            0 => None,
            run => Some(run),
        }
    }

    /// Request cancellation of the active run; `false` (and no effect) when idle
    pub fn request_interrupt(&self) -> bool {
        match self.current_run() {
            Some(run) => {
                self.pending.store(run, Ordering::Release);
                debug!("interrupt requested for run {}", run);
                true
            }
            None => false,
        }
    }

    /// Replace the continuation callback
    pub fn set_continuation(&self, callback: Option<ContinuationCallback>) {
        *self.continuation.write() = callback;
    }

    /// The continuation callback
    #[must_use]
    pub fn continuation(&self) -> Option<ContinuationCallback> {
        self.continuation.read().clone()
    }

    /// Check whether the active run has to stop after `operations` operations
    pub fn checkpoint(&self, operations: u64) -> Option<CancelReason> {
        let run = self.current.load(Ordering::Acquire);
        if run == 0 {
            return None;
        }

        if self
            .pending
            .compare_exchange(run, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Some(CancelReason::Interrupted);
        }

        if operations % DEADLINE_CHECK_INTERVAL == 0 {
            if let Some(deadline) = *self.deadline.lock() {
                if Instant::now() >= deadline {
                    return Some(CancelReason::TimedOut(self.timeout_ms.load(Ordering::Relaxed)));
                }
            }
        }

        if operations % self.interval == 0 {
            let callback = self.continuation();
            if let Some(callback) = callback {
                if !callback() {
                    return Some(CancelReason::Declined);
                }
            }
        }

        None
    }
}
