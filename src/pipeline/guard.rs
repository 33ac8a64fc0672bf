//! Pass-level concurrency controls.
//!
//! - `PassLock` enforces one reconciliation pass per document at a time and
//!   exposes what is running.
//! - `CancellationToken` lets the host abandon a pass between stages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of the currently running pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivePass {
    pub pass_id: String,
    /// Task name, e.g. `review_document`.
    pub task: String,
    pub started_at: DateTime<Utc>,
}

/// Reentrancy guard for one host document.
///
/// A second pass started while one holds the lock is refused, never queued.
pub struct PassLock {
    lock: Mutex<()>,
    current: Mutex<Option<ActivePass>>,
}

impl PassLock {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            current: Mutex::new(None),
        }
    }

    /// Try to start a pass without blocking. `None` while another pass runs.
    pub fn try_acquire(&self, pass_id: &str, task: &str) -> Option<PassGuard<'_>> {
        let guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            // Poisoned by a pass that panicked.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        self.set_current(pass_id, task);
        Some(PassGuard {
            _guard: guard,
            lock: self,
        })
    }

    /// What pass is currently running? `None` when idle.
    pub fn current_pass(&self) -> Option<ActivePass> {
        self.current.lock().ok()?.clone()
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.lock.try_lock(), Err(TryLockError::WouldBlock))
    }

    fn set_current(&self, pass_id: &str, task: &str) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some(ActivePass {
                pass_id: pass_id.to_string(),
                task: task.to_string(),
                started_at: Utc::now(),
            });
        }
    }

    fn clear_current(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

impl Default for PassLock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII token for an exclusive pass. Dropping it releases the lock and
/// clears the current pass.
pub struct PassGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    lock: &'a PassLock,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.lock.clear_current();
    }
}

/// Cooperative cancellation flag, checked between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
