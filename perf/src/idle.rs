//! Deferred low-priority callbacks.
//!
//! One [`IdleScheduler`] per process, its backend fixed at construction:
//!
//! - [`IdleBackend::Idle`] waits until the runtime's global injection queue is empty
//!   (bounded by [`IdleOptions::timeout`] when given), then runs the callback.
//! - [`IdleBackend::Timer`] runs the callback after a fixed 1 ms delay.
//!
//! Both hand out the same [`IdleHandle`] and cancel the same way.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::AbortHandle;

/// Delay used by the timer backend.
pub const TIMER_DELAY: Duration = Duration::from_millis(1);

/// Queue probes made back to back before the idle backend starts sleeping between them.
const EAGER_PROBES: u32 = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdleOptions {
    /// Run anyway once this much time has passed.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleBackend {
    Idle,
    Timer,
}

impl IdleBackend {
    /// `Idle` on a multi-thread runtime (which exposes its queue depth); `Timer` otherwise.
    #[must_use]
    pub fn detect(handle: &Handle) -> Self {
        match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => Self::Idle,
            _ => Self::Timer,
        }
    }

    /// Resolve a configured choice (`idle`, `timer`, or `auto`) against `handle`.
    #[must_use]
    pub fn from_choice(choice: &str, handle: &Handle) -> Self {
        match choice.trim().to_ascii_lowercase().as_str() {
            "idle" => Self::Idle,
            "timer" => Self::Timer,
            "auto" | "" => Self::detect(handle),
            other => {
                tracing::warn!(choice = other, "Unknown idle backend, detecting");
                Self::detect(handle)
            }
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Timer => "timer",
        }
    }
}

/// Token for one scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdleHandle(u64);

#[derive(Debug)]
pub struct IdleScheduler {
    backend: IdleBackend,
    runtime: Handle,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, AbortHandle>>>,
}

impl IdleScheduler {
    /// Scheduler on the current runtime with an explicit backend.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn new(backend: IdleBackend) -> Self {
        Self::with_handle(backend, Handle::current())
    }

    /// Scheduler on the current runtime with the backend it supports best.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn detect() -> Self {
        let runtime = Handle::current();
        Self::with_handle(IdleBackend::detect(&runtime), runtime)
    }

    #[must_use]
    pub fn with_handle(backend: IdleBackend, runtime: Handle) -> Self {
        tracing::debug!(backend = backend.as_str(), "Idle scheduler ready");
        Self {
            backend,
            runtime,
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub const fn backend(&self) -> IdleBackend {
        self.backend
    }

    /// Defer `callback` until the runtime is idle (or the timer fires).
    pub fn schedule<F>(&self, callback: F, options: IdleOptions) -> IdleHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let backend = self.backend;
        let runtime = self.runtime.clone();
        let pending = Arc::clone(&self.pending);

        // Held across spawn so a fast task cannot deregister before it is registered.
        let mut table = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let task = self.runtime.spawn(async move {
            match backend {
                IdleBackend::Idle => wait_for_idle(&runtime, options.timeout).await,
                IdleBackend::Timer => tokio::time::sleep(TIMER_DELAY).await,
            }
            pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            callback();
        });
        table.insert(id, task.abort_handle());
        IdleHandle(id)
    }

    /// Cancel a callback that has not run yet. Returns whether anything was cancelled.
    pub fn cancel(&self, handle: IdleHandle) -> bool {
        let task = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0);
        match task {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

async fn wait_for_idle(runtime: &Handle, timeout: Option<Duration>) {
    let drained = async {
        let mut probes = 0u32;
        while runtime.metrics().global_queue_depth() > 0 {
            if probes < EAGER_PROBES {
                probes += 1;
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(TIMER_DELAY).await;
            }
        }
    };

    match timeout {
        Some(limit) => {
            if tokio::time::timeout(limit, drained).await.is_err() {
                tracing::debug!(timeout_ms = limit.as_millis(), "Idle wait timed out");
            }
        }
        None => drained.await,
    }
}
