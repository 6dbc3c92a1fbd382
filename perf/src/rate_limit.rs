//! Debounce and throttle wrappers.
//!
//! Each wrapper owns its timer state. Clones of a wrapper share that state; two wrappers
//! built from separate `debounce`/`throttle` calls never do. Timers are Tokio tasks, so
//! `call` must run inside a Tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

type Callback<A> = Box<dyn Fn(A) + Send + Sync>;

struct DebounceState<A> {
    func: Callback<A>,
    wait: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

/// Runs the wrapped function only after `wait` has passed without another call.
pub struct Debounced<A> {
    state: Arc<DebounceState<A>>,
}

impl<A> Clone for Debounced<A> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<A> std::fmt::Debug for Debounced<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debounced")
            .field("wait", &self.state.wait)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

/// Wrap `func` so that only the last call in any `wait` window runs, with its arguments.
pub fn debounce<A, F>(func: F, wait: Duration) -> Debounced<A>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    Debounced {
        state: Arc::new(DebounceState {
            func: Box::new(func),
            wait,
            pending: Mutex::new(None),
        }),
    }
}

impl<A: Send + 'static> Debounced<A> {
    /// Cancel any scheduled run and schedule `args` for `wait` from now.
    pub fn call(&self, args: A) {
        let state = Arc::clone(&self.state);
        let mut pending = self.state.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(state.wait).await;
            (state.func)(args);
        }));
    }
}

impl<A> Debounced<A> {
    /// Drop the scheduled run, if any.
    pub fn cancel(&self) {
        if let Some(previous) = self
            .state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            previous.abort();
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

struct ThrottleState<A> {
    func: Callback<A>,
    limit: Duration,
    cooling: AtomicBool,
}

/// Runs the leading call of each `limit` window and drops the rest.
pub struct Throttled<A> {
    state: Arc<ThrottleState<A>>,
}

impl<A> Clone for Throttled<A> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<A> std::fmt::Debug for Throttled<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttled")
            .field("limit", &self.state.limit)
            .field("cooling", &self.is_cooling())
            .finish_non_exhaustive()
    }
}

/// Wrap `func` so it runs at most once per `limit`, on the leading edge.
pub fn throttle<A, F>(func: F, limit: Duration) -> Throttled<A>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    Throttled {
        state: Arc::new(ThrottleState {
            func: Box::new(func),
            limit,
            cooling: AtomicBool::new(false),
        }),
    }
}

impl<A: Send + 'static> Throttled<A> {
    /// Run now unless a cooldown is active. Returns whether the call ran.
    pub fn call(&self, args: A) -> bool {
        if self
            .state
            .cooling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Cooldown is armed before the callback runs, so a panic still reopens it.
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(state.limit).await;
            state.cooling.store(false, Ordering::Release);
        });

        (self.state.func)(args);
        true
    }
}

impl<A> Throttled<A> {
    #[must_use]
    pub fn is_cooling(&self) -> bool {
        self.state.cooling.load(Ordering::Acquire)
    }
}
