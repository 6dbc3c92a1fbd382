//! Runtime performance helpers.
//!
//! - [`PerfMonitor`] - named start/end marks, logged by [`TimingTier`]
//! - [`measure_fps`] - frame counting over a window from any [`FrameSource`]
//! - [`get_memory_usage`] - process and host memory in megabytes
//! - [`debounce`] / [`throttle`] - rate-limited wrappers around a callback
//! - [`IdleScheduler`] - deferred callbacks on an idle or timer backend
//!
//! Everything time-based runs on Tokio, so paused-clock tests drive it deterministically.

pub mod fps;
pub mod idle;
pub mod memory;
pub mod monitor;
pub mod rate_limit;

pub use fps::{FrameClock, FrameSource, measure_fps};
pub use idle::{IdleBackend, IdleHandle, IdleOptions, IdleScheduler};
pub use memory::{MemoryUsage, get_memory_usage, log_memory_usage};
pub use monitor::{FAST_THRESHOLD, PerfMonitor, SLOW_THRESHOLD, TimingTier, perf_monitor};
pub use rate_limit::{Debounced, Throttled, debounce, throttle};
