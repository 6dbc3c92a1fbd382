//! Frame-rate sampling.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Something that signals once per rendered frame.
pub trait FrameSource {
    /// Resolve when the next frame is presented.
    fn next_frame(&mut self) -> impl Future<Output = ()> + Send;
}

/// Fixed-rate frame ticks, standing in for a display's refresh signal.
#[derive(Debug)]
pub struct FrameClock {
    interval: Interval,
}

impl FrameClock {
    pub const DEFAULT_REFRESH_HZ: u32 = 60;

    /// Tick `refresh_hz` times per second. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(refresh_hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(refresh_hz.max(1)));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(Self::DEFAULT_REFRESH_HZ)
    }
}

impl FrameSource for FrameClock {
    async fn next_frame(&mut self) {
        self.interval.tick().await;
    }
}

/// Count frames from `source` until `window` has elapsed and return frames per second.
///
/// Resolves exactly once, after the first frame that lands at or past the window.
pub async fn measure_fps<S: FrameSource>(source: &mut S, window: Duration) -> f64 {
    let started = Instant::now();
    let mut frames: u64 = 0;

    loop {
        source.next_frame().await;
        frames += 1;
        let elapsed = started.elapsed();
        if elapsed >= window {
            let fps = if elapsed.is_zero() {
                0.0
            } else {
                frames as f64 / elapsed.as_secs_f64()
            };
            tracing::info!(fps, frames, "Average FPS: {fps:.2}");
            return fps;
        }
    }
}
