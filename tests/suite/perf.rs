//! Perf helpers driven from a multi-thread runtime, as the binary runs them

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use atelier_perf::{
    FrameClock, IdleBackend, IdleOptions, IdleScheduler, PerfMonitor, debounce, measure_fps,
    throttle,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configured_backends_both_run_callbacks() {
    let handle = tokio::runtime::Handle::current();
    for choice in ["idle", "timer", "auto"] {
        let scheduler =
            IdleScheduler::with_handle(IdleBackend::from_choice(choice, &handle), handle.clone());
        let (tx, rx) = tokio::sync::oneshot::channel();
        scheduler.schedule(
            move || {
                let _ = tx.send(());
            },
            IdleOptions {
                timeout: Some(Duration::from_millis(100)),
            },
        );
        tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .unwrap_or_else(|_| panic!("{choice} backend ran"))
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn debounce_and_throttle_on_real_clock() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let debounced = debounce(
        move |_: ()| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        Duration::from_millis(30),
    );
    for _ in 0..3 {
        debounced.call(());
    }
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let throttled = throttle(
        move |_: ()| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        Duration::from_secs(10),
    );
    assert!(throttled.call(()));
    assert!(!throttled.call(()));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fps_and_timing_on_real_clock() {
    let monitor = PerfMonitor::new();
    monitor.start("fps");
    let fps = measure_fps(&mut FrameClock::new(200), Duration::from_millis(100)).await;
    let elapsed = monitor.end_with("fps", false);

    assert!(fps > 0.0);
    assert!(elapsed >= Duration::from_millis(100));
}
