// Worker tests: scheduler cadence, disabled ticks, queue-full policy, consumer

mod common;

use common::engine_with;
use netflow::models::{Direction, RateSample};
use netflow::worker::{
    LatestSample, WorkerConfig, WorkerDeps, WorkerStats, spawn, spawn_sample_consumer,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time::{Duration, sleep};

const CONFIG: WorkerConfig = WorkerConfig {
    stats_log_interval_secs: 3600,
};

#[tokio::test(start_paused = true)]
async fn disabled_engine_publishes_nothing() {
    let (engine, fake) = engine_with(&[8080], 1);
    let (tx, mut rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let stats = Arc::new(WorkerStats::default());

    let handle = spawn(
        WorkerDeps {
            engine,
            sample_tx: tx,
            stats: stats.clone(),
            shutdown_rx,
        },
        CONFIG,
    );
    sleep(Duration::from_secs(10)).await;
    let _ = shutdown_tx.send(());
    handle.await.unwrap();

    assert!(rx.recv().await.is_none());
    assert!(stats.ticks_skipped_total.load(Ordering::Relaxed) >= 10);
    assert_eq!(stats.samples_published_total.load(Ordering::Relaxed), 0);
    assert!(fake.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn enabled_engine_publishes_one_sample_per_tick() {
    let (engine, fake) = engine_with(&[8080], 1);
    engine.enable().await;
    fake.set_counter(8080, Direction::Inbound, 100);
    let (tx, mut rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let stats = Arc::new(WorkerStats::default());

    let handle = spawn(
        WorkerDeps {
            engine,
            sample_tx: tx,
            stats: stats.clone(),
            shutdown_rx,
        },
        CONFIG,
    );
    sleep(Duration::from_millis(2500)).await;
    let _ = shutdown_tx.send(());
    handle.await.unwrap();

    let mut samples = Vec::new();
    while let Some(s) = rx.recv().await {
        samples.push(s);
    }
    // Ticks at t = 0s, 1s, 2s.
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].in_bytes, 100);
    assert_eq!(samples[1].in_bytes, 0);
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(stats.samples_published_total.load(Ordering::Relaxed), 3);
}

#[tokio::test(start_paused = true)]
async fn full_queue_drops_newest_samples() {
    let (engine, _fake) = engine_with(&[8080], 1);
    engine.enable().await;
    let (tx, mut rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let stats = Arc::new(WorkerStats::default());

    let handle = spawn(
        WorkerDeps {
            engine,
            sample_tx: tx,
            stats: stats.clone(),
            shutdown_rx,
        },
        CONFIG,
    );
    sleep(Duration::from_millis(3500)).await;
    let _ = shutdown_tx.send(());
    handle.await.unwrap();

    assert_eq!(stats.samples_published_total.load(Ordering::Relaxed), 1);
    assert_eq!(stats.samples_dropped_total.load(Ordering::Relaxed), 3);
    assert!(rx.recv().await.is_some());
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn consumer_keeps_latest_sample_and_exits_when_queue_closes() {
    let (tx, rx) = mpsc::channel(4);
    let latest: LatestSample = Arc::new(RwLock::new(None));
    let handle = spawn_sample_consumer(rx, latest.clone());

    for ts in 1..=3 {
        tx.send(RateSample {
            in_bytes: ts * 10,
            out_bytes: ts,
            timestamp: ts,
        })
        .await
        .unwrap();
    }
    drop(tx);
    handle.await.unwrap();

    let last = latest.read().await.clone().expect("latest sample recorded");
    assert_eq!(last.timestamp, 3);
    assert_eq!(last.in_bytes, 30);
}
