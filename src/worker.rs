// Fixed-interval collection loop and the consumer draining the outbound sample queue.
// Queue-full policy is drop-newest: a sample that does not fit is discarded and counted.

use crate::engine::FlowEngine;
use crate::models::RateSample;
use crate::pipeline::CommandRunner;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time::{Duration, interval};
use tracing::Instrument;

/// Latest sample seen by the consumer, shared with the HTTP routes.
pub type LatestSample = Arc<RwLock<Option<RateSample>>>;

/// Counters reported in the periodic "app stats" log line.
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub samples_published_total: AtomicU64,
    pub samples_dropped_total: AtomicU64,
    pub ticks_skipped_total: AtomicU64,
}

/// Engine, queue and shutdown for the collection loop.
pub struct WorkerDeps<R> {
    pub engine: Arc<FlowEngine<R>>,
    pub sample_tx: mpsc::Sender<RateSample>,
    pub stats: Arc<WorkerStats>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Collection cadence comes from the engine; this only covers logging.
pub struct WorkerConfig {
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Spawns the collection loop. Ticks while disabled are skipped without touching the
/// engine's lock; each completed pass is pushed onto the queue without blocking.
pub fn spawn<R: CommandRunner + 'static>(
    deps: WorkerDeps<R>,
    config: WorkerConfig,
) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        engine,
        sample_tx,
        stats,
        mut shutdown_rx,
    } = deps;
    let stats_log_interval = Duration::from_secs(config.stats_log_interval_secs);
    let interval_secs = engine.interval().as_secs();
    let worker_span = tracing::span!(tracing::Level::DEBUG, "worker", interval_secs);

    tokio::spawn(
        async move {
            let mut tick = interval(engine.interval());
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut stats_log_tick = interval(stats_log_interval);
            stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if engine.is_closed() {
                            tracing::debug!("flow collect is closed");
                            stats.ticks_skipped_total.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                        let Some(sample) = engine.collect_sample().await else {
                            stats.ticks_skipped_total.fetch_add(1, Ordering::Relaxed);
                            continue;
                        };
                        match sample_tx.try_send(sample) {
                            Ok(()) => {
                                stats.samples_published_total.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(TrySendError::Full(sample)) => {
                                stats.samples_dropped_total.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(
                                    operation = "publish_sample",
                                    %sample,
                                    "sample queue full; dropping newest sample"
                                );
                            }
                            Err(TrySendError::Closed(_)) => {
                                tracing::debug!("Sample queue closed");
                                break;
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Worker shutting down");
                        break;
                    }
                    _ = stats_log_tick.tick() => {
                        tracing::info!(
                            state = ?engine.state(),
                            samples_published_total = stats.samples_published_total.load(Ordering::Relaxed),
                            samples_dropped_total = stats.samples_dropped_total.load(Ordering::Relaxed),
                            ticks_skipped_total = stats.ticks_skipped_total.load(Ordering::Relaxed),
                            "app stats"
                        );
                    }
                }
            }
        }
        .instrument(worker_span),
    )
}

/// Spawns the consumer: logs every sample and keeps the latest one.
/// Exits once every sender is dropped and the queue is drained.
pub fn spawn_sample_consumer(
    mut sample_rx: mpsc::Receiver<RateSample>,
    latest: LatestSample,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(sample) = sample_rx.recv().await {
            tracing::info!(
                in_bytes = sample.in_bytes,
                out_bytes = sample.out_bytes,
                timestamp = sample.timestamp,
                "receive a flow"
            );
            *latest.write().await = Some(sample);
        }
        tracing::debug!("Sample consumer shutting down");
    })
}
