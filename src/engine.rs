// Flow collection engine: enabled/disabled state machine plus the per-port rate sampler.
//
// The counter table and all rule side effects share one write lock, so a collection
// pass never observes a table that is half-reset, and transitions never interleave
// with a pass. The enabled flag is read lock-free by the scheduler.

use crate::accounting_repo::AccountingRepo;
use crate::models::{CollectionState, Direction, PortCounter, RateSample};
use crate::pipeline::CommandRunner;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::{info, instrument, warn};

pub struct FlowEngine<R> {
    repo: AccountingRepo<R>,
    ports: Vec<u16>,
    interval_secs: u64,
    enabled: AtomicBool,
    /// Set by the first enable or collection pass; never cleared.
    initialized: AtomicBool,
    /// True while accounting rules are installed.
    provisioned: AtomicBool,
    last_timestamp: AtomicI64,
    counters: RwLock<Vec<PortCounter>>,
}

impl<R: CommandRunner> FlowEngine<R> {
    /// Builds a disabled engine for `ports`. Port 0 and duplicates are dropped;
    /// an interval below one second is raised to one second.
    pub fn new(repo: AccountingRepo<R>, ports: &[u16], interval_secs: u64) -> Self {
        let mut tracked: Vec<u16> = Vec::with_capacity(ports.len());
        for &port in ports {
            if port == 0 {
                warn!(port, "ignoring non-positive port");
                continue;
            }
            if !tracked.contains(&port) {
                tracked.push(port);
            }
        }
        let counters = tracked.iter().copied().map(PortCounter::new).collect();
        Self {
            repo,
            ports: tracked,
            interval_secs: interval_secs.max(1),
            enabled: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            provisioned: AtomicBool::new(false),
            last_timestamp: AtomicI64::new(i64::MIN),
            counters: RwLock::new(counters),
        }
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Lock-free fast path for the scheduler.
    pub fn is_closed(&self) -> bool {
        !self.enabled.load(Ordering::Acquire)
    }

    pub fn state(&self) -> CollectionState {
        if self.is_closed() {
            CollectionState::Disabled
        } else {
            CollectionState::Enabled
        }
    }

    /// Copy of the current counter table.
    pub async fn snapshot(&self) -> Vec<PortCounter> {
        self.counters.read().await.clone()
    }

    /// Disabled -> Enabled: reinstalls accounting rules and zeroes the counter table.
    /// Returns false (and does nothing) when already enabled.
    #[instrument(skip(self), fields(operation = "enable"))]
    pub async fn enable(&self) -> bool {
        if !self.is_closed() {
            return false;
        }
        let mut counters = self.counters.write().await;
        if self
            .enabled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        info!(ports = ?self.ports, "flow collection enabled");
        self.initialized.store(true, Ordering::Release);
        self.install_locked().await;
        counters.iter_mut().for_each(PortCounter::reset);
        true
    }

    /// Enabled -> Disabled: removes accounting rules and zeroes the counter table so a
    /// later enable does not compute a delta against stale cumulative values.
    #[instrument(skip(self), fields(operation = "disable"))]
    pub async fn disable(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut counters = self.counters.write().await;
        if self
            .enabled
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        info!("flow collection disabled");
        self.remove_locked().await;
        counters.iter_mut().for_each(PortCounter::reset);
        true
    }

    /// Installs accounting rules the first time it is called on this engine. Later calls,
    /// including after a disable, leave rules alone.
    pub async fn ensure_initialized(&self) {
        if self.initialized.load(Ordering::Acquire) {
            return;
        }
        let _counters = self.counters.write().await;
        self.initialize_locked().await;
    }

    /// One collection pass over all tracked ports, regardless of state. Only the very
    /// first pass may install rules; a disabled engine is never re-provisioned here.
    /// Returns the aggregate (inbound, outbound) bytes/sec.
    pub async fn collect(&self) -> (i64, i64) {
        let mut counters = self.counters.write().await;
        self.initialize_locked().await;
        self.sample_locked(&mut counters).await
    }

    /// Collection pass for the scheduler: `None` when collection is disabled at the
    /// time the lock is acquired.
    pub async fn collect_sample(&self) -> Option<RateSample> {
        let mut counters = self.counters.write().await;
        if self.is_closed() {
            return None;
        }
        self.initialize_locked().await;
        let (in_bytes, out_bytes) = self.sample_locked(&mut counters).await;
        let timestamp = not_before(
            self.last_timestamp.load(Ordering::Acquire),
            chrono::Utc::now().timestamp(),
        );
        self.last_timestamp.store(timestamp, Ordering::Release);
        Some(RateSample {
            in_bytes,
            out_bytes,
            timestamp,
        })
    }

    /// Disables collection and removes any installed rules, including rules a disabled
    /// engine provisioned through its first collection pass.
    pub async fn shutdown(&self) {
        info!("shutdown netflow");
        let mut counters = self.counters.write().await;
        self.enabled.store(false, Ordering::Release);
        self.remove_locked().await;
        counters.iter_mut().for_each(PortCounter::reset);
    }

    // Caller holds the counters write lock.
    async fn initialize_locked(&self) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }
        self.install_locked().await;
    }

    // Caller holds the counters write lock.
    async fn install_locked(&self) {
        self.repo.install_rules(&self.ports).await;
        self.provisioned.store(true, Ordering::Release);
    }

    // Caller holds the counters write lock.
    async fn remove_locked(&self) {
        if self.provisioned.swap(false, Ordering::AcqRel) {
            self.repo.remove_rules(&self.ports).await;
        }
    }

    // Caller holds the counters write lock.
    async fn sample_locked(&self, counters: &mut [PortCounter]) -> (i64, i64) {
        let mut total_in: i64 = 0;
        let mut total_out: i64 = 0;
        for counter in counters.iter_mut() {
            if counter.port == 0 {
                continue;
            }
            match self.repo.read_counter(counter.port, Direction::Inbound).await {
                Ok(current) => {
                    total_in = total_in
                        .saturating_add(per_second(counter.in_bytes, current, self.interval_secs));
                    counter.in_bytes = current;
                }
                Err(e) => warn!(port = counter.port, direction = "inbound", error = %e, "counter read failed"),
            }
            match self.repo.read_counter(counter.port, Direction::Outbound).await {
                Ok(current) => {
                    total_out = total_out
                        .saturating_add(per_second(counter.out_bytes, current, self.interval_secs));
                    counter.out_bytes = current;
                }
                Err(e) => warn!(port = counter.port, direction = "outbound", error = %e, "counter read failed"),
            }
        }
        (total_in, total_out)
    }
}

/// Bytes/sec between two cumulative readings. A counter that went backwards
/// (reset, wrap, rule reinstall) contributes 0.
pub fn per_second(previous: i64, current: i64, interval_secs: u64) -> i64 {
    let secs = i64::try_from(interval_secs.max(1)).unwrap_or(i64::MAX);
    (current.saturating_sub(previous) / secs).max(0)
}

/// Sample timestamp that never goes backwards, even if the wall clock is stepped back.
fn not_before(previous: i64, now: i64) -> i64 {
    now.max(previous)
}
