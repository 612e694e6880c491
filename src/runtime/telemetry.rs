use crate::pipeline::reorder::ReorderBuffer;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

const DEFAULT_LOG_DIRECTIVE: &str = "warn";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a stderr tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `warn`.
/// Stdout is reserved for result lines, so diagnostics never go there.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
///
/// These are observability only; termination is decided by the reorder buffer's own counters.
#[derive(Default, Debug)]
pub struct Telemetry {
    submitted: AtomicU64,
    emitted: AtomicU64,
    probe_failures: AtomicU64,
    probe_timeouts: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Telemetry {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emitted(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.emitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_probe_failure(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_timeout(&self) {
        self.probe_timeouts.fetch_add(1, Ordering::Relaxed);
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks a probe as in flight until the returned guard is dropped.
    pub fn enter_probe(self: &Arc<Self>) -> InFlightGuard {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        InFlightGuard {
            telemetry: Arc::clone(self),
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            probe_timeouts: self.probe_timeouts.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
        }
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

pub struct InFlightGuard {
    telemetry: Arc<Telemetry>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.telemetry.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub submitted: u64,
    pub emitted: u64,
    pub probe_failures: u64,
    pub probe_timeouts: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

/// Spawns a background task that periodically logs throughput, reorder backlog, and failures.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    buffer: Arc<ReorderBuffer>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(target: "headcheck::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let emitted_delta = current_snapshot
                        .emitted
                        .saturating_sub(last_snapshot.emitted);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        emitted_delta as f64 / elapsed
                    };
                    let held = buffer.held().await;
                    let outstanding = buffer.outstanding().await;

                    tracing::debug!(
                        target: "headcheck::metrics",
                        throughput = format!("{throughput:.2}"),
                        submitted = current_snapshot.submitted,
                        emitted = current_snapshot.emitted,
                        held,
                        outstanding,
                        in_flight = current_snapshot.in_flight,
                        probe_failures = current_snapshot.probe_failures,
                        probe_timeouts = current_snapshot.probe_timeouts,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
