//! Prometheus metrics for monitoring
//!
//! Counters, gauges, and latency histograms for generation throughput and
//! worker call health, exported in Prometheus text format over HTTP.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::runtime::ShutdownSignal;

/// Upper bounds (seconds) of the latency buckets
const LATENCY_BOUNDS: [f64; 12] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Anything that can write itself in exposition format
pub trait Exposition {
    fn render(&self, out: &mut String);
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

/// Monotonically increasing count
pub struct Counter {
    name: &'static str,
    help: &'static str,
    value: AtomicU64,
}

impl Counter {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Exposition for Counter {
    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "counter");
        let _ = writeln!(out, "{} {}", self.name, self.get());
    }
}

/// Value that moves both ways
pub struct Gauge {
    name: &'static str,
    help: &'static str,
    value: AtomicI64,
}

impl Gauge {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicI64::new(0),
        }
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Exposition for Gauge {
    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "gauge");
        let _ = writeln!(out, "{} {}", self.name, self.get());
    }
}

/// Latency distribution over [`LATENCY_BOUNDS`]
pub struct Histogram {
    name: &'static str,
    help: &'static str,
    buckets: [AtomicU64; LATENCY_BOUNDS.len()],
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            buckets: [const { AtomicU64::new(0) }; LATENCY_BOUNDS.len()],
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        for (bound, bucket) in LATENCY_BOUNDS.iter().zip(&self.buckets) {
            if secs <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Observe the time until the returned guard is dropped
    pub fn start_timer(&self) -> HistogramTimer<'_> {
        HistogramTimer {
            histogram: self,
            started: Instant::now(),
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Exposition for Histogram {
    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "histogram");
        for (bound, bucket) in LATENCY_BOUNDS.iter().zip(&self.buckets) {
            let _ = writeln!(
                out,
                "{}_bucket{{le=\"{}\"}} {}",
                self.name,
                bound,
                bucket.load(Ordering::Relaxed)
            );
        }
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", self.name, self.count());
        let sum = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(out, "{}_sum {}", self.name, sum);
        let _ = writeln!(out, "{}_count {}", self.name, self.count());
    }
}

/// Records into its histogram on drop
pub struct HistogramTimer<'a> {
    histogram: &'a Histogram,
    started: Instant,
}

impl Drop for HistogramTimer<'_> {
    fn drop(&mut self) {
        self.histogram.observe(self.started.elapsed());
    }
}

/// Standard lifegrid metrics
pub mod standard {
    use super::{Counter, Gauge, Histogram};

    pub static GENERATIONS: Counter =
        Counter::new("lifegrid_generations_total", "Generations merged by the broker");

    pub static WORKER_CALL_FAILURES: Counter = Counter::new(
        "lifegrid_worker_call_failures_total",
        "Worker evolve calls that failed or timed out",
    );

    pub static COMPLETED_TURNS: Gauge =
        Gauge::new("lifegrid_completed_turns", "Completed turns of the current run");

    pub static ALIVE_CELLS: Gauge =
        Gauge::new("lifegrid_alive_cells", "Alive cells at the last state query");

    pub static GENERATION_DURATION: Histogram = Histogram::new(
        "lifegrid_generation_duration_seconds",
        "Dispatch-to-merge latency per generation",
    );

    pub static EVOLVE_DURATION: Histogram = Histogram::new(
        "lifegrid_evolve_duration_seconds",
        "Band evolution latency inside a worker",
    );
}

/// Render every standard metric
pub fn gather_system_metrics() -> String {
    let metrics: [&dyn Exposition; 6] = [
        &standard::GENERATIONS,
        &standard::WORKER_CALL_FAILURES,
        &standard::COMPLETED_TURNS,
        &standard::ALIVE_CELLS,
        &standard::GENERATION_DURATION,
        &standard::EVOLVE_DURATION,
    ];
    let mut out = String::new();
    for metric in metrics {
        metric.render(&mut out);
    }
    out
}

/// Serve `/metrics` on `addr` until `shutdown` fires
pub async fn serve_metrics(addr: SocketAddr, shutdown: ShutdownSignal) -> std::io::Result<()> {
    let app = Router::new()
        .route("/metrics", get(|| async { gather_system_metrics() }))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}
