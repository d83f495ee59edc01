use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window of per-batch processing times with percentile queries
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: Arc<Mutex<VecDeque<u64>>>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Record one measurement in nanoseconds
    pub fn record(&self, nanos: u64) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(nanos);
    }

    /// Percentile of the current window, in microseconds
    pub fn percentile_us(&self, p: f64) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 * p).ceil() as usize).saturating_sub(1);
        sorted[idx] as f64 / 1000.0
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }
}

/// Counters for one pipeline run, shared across the reader, pool and
/// aggregator threads. Cheap to clone; clones observe the same counters.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    records_read: Arc<AtomicU64>,
    records_malformed: Arc<AtomicU64>,
    batches_dispatched: Arc<AtomicU64>,
    batches_processed: Arc<AtomicU64>,
    merges: Arc<AtomicU64>,
    batch_latency: LatencyWindow,
    start: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            records_read: Arc::new(AtomicU64::new(0)),
            records_malformed: Arc::new(AtomicU64::new(0)),
            batches_dispatched: Arc::new(AtomicU64::new(0)),
            batches_processed: Arc::new(AtomicU64::new(0)),
            merges: Arc::new(AtomicU64::new(0)),
            batch_latency: LatencyWindow::new(1000),
            start: Instant::now(),
        }
    }

    pub fn add_records_read(&self, n: u64) {
        self.records_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_records_malformed(&self, n: u64) {
        self.records_malformed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_batch_dispatched(&self) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_processed(&self) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merge(&self) {
        self.merges.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long one batch took to tally, in nanoseconds
    pub fn record_batch_latency(&self, nanos: u64) {
        self.batch_latency.record(nanos);
    }

    pub fn records_read(&self) -> u64 {
        self.records_read.load(Ordering::Relaxed)
    }

    pub fn records_malformed(&self) -> u64 {
        self.records_malformed.load(Ordering::Relaxed)
    }

    pub fn batches_dispatched(&self) -> u64 {
        self.batches_dispatched.load(Ordering::Relaxed)
    }

    pub fn batches_processed(&self) -> u64 {
        self.batches_processed.load(Ordering::Relaxed)
    }

    pub fn merges(&self) -> u64 {
        self.merges.load(Ordering::Relaxed)
    }

    /// Records per second since the metrics were created
    pub fn throughput_rps(&self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.records_read() as f64 / elapsed
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_read: self.records_read(),
            records_malformed: self.records_malformed(),
            batches_dispatched: self.batches_dispatched(),
            batches_processed: self.batches_processed(),
            merges: self.merges(),
            throughput_rps: self.throughput_rps(),
            batch_p50_us: self.batch_latency.percentile_us(0.50),
            batch_p95_us: self.batch_latency.percentile_us(0.95),
            batch_p99_us: self.batch_latency.percentile_us(0.99),
            elapsed: self.start.elapsed(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time view of the pipeline counters
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub records_read: u64,
    pub records_malformed: u64,
    pub batches_dispatched: u64,
    pub batches_processed: u64,
    pub merges: u64,
    pub throughput_rps: f64,
    pub batch_p50_us: f64,
    pub batch_p95_us: f64,
    pub batch_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format as a single human-readable line
    pub fn format(&self) -> String {
        format!(
            "Records: {} ({} malformed), Batches: {}/{}, Merges: {}, \
             Throughput: {:.0} rec/s, Batch P50: {:.2}µs, P95: {:.2}µs, \
             P99: {:.2}µs, Elapsed: {:.2}s",
            self.records_read,
            self.records_malformed,
            self.batches_processed,
            self.batches_dispatched,
            self.merges,
            self.throughput_rps,
            self.batch_p50_us,
            self.batch_p95_us,
            self.batch_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}
