use crossbeam::channel::bounded;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::aggregate::{Aggregator, GlobalCount, PartialCount};
use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::pool::WorkerPool;
use crate::rank::{top_n, RankedEntry};
use crate::reader::{ChunkReader, MalformedPolicy};
use crate::record::RecordSource;

/// Handle for stopping a run from another thread.
///
/// Cancellation stops the reader, unblocks a producer stuck in the
/// submit path, lets workers finish the batch in hand, and makes the run
/// return [`PipelineError::Cancelled`] instead of a result.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Builder for configuring a pipeline.
///
/// Defaults match the batch-size, key-column and result-count constants of
/// the classic CSV aggregation setup: 4 workers, 500-record batches, key
/// column 1, top 10.
pub struct PipelineBuilder {
    workers: usize,
    batch_size: usize,
    queue_capacity: Option<usize>,
    key_column: usize,
    top_n: usize,
    malformed: MalformedPolicy,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            workers: 4,
            batch_size: 500,
            queue_capacity: None,
            key_column: 1,
            top_n: 10,
            malformed: MalformedPolicy::default(),
        }
    }

    /// Number of parallel workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Records per batch
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Pending-batch queue depth; defaults to twice the worker count
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Zero-based index of the aggregation key column
    pub fn key_column(mut self, column: usize) -> Self {
        self.key_column = column;
        self
    }

    /// How many ranked entries a run returns
    pub fn top_n(mut self, n: usize) -> Self {
        self.top_n = n;
        self
    }

    /// Policy for records missing the key column
    pub fn malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.malformed = policy;
        self
    }

    /// Validate the configuration and build the pipeline.
    ///
    /// Configuration errors are rejected here, never surfaced mid-run.
    pub fn build(self) -> Result<Pipeline> {
        if self.workers == 0 {
            return Err(PipelineError::Config(
                "worker count must be positive".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch size must be positive".into()));
        }
        if self.top_n == 0 {
            return Err(PipelineError::Config(
                "result count must be positive".into(),
            ));
        }
        if self.queue_capacity == Some(0) {
            return Err(PipelineError::Config(
                "queue capacity must be positive".into(),
            ));
        }

        Ok(Pipeline {
            workers: self.workers,
            batch_size: self.batch_size,
            queue_capacity: self.queue_capacity.unwrap_or(self.workers * 2),
            key_column: self.key_column,
            top_n: self.top_n,
            malformed: self.malformed,
            metrics: PipelineMetrics::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured aggregation pipeline: chunked ingestion, bounded worker
/// fan-out, single-consumer fan-in, deterministic ranking.
///
/// A pipeline runs exactly once; [`run`] consumes it. Grab the
/// [`CancelToken`] and a [`PipelineMetrics`] handle before running if you
/// need them afterwards.
///
/// [`run`]: Pipeline::run
pub struct Pipeline {
    workers: usize,
    batch_size: usize,
    queue_capacity: usize,
    key_column: usize,
    top_n: usize,
    malformed: MalformedPolicy,
    metrics: PipelineMetrics,
    cancel: Arc<AtomicBool>,
}

impl Pipeline {
    /// Token that cancels this pipeline's run
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            flag: Arc::clone(&self.cancel),
        }
    }

    /// Handle on the run's counters; stays valid after the run finishes
    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.clone()
    }

    /// Run the pipeline over `source` and return the top-N ranked entries
    pub fn run<S: RecordSource>(self, source: S) -> Result<Vec<RankedEntry>> {
        let n = self.top_n;
        let global = self.run_counts(source)?;
        Ok(top_n(&global, n))
    }

    /// Run the pipeline over `source` and return the full frequency map
    pub fn run_counts<S: RecordSource>(self, source: S) -> Result<GlobalCount> {
        debug!(
            "starting pipeline: {} workers, batch size {}, queue {}, key column {}",
            self.workers, self.batch_size, self.queue_capacity, self.key_column
        );

        // fan-in channel; the aggregator drains it until every worker-held
        // sender is gone, so a reporting worker can never deadlock
        let (partial_tx, partial_rx) = bounded::<PartialCount>(self.workers * 2);

        let agg_metrics = self.metrics.clone();
        let aggregator = thread::spawn(move || {
            let mut agg = Aggregator::new();
            while let Ok(partial) = partial_rx.recv() {
                agg.merge(partial);
                agg_metrics.record_merge();
            }
            agg.finalize()
        });

        let mut pool = WorkerPool::start(
            self.workers,
            self.queue_capacity,
            self.key_column,
            partial_tx,
            Arc::clone(&self.cancel),
            self.metrics.clone(),
        );

        let mut reader =
            ChunkReader::new(source, self.batch_size, self.key_column, self.malformed);

        // single producer path: sequential reads cannot be parallelized
        // without breaking order within a batch
        let read_result: Result<()> = loop {
            if self.cancel.load(Ordering::Relaxed) {
                break Err(PipelineError::Cancelled);
            }
            match reader.next_batch() {
                Ok(Some(batch)) => {
                    if let Err(e) = pool.submit(batch) {
                        break Err(e);
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.metrics.add_records_read(reader.records_read());
        self.metrics.add_records_malformed(reader.malformed_skipped());

        // drain in-flight work and join everything before deciding the
        // outcome, so an error path leaks no threads
        let close_result = pool.close();
        let global = aggregator
            .join()
            .map_err(|_| PipelineError::Thread("aggregator panicked".into()))?;

        read_result?;
        close_result?;

        info!(
            "pipeline finished: {} records, {} distinct keys, {} batches",
            global.total(),
            global.distinct(),
            self.metrics.batches_processed()
        );
        Ok(global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_are_valid() {
        assert!(PipelineBuilder::new().build().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            PipelineBuilder::new().workers(0).build(),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            PipelineBuilder::new().batch_size(0).build(),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_zero_top_n_rejected() {
        assert!(matches!(
            PipelineBuilder::new().top_n(0).build(),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        assert!(matches!(
            PipelineBuilder::new().queue_capacity(0).build(),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_cancel_token_observes_cancellation() {
        let pipeline = PipelineBuilder::new().build().unwrap();
        let token = pipeline.cancel_token();
        assert!(!token.is_cancelled());
        token.clone().cancel();
        assert!(token.is_cancelled());
    }
}
