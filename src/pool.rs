use crossbeam::channel::{bounded, Receiver, Sender, SendTimeoutError};
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{spawn, JoinHandle};
use std::time::{Duration, Instant};

use crate::aggregate::PartialCount;
use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::reader::Batch;

/// How long a saturated `submit` waits before re-checking cancellation
const SUBMIT_POLL: Duration = Duration::from_millis(10);

/// Count key occurrences in one batch.
///
/// Records missing the key column produce nothing; the reader's policy keeps
/// them out of batches, so this is a guard, not a code path.
pub fn tally_batch(batch: &Batch, key_column: usize) -> PartialCount {
    let mut counts = PartialCount::with_capacity(batch.len().min(1024));
    for record in batch.records() {
        if let Some(key) = record.field(key_column) {
            *counts.entry(key.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// A bounded pool of worker threads that tally batches into partial counts.
///
/// Batches flow through a bounded queue: [`WorkerPool::submit`] blocks when
/// every worker is busy and the queue is full, which caps in-flight batches
/// at worker count + queue capacity. Each worker lives through
/// Idle → Busy → Idle cycles and reaches Stopped only after [`close`]
/// drains the queue (or cancellation discards it).
///
/// Completion is signaled downstream by dropping the partial-count senders:
/// once every worker has exited, the aggregator's receiver disconnects and
/// it knows no more partials will arrive.
///
/// [`close`]: WorkerPool::close
pub struct WorkerPool {
    batch_tx: Option<Sender<Batch>>,
    workers: Vec<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
    metrics: PipelineMetrics,
    worker_count: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    /// Spawn `worker_count` workers fed by a queue of `queue_capacity`.
    ///
    /// Each worker sends its partial counts through its own clone of
    /// `partial_tx`; the original passed in here is dropped, so the
    /// receiving side disconnects exactly when the last worker exits.
    pub fn start(
        worker_count: usize,
        queue_capacity: usize,
        key_column: usize,
        partial_tx: Sender<PartialCount>,
        cancel: Arc<AtomicBool>,
        metrics: PipelineMetrics,
    ) -> Self {
        let (batch_tx, batch_rx) = bounded::<Batch>(queue_capacity);

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let batch_rx = batch_rx.clone();
            let partial_tx = partial_tx.clone();
            let cancel = Arc::clone(&cancel);
            let metrics = metrics.clone();
            workers.push(spawn(move || {
                worker_loop(id, batch_rx, partial_tx, cancel, key_column, metrics)
            }));
        }

        Self {
            batch_tx: Some(batch_tx),
            workers,
            cancel,
            metrics,
            worker_count,
            queue_capacity,
        }
    }

    /// Hand a batch to the pool, blocking while the queue is full.
    ///
    /// This is the backpressure point: a producer faster than the workers
    /// parks here instead of growing memory. Cancellation unblocks it.
    pub fn submit(&self, mut batch: Batch) -> Result<()> {
        let tx = self
            .batch_tx
            .as_ref()
            .ok_or_else(|| PipelineError::Thread("pool is closed".into()))?;
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(PipelineError::Cancelled);
            }
            match tx.send_timeout(batch, SUBMIT_POLL) {
                Ok(()) => {
                    self.metrics.record_batch_dispatched();
                    return Ok(());
                }
                Err(SendTimeoutError::Timeout(b)) => batch = b,
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(PipelineError::Thread("all workers exited".into()));
                }
            }
        }
    }

    /// Non-blocking submit; hands the batch back when the queue is full
    pub fn try_submit(&self, batch: Batch) -> std::result::Result<(), Batch> {
        match &self.batch_tx {
            Some(tx) => match tx.try_send(batch) {
                Ok(()) => {
                    self.metrics.record_batch_dispatched();
                    Ok(())
                }
                Err(e) => Err(e.into_inner()),
            },
            None => Err(batch),
        }
    }

    /// Stop accepting batches, wait for the queue to drain and the workers
    /// to exit. Idempotent; a second call is a no-op.
    ///
    /// Every batch accepted before close is still processed (unless the
    /// pool was cancelled, in which case queued batches are discarded).
    pub fn close(&mut self) -> Result<()> {
        let Some(tx) = self.batch_tx.take() else {
            return Ok(());
        };
        drop(tx);

        let mut panicked = 0usize;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        debug!("worker pool closed ({} workers)", self.worker_count);
        if panicked > 0 {
            return Err(PipelineError::Thread(format!(
                "{} worker(s) panicked",
                panicked
            )));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Upper bound on batches submitted but not yet processed
    pub fn in_flight_bound(&self) -> usize {
        self.worker_count + self.queue_capacity
    }
}

fn worker_loop(
    id: usize,
    batch_rx: Receiver<Batch>,
    partial_tx: Sender<PartialCount>,
    cancel: Arc<AtomicBool>,
    key_column: usize,
    metrics: PipelineMetrics,
) {
    debug!("worker {} started", id);
    while let Ok(batch) = batch_rx.recv() {
        // a cancelled run publishes nothing, so queued batches are discarded;
        // the batch already in hand when the flag flips still completes
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let start = Instant::now();
        let partial = tally_batch(&batch, key_column);
        metrics.record_batch_latency(start.elapsed().as_nanos() as u64);
        metrics.record_batch_processed();
        trace!(
            "worker {} tallied batch {} ({} records, {} distinct keys)",
            id,
            batch.seq(),
            batch.len(),
            partial.len()
        );
        if partial_tx.send(partial).is_err() {
            // downstream stopped listening
            break;
        }
    }
    debug!("worker {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn batch_of(keys: &[&str], seq: u64) -> Batch {
        let records = keys
            .iter()
            .enumerate()
            .map(|(i, k)| Record::new(vec!["id".to_string(), k.to_string()], i as u64 + 1))
            .collect();
        Batch::new(seq, records)
    }

    #[test]
    fn test_tally_batch_counts_keys() {
        let partial = tally_batch(&batch_of(&["a", "b", "a"], 0), 1);
        assert_eq!(partial.get("a"), Some(&2));
        assert_eq!(partial.get("b"), Some(&1));
    }

    #[test]
    fn test_tally_batch_ignores_missing_column() {
        let batch = Batch::new(0, vec![Record::new(vec!["only".to_string()], 1)]);
        let partial = tally_batch(&batch, 1);
        assert!(partial.is_empty());
    }

    #[test]
    fn test_pool_processes_every_submitted_batch() {
        let (partial_tx, partial_rx) = bounded::<PartialCount>(64);
        let cancel = Arc::new(AtomicBool::new(false));
        let mut pool = WorkerPool::start(
            2,
            4,
            1,
            partial_tx,
            Arc::clone(&cancel),
            PipelineMetrics::new(),
        );

        for seq in 0..10 {
            pool.submit(batch_of(&["a", "b"], seq)).unwrap();
        }
        pool.close().unwrap();

        let mut total = 0u64;
        while let Ok(partial) = partial_rx.recv() {
            total += partial.values().sum::<u64>();
        }
        assert_eq!(total, 20);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (partial_tx, _partial_rx) = bounded::<PartialCount>(8);
        let cancel = Arc::new(AtomicBool::new(false));
        let mut pool =
            WorkerPool::start(1, 2, 1, partial_tx, Arc::clone(&cancel), PipelineMetrics::new());
        pool.close().unwrap();
        pool.close().unwrap();
    }

    #[test]
    fn test_try_submit_reports_full_queue() {
        // rendezvous partial channel with no receiver active: the single
        // worker tallies one batch and parks on the send, so the batch
        // queue (capacity 1) stays full and a third submit must bounce
        let (partial_tx, partial_rx) = bounded::<PartialCount>(0);
        let cancel = Arc::new(AtomicBool::new(false));
        let mut pool = WorkerPool::start(
            1,
            1,
            1,
            partial_tx,
            Arc::clone(&cancel),
            PipelineMetrics::new(),
        );

        pool.submit(batch_of(&["a"], 0)).unwrap();
        pool.submit(batch_of(&["b"], 1)).unwrap();

        // worker is parked, queue holds the second batch
        let rejected = pool.try_submit(batch_of(&["c"], 2));
        assert!(rejected.is_err());
        assert_eq!(rejected.unwrap_err().seq(), 2);
        assert_eq!(pool.in_flight_bound(), 2);

        // unblock the worker so close can join it
        drop(partial_rx);
        pool.close().unwrap();
    }

    #[test]
    fn test_cancel_discards_queued_batches() {
        let (partial_tx, partial_rx) = bounded::<PartialCount>(0);
        let cancel = Arc::new(AtomicBool::new(false));
        let mut pool = WorkerPool::start(
            1,
            1,
            1,
            partial_tx,
            Arc::clone(&cancel),
            PipelineMetrics::new(),
        );

        pool.submit(batch_of(&["a"], 0)).unwrap();
        pool.submit(batch_of(&["b"], 1)).unwrap();

        cancel.store(true, Ordering::Relaxed);
        assert!(matches!(
            pool.submit(batch_of(&["c"], 2)),
            Err(PipelineError::Cancelled)
        ));

        drop(partial_rx);
        pool.close().unwrap();
    }
}
