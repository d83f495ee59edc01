use log::debug;

use crate::error::{PipelineError, Result};
use crate::record::{Record, RecordSource};

/// What to do with a record too short to contain the key column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Count and drop the record, keep reading (default)
    Skip,
    /// Abort the run with [`PipelineError::MalformedRecord`]
    FailFast,
}

impl Default for MalformedPolicy {
    fn default() -> Self {
        MalformedPolicy::Skip
    }
}

/// An ordered group of records dispatched to one worker as a unit.
///
/// Owned exclusively by the reader until submitted, then by exactly one
/// worker. The sequence number is informational; batches may complete in
/// any order.
#[derive(Debug)]
pub struct Batch {
    seq: u64,
    records: Vec<Record>,
}

impl Batch {
    pub fn new(seq: u64, records: Vec<Record>) -> Self {
        Self { seq, records }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Pulls records from a [`RecordSource`] and groups them into fixed-capacity
/// batches, preserving source order.
///
/// Malformed records (fewer fields than the key column requires) are handled
/// here according to the configured policy, so workers only ever see records
/// whose key field exists. Every batch except possibly the last holds exactly
/// `capacity` records.
///
/// A read error discards any records buffered for the current batch and
/// propagates; the run fails as a whole, so no partial result survives it.
pub struct ChunkReader<S> {
    source: S,
    capacity: usize,
    key_column: usize,
    policy: MalformedPolicy,
    next_seq: u64,
    records_read: u64,
    malformed_skipped: u64,
    done: bool,
}

impl<S: RecordSource> ChunkReader<S> {
    pub fn new(source: S, capacity: usize, key_column: usize, policy: MalformedPolicy) -> Self {
        Self {
            source,
            capacity,
            key_column,
            policy,
            next_seq: 0,
            records_read: 0,
            malformed_skipped: 0,
            done: false,
        }
    }

    /// Read the next batch. `Ok(None)` means the source is exhausted; the
    /// final batch may be short.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.done {
            return Ok(None);
        }

        let mut records = Vec::with_capacity(self.capacity);
        while records.len() < self.capacity {
            match self.source.read_record() {
                Ok(Some(record)) => {
                    if record.field_count() <= self.key_column {
                        match self.policy {
                            MalformedPolicy::Skip => {
                                self.malformed_skipped += 1;
                                debug!(
                                    "skipping malformed record on line {} ({} fields)",
                                    record.line(),
                                    record.field_count()
                                );
                                continue;
                            }
                            MalformedPolicy::FailFast => {
                                self.done = true;
                                return Err(PipelineError::MalformedRecord {
                                    line: record.line(),
                                    fields: record.field_count(),
                                    column: self.key_column,
                                });
                            }
                        }
                    }
                    self.records_read += 1;
                    records.push(record);
                }
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            }
        }

        if records.is_empty() {
            return Ok(None);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(Some(Batch::new(seq, records)))
    }

    /// Valid records emitted so far (malformed ones excluded)
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Records dropped under the skip policy
    pub fn malformed_skipped(&self) -> u64 {
        self.malformed_skipped
    }
}
