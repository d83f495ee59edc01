//! A backpressure-aware concurrent aggregation pipeline for delimited text records.
//!
//! This crate ingests a stream of delimited records, counts occurrences of one
//! key column across a bounded pool of worker threads, and reports the top-N
//! keys with a deterministic tie-break.
//!
//! # Features
//!
//! - Chunked ingestion: records are grouped into fixed-size batches that are
//!   dispatched as whole units of work
//! - Bounded worker pool with backpressure: submission blocks when the pool
//!   is saturated instead of growing memory without limit
//! - Single-consumer fan-in: partial counts merge through one aggregator, so
//!   no count is lost or doubled
//! - Deterministic ranking: count descending, ties broken by ascending key
//! - Configurable malformed-record policy (skip or fail fast)
//! - Run-wide cancellation and per-run metrics
//!
//! # Example
//!
//! ```ignore
//! use tally_pipeline::{DelimitedReader, PipelineBuilder};
//!
//! let pipeline = PipelineBuilder::new()
//!     .workers(8)
//!     .batch_size(1000)
//!     .key_column(1)
//!     .top_n(10)
//!     .build()?;
//!
//! let source = DelimitedReader::new(std::io::BufReader::new(file));
//! for entry in pipeline.run(source)? {
//!     println!("{} {}", entry.key, entry.count);
//! }
//! ```

pub mod aggregate;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod rank;
pub mod reader;
pub mod record;

// Re-exports for convenience
pub use aggregate::{Aggregator, GlobalCount, PartialCount};
pub use error::{PipelineError, Result};
pub use metrics::{LatencyWindow, MetricsSnapshot, PipelineMetrics};
pub use pipeline::{CancelToken, Pipeline, PipelineBuilder};
pub use pool::WorkerPool;
pub use rank::{top_n, RankedEntry};
pub use reader::{Batch, ChunkReader, MalformedPolicy};
pub use record::{DelimitedReader, Record, RecordSource, StaticSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
