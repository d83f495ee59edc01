use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Rejected before the pipeline starts; never surfaced mid-run
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A record is too short to contain the key column (fail-fast mode only)
    #[error("record on line {line} has {fields} field(s), key column is {column}")]
    MalformedRecord {
        line: u64,
        fields: usize,
        column: usize,
    },

    /// The underlying input stream failed mid-read
    #[error("input stream read failed: {0}")]
    StreamRead(#[from] std::io::Error),

    /// A worker or aggregator thread panicked
    #[error("pipeline thread failure: {0}")]
    Thread(String),

    /// The run was cancelled before the input was exhausted
    #[error("pipeline run cancelled")]
    Cancelled,
}
