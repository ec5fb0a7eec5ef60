use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Error taxonomy for the ensemble pipeline.
///
/// Configuration errors abort before any work begins. Per-job conditions
/// (`ShapeMismatch`, `ClusteringJobFailure`) are caught at the store boundary,
/// logged, and recorded as missing so a run can continue on partial results.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("label vector mismatch for replicate={replicate} algorithm={algorithm} k={k}: {reason}")]
    ShapeMismatch {
        replicate: usize,
        algorithm: String,
        k: usize,
        reason: String,
    },

    #[error("clustering job failed for replicate={replicate} algorithm={algorithm} k={k}: {reason}")]
    ClusteringJobFailure {
        replicate: usize,
        algorithm: String,
        k: usize,
        reason: String,
    },

    #[error("{count} entries remain missing after imputation in {context}")]
    UnresolvedMissingData { context: String, count: usize },

    #[error("k must lie in [2, {n}), got {k}")]
    InvalidK { k: usize, n: usize },
}
