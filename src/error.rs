use thiserror::Error;

/// Failure taxonomy for a linkage run. Data-level problems (null fields,
/// unparsable values) never surface here: comparators score them 0.0 and the
/// run continues. Everything below aborts the run.
#[derive(Debug, Error)]
pub enum LinkageError {
    /// Invalid configuration; raised before any I/O against the store.
    #[error("configuration error: {0}")]
    Config(String),

    /// Pair-history lookup failed; partial exclusion state cannot be trusted.
    #[error("pair history lookup failed: {0:#}")]
    History(anyhow::Error),

    /// A scoring-model artifact could not be loaded at startup.
    #[error("model load failed for {path}: {reason}")]
    Model { path: String, reason: String },

    /// Feature matrix rejected by the ensemble (shape mismatch, NaN feature).
    #[error("inference error: {0}")]
    Inference(String),

    /// Batched insert failed; the current block is not persisted.
    #[error("persistence failed for block {block}: {cause:#}")]
    Persist { block: usize, cause: anyhow::Error },
}

pub type LinkageResult<T> = Result<T, LinkageError>;
