use thiserror::Error;
use timscore::error::CoreError;

/// Errors of the session layer.
///
/// Construction failures leave no usable session behind; per-query
/// failures propagate to the caller. Backend extraction errors are
/// passed through without retries.
#[derive(Debug, Error)]
pub enum TimsError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("metadata query failed: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("inconsistent instrument metadata: {0}")]
    Construction(String),

    #[error("backend extraction failed for frame {frame}: {message}")]
    Extraction { frame: u32, message: String },
}
