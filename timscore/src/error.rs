use thiserror::Error;

/// Errors produced by the numeric core.
///
/// Construction failures are fatal for the object being built; query
/// failures propagate to the caller and are never coerced into empty
/// results.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("inconsistent input: {0}")]
    Construction(String),

    #[error("degenerate fit: {points} distinct grid points for polynomial degree {degree}")]
    DegenerateFit { points: usize, degree: usize },

    #[error("value {value} outside domain [{lo}, {hi}]")]
    OutOfDomain { value: f64, lo: f64, hi: f64 },

    #[error("invalid selector: {0}")]
    InvalidSelector(String),
}
