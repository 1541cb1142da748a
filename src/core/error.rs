use thiserror::Error;

/// A trajectory value stopped being a finite number.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("portfolio value became {value} at year {year}")]
pub struct NonFiniteValue {
    pub year: usize,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("cannot build return distribution: {0}")]
    Distribution(String),

    #[error(
        "return matrix is {rows}x{cols}, expected {expected_rows}x{expected_cols} (trials x years)"
    )]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("trial {trial} failed: {source}")]
    TrialFailed {
        trial: usize,
        #[source]
        source: NonFiniteValue,
    },

    #[error("cannot build worker pool: {0}")]
    ThreadPool(String),
}

impl SimError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}
