use chrono::NaiveDate;
use thiserror::Error;

/// Construction errors for [`crate::TimeSeries`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    /// Dates must be strictly increasing.
    #[error("series dates not strictly increasing at index {index} ({prev} -> {next})")]
    NotIncreasing {
        index: usize,
        prev: NaiveDate,
        next: NaiveDate,
    },

    /// Dates and values have different lengths.
    #[error("length mismatch: {dates} dates vs {values} values")]
    LengthMismatch { dates: usize, values: usize },
}
