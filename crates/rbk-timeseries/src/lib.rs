//! rbk-timeseries
//!
//! Dated numeric series used by the risk-budget engine.
//!
//! - Points are `(NaiveDate, f64)` with strictly increasing dates.
//! - A series is immutable once built; every transform returns a new series.
//! - NaN is a legal value inside a series (it marks "no observation" after
//!   differencing or re-gridding); statistics skip NaN and callers decide
//!   when to replace it.
//! - Pure deterministic logic, no IO.

mod align;
mod error;
mod series;

pub use align::{align_to_longest, longest_key};
pub use error::SeriesError;
pub use series::TimeSeries;

/// Trading days per year used for annualisation.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// `sqrt(252)`.
pub fn annualisation_factor() -> f64 {
    TRADING_DAYS_PER_YEAR.sqrt()
}
