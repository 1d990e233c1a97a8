//! rbk-portfolio
//!
//! Portfolio construction building blocks for the risk-budget engine:
//! - synthetic per-instrument cash-difference series (with nested-strategy recursion)
//! - correlation matrix and the constrained information-ratio optimizer
//! - notional adjustment and look-through gross notional
//! - post-stage leverage checks
//!
//! Pure deterministic logic over host reads. No writes.

pub mod aggregator;
pub mod constraints;
pub mod notional;
pub mod optimizer;

pub use aggregator::{build_series_map, eligible_series, MIN_OBSERVATIONS};
pub use constraints::{check_global_leverage, check_individual_leverage, ConstraintViolation};
pub use notional::{gross_notional, lookthrough_leverage, notional_adjustment};
pub use optimizer::{correlation_matrix, equal_weights, optimize, Matrix};

use std::collections::BTreeMap;

use rbk_schemas::InstrumentId;
use rbk_timeseries::TimeSeries;

/// Instrument -> weight (fraction of reference AUM, signed).
pub type WeightMap = BTreeMap<InstrumentId, f64>;

/// Instrument -> synthetic cash-difference series. Absent = not eligible.
pub type SeriesMap = BTreeMap<InstrumentId, TimeSeries>;
