//! rbk-risk
//!
//! Exposure and risk model for the risk-budget engine:
//! - high/low water marks with single-asset look-through
//! - annualised cash-volatility risk
//! - volatility-adaptive stop-loss exposure
//! - information ratio used as the optimizer's expected-return proxy
//! - 1% / 20-day historical VaR over proposed exposures
//!
//! Deterministic, pure logic over host reads. No writes.

mod model;
pub mod var;

pub use model::{
    default_high_low_mark, realized_volatility, DefaultRiskModel, ExposureParams, RiskModel,
    Watermarks,
};
pub use var::{value_at_risk, var_scaling, VarSettings};

/// Volatility/risk values below this are treated as zero; dependent scaling
/// factors fall back to 1.0.
pub const RISK_EPSILON: f64 = 1e-5;
