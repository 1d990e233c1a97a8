//! rbk-portfolio: constraints
//!
//! After-the-fact leverage checks on a stage's weight map. The pipeline
//! enforces the caps while building weights; these functions verify the
//! result and report breaches (tolerance-aware) for the stage trace.

use std::collections::BTreeMap;

use rbk_schemas::InstrumentId;

use crate::WeightMap;

/// Relative slack for floating-point comparisons.
const TOLERANCE: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintViolation {
    /// `|w| × adjustment` exceeds the individual leverage cap.
    IndividualLeverageExceeded {
        instrument: InstrumentId,
        leverage: f64,
        limit: f64,
    },
    /// Look-through gross notional exceeds `max_global_leverage × AUM`.
    GlobalLeverageExceeded { actual: f64, limit: f64 },
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndividualLeverageExceeded {
                instrument,
                leverage,
                limit,
            } => {
                write!(f, "leverage {leverage:.4} for {instrument} exceeds max {limit:.4}")
            }
            Self::GlobalLeverageExceeded { actual, limit } => {
                write!(f, "gross notional {actual:.2} exceeds limit {limit:.2}")
            }
        }
    }
}

/// Every weight must satisfy `|w| × adjustment <= max_individual_leverage`.
/// Missing adjustments count as 1.0.
pub fn check_individual_leverage(
    weights: &WeightMap,
    adjustments: &BTreeMap<InstrumentId, f64>,
    max_individual_leverage: f64,
) -> Vec<ConstraintViolation> {
    weights
        .iter()
        .filter_map(|(id, w)| {
            let na = adjustments.get(id).copied().unwrap_or(1.0);
            let leverage = w.abs() * na;
            (leverage > max_individual_leverage * (1.0 + TOLERANCE) + TOLERANCE).then_some(
                ConstraintViolation::IndividualLeverageExceeded {
                    instrument: *id,
                    leverage,
                    limit: max_individual_leverage,
                },
            )
        })
        .collect()
}

/// `gross_notional` must not exceed `max_global_leverage × reference_aum`
/// after rounding both to whole currency units.
pub fn check_global_leverage(
    gross_notional: f64,
    max_global_leverage: f64,
    reference_aum: f64,
) -> Option<ConstraintViolation> {
    let limit = (max_global_leverage * reference_aum).round();
    let actual = gross_notional.round();
    (actual > limit).then_some(ConstraintViolation::GlobalLeverageExceeded { actual, limit })
}
