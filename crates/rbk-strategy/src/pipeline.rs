//! The seven weighting stages as pure functions over `WeightMap`s.
//!
//! Every stage takes the previous map by reference and returns a fresh one;
//! host reads happen in `strategy.rs` before a stage runs.

use std::collections::BTreeMap;

use rbk_portfolio::WeightMap;
use rbk_risk::RISK_EPSILON;
use rbk_schemas::InstrumentId;
use serde::Serialize;

/// Per-instrument scalar (vol scalar, notional adjustment, leverage ...).
pub type FactorMap = BTreeMap<InstrumentId, f64>;

/// Every stage's output for one evaluation, in order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StageTrace {
    pub seed: WeightMap,
    pub vol_targeted: WeightMap,
    pub tilted: WeightMap,
    pub portfolio_vol: WeightMap,
    pub individual_cap: WeightMap,
    pub global_cap: WeightMap,
    pub var_cap: WeightMap,
    /// Realised risk of the stage-3 aggregate series.
    pub portfolio_risk: f64,
    /// Look-through gross notional before the global cap.
    pub gross_notional: f64,
    /// Stage-7 realised VaR, when the VaR stage ran.
    pub realized_var: Option<f64>,
    /// Constraint checks that still fail after their stage.
    pub violations: Vec<String>,
}

impl StageTrace {
    pub fn final_weights(&self) -> &WeightMap {
        &self.var_cap
    }
}

/// Stage 1: `1/N` per eligible instrument.
pub fn equal_seed(ids: &[InstrumentId]) -> WeightMap {
    if ids.is_empty() {
        return WeightMap::new();
    }
    let w = 1.0 / ids.len() as f64;
    ids.iter().map(|id| (*id, w)).collect()
}

/// `target / vol`, neutral when disabled or the vol is below epsilon.
pub fn vol_scalar(enabled: bool, target: f64, vol: f64) -> f64 {
    if !enabled || !vol.is_finite() || vol < RISK_EPSILON {
        return 1.0;
    }
    target / vol
}

/// Elementwise product; instruments without a factor keep their weight.
pub fn scale_each(weights: &WeightMap, factors: &FactorMap) -> WeightMap {
    weights
        .iter()
        .map(|(id, w)| (*id, w * factors.get(id).copied().unwrap_or(1.0)))
        .collect()
}

pub fn scale_all(weights: &WeightMap, factor: f64) -> WeightMap {
    weights.iter().map(|(id, w)| (*id, w * factor)).collect()
}

/// Stage 5: `sign(w) × min(max_il, |w| × na) / na`.
pub fn cap_individual(weights: &WeightMap, adjustments: &FactorMap, max_individual_leverage: f64) -> WeightMap {
    weights
        .iter()
        .map(|(id, w)| {
            let na = adjustments.get(id).copied().unwrap_or(1.0);
            if na == 0.0 || !na.is_finite() {
                return (*id, *w);
            }
            let capped = (w.abs() * na).min(max_individual_leverage) / na;
            (*id, capped.copysign(*w))
        })
        .collect()
}

/// `Σ |w| × reference AUM × notional_per_weight`.
pub fn gross_exposure(weights: &WeightMap, notional_per_weight: &FactorMap, reference_aum: f64) -> f64 {
    weights
        .iter()
        .map(|(id, w)| w.abs() * reference_aum * notional_per_weight.get(id).copied().unwrap_or(1.0))
        .sum()
}

/// Stage 6: proportional scale-down when the rounded gross exceeds the
/// rounded limit. Returns the new map and the gross it was measured at.
pub fn cap_global(
    weights: &WeightMap,
    notional_per_weight: &FactorMap,
    max_global_leverage: f64,
    reference_aum: f64,
) -> (WeightMap, f64) {
    let gross = gross_exposure(weights, notional_per_weight, reference_aum);
    let limit = max_global_leverage * reference_aum;
    if gross > 0.0 && gross.round() > limit.round() {
        (scale_all(weights, limit / gross), gross)
    } else {
        (weights.clone(), gross)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wm(pairs: &[(u64, f64)]) -> WeightMap {
        pairs.iter().map(|(i, w)| (InstrumentId(*i), *w)).collect()
    }

    #[test]
    fn seed_is_equal() {
        let s = equal_seed(&[InstrumentId(1), InstrumentId(2), InstrumentId(3), InstrumentId(4)]);
        assert!(s.values().all(|w| (*w - 0.25).abs() < 1e-12));
        assert!(equal_seed(&[]).is_empty());
    }

    #[test]
    fn single_leaf_vol_targeting_halves_weight() {
        let w1 = equal_seed(&[InstrumentId(1)]);
        let factors = FactorMap::from([(InstrumentId(1), vol_scalar(true, 0.1, 0.2))]);
        let w2 = scale_each(&w1, &factors);
        assert!((w2[&InstrumentId(1)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn vol_scalar_is_neutral_below_epsilon_or_disabled() {
        assert_eq!(vol_scalar(true, 0.1, 1e-6), 1.0);
        assert_eq!(vol_scalar(false, 0.1, 0.2), 1.0);
        assert_eq!(vol_scalar(true, 0.1, f64::NAN), 1.0);
    }

    #[test]
    fn individual_cap_respects_adjustment_and_sign() {
        let w = wm(&[(1, -0.8), (2, 0.3), (3, 0.4)]);
        let na = FactorMap::from([(InstrumentId(3), 2.0)]);
        let out = cap_individual(&w, &na, 0.5);
        assert!((out[&InstrumentId(1)] + 0.5).abs() < 1e-12);
        assert!((out[&InstrumentId(2)] - 0.3).abs() < 1e-12);
        // 0.4 × 2 = 0.8 > 0.5, so 0.5 / 2.
        assert!((out[&InstrumentId(3)] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn global_cap_scales_to_limit() {
        let w = wm(&[(1, 1.0), (2, -1.0)]);
        let lev = FactorMap::from([(InstrumentId(2), 2.0)]);
        let (out, gross) = cap_global(&w, &lev, 1.5, 1_000.0);
        assert!((gross - 3_000.0).abs() < 1e-9);
        let after = gross_exposure(&out, &lev, 1_000.0);
        assert!((after - 1_500.0).abs() < 1e-9);
        assert!((out[&InstrumentId(1)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn global_cap_ignores_sub_unit_excess() {
        let w = wm(&[(1, 1.0)]);
        let (out, _) = cap_global(&w, &FactorMap::new(), 0.9996, 1_000.4);
        assert_eq!(out, w);
    }
}
