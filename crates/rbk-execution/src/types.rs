use std::collections::BTreeMap;

use rbk_schemas::{InstrumentId, TargetOrderRequest};
use serde::{Deserialize, Serialize};

/// Final weight of one instrument, ready for sizing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetWeight {
    pub instrument: InstrumentId,
    pub weight: f64,
    /// Notional adjustment (1.0 for leaves).
    pub adjustment: f64,
    /// Nested strategies are sized as unsigned notional plus a direction flag.
    pub nested: bool,
}

impl TargetWeight {
    pub fn leaf(instrument: InstrumentId, weight: f64) -> Self {
        Self {
            instrument,
            weight,
            adjustment: 1.0,
            nested: false,
        }
    }

    pub fn nested(instrument: InstrumentId, weight: f64, adjustment: f64) -> Self {
        Self {
            instrument,
            weight,
            adjustment,
            nested: true,
        }
    }

    /// Signed target notional in portfolio currency.
    pub fn target_notional(&self, reference_aum: f64) -> f64 {
        self.weight * reference_aum * self.adjustment
    }
}

/// What the book currently says about an instrument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Current {
    /// Signed notional in portfolio currency.
    pub notional: f64,
    pub has_open_order: bool,
}

pub type CurrentBook = BTreeMap<InstrumentId, Current>;

/// Per-instrument gate result, kept for tracing and tests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub instrument: InstrumentId,
    pub target: f64,
    pub current: f64,
    /// `|target − current| / AUM`.
    pub change: f64,
    pub emitted: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceDecision {
    pub orders: Vec<TargetOrderRequest>,
    pub gates: Vec<GateOutcome>,
}
