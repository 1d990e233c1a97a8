//! rbk-schemas
//!
//! Shared value types passed between the host and the risk-budget engine:
//! instrument identity and category, series kinds, positions, open orders and
//! target-order requests. No logic beyond small constructors and lookups.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable instrument identifier assigned by the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub u64);

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// Identifier of a portfolio owned by a strategy instrument.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortfolioId(pub u64);

impl fmt::Display for PortfolioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Category -> series kind
// ---------------------------------------------------------------------------

/// Closed set of instrument categories known to the engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentCategory {
    Equity,
    Etf,
    Future,
    Currency,
    Strategy,
    Other,
}

/// Which price series an instrument is valued on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    AdjustedClose,
    Last,
    Close,
}

impl SeriesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::AdjustedClose => "adjusted_close",
            SeriesKind::Last => "last",
            SeriesKind::Close => "close",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adjusted_close" | "adj_close" | "adjclose" => Some(SeriesKind::AdjustedClose),
            "last" => Some(SeriesKind::Last),
            "close" => Some(SeriesKind::Close),
            _ => None,
        }
    }
}

/// Category -> natural series kind. Every category appears exactly once.
pub const SERIES_KIND_TABLE: [(InstrumentCategory, SeriesKind); 6] = [
    (InstrumentCategory::Equity, SeriesKind::AdjustedClose),
    (InstrumentCategory::Etf, SeriesKind::AdjustedClose),
    (InstrumentCategory::Future, SeriesKind::Close),
    (InstrumentCategory::Currency, SeriesKind::Close),
    (InstrumentCategory::Strategy, SeriesKind::Last),
    (InstrumentCategory::Other, SeriesKind::Close),
];

impl InstrumentCategory {
    /// Natural series kind for this category (table lookup).
    pub fn series_kind(self) -> SeriesKind {
        SERIES_KIND_TABLE
            .iter()
            .find(|(c, _)| *c == self)
            .map(|(_, k)| *k)
            .unwrap_or(SeriesKind::Close)
    }

    pub fn is_strategy(self) -> bool {
        self == InstrumentCategory::Strategy
    }
}

// ---------------------------------------------------------------------------
// Instrument
// ---------------------------------------------------------------------------

fn default_point_size() -> f64 {
    1.0
}

/// Instrument metadata as exposed by the host.
///
/// `portfolio` is `Some` only for nested strategies that own a portfolio.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub name: String,
    pub category: InstrumentCategory,
    pub currency: String,
    /// Futures contract multiplier; 1.0 for everything else.
    #[serde(default = "default_point_size")]
    pub point_size: f64,
    #[serde(default)]
    pub portfolio: Option<PortfolioId>,
}

impl Instrument {
    pub fn new<S: Into<String>, C: Into<String>>(
        id: u64,
        name: S,
        category: InstrumentCategory,
        currency: C,
    ) -> Self {
        Self {
            id: InstrumentId(id),
            name: name.into(),
            category,
            currency: currency.into(),
            point_size: 1.0,
            portfolio: None,
        }
    }

    pub fn with_point_size(mut self, point_size: f64) -> Self {
        self.point_size = point_size;
        self
    }

    pub fn with_portfolio(mut self, portfolio: PortfolioId) -> Self {
        self.portfolio = Some(portfolio);
        self
    }

    pub fn series_kind(&self) -> SeriesKind {
        self.category.series_kind()
    }

    /// A strategy that owns its own portfolio.
    pub fn is_nested(&self) -> bool {
        self.category.is_strategy() && self.portfolio.is_some()
    }

    /// Multiplier applied to price changes: futures point size, 1.0 otherwise.
    pub fn multiplier(&self) -> f64 {
        if self.category == InstrumentCategory::Future {
            self.point_size
        } else {
            1.0
        }
    }
}

// ---------------------------------------------------------------------------
// Positions and orders
// ---------------------------------------------------------------------------

/// Signed unit holding of an instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: InstrumentId,
    pub units: f64,
}

impl Position {
    pub fn new(instrument: InstrumentId, units: f64) -> Self {
        Self { instrument, units }
    }
}

/// Size of a target order: units, or notional in portfolio currency.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OrderSize {
    Units(f64),
    Notional(f64),
}

impl OrderSize {
    pub fn is_zero(&self) -> bool {
        match self {
            OrderSize::Units(u) => *u == 0.0,
            OrderSize::Notional(n) => *n == 0.0,
        }
    }
}

/// Pending target instruction for an instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub instrument: InstrumentId,
    pub size: OrderSize,
    #[serde(default)]
    pub direction: Option<Direction>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    Create,
    Update,
}

/// Long/short flag carried by nested-strategy orders.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn from_sign(x: f64) -> Self {
        if x < 0.0 {
            Direction::Short
        } else {
            Direction::Long
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

/// Target-order request emitted toward the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetOrderRequest {
    /// Deterministic: derived from (portfolio, instrument, date).
    pub request_id: Uuid,
    pub portfolio: PortfolioId,
    pub instrument: InstrumentId,
    pub date: NaiveDate,
    pub size: OrderSize,
    pub mode: OrderMode,
    pub direction: Option<Direction>,
}

impl TargetOrderRequest {
    pub fn new(
        portfolio: PortfolioId,
        instrument: InstrumentId,
        date: NaiveDate,
        size: OrderSize,
        mode: OrderMode,
    ) -> Self {
        Self {
            request_id: derive_request_id(portfolio, instrument, date),
            portfolio,
            instrument,
            date,
            size,
            mode,
            direction: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// The order as it will sit on the book once accepted.
    pub fn to_open_order(&self) -> OpenOrder {
        OpenOrder {
            instrument: self.instrument,
            size: self.size,
            direction: self.direction,
        }
    }
}

/// UUIDv5 over a scoped key; re-running a date yields the same id.
pub fn derive_request_id(portfolio: PortfolioId, instrument: InstrumentId, date: NaiveDate) -> Uuid {
    let data = format!("rbk.target-order.v1|{}|{}|{}", portfolio.0, instrument.0, date);
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, data.as_bytes())
}
