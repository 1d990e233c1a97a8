//! rbk-host
//!
//! Narrow contracts between the risk-budget engine and whatever owns the
//! instruments, portfolios, prices and order book. The engine only reads
//! through `&self` and writes orders / NAVs through `&mut self`.
//!
//! `MemoryHost` is a deterministic in-memory implementation used by tests
//! and by the CLI harness (loaded from a JSON world snapshot).

use chrono::{Datelike, NaiveDate, Weekday};
use rbk_config::ConfigSource;
use rbk_schemas::{
    Instrument, InstrumentId, OpenOrder, PortfolioId, Position, SeriesKind, TargetOrderRequest,
};
use rbk_timeseries::TimeSeries;
use thiserror::Error;

mod loader;
mod memory;

pub use loader::{load_prices_csv, load_world_json, PriceRow};
pub use memory::{FxEntry, MemoryHost, PortfolioState, SeriesEntry, World};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("unknown instrument {0}")]
    UnknownInstrument(InstrumentId),

    #[error("unknown portfolio {0}")]
    UnknownPortfolio(PortfolioId),

    #[error("instrument {instrument} is not part of portfolio {portfolio}")]
    NotInPortfolio {
        portfolio: PortfolioId,
        instrument: InstrumentId,
    },
}

/// Instrument metadata, price/NAV series and currency conversion.
pub trait MarketData {
    fn instrument(&self, id: InstrumentId) -> Result<Instrument, HostError>;

    /// Full stored history for `(id, kind)`; `None` when the host has none.
    fn series(&self, id: InstrumentId, kind: SeriesKind) -> Option<TimeSeries>;

    /// Units of `to` per unit of `from` on `date` (closest prior quote).
    fn fx_rate(&self, from: &str, to: &str, date: NaiveDate) -> Option<f64>;

    /// Series of the instrument's natural kind.
    fn natural_series(&self, instrument: &Instrument) -> Option<TimeSeries> {
        self.series(instrument.id, instrument.series_kind())
    }

    /// Last natural-series value on or before `date`.
    fn price(&self, instrument: &Instrument, date: NaiveDate) -> Option<f64> {
        let s = self.natural_series(instrument)?;
        let idx = s.closest_prior_index(date)?;
        s.value(idx)
    }
}

/// Portfolio membership, positions, open orders and NAV bookkeeping.
pub trait PortfolioBook {
    fn portfolio_currency(&self, portfolio: PortfolioId) -> Result<String, HostError>;

    /// Instrument universe of the portfolio, in a stable order.
    fn instruments(&self, portfolio: PortfolioId) -> Result<Vec<InstrumentId>, HostError>;

    fn is_reserve(&self, portfolio: PortfolioId, instrument: InstrumentId) -> bool;

    fn position(&self, portfolio: PortfolioId, instrument: InstrumentId) -> Option<Position>;

    fn open_order(&self, portfolio: PortfolioId, instrument: InstrumentId) -> Option<OpenOrder>;

    /// Positions with pending orders applied, as of `date`. Zero holdings are omitted.
    fn holdings(&self, portfolio: PortfolioId, date: NaiveDate) -> Result<Vec<Position>, HostError>;

    /// Current assets under management; `None` when unknown.
    fn aum(&self, portfolio: PortfolioId, date: NaiveDate) -> Option<f64>;

    /// Committed NAVs in date order.
    fn nav_history(&self, portfolio: PortfolioId) -> TimeSeries;

    /// NAV used before the first commit.
    fn initial_nav(&self, portfolio: PortfolioId) -> Option<f64>;

    fn has_open_orders(&self, portfolio: PortfolioId) -> Result<bool, HostError> {
        Ok(self
            .instruments(portfolio)?
            .into_iter()
            .any(|i| self.open_order(portfolio, i).is_some()))
    }
}

/// Target-order writes.
pub trait OrderSink {
    fn create_target_order(&mut self, request: &TargetOrderRequest) -> Result<(), HostError>;
    fn update_target_order(&mut self, request: &TargetOrderRequest) -> Result<(), HostError>;
}

pub trait NavSink {
    fn commit_nav(&mut self, portfolio: PortfolioId, date: NaiveDate, nav: f64) -> Result<(), HostError>;
}

/// Business-day calendar. The default treats Monday..Friday as business days.
pub trait Calendar {
    fn is_business_day(&self, date: NaiveDate) -> bool {
        is_weekday(date)
    }
}

pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Weekends only, no holidays.
#[derive(Clone, Copy, Debug, Default)]
pub struct WeekdayCalendar;

impl Calendar for WeekdayCalendar {}

/// Everything the strategy reads.
pub trait Host: MarketData + PortfolioBook + Calendar + ConfigSource {}

impl<T: MarketData + PortfolioBook + Calendar + ConfigSource + ?Sized> Host for T {}
