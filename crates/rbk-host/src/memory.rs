//! Deterministic in-memory host.
//!
//! - All maps are `BTreeMap`, so iteration order is stable.
//! - Orders are accepted immediately and sit on the book as open orders;
//!   nothing fills unless a test moves a position explicitly.
//! - Every accepted request is appended to `submitted()` in call order.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rbk_config::{ConfigParam, ConfigSource, DatedConfig};
use rbk_schemas::{
    Instrument, InstrumentId, OpenOrder, OrderSize, PortfolioId, Position, SeriesKind,
    TargetOrderRequest,
};
use rbk_timeseries::{SeriesError, TimeSeries};
use serde::{Deserialize, Serialize};

use crate::{is_weekday, Calendar, HostError, MarketData, NavSink, OrderSink, PortfolioBook, PriceRow};

// ---------------------------------------------------------------------------
// World snapshot (serde shape)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub instrument: InstrumentId,
    pub kind: SeriesKind,
    pub points: TimeSeries,
}

/// Quotes of `to` per unit of `from`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FxEntry {
    pub from: String,
    pub to: String,
    pub rates: TimeSeries,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortfolioState {
    pub id: PortfolioId,
    pub currency: String,
    #[serde(default)]
    pub instruments: Vec<InstrumentId>,
    #[serde(default)]
    pub reserves: Vec<InstrumentId>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub open_orders: Vec<OpenOrder>,
    #[serde(default)]
    pub aum: Option<f64>,
    #[serde(default)]
    pub navs: TimeSeries,
    #[serde(default)]
    pub initial_nav: Option<f64>,
    #[serde(default)]
    pub config: DatedConfig,
}

impl PortfolioState {
    pub fn new(id: PortfolioId, currency: impl Into<String>) -> Self {
        Self {
            id,
            currency: currency.into(),
            instruments: Vec::new(),
            reserves: Vec::new(),
            positions: Vec::new(),
            open_orders: Vec::new(),
            aum: None,
            navs: TimeSeries::empty(),
            initial_nav: None,
            config: DatedConfig::new(),
        }
    }
}

/// Everything a `MemoryHost` holds, as loaded from JSON.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct World {
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    #[serde(default)]
    pub series: Vec<SeriesEntry>,
    #[serde(default)]
    pub fx: Vec<FxEntry>,
    #[serde(default)]
    pub portfolios: Vec<PortfolioState>,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

// ---------------------------------------------------------------------------
// MemoryHost
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct MemoryHost {
    instruments: BTreeMap<InstrumentId, Instrument>,
    series: BTreeMap<(InstrumentId, SeriesKind), TimeSeries>,
    fx: BTreeMap<(String, String), TimeSeries>,
    portfolios: BTreeMap<PortfolioId, PortfolioState>,
    holidays: BTreeSet<NaiveDate>,
    submitted: Vec<TargetOrderRequest>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a snapshot; every instrument a portfolio references must exist.
    pub fn from_world(world: World) -> Result<Self, HostError> {
        let mut host = Self::new();
        for inst in world.instruments {
            host.instruments.insert(inst.id, inst);
        }
        for s in world.series {
            host.series.insert((s.instrument, s.kind), s.points);
        }
        for f in world.fx {
            host.fx.insert((f.from, f.to), f.rates);
        }
        for p in world.portfolios {
            for id in p.instruments.iter().chain(p.positions.iter().map(|x| &x.instrument)) {
                if !host.instruments.contains_key(id) {
                    return Err(HostError::UnknownInstrument(*id));
                }
            }
            host.portfolios.insert(p.id, p);
        }
        host.holidays = world.holidays.into_iter().collect();
        Ok(host)
    }

    /// Replace stored series with the rows given, grouped by (instrument, kind).
    pub fn apply_prices(&mut self, rows: Vec<PriceRow>) -> Result<(), SeriesError> {
        let mut grouped: BTreeMap<(InstrumentId, SeriesKind), Vec<(NaiveDate, f64)>> = BTreeMap::new();
        for r in rows {
            grouped
                .entry((InstrumentId(r.instrument_id), r.kind))
                .or_default()
                .push((r.date, r.value));
        }
        for (key, mut points) in grouped {
            points.sort_by_key(|(d, _)| *d);
            self.series.insert(key, TimeSeries::new(points)?);
        }
        Ok(())
    }

    // --- builders (tests / fixtures) ------------------------------------

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.insert(instrument.id, instrument);
        self
    }

    pub fn with_series(mut self, id: InstrumentId, kind: SeriesKind, series: TimeSeries) -> Self {
        self.series.insert((id, kind), series);
        self
    }

    pub fn with_fx(mut self, from: &str, to: &str, rates: TimeSeries) -> Self {
        self.fx.insert((from.to_string(), to.to_string()), rates);
        self
    }

    pub fn with_portfolio(mut self, id: PortfolioId, currency: &str) -> Self {
        self.portfolios.insert(id, PortfolioState::new(id, currency));
        self
    }

    /// Add `instrument` to the universe of `portfolio` (created in USD if absent).
    pub fn with_member(mut self, portfolio: PortfolioId, instrument: InstrumentId) -> Self {
        let book = self.book_mut(portfolio);
        if !book.instruments.contains(&instrument) {
            book.instruments.push(instrument);
        }
        self
    }

    pub fn with_reserve(mut self, portfolio: PortfolioId, instrument: InstrumentId) -> Self {
        self = self.with_member(portfolio, instrument);
        self.book_mut(portfolio).reserves.push(instrument);
        self
    }

    pub fn with_position(mut self, portfolio: PortfolioId, instrument: InstrumentId, units: f64) -> Self {
        self.set_position(portfolio, instrument, units);
        self
    }

    pub fn with_open_order(mut self, portfolio: PortfolioId, order: OpenOrder) -> Self {
        self.set_open_order(portfolio, order);
        self
    }

    pub fn with_aum(mut self, portfolio: PortfolioId, aum: f64) -> Self {
        self.book_mut(portfolio).aum = Some(aum);
        self
    }

    pub fn with_initial_nav(mut self, portfolio: PortfolioId, nav: f64) -> Self {
        self.book_mut(portfolio).initial_nav = Some(nav);
        self
    }

    pub fn with_config(mut self, portfolio: PortfolioId, config: DatedConfig) -> Self {
        self.book_mut(portfolio).config = config;
        self
    }

    pub fn with_holiday(mut self, date: NaiveDate) -> Self {
        self.holidays.insert(date);
        self
    }

    // --- mutators -------------------------------------------------------

    pub fn set_config(&mut self, portfolio: PortfolioId, config: DatedConfig) {
        self.book_mut(portfolio).config = config;
    }

    pub fn set_position(&mut self, portfolio: PortfolioId, instrument: InstrumentId, units: f64) {
        let book = self.book_mut(portfolio);
        match book.positions.iter_mut().find(|p| p.instrument == instrument) {
            Some(p) => p.units = units,
            None => book.positions.push(Position::new(instrument, units)),
        }
    }

    pub fn set_open_order(&mut self, portfolio: PortfolioId, order: OpenOrder) {
        let book = self.book_mut(portfolio);
        book.open_orders.retain(|o| o.instrument != order.instrument);
        book.open_orders.push(order);
    }

    pub fn clear_open_order(&mut self, portfolio: PortfolioId, instrument: InstrumentId) {
        self.book_mut(portfolio).open_orders.retain(|o| o.instrument != instrument);
    }

    /// Accepted target-order requests, oldest first.
    pub fn submitted(&self) -> &[TargetOrderRequest] {
        &self.submitted
    }

    fn book(&self, portfolio: PortfolioId) -> Result<&PortfolioState, HostError> {
        self.portfolios
            .get(&portfolio)
            .ok_or(HostError::UnknownPortfolio(portfolio))
    }

    fn book_mut(&mut self, portfolio: PortfolioId) -> &mut PortfolioState {
        self.portfolios
            .entry(portfolio)
            .or_insert_with(|| PortfolioState::new(portfolio, "USD"))
    }

    /// Units implied by an open order. Notional orders are converted at the
    /// instrument's price on `date`; `None` when no price is available.
    fn implied_units(&self, currency: &str, order: &OpenOrder, date: NaiveDate) -> Option<f64> {
        match order.size {
            OrderSize::Units(u) => Some(u),
            OrderSize::Notional(n) => {
                let inst = self.instruments.get(&order.instrument)?;
                let unit_value = self
                    .price(inst, date)
                    .zip(self.fx_rate(&inst.currency, currency, date))
                    .map(|(price, fx)| price * inst.multiplier() * fx)
                    .filter(|v| *v != 0.0 && v.is_finite());
                let Some(unit_value) = unit_value else {
                    tracing::debug!(instrument = %order.instrument, %date, "open order not valued; ignored in holdings");
                    return None;
                };
                let signed = order.direction.map(|d| d.sign() * n.abs()).unwrap_or(n);
                Some(signed / unit_value)
            }
        }
    }

    fn accept(&mut self, request: &TargetOrderRequest) -> Result<(), HostError> {
        let book = self.book(request.portfolio)?;
        if !book.instruments.contains(&request.instrument) {
            tracing::warn!(
                portfolio = %request.portfolio,
                instrument = %request.instrument,
                "order rejected; instrument not in portfolio"
            );
            return Err(HostError::NotInPortfolio {
                portfolio: request.portfolio,
                instrument: request.instrument,
            });
        }
        self.set_open_order(request.portfolio, request.to_open_order());
        self.submitted.push(request.clone());
        Ok(())
    }
}

impl MarketData for MemoryHost {
    fn instrument(&self, id: InstrumentId) -> Result<Instrument, HostError> {
        self.instruments
            .get(&id)
            .cloned()
            .ok_or(HostError::UnknownInstrument(id))
    }

    fn series(&self, id: InstrumentId, kind: SeriesKind) -> Option<TimeSeries> {
        self.series.get(&(id, kind)).cloned()
    }

    fn fx_rate(&self, from: &str, to: &str, date: NaiveDate) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        let quote = |s: &TimeSeries| s.closest_prior_index(date).and_then(|i| s.value(i));
        if let Some(rate) = self.fx.get(&(from.to_string(), to.to_string())).and_then(quote) {
            return Some(rate);
        }
        self.fx
            .get(&(to.to_string(), from.to_string()))
            .and_then(quote)
            .filter(|r| *r != 0.0)
            .map(|r| 1.0 / r)
    }
}

impl PortfolioBook for MemoryHost {
    fn portfolio_currency(&self, portfolio: PortfolioId) -> Result<String, HostError> {
        Ok(self.book(portfolio)?.currency.clone())
    }

    fn instruments(&self, portfolio: PortfolioId) -> Result<Vec<InstrumentId>, HostError> {
        Ok(self.book(portfolio)?.instruments.clone())
    }

    fn is_reserve(&self, portfolio: PortfolioId, instrument: InstrumentId) -> bool {
        self.portfolios
            .get(&portfolio)
            .map(|b| b.reserves.contains(&instrument))
            .unwrap_or(false)
    }

    fn position(&self, portfolio: PortfolioId, instrument: InstrumentId) -> Option<Position> {
        self.portfolios
            .get(&portfolio)?
            .positions
            .iter()
            .find(|p| p.instrument == instrument)
            .cloned()
    }

    fn open_order(&self, portfolio: PortfolioId, instrument: InstrumentId) -> Option<OpenOrder> {
        self.portfolios
            .get(&portfolio)?
            .open_orders
            .iter()
            .find(|o| o.instrument == instrument)
            .cloned()
    }

    fn holdings(&self, portfolio: PortfolioId, date: NaiveDate) -> Result<Vec<Position>, HostError> {
        let book = self.book(portfolio)?;
        let mut units: BTreeMap<InstrumentId, f64> = book
            .positions
            .iter()
            .map(|p| (p.instrument, p.units))
            .collect();
        for order in &book.open_orders {
            if let Some(u) = self.implied_units(&book.currency, order, date) {
                units.insert(order.instrument, u);
            }
        }
        Ok(units
            .into_iter()
            .filter(|(_, u)| *u != 0.0)
            .map(|(i, u)| Position::new(i, u))
            .collect())
    }

    fn aum(&self, portfolio: PortfolioId, _date: NaiveDate) -> Option<f64> {
        self.portfolios.get(&portfolio)?.aum
    }

    fn nav_history(&self, portfolio: PortfolioId) -> TimeSeries {
        self.portfolios
            .get(&portfolio)
            .map(|b| b.navs.clone())
            .unwrap_or_default()
    }

    fn initial_nav(&self, portfolio: PortfolioId) -> Option<f64> {
        self.portfolios.get(&portfolio)?.initial_nav
    }
}

impl OrderSink for MemoryHost {
    fn create_target_order(&mut self, request: &TargetOrderRequest) -> Result<(), HostError> {
        self.accept(request)
    }

    fn update_target_order(&mut self, request: &TargetOrderRequest) -> Result<(), HostError> {
        self.accept(request)
    }
}

impl NavSink for MemoryHost {
    /// Appends or overwrites the NAV on `date`; later dates are dropped so
    /// the history stays strictly increasing.
    fn commit_nav(&mut self, portfolio: PortfolioId, date: NaiveDate, nav: f64) -> Result<(), HostError> {
        let book = self
            .portfolios
            .get_mut(&portfolio)
            .ok_or(HostError::UnknownPortfolio(portfolio))?;
        let mut points: Vec<(NaiveDate, f64)> = book
            .navs
            .points()
            .iter()
            .copied()
            .filter(|(d, _)| *d < date)
            .collect();
        points.push((date, nav));
        book.navs = TimeSeries::new(points).unwrap_or_default();
        Ok(())
    }
}

impl Calendar for MemoryHost {
    fn is_business_day(&self, date: NaiveDate) -> bool {
        is_weekday(date) && !self.holidays.contains(&date)
    }
}

impl ConfigSource for MemoryHost {
    fn config_value(&self, portfolio: PortfolioId, date: NaiveDate, param: ConfigParam) -> Option<f64> {
        self.portfolios.get(&portfolio)?.config.value(date, param)
    }
}
