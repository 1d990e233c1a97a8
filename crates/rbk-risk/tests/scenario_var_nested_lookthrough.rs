//! VaR through nested strategies
//!
//! GREEN when:
//! - A nested strategy fully invested in one asset has the same VaR as the
//!   asset itself at equal exposure.
//! - VaR scales linearly with exposure.
//! - Mutually nested strategies terminate.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rbk_host::{MarketData, MemoryHost};
use rbk_risk::{value_at_risk, VarSettings};
use rbk_schemas::{Instrument, InstrumentCategory, InstrumentId, PortfolioId, SeriesKind};
use rbk_timeseries::TimeSeries;

const PARENT: PortfolioId = PortfolioId(1);
const CHILD: PortfolioId = PortfolioId(2);
const ASSET: InstrumentId = InstrumentId(10);
const NESTED: InstrumentId = InstrumentId(20);

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
}

fn wave(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + 10.0 * (i as f64 * 0.3).sin()).collect()
}

fn world() -> (MemoryHost, NaiveDate) {
    let prices = TimeSeries::daily(start(), &wave(300));
    let (date, last) = prices.last().unwrap();

    let host = MemoryHost::new()
        .with_instrument(Instrument::new(10, "ASSET", InstrumentCategory::Etf, "USD"))
        .with_instrument(
            Instrument::new(20, "NESTED", InstrumentCategory::Strategy, "USD").with_portfolio(CHILD),
        )
        .with_series(ASSET, SeriesKind::AdjustedClose, prices)
        .with_series(NESTED, SeriesKind::Last, TimeSeries::daily(start(), &vec![100.0; 300]))
        .with_portfolio(PARENT, "USD")
        .with_member(PARENT, ASSET)
        .with_member(PARENT, NESTED)
        .with_portfolio(CHILD, "USD")
        .with_member(CHILD, ASSET)
        .with_position(CHILD, ASSET, 10.0)
        .with_aum(CHILD, 10.0 * last);
    (host, date)
}

fn var_of(host: &MemoryHost, id: InstrumentId, exposure: f64, date: NaiveDate) -> f64 {
    let mut exposures = BTreeMap::new();
    exposures.insert(id, exposure);
    value_at_risk(host, PARENT, &exposures, date, &VarSettings::default())
        .unwrap()
        .unwrap()
}

#[test]
fn fully_invested_nested_matches_underlying() {
    let (host, date) = world();
    let direct = var_of(&host, ASSET, 1.0, date);
    let nested = var_of(&host, NESTED, 1.0, date);
    assert!(direct < 0.0, "a 10% sine wave must lose at the 1% tail");
    assert!((direct - nested).abs() < 1e-12, "direct={direct} nested={nested}");
}

#[test]
fn var_scales_with_exposure() {
    let (host, date) = world();
    let one = var_of(&host, ASSET, 1.0, date);
    let half = var_of(&host, ASSET, 0.5, date);
    assert!((half - 0.5 * one).abs() < 1e-12);
}

#[test]
fn mutually_nested_strategies_terminate() {
    let a = Instrument::new(30, "A", InstrumentCategory::Strategy, "USD").with_portfolio(PortfolioId(3));
    let b = Instrument::new(40, "B", InstrumentCategory::Strategy, "USD").with_portfolio(PortfolioId(4));
    let nav = TimeSeries::daily(start(), &wave(300));
    let date = nav.last().unwrap().0;

    let host = MemoryHost::new()
        .with_instrument(a.clone())
        .with_instrument(b.clone())
        .with_series(a.id, SeriesKind::Last, nav.clone())
        .with_series(b.id, SeriesKind::Last, nav)
        .with_portfolio(PortfolioId(3), "USD")
        .with_member(PortfolioId(3), b.id)
        .with_position(PortfolioId(3), b.id, 1.0)
        .with_aum(PortfolioId(3), 100.0)
        .with_portfolio(PortfolioId(4), "USD")
        .with_member(PortfolioId(4), a.id)
        .with_position(PortfolioId(4), a.id, 1.0)
        .with_aum(PortfolioId(4), 100.0);

    assert!(host.price(&a, date).is_some());
    let mut exposures = BTreeMap::new();
    exposures.insert(a.id, 1.0);
    let out = value_at_risk(&host, PortfolioId(3), &exposures, date, &VarSettings::default());
    assert!(out.is_ok());
}
