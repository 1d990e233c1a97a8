//! Synthetic time-series aggregator.
//!
//! Builds one cash-difference series per eligible instrument:
//! - leaf: lookback window scaled to `reference_aum × fx / last`, first
//!   difference, NaN -> 0
//! - nested strategy: sum of its held children's cash differences, in
//!   units actually held (recursing depth-first into nested children)
//!
//! Every series is then re-gridded onto the longest one.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rbk_host::{Host, HostError};
use rbk_schemas::{Instrument, InstrumentId, PortfolioId};
use rbk_timeseries::{align_to_longest, TimeSeries};

use crate::SeriesMap;

/// Instruments with fewer observations up to the evaluation date are skipped.
pub const MIN_OBSERVATIONS: usize = 5;

pub fn build_series_map(
    host: &dyn Host,
    portfolio: PortfolioId,
    universe: &[InstrumentId],
    date: NaiveDate,
    reference_aum: f64,
    lookback: Option<usize>,
) -> Result<SeriesMap, HostError> {
    let currency = host.portfolio_currency(portfolio)?;
    let mut raw = SeriesMap::new();

    for id in universe {
        if host.is_reserve(portfolio, *id) {
            continue;
        }
        let inst = host.instrument(*id)?;
        let Some(series) = eligible_series(host, &inst, date) else {
            tracing::debug!(instrument = %id, "not enough history; excluded");
            continue;
        };

        let synthetic = match inst.portfolio.filter(|_| inst.is_nested()) {
            Some(nested) => {
                let mut path = BTreeSet::from([inst.id]);
                nested_series(host, &inst, nested, date, lookback, &currency, &mut path)?
            }
            None => None,
        };
        let out = match synthetic {
            Some(s) => s,
            None => leaf_series(host, &inst, &series, date, lookback, reference_aum, &currency),
        };
        raw.insert(*id, out);
    }

    if raw.is_empty() {
        return Ok(raw);
    }
    Ok(align_to_longest(raw))
}

/// Natural series of `inst` when it has at least `MIN_OBSERVATIONS` points up to `date`.
pub fn eligible_series(host: &dyn Host, inst: &Instrument, date: NaiveDate) -> Option<TimeSeries> {
    host.natural_series(inst)
        .filter(|s| s.count_up_to(date) >= MIN_OBSERVATIONS)
}

fn leaf_series(
    host: &dyn Host,
    inst: &Instrument,
    series: &TimeSeries,
    date: NaiveDate,
    lookback: Option<usize>,
    reference_aum: f64,
    currency: &str,
) -> TimeSeries {
    let window = series.window_ending(date, lookback);
    let last = window.last_value().unwrap_or(f64::NAN);
    let fx = host.fx_rate(&inst.currency, currency, date).unwrap_or(f64::NAN);
    window.scale(reference_aum * fx / last).diff().replace_nan(0.0)
}

/// Cash P&L proxy of a nested strategy in `parent_currency`. `None` when it
/// holds no eligible children.
fn nested_series(
    host: &dyn Host,
    inst: &Instrument,
    portfolio: PortfolioId,
    date: NaiveDate,
    lookback: Option<usize>,
    parent_currency: &str,
    path: &mut BTreeSet<InstrumentId>,
) -> Result<Option<TimeSeries>, HostError> {
    let currency = host.portfolio_currency(portfolio)?;
    let mut parts: Vec<TimeSeries> = Vec::new();

    for child_id in host.instruments(portfolio)? {
        if host.is_reserve(portfolio, child_id) {
            continue;
        }
        if path.contains(&child_id) {
            tracing::warn!(parent = %inst.id, child = %child_id, "cycle in nested strategies; child skipped");
            continue;
        }
        let units = match host.position(portfolio, child_id) {
            Some(p) if p.units != 0.0 => p.units,
            _ => continue,
        };
        let child = host.instrument(child_id)?;
        let Some(series) = eligible_series(host, &child, date) else {
            continue;
        };
        let fx = host.fx_rate(&child.currency, &currency, date).unwrap_or(f64::NAN);

        let nested_part = match child.portfolio.filter(|_| child.is_nested()) {
            Some(grandchild) => {
                path.insert(child_id);
                let sub = nested_series(host, &child, grandchild, date, lookback, &currency, path)?;
                path.remove(&child_id);
                match sub {
                    Some(s) => held_fraction(host, grandchild, &series, units, date).map(|f| s.scale(f)),
                    None => None,
                }
            }
            None => None,
        };

        let part = match nested_part {
            Some(p) => p,
            None => series
                .window_ending(date, lookback)
                .diff()
                .scale(units * child.multiplier() * fx)
                .replace_nan(0.0),
        };
        parts.push(part);
    }

    let Some(total) = sum_on_longest(inst, parts) else {
        return Ok(None);
    };
    let fx = host.fx_rate(&currency, parent_currency, date).unwrap_or(f64::NAN);
    Ok(Some(total.scale(fx).replace_nan(0.0)))
}

/// Share of a nested child's portfolio held: `units × NAV / child AUM`.
fn held_fraction(
    host: &dyn Host,
    portfolio: PortfolioId,
    nav: &TimeSeries,
    units: f64,
    date: NaiveDate,
) -> Option<f64> {
    let aum = host.aum(portfolio, date).filter(|a| *a != 0.0)?;
    let idx = nav.closest_prior_index(date)?;
    let value = nav.value(idx)?;
    Some(units * value / aum)
}

/// Pointwise sum onto the longest part. Parts of other lengths are skipped.
fn sum_on_longest(inst: &Instrument, parts: Vec<TimeSeries>) -> Option<TimeSeries> {
    let longest = parts.iter().map(|p| p.len()).max()?;
    let mut total: Option<TimeSeries> = None;
    for part in parts {
        if part.len() != longest {
            tracing::warn!(
                parent = %inst.id,
                len = part.len(),
                expected = longest,
                "child series length differs; not summed"
            );
            continue;
        }
        total = match total {
            None => Some(part),
            Some(acc) => acc.add_aligned(&part),
        };
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbk_host::MemoryHost;
    use rbk_schemas::{InstrumentCategory, SeriesKind};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    const P: PortfolioId = PortfolioId(1);

    #[test]
    fn leaf_is_scaled_cash_difference() {
        let host = MemoryHost::new()
            .with_instrument(Instrument::new(1, "A", InstrumentCategory::Etf, "USD"))
            .with_series(
                InstrumentId(1),
                SeriesKind::AdjustedClose,
                TimeSeries::daily(d(1), &[100.0, 101.0, 99.0, 100.0, 102.0, 100.0]),
            )
            .with_portfolio(P, "USD")
            .with_member(P, InstrumentId(1));

        let map = build_series_map(&host, P, &[InstrumentId(1)], d(6), 1_000.0, Some(3)).unwrap();
        // window [100, 102, 100], scale 1000/100 = 10
        assert_eq!(map[&InstrumentId(1)].values(), vec![0.0, 20.0, -20.0]);
    }

    #[test]
    fn short_history_and_reserves_are_excluded() {
        let host = MemoryHost::new()
            .with_instrument(Instrument::new(1, "A", InstrumentCategory::Etf, "USD"))
            .with_instrument(Instrument::new(2, "CASH", InstrumentCategory::Currency, "USD"))
            .with_series(InstrumentId(1), SeriesKind::AdjustedClose, TimeSeries::daily(d(1), &[1.0; 4]))
            .with_series(InstrumentId(2), SeriesKind::Close, TimeSeries::daily(d(1), &[1.0; 10]))
            .with_portfolio(P, "USD")
            .with_member(P, InstrumentId(1))
            .with_reserve(P, InstrumentId(2));

        let map = build_series_map(&host, P, &[InstrumentId(1), InstrumentId(2)], d(10), 1.0, None).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn missing_fx_gives_zero_series() {
        let host = MemoryHost::new()
            .with_instrument(Instrument::new(1, "A", InstrumentCategory::Etf, "JPY"))
            .with_series(InstrumentId(1), SeriesKind::AdjustedClose, TimeSeries::daily(d(1), &[1.0, 2.0, 3.0, 4.0, 5.0]))
            .with_portfolio(P, "USD")
            .with_member(P, InstrumentId(1));

        let map = build_series_map(&host, P, &[InstrumentId(1)], d(5), 1.0, None).unwrap();
        assert!(map[&InstrumentId(1)].values().iter().all(|v| *v == 0.0));
    }
}
