//! Notional bases of nested strategies.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rbk_host::{Host, HostError};
use rbk_schemas::{Instrument, PortfolioId};

/// Ratio translating a weight in the parent's notional base into a nested
/// strategy's own base: `own AUM / reference AUM`.
///
/// 1.0 for leaves, for nested strategies without a usable AUM, and for
/// nested strategies holding nothing.
pub fn notional_adjustment(
    host: &dyn Host,
    instrument: &Instrument,
    date: NaiveDate,
    reference_aum: f64,
) -> Result<f64, HostError> {
    let Some(portfolio) = instrument.portfolio.filter(|_| instrument.is_nested()) else {
        return Ok(1.0);
    };
    if reference_aum == 0.0 || !reference_aum.is_finite() {
        return Ok(1.0);
    }
    let Some(own) = host.aum(portfolio, date).filter(|a| *a > 0.0 && a.is_finite()) else {
        return Ok(1.0);
    };
    if host.holdings(portfolio, date)?.is_empty() {
        return Ok(1.0);
    }
    Ok(own / reference_aum)
}

/// Gross notional of `portfolio` in its own currency:
/// `Σ |units × price × point size × fx|` over holdings, where a nested
/// holding counts at its value times that strategy's own gross leverage.
pub fn gross_notional(host: &dyn Host, portfolio: PortfolioId, date: NaiveDate) -> Result<f64, HostError> {
    let mut path = BTreeSet::new();
    gross_notional_inner(host, portfolio, date, &mut path)
}

/// Gross leverage of a nested strategy (`gross notional / AUM`); 1.0 for
/// leaves and whenever it cannot be determined.
pub fn lookthrough_leverage(host: &dyn Host, instrument: &Instrument, date: NaiveDate) -> Result<f64, HostError> {
    let mut path = BTreeSet::new();
    leverage_inner(host, instrument, date, &mut path)
}

fn leverage_inner(
    host: &dyn Host,
    instrument: &Instrument,
    date: NaiveDate,
    path: &mut BTreeSet<PortfolioId>,
) -> Result<f64, HostError> {
    let Some(portfolio) = instrument.portfolio.filter(|_| instrument.is_nested()) else {
        return Ok(1.0);
    };
    if path.contains(&portfolio) {
        tracing::warn!(instrument = %instrument.id, %portfolio, "cycle in nested portfolios; leverage 1.0");
        return Ok(1.0);
    }
    let Some(aum) = host.aum(portfolio, date).filter(|a| *a > 0.0 && a.is_finite()) else {
        return Ok(1.0);
    };
    if host.holdings(portfolio, date)?.is_empty() {
        return Ok(1.0);
    }
    let gross = gross_notional_inner(host, portfolio, date, path)?;
    Ok(gross / aum)
}

fn gross_notional_inner(
    host: &dyn Host,
    portfolio: PortfolioId,
    date: NaiveDate,
    path: &mut BTreeSet<PortfolioId>,
) -> Result<f64, HostError> {
    let currency = host.portfolio_currency(portfolio)?;
    path.insert(portfolio);

    let mut total = 0.0;
    for h in host.holdings(portfolio, date)? {
        let inst = host.instrument(h.instrument)?;
        let (Some(price), Some(fx)) = (host.price(&inst, date), host.fx_rate(&inst.currency, &currency, date))
        else {
            tracing::debug!(%portfolio, instrument = %inst.id, "no price or fx; excluded from gross notional");
            continue;
        };
        let value = (h.units * price * inst.multiplier() * fx).abs();
        let leverage = leverage_inner(host, &inst, date, path)?;
        if value.is_finite() && leverage.is_finite() {
            total += value * leverage;
        }
    }

    path.remove(&portfolio);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbk_host::{MarketData, MemoryHost};
    use rbk_schemas::{InstrumentCategory, InstrumentId, SeriesKind};
    use rbk_timeseries::TimeSeries;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    const PARENT: PortfolioId = PortfolioId(1);
    const CHILD: PortfolioId = PortfolioId(2);

    fn nested() -> Instrument {
        Instrument::new(20, "SUB", InstrumentCategory::Strategy, "USD").with_portfolio(CHILD)
    }

    fn host() -> MemoryHost {
        MemoryHost::new()
            .with_instrument(Instrument::new(10, "FUT", InstrumentCategory::Future, "EUR").with_point_size(50.0))
            .with_instrument(nested())
            .with_series(InstrumentId(10), SeriesKind::Close, TimeSeries::daily(d(1), &[4_000.0]))
            .with_series(InstrumentId(20), SeriesKind::Last, TimeSeries::daily(d(1), &[200.0]))
            .with_fx("EUR", "USD", TimeSeries::daily(d(1), &[1.1]))
            .with_portfolio(PARENT, "USD")
            .with_member(PARENT, InstrumentId(20))
            .with_portfolio(CHILD, "USD")
            .with_member(CHILD, InstrumentId(10))
            .with_aum(CHILD, 50_000_000.0)
    }

    #[test]
    fn adjustment_is_own_over_reference_aum() {
        let h = host().with_position(CHILD, InstrumentId(10), -100.0);
        let adj = notional_adjustment(&h, &nested(), d(1), 100_000_000.0).unwrap();
        assert!((adj - 0.5).abs() < 1e-12);

        let leaf = h.instrument(InstrumentId(10)).unwrap();
        assert_eq!(notional_adjustment(&h, &leaf, d(1), 100_000_000.0).unwrap(), 1.0);
    }

    #[test]
    fn adjustment_is_neutral_without_positions() {
        let adj = notional_adjustment(&host(), &nested(), d(1), 100_000_000.0).unwrap();
        assert_eq!(adj, 1.0);
    }

    #[test]
    fn gross_notional_looks_through_nested_holdings() {
        // Child: 100 short futures = 100 × 4000 × 50 × 1.1 = 22m on 50m AUM.
        // Parent holds 1000 units of the child at NAV 200 = 200k.
        let h = host()
            .with_position(CHILD, InstrumentId(10), -100.0)
            .with_position(PARENT, InstrumentId(20), 1_000.0);

        let child_gross = gross_notional(&h, CHILD, d(1)).unwrap();
        assert!((child_gross - 22_000_000.0).abs() < 1e-6);

        let parent_gross = gross_notional(&h, PARENT, d(1)).unwrap();
        assert!((parent_gross - 200_000.0 * 0.44).abs() < 1e-6);
    }

    #[test]
    fn self_holding_portfolio_terminates() {
        let looped = Instrument::new(30, "LOOP", InstrumentCategory::Strategy, "USD").with_portfolio(PortfolioId(3));
        let h = MemoryHost::new()
            .with_instrument(looped.clone())
            .with_series(looped.id, SeriesKind::Last, TimeSeries::daily(d(1), &[10.0]))
            .with_portfolio(PortfolioId(3), "USD")
            .with_member(PortfolioId(3), looped.id)
            .with_position(PortfolioId(3), looped.id, 5.0)
            .with_aum(PortfolioId(3), 100.0);

        assert_eq!(gross_notional(&h, PortfolioId(3), d(1)).unwrap(), 50.0);
        assert_eq!(lookthrough_leverage(&h, &looped, d(1)).unwrap(), 0.5);
    }
}
