//! Historical value-at-risk over proposed exposures.
//!
//! Each instrument contributes rolling `horizon`-day simple returns (the last
//! `observations` of them); a nested strategy contributes the
//! notional-weighted returns of its own holdings instead of its NAV. The
//! portfolio return per observation is `Σ exposure_i × r_i` with exposures
//! expressed as fractions of the reference AUM.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rbk_host::{Host, HostError};
use rbk_schemas::{Instrument, InstrumentId, PortfolioId};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VarSettings {
    pub horizon: usize,
    pub observations: usize,
    pub percentile: f64,
}

impl Default for VarSettings {
    fn default() -> Self {
        Self {
            horizon: 20,
            observations: 252,
            percentile: 0.01,
        }
    }
}

/// Lower-tail portfolio return at `settings.percentile` (negative = loss).
/// `None` when no instrument has enough history.
pub fn value_at_risk(
    host: &dyn Host,
    portfolio: PortfolioId,
    exposures: &BTreeMap<InstrumentId, f64>,
    date: NaiveDate,
    settings: &VarSettings,
) -> Result<Option<f64>, HostError> {
    let mut total: Vec<f64> = Vec::new();
    let mut path = BTreeSet::new();
    for (id, exposure) in exposures {
        if *exposure == 0.0 {
            continue;
        }
        let inst = host.instrument(*id)?;
        let r = instrument_returns(host, &inst, date, settings, &mut path)?;
        add_aligned_tail(&mut total, &r, *exposure);
    }
    tracing::debug!(%portfolio, observations = total.len(), "var observations built");
    Ok(percentile(total, settings.percentile))
}

/// Scale factor applied to the weights for a realised VaR against a target.
///
/// Scales towards the target only while the realised loss is within it;
/// a breach leaves the weights unchanged.
pub fn var_scaling(realized: f64, target: f64) -> f64 {
    let target_loss = -target.abs();
    if realized < 0.0 && realized >= target_loss {
        target.abs() / realized.abs()
    } else {
        1.0
    }
}

fn instrument_returns(
    host: &dyn Host,
    inst: &Instrument,
    date: NaiveDate,
    settings: &VarSettings,
    path: &mut BTreeSet<InstrumentId>,
) -> Result<Vec<f64>, HostError> {
    if let Some(portfolio) = inst.portfolio.filter(|_| inst.is_nested()) {
        if path.contains(&inst.id) {
            tracing::warn!(instrument = %inst.id, "nested strategy already on var path; using its own series");
        } else if let Some(r) = nested_returns(host, inst, portfolio, date, settings, path)? {
            return Ok(r);
        }
    }
    Ok(own_returns(host, inst, date, settings))
}

fn nested_returns(
    host: &dyn Host,
    inst: &Instrument,
    portfolio: PortfolioId,
    date: NaiveDate,
    settings: &VarSettings,
    path: &mut BTreeSet<InstrumentId>,
) -> Result<Option<Vec<f64>>, HostError> {
    let Some(aum) = host.aum(portfolio, date).filter(|a| *a != 0.0) else {
        return Ok(None);
    };
    let holdings = host.holdings(portfolio, date)?;
    if holdings.is_empty() {
        return Ok(None);
    }
    let currency = host.portfolio_currency(portfolio)?;

    path.insert(inst.id);
    let mut combined: Vec<f64> = Vec::new();
    for h in holdings {
        if path.contains(&h.instrument) {
            tracing::warn!(parent = %inst.id, child = %h.instrument, "cycle in nested holdings skipped");
            continue;
        }
        let child = host.instrument(h.instrument)?;
        let notional = host
            .price(&child, date)
            .zip(host.fx_rate(&child.currency, &currency, date))
            .map(|(p, fx)| h.units * p * child.multiplier() * fx)
            .filter(|n| n.is_finite());
        let Some(notional) = notional else {
            continue;
        };
        let r = instrument_returns(host, &child, date, settings, path)?;
        add_aligned_tail(&mut combined, &r, notional / aum);
    }
    path.remove(&inst.id);
    Ok(Some(combined))
}

fn own_returns(host: &dyn Host, inst: &Instrument, date: NaiveDate, settings: &VarSettings) -> Vec<f64> {
    let Some(series) = host.natural_series(inst) else {
        return Vec::new();
    };
    let window = series.window_ending(date, Some(settings.observations + settings.horizon));
    window
        .pct_change(settings.horizon)
        .values()
        .into_iter()
        .skip(settings.horizon)
        .map(|r| if r.is_finite() { r } else { 0.0 })
        .collect()
}

/// Adds `scale × v` onto `acc`, aligning both on their most recent observation.
fn add_aligned_tail(acc: &mut Vec<f64>, v: &[f64], scale: f64) {
    if v.len() > acc.len() {
        let mut padded = vec![0.0; v.len() - acc.len()];
        padded.append(acc);
        *acc = padded;
    }
    let offset = acc.len() - v.len();
    for (j, x) in v.iter().enumerate() {
        acc[offset + j] += scale * x;
    }
}

/// Linear interpolation at `p × (n − 1)` of the ascending sort.
fn percentile(mut values: Vec<f64>, p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let pos = p.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}
