use chrono::NaiveDate;
use rbk_host::Host;
use rbk_schemas::Instrument;
use rbk_timeseries::{annualisation_factor, TimeSeries};

/// Water marks of an instrument's valuation series up to a date.
#[derive(Clone, Debug, PartialEq)]
pub struct Watermarks {
    /// Highest value in the history.
    pub high: f64,
    /// Lowest value at or after the high.
    pub low: f64,
    pub current: f64,
    /// Value one observation before `current` (equals `current` for a single point).
    pub prior: f64,
    pub history: TimeSeries,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExposureParams {
    /// Number of log returns used for realised volatility; whole history when `None`.
    pub days_back: Option<usize>,
    /// Stop once the drawdown from the high exceeds `threshold × volatility`.
    pub threshold: Option<f64>,
}

/// Strategy-specific risk behaviour. Every method has a default; an
/// implementation overrides only what it needs.
pub trait RiskModel {
    fn high_low_mark(&self, host: &dyn Host, instrument: &Instrument, date: NaiveDate) -> Option<Watermarks> {
        default_high_low_mark(host, instrument, date)
    }

    /// Annualised quadratic variation of a cash series as a fraction of `reference_aum`.
    fn risk(&self, series: &TimeSeries, reference_aum: f64) -> f64 {
        if reference_aum == 0.0 {
            return 0.0;
        }
        series.quadratic_variation() * annualisation_factor() / reference_aum
    }

    /// 1.0 for full exposure, 0.0 while stopped out.
    fn exposure(
        &self,
        host: &dyn Host,
        instrument: &Instrument,
        date: NaiveDate,
        params: &ExposureParams,
    ) -> f64 {
        let Some(marks) = self.high_low_mark(host, instrument, date) else {
            return 1.0;
        };
        let (Some(threshold), Some(vol)) = (params.threshold, realized_volatility(&marks.history, params.days_back))
        else {
            return 1.0;
        };
        if marks.high <= 0.0 {
            return 1.0;
        }

        let drawdown = (marks.high - marks.current) / marks.high;
        if drawdown > threshold * vol {
            // Stopped; re-enter only close to the trough.
            if marks.current < (1.0 + vol) * marks.low {
                return 1.0;
            }
            tracing::debug!(instrument = %instrument.id, drawdown, vol, "exposure stopped");
            return 0.0;
        }
        1.0
    }

    /// `1 + min(current/high - 1, 0) + (current/low - 1)`; 1.0 without usable marks.
    fn information_ratio(&self, host: &dyn Host, instrument: &Instrument, date: NaiveDate) -> f64 {
        match self.high_low_mark(host, instrument, date) {
            Some(m) if m.high > 0.0 && m.low > 0.0 => {
                1.0 + (m.current / m.high - 1.0).min(0.0) + (m.current / m.low - 1.0)
            }
            _ => 1.0,
        }
    }
}

/// The stock behaviour with nothing overridden.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRiskModel;

impl RiskModel for DefaultRiskModel {}

/// Annualised sample volatility of the trailing `days_back` log returns.
pub fn realized_volatility(history: &TimeSeries, days_back: Option<usize>) -> Option<f64> {
    let window = match days_back {
        Some(n) => history.tail(n + 1),
        None => history.clone(),
    };
    window
        .log_returns()
        .drop_nan()
        .std_dev()
        .map(|sd| sd * annualisation_factor())
}

/// Marks over the full history up to `date`.
///
/// A nested strategy whose portfolio holds exactly one non-strategy
/// instrument is valued on that instrument's series instead of its own NAV.
pub fn default_high_low_mark(host: &dyn Host, instrument: &Instrument, date: NaiveDate) -> Option<Watermarks> {
    let valued = look_through(host, instrument).unwrap_or_else(|| instrument.clone());
    let history = host.natural_series(&valued)?.up_to(date).drop_nan();

    let (hi_idx, high) = history.max()?;
    let low = history
        .points()
        .iter()
        .skip(hi_idx)
        .map(|(_, v)| *v)
        .fold(f64::INFINITY, f64::min);
    let n = history.len();
    let current = history.value(n - 1)?;
    let prior = if n >= 2 { history.value(n - 2)? } else { current };

    Some(Watermarks {
        high,
        low,
        current,
        prior,
        history,
    })
}

fn look_through(host: &dyn Host, instrument: &Instrument) -> Option<Instrument> {
    let portfolio = instrument.portfolio.filter(|_| instrument.is_nested())?;
    let members = host.instruments(portfolio).ok()?;
    let [only] = members.as_slice() else {
        return None;
    };
    let inner = host.instrument(*only).ok()?;
    (!inner.category.is_strategy()).then_some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbk_host::MemoryHost;
    use rbk_schemas::{InstrumentCategory, InstrumentId, PortfolioId, SeriesKind};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn etf(values: &[f64]) -> (MemoryHost, Instrument) {
        let inst = Instrument::new(1, "ETF", InstrumentCategory::Etf, "USD");
        let host = MemoryHost::new()
            .with_instrument(inst.clone())
            .with_series(InstrumentId(1), SeriesKind::AdjustedClose, TimeSeries::daily(d(1), values));
        (host, inst)
    }

    #[test]
    fn marks_track_low_after_high() {
        let (host, inst) = etf(&[90.0, 120.0, 100.0, 80.0, 95.0]);
        let m = DefaultRiskModel.high_low_mark(&host, &inst, d(5)).unwrap();
        assert_eq!(m.high, 120.0);
        assert_eq!(m.low, 80.0);
        assert_eq!(m.current, 95.0);
        assert_eq!(m.prior, 80.0);

        // Only history up to the date counts.
        let early = DefaultRiskModel.high_low_mark(&host, &inst, d(2)).unwrap();
        assert_eq!(early.current, 120.0);
        assert_eq!(early.history.len(), 2);
    }

    #[test]
    fn nested_single_asset_strategy_looks_through() {
        let (host, etf) = etf(&[10.0, 11.0, 12.0]);
        let wrapper = Instrument::new(2, "WRAP", InstrumentCategory::Strategy, "USD").with_portfolio(PortfolioId(2));
        let host = host
            .with_instrument(wrapper.clone())
            .with_series(InstrumentId(2), SeriesKind::Last, TimeSeries::daily(d(1), &[100.0, 50.0, 75.0]))
            .with_portfolio(PortfolioId(2), "USD")
            .with_member(PortfolioId(2), etf.id);

        let m = DefaultRiskModel.high_low_mark(&host, &wrapper, d(3)).unwrap();
        assert_eq!(m.high, 12.0);
    }

    #[test]
    fn information_ratio_penalises_distance_from_peak() {
        let (host, inst) = etf(&[100.0, 80.0, 88.0]);
        let ir = DefaultRiskModel.information_ratio(&host, &inst, d(3));
        let expected = 1.0 + (0.88 - 1.0) + (88.0 / 80.0 - 1.0);
        assert!((ir - expected).abs() < 1e-12);

        let (host, inst) = etf(&[]);
        assert_eq!(DefaultRiskModel.information_ratio(&host, &inst, d(3)), 1.0);
    }

    #[test]
    fn risk_is_annualised_rms_over_aum() {
        let s = TimeSeries::daily(d(1), &[1_000.0, -1_000.0, 1_000.0, -1_000.0]);
        let r = DefaultRiskModel.risk(&s, 1_000_000.0);
        assert!((r - 1_000.0 * 252f64.sqrt() / 1_000_000.0).abs() < 1e-15);
        assert_eq!(DefaultRiskModel.risk(&s, 0.0), 0.0);
    }

    #[test]
    fn exposure_stops_after_large_drawdown() {
        // Calm tail (vol ~0.14) after a 20% drawdown from the high.
        let (host, inst) = etf(&[100.0, 90.0, 50.0, 60.0, 80.0, 80.5, 80.0]);
        let tight = ExposureParams {
            days_back: Some(2),
            threshold: Some(1.0),
        };
        assert_eq!(DefaultRiskModel.exposure(&host, &inst, d(7), &tight), 0.0);

        // Without a threshold there is no stop.
        assert_eq!(DefaultRiskModel.exposure(&host, &inst, d(7), &ExposureParams::default()), 1.0);

        let wide = ExposureParams {
            days_back: Some(2),
            threshold: Some(100.0),
        };
        assert_eq!(DefaultRiskModel.exposure(&host, &inst, d(7), &wide), 1.0);
    }

    #[test]
    fn stopped_exposure_reenters_near_the_trough() {
        let (host, inst) = etf(&[100.0, 90.0, 50.0, 50.5, 50.0]);
        let params = ExposureParams {
            days_back: Some(2),
            threshold: Some(1.0),
        };
        assert_eq!(DefaultRiskModel.exposure(&host, &inst, d(5), &params), 1.0);
    }
}
