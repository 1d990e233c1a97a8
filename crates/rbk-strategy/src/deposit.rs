//! Cash-accrual strategy: NAV grows at `spread + funding rate` on Act/360.

use chrono::NaiveDate;
use rbk_config::StrategyParams;
use rbk_host::{Host, NavSink};
use rbk_schemas::{Instrument, PortfolioId};
use serde::Serialize;

use crate::strategy::strategy_portfolio;
use crate::StrategyError;

/// NAV used when neither a committed NAV nor an initial NAV exists.
pub const DEFAULT_INITIAL_NAV: f64 = 100.0;

/// Act/360 day count.
pub const DAY_COUNT_BASIS: f64 = 360.0;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Accrual {
    pub date: NaiveDate,
    /// Date of the NAV accrued from; `None` on the first commit.
    pub previous_date: Option<NaiveDate>,
    pub previous_nav: f64,
    pub days: i64,
    /// Funding rate in percent.
    pub rate: f64,
    pub spread: f64,
    pub nav: f64,
}

pub struct DepositStrategy {
    instrument: Instrument,
    portfolio: PortfolioId,
}

impl DepositStrategy {
    pub fn new(instrument: Instrument) -> Result<Self, StrategyError> {
        let portfolio = strategy_portfolio(&instrument)?;
        Ok(Self { instrument, portfolio })
    }

    pub fn portfolio(&self) -> PortfolioId {
        self.portfolio
    }

    /// NAV for `date` without committing it.
    pub fn next_nav(&self, host: &dyn Host, date: NaiveDate) -> Result<Accrual, StrategyError> {
        let params = StrategyParams::resolve(host, self.portfolio, date);
        let spread = params.spread.unwrap_or(0.0);
        let rate = match params.funding_instrument {
            Some(id) => {
                let funding = host.instrument(id)?;
                host.price(&funding, date).filter(|r| !r.is_nan()).unwrap_or(0.0)
            }
            None => 0.0,
        };

        let history = host.nav_history(self.portfolio);
        let previous = date
            .pred_opt()
            .and_then(|day_before| history.closest_prior_index(day_before))
            .and_then(|i| history.points().get(i).copied())
            .filter(|(_, v)| v.is_finite());
        let initial = host.initial_nav(self.portfolio).unwrap_or(DEFAULT_INITIAL_NAV);

        let (previous_date, previous_nav, days) = match previous {
            Some((d, v)) => (Some(d), v, (date - d).num_days()),
            None => (None, initial, 0),
        };
        let nav = previous_nav * (1.0 + (spread + rate / 100.0) * days as f64 / DAY_COUNT_BASIS);

        Ok(Accrual {
            date,
            previous_date,
            previous_nav,
            days,
            rate,
            spread,
            nav,
        })
    }

    /// Compute and commit the NAV for `date`.
    pub fn accrue<H: Host + NavSink>(&self, host: &mut H, date: NaiveDate) -> Result<Accrual, StrategyError> {
        let accrual = self.next_nav(&*host, date)?;
        host.commit_nav(self.portfolio, date, accrual.nav)?;
        tracing::info!(
            strategy = %self.instrument.id,
            %date,
            nav = accrual.nav,
            days = accrual.days,
            "nav committed"
        );
        Ok(accrual)
    }
}
