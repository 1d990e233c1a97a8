//! `RiskBudgetStrategy`: one evaluation per (strategy, date).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rbk_config::StrategyParams;
use rbk_execution::{current_book, targets_to_order_requests, RebalanceDecision, TargetWeight};
use rbk_host::Host;
use rbk_portfolio::{
    build_series_map, check_global_leverage, check_individual_leverage, eligible_series, equal_weights,
    lookthrough_leverage, notional_adjustment, optimize, SeriesMap, WeightMap,
};
use rbk_risk::{value_at_risk, var_scaling, ExposureParams, RiskModel, VarSettings};
use rbk_schemas::{
    Direction, Instrument, InstrumentId, OrderMode, OrderSize, PortfolioId, TargetOrderRequest,
};
use rbk_timeseries::TimeSeries;
use serde::Serialize;

use crate::pipeline::{
    cap_global, cap_individual, equal_seed, gross_exposure, scale_all, scale_each, vol_scalar, FactorMap, StageTrace,
};
use crate::{RebalanceFrequency, StrategyError};

/// Outcome of one evaluation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Evaluation {
    /// Reference AUM was zero; nothing computed.
    Skipped,
    /// Full mode was not due on this date.
    Held,
    Bootstrap {
        orders: Vec<TargetOrderRequest>,
    },
    Full {
        trace: StageTrace,
        decision: RebalanceDecision,
    },
}

impl Evaluation {
    pub fn orders(&self) -> &[TargetOrderRequest] {
        match self {
            Evaluation::Bootstrap { orders } => orders,
            Evaluation::Full { decision, .. } => &decision.orders,
            Evaluation::Skipped | Evaluation::Held => &[],
        }
    }

    pub fn final_weights(&self) -> Option<&WeightMap> {
        match self {
            Evaluation::Full { trace, .. } => Some(trace.final_weights()),
            _ => None,
        }
    }
}

/// Risk-budget allocator bound to a strategy instrument and its portfolio.
pub struct RiskBudgetStrategy<'m> {
    instrument: Instrument,
    portfolio: PortfolioId,
    model: &'m dyn RiskModel,
    var: VarSettings,
}

impl<'m> RiskBudgetStrategy<'m> {
    /// Fails unless `instrument` is a strategy that owns a portfolio.
    pub fn new(instrument: Instrument, model: &'m dyn RiskModel) -> Result<Self, StrategyError> {
        let portfolio = strategy_portfolio(&instrument)?;
        Ok(Self {
            instrument,
            portfolio,
            model,
            var: VarSettings::default(),
        })
    }

    /// Look the instrument up on the host and validate it.
    pub fn load(host: &dyn Host, id: InstrumentId, model: &'m dyn RiskModel) -> Result<Self, StrategyError> {
        let instrument = host.instrument(id)?;
        Self::new(instrument, model)
    }

    pub fn with_var_settings(mut self, settings: VarSettings) -> Self {
        self.var = settings;
        self
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn portfolio(&self) -> PortfolioId {
        self.portfolio
    }

    pub fn evaluate(&self, host: &dyn Host, date: NaiveDate) -> Result<Evaluation, StrategyError> {
        let params = StrategyParams::resolve(host, self.portfolio, date);
        let reference_aum = self.reference_aum(host, &params, date);
        if reference_aum == 0.0 {
            tracing::info!(strategy = %self.instrument.id, %date, "reference AUM is zero; skipped");
            return Ok(Evaluation::Skipped);
        }

        let universe = host.instruments(self.portfolio)?;
        if params.is_bootstrap() {
            return self.bootstrap(host, &params, &universe, date, reference_aum);
        }

        if !self.rebalance_due(host, &params, date)? {
            tracing::debug!(strategy = %self.instrument.id, %date, "rebalance not due");
            return Ok(Evaluation::Held);
        }

        let series = build_series_map(host, self.portfolio, &universe, date, reference_aum, params.days_back)?;
        if series.is_empty() {
            tracing::info!(strategy = %self.instrument.id, %date, "no eligible history; bootstrapping");
            return self.bootstrap(host, &params, &universe, date, reference_aum);
        }

        self.full(host, &params, &series, date, reference_aum)
    }

    fn reference_aum(&self, host: &dyn Host, params: &StrategyParams, date: NaiveDate) -> f64 {
        match params.fixed_notional {
            Some(n) if n > 0.0 => n,
            _ => host
                .aum(self.portfolio, date)
                .filter(|a| a.is_finite())
                .unwrap_or(0.0),
        }
    }

    fn rebalance_due(&self, host: &dyn Host, params: &StrategyParams, date: NaiveDate) -> Result<bool, StrategyError> {
        if host.has_open_orders(self.portfolio)? {
            return Ok(true);
        }
        Ok(RebalanceFrequency::from_code(params.rebalancing_frequency).is_due(host, date))
    }

    fn exposure_params(params: &StrategyParams) -> ExposureParams {
        ExposureParams {
            days_back: params.days_back,
            threshold: params.exposure_threshold,
        }
    }

    fn bootstrap(
        &self,
        host: &dyn Host,
        params: &StrategyParams,
        universe: &[InstrumentId],
        date: NaiveDate,
        reference_aum: f64,
    ) -> Result<Evaluation, StrategyError> {
        let currency = host.portfolio_currency(self.portfolio)?;
        let exposure_params = Self::exposure_params(params);
        let mut orders = Vec::new();

        for id in universe {
            if host.is_reserve(self.portfolio, *id) {
                continue;
            }
            let held = host
                .position(self.portfolio, *id)
                .is_some_and(|p| p.units != 0.0);
            if held || host.open_order(self.portfolio, *id).is_some() {
                continue;
            }

            let inst = host.instrument(*id)?;
            if eligible_series(host, &inst, date).is_none() {
                tracing::debug!(instrument = %id, %date, "not enough history; not bootstrapped");
                continue;
            }
            let exposure = if params.exposure_management {
                self.model.exposure(host, &inst, date, &exposure_params)
            } else {
                1.0
            };

            let size = if inst.is_nested() {
                OrderSize::Notional(reference_aum * exposure)
            } else {
                let unit_value = host
                    .price(&inst, date)
                    .zip(host.fx_rate(&inst.currency, &currency, date))
                    .map(|(p, fx)| p * fx)
                    .filter(|v| v.is_finite() && *v > 0.0);
                let Some(unit_value) = unit_value else {
                    tracing::warn!(instrument = %id, %date, "no price; not bootstrapped");
                    continue;
                };
                OrderSize::Units(reference_aum / unit_value * exposure)
            };
            if size.is_zero() {
                continue;
            }

            let mut request = TargetOrderRequest::new(self.portfolio, *id, date, size, OrderMode::Create);
            if inst.is_nested() {
                request = request.with_direction(Direction::Long);
            }
            orders.push(request);
        }

        tracing::info!(strategy = %self.instrument.id, %date, orders = orders.len(), "bootstrap evaluated");
        Ok(Evaluation::Bootstrap { orders })
    }

    fn full(
        &self,
        host: &dyn Host,
        params: &StrategyParams,
        series: &SeriesMap,
        date: NaiveDate,
        reference_aum: f64,
    ) -> Result<Evaluation, StrategyError> {
        let ids: Vec<InstrumentId> = series.keys().copied().collect();
        let mut instruments = BTreeMap::new();
        let mut adjustments = FactorMap::new();
        for id in &ids {
            let inst = host.instrument(*id)?;
            adjustments.insert(*id, notional_adjustment(host, &inst, date, reference_aum)?);
            instruments.insert(*id, inst);
        }
        let target_vol = params.target_vol();
        let mut trace = StageTrace::default();

        // 1
        trace.seed = equal_seed(&ids);

        // 2
        let exposure_params = Self::exposure_params(params);
        let mut scalars = FactorMap::new();
        for (id, inst) in &instruments {
            let s = &series[id];
            let na = adjustments[id];
            let mut dp = if inst.is_nested() {
                let own_aum = inst
                    .portfolio
                    .and_then(|p| host.aum(p, date))
                    .filter(|a| *a > 0.0 && a.is_finite())
                    .unwrap_or(reference_aum);
                vol_scalar(params.individual_vol_targeting, target_vol, self.model.risk(s, own_aum)) * na
            } else {
                vol_scalar(params.individual_vol_targeting, target_vol, self.model.risk(s, reference_aum))
            };
            if params.exposure_management {
                dp *= self.model.exposure(host, inst, date, &exposure_params);
            }
            scalars.insert(*id, dp);
        }
        trace.vol_targeted = scale_each(&trace.seed, &scalars);
        tracing::debug!(stage = 2, weights = ?trace.vol_targeted, "individual vol targeting");

        // 3
        let weighted: Vec<TimeSeries> = ids
            .iter()
            .map(|id| series[id].scale(trace.vol_targeted[id]))
            .collect();
        let tilt = if params.concentration_management {
            let ratios: Vec<f64> = ids
                .iter()
                .map(|id| self.model.information_ratio(host, &instruments[id], date))
                .collect();
            optimize(&weighted, &ratios)
        } else {
            equal_weights(ids.len())
        };
        let tilt: FactorMap = ids.iter().copied().zip(tilt).collect();
        trace.tilted = scale_each(&trace.vol_targeted, &tilt);
        tracing::debug!(stage = 3, weights = ?trace.tilted, "concentration tilt");

        // 4
        let aggregate = aggregate_series(series, &trace.tilted);
        trace.portfolio_risk = self.model.risk(&aggregate, reference_aum);
        let factor = vol_scalar(params.portfolio_vol_targeting, target_vol, trace.portfolio_risk);
        trace.portfolio_vol = scale_all(&trace.tilted, factor);
        tracing::debug!(stage = 4, risk = trace.portfolio_risk, factor, "portfolio vol targeting");

        // 5
        trace.individual_cap = match params.max_individual_leverage {
            Some(max_il) => {
                let capped = cap_individual(&trace.portfolio_vol, &adjustments, max_il);
                trace.violations.extend(
                    check_individual_leverage(&capped, &adjustments, max_il)
                        .iter()
                        .map(ToString::to_string),
                );
                capped
            }
            None => trace.portfolio_vol.clone(),
        };

        // 6
        let mut notional_per_weight = FactorMap::new();
        for (id, inst) in &instruments {
            let leverage = lookthrough_leverage(host, inst, date)?;
            notional_per_weight.insert(*id, adjustments[id] * leverage);
        }
        trace.global_cap = match params.max_global_leverage {
            Some(max_gl) => {
                let (capped, gross) = cap_global(&trace.individual_cap, &notional_per_weight, max_gl, reference_aum);
                trace.gross_notional = gross;
                let after = gross_exposure(&capped, &notional_per_weight, reference_aum);
                if let Some(v) = check_global_leverage(after, max_gl, reference_aum) {
                    trace.violations.push(v.to_string());
                }
                capped
            }
            None => {
                trace.gross_notional = gross_exposure(&trace.individual_cap, &notional_per_weight, reference_aum);
                trace.individual_cap.clone()
            }
        };
        tracing::debug!(stage = 6, gross = trace.gross_notional, "global leverage");

        // 7
        trace.var_cap = match params.var_target.filter(|t| params.var_flag && *t != 0.0) {
            Some(target) => {
                let exposures: BTreeMap<InstrumentId, f64> = trace
                    .global_cap
                    .iter()
                    .map(|(id, w)| (*id, w * adjustments[id]))
                    .collect();
                match value_at_risk(host, self.portfolio, &exposures, date, &self.var)? {
                    Some(realized) => {
                        trace.realized_var = Some(realized);
                        let factor = var_scaling(realized, target);
                        if realized < -target.abs() {
                            tracing::warn!(realized, target, "VaR beyond target; weights left unchanged");
                        }
                        scale_all(&trace.global_cap, factor)
                    }
                    None => trace.global_cap.clone(),
                }
            }
            None => trace.global_cap.clone(),
        };

        for v in &trace.violations {
            tracing::warn!(strategy = %self.instrument.id, violation = %v, "constraint check failed");
        }

        let targets: Vec<TargetWeight> = trace
            .var_cap
            .iter()
            .map(|(id, w)| {
                if instruments[id].is_nested() {
                    TargetWeight::nested(*id, *w, adjustments[id])
                } else {
                    TargetWeight::leaf(*id, *w)
                }
            })
            .collect();
        let book = current_book(host, self.portfolio, &ids, date)?;
        let decision = targets_to_order_requests(
            self.portfolio,
            date,
            reference_aum,
            params.threshold(),
            &targets,
            &book,
        );

        tracing::info!(
            strategy = %self.instrument.id,
            %date,
            instruments = ids.len(),
            orders = decision.orders.len(),
            "full evaluation complete"
        );
        Ok(Evaluation::Full { trace, decision })
    }
}

pub(crate) fn strategy_portfolio(instrument: &Instrument) -> Result<PortfolioId, StrategyError> {
    if !instrument.category.is_strategy() {
        return Err(StrategyError::WrongCategory {
            instrument: instrument.id,
            category: instrument.category,
        });
    }
    instrument
        .portfolio
        .ok_or(StrategyError::MissingPortfolio(instrument.id))
}

/// `Σ series_i × w_i` over aligned series. Empty when nothing is weighted.
fn aggregate_series(series: &SeriesMap, weights: &WeightMap) -> TimeSeries {
    let mut acc: Option<TimeSeries> = None;
    for (id, s) in series {
        let w = weights.get(id).copied().unwrap_or(0.0);
        let part = s.scale(w);
        acc = Some(match acc {
            None => part,
            Some(a) => a.add_aligned(&part).unwrap_or(a),
        });
    }
    acc.unwrap_or_else(TimeSeries::empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbk_schemas::InstrumentCategory;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn aggregate_is_weighted_sum() {
        let mut series = SeriesMap::new();
        series.insert(InstrumentId(1), TimeSeries::daily(d(1), &[0.0, 2.0, -2.0]));
        series.insert(InstrumentId(2), TimeSeries::daily(d(1), &[0.0, 1.0, 1.0]));
        let weights = WeightMap::from([(InstrumentId(1), 0.5), (InstrumentId(2), 2.0)]);
        let agg = aggregate_series(&series, &weights);
        assert_eq!(agg.values(), vec![0.0, 3.0, 1.0]);
        assert!(aggregate_series(&SeriesMap::new(), &weights).is_empty());
    }

    #[test]
    fn only_strategies_with_portfolios_run() {
        let ok = Instrument::new(1, "S", InstrumentCategory::Strategy, "USD").with_portfolio(PortfolioId(3));
        assert_eq!(strategy_portfolio(&ok), Ok(PortfolioId(3)));
        let fut = Instrument::new(2, "ES", InstrumentCategory::Future, "USD");
        assert!(matches!(strategy_portfolio(&fut), Err(StrategyError::WrongCategory { .. })));
    }
}
