//! Strategy parameter enumeration and per-date resolution.

use chrono::NaiveDate;
use rbk_schemas::{InstrumentId, PortfolioId};
use serde::{Deserialize, Serialize};

/// The fixed set of numeric strategy parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigParam {
    TargetVolatility,
    IndividualVolTargeting,
    PortfolioVolTargeting,
    ExposureManagement,
    ExposureThreshold,
    ConcentrationManagement,
    MaxIndividualLeverage,
    MaxGlobalLeverage,
    VarFlag,
    VarTarget,
    RebalancingFrequency,
    DaysBack,
    RebalancingThreshold,
    FixedNotional,
    Spread,
    FundingInstrument,
}

impl ConfigParam {
    pub const ALL: [ConfigParam; 16] = [
        ConfigParam::TargetVolatility,
        ConfigParam::IndividualVolTargeting,
        ConfigParam::PortfolioVolTargeting,
        ConfigParam::ExposureManagement,
        ConfigParam::ExposureThreshold,
        ConfigParam::ConcentrationManagement,
        ConfigParam::MaxIndividualLeverage,
        ConfigParam::MaxGlobalLeverage,
        ConfigParam::VarFlag,
        ConfigParam::VarTarget,
        ConfigParam::RebalancingFrequency,
        ConfigParam::DaysBack,
        ConfigParam::RebalancingThreshold,
        ConfigParam::FixedNotional,
        ConfigParam::Spread,
        ConfigParam::FundingInstrument,
    ];

    /// YAML / JSON key.
    pub fn key(&self) -> &'static str {
        match self {
            ConfigParam::TargetVolatility => "target_volatility",
            ConfigParam::IndividualVolTargeting => "individual_vol_targeting",
            ConfigParam::PortfolioVolTargeting => "portfolio_vol_targeting",
            ConfigParam::ExposureManagement => "exposure_management",
            ConfigParam::ExposureThreshold => "exposure_threshold",
            ConfigParam::ConcentrationManagement => "concentration_management",
            ConfigParam::MaxIndividualLeverage => "max_individual_leverage",
            ConfigParam::MaxGlobalLeverage => "max_global_leverage",
            ConfigParam::VarFlag => "var_flag",
            ConfigParam::VarTarget => "var_target",
            ConfigParam::RebalancingFrequency => "rebalancing_frequency",
            ConfigParam::DaysBack => "days_back",
            ConfigParam::RebalancingThreshold => "rebalancing_threshold",
            ConfigParam::FixedNotional => "fixed_notional",
            ConfigParam::Spread => "spread",
            ConfigParam::FundingInstrument => "funding_instrument",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.key() == key)
    }
}

/// Read access to strategy configuration, keyed by (portfolio, date, parameter).
///
/// `None` means the parameter is unset for that date.
pub trait ConfigSource {
    fn config_value(&self, portfolio: PortfolioId, date: NaiveDate, param: ConfigParam) -> Option<f64>;
}

/// A flag is enabled when set and strictly positive.
pub fn flag(v: Option<f64>) -> bool {
    matches!(v, Some(x) if x > 0.0)
}

/// Drops NaN so downstream code only sees `Some(finite-or-inf)` or `None`.
fn usable(v: Option<f64>) -> Option<f64> {
    v.filter(|x| !x.is_nan())
}

/// Every parameter resolved for one (portfolio, date).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StrategyParams {
    pub target_volatility: Option<f64>,
    pub individual_vol_targeting: bool,
    pub portfolio_vol_targeting: bool,
    pub exposure_management: bool,
    pub exposure_threshold: Option<f64>,
    pub concentration_management: bool,
    pub max_individual_leverage: Option<f64>,
    pub max_global_leverage: Option<f64>,
    pub var_flag: bool,
    pub var_target: Option<f64>,
    pub rebalancing_frequency: Option<f64>,
    pub days_back: Option<usize>,
    pub rebalancing_threshold: Option<f64>,
    pub fixed_notional: Option<f64>,
    pub spread: Option<f64>,
    pub funding_instrument: Option<InstrumentId>,
}

impl StrategyParams {
    pub fn resolve<C: ConfigSource + ?Sized>(source: &C, portfolio: PortfolioId, date: NaiveDate) -> Self {
        let get = |p: ConfigParam| usable(source.config_value(portfolio, date, p));
        Self {
            target_volatility: get(ConfigParam::TargetVolatility),
            individual_vol_targeting: flag(get(ConfigParam::IndividualVolTargeting)),
            portfolio_vol_targeting: flag(get(ConfigParam::PortfolioVolTargeting)),
            exposure_management: flag(get(ConfigParam::ExposureManagement)),
            exposure_threshold: get(ConfigParam::ExposureThreshold),
            concentration_management: flag(get(ConfigParam::ConcentrationManagement)),
            max_individual_leverage: get(ConfigParam::MaxIndividualLeverage),
            max_global_leverage: get(ConfigParam::MaxGlobalLeverage),
            var_flag: flag(get(ConfigParam::VarFlag)),
            var_target: get(ConfigParam::VarTarget),
            rebalancing_frequency: get(ConfigParam::RebalancingFrequency),
            days_back: get(ConfigParam::DaysBack)
                .filter(|d| *d >= 1.0)
                .map(|d| d as usize),
            rebalancing_threshold: get(ConfigParam::RebalancingThreshold),
            fixed_notional: get(ConfigParam::FixedNotional),
            spread: get(ConfigParam::Spread),
            funding_instrument: get(ConfigParam::FundingInstrument)
                .filter(|id| *id >= 0.0)
                .map(|id| InstrumentId(id as u64)),
        }
    }

    /// Optimisation needs both a lookback and a non-zero vol target.
    pub fn is_bootstrap(&self) -> bool {
        self.days_back.is_none() || matches!(self.target_volatility, None | Some(0.0))
    }

    pub fn target_vol(&self) -> f64 {
        self.target_volatility.unwrap_or(0.0)
    }

    pub fn threshold(&self) -> f64 {
        self.rebalancing_threshold.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<(ConfigParam, f64)>);

    impl ConfigSource for Fixed {
        fn config_value(&self, _: PortfolioId, _: NaiveDate, param: ConfigParam) -> Option<f64> {
            self.0.iter().find(|(p, _)| *p == param).map(|(_, v)| *v)
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn every_param_round_trips_through_its_key() {
        for p in ConfigParam::ALL {
            assert_eq!(ConfigParam::from_key(p.key()), Some(p));
        }
        assert_eq!(ConfigParam::from_key("leverage"), None);
    }

    #[test]
    fn flags_require_positive_values() {
        assert!(flag(Some(1.0)));
        assert!(!flag(Some(0.0)));
        assert!(!flag(Some(-1.0)));
        assert!(!flag(None));
        assert!(!flag(Some(f64::NAN)));
    }

    #[test]
    fn unset_lookback_or_zero_vol_means_bootstrap() {
        let p = StrategyParams::resolve(&Fixed(vec![]), PortfolioId(1), date());
        assert!(p.is_bootstrap());

        let p = StrategyParams::resolve(
            &Fixed(vec![(ConfigParam::DaysBack, 60.0), (ConfigParam::TargetVolatility, 0.0)]),
            PortfolioId(1),
            date(),
        );
        assert!(p.is_bootstrap());

        let p = StrategyParams::resolve(
            &Fixed(vec![(ConfigParam::DaysBack, 60.0), (ConfigParam::TargetVolatility, 0.1)]),
            PortfolioId(1),
            date(),
        );
        assert!(!p.is_bootstrap());
        assert_eq!(p.days_back, Some(60));
    }

    #[test]
    fn nan_values_resolve_as_unset() {
        let p = StrategyParams::resolve(
            &Fixed(vec![(ConfigParam::FixedNotional, f64::NAN), (ConfigParam::FundingInstrument, 42.0)]),
            PortfolioId(1),
            date(),
        );
        assert_eq!(p.fixed_notional, None);
        assert_eq!(p.funding_instrument, Some(InstrumentId(42)));
    }
}
