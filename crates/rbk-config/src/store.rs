//! Dated parameter store built from the merged config document.
//!
//! Document shape:
//! ```yaml
//! parameters:
//!   target_volatility: 0.10
//!   days_back: 60
//! schedule:
//!   - from: 2024-06-01
//!     parameters:
//!       target_volatility: 0.12
//!       fixed_notional: null   # explicit unset from this date
//! ```
//! A value applies from its `from` date onwards until a later entry
//! overrides it; `parameters` is the undated base.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rbk_schemas::PortfolioId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{ConfigParam, ConfigSource};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown config parameter '{0}'")]
    UnknownParameter(String),

    #[error("invalid config document: {0}")]
    Invalid(String),
}

/// Raw serde shape; parameter names are validated on conversion.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub parameters: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub schedule: Vec<RawOverride>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawOverride {
    pub from: NaiveDate,
    #[serde(default)]
    pub parameters: BTreeMap<String, Option<f64>>,
}

type ParamMap = BTreeMap<ConfigParam, Option<f64>>;

/// Parameter values with effective dates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig", into = "RawConfig")]
pub struct DatedConfig {
    base: ParamMap,
    /// Sorted by date ascending.
    overrides: Vec<(NaiveDate, ParamMap)>,
}

fn parse_params(raw: BTreeMap<String, Option<f64>>) -> Result<ParamMap, ConfigError> {
    raw.into_iter()
        .map(|(k, v)| {
            ConfigParam::from_key(&k)
                .map(|p| (p, v))
                .ok_or(ConfigError::UnknownParameter(k))
        })
        .collect()
}

fn render_params(m: ParamMap) -> BTreeMap<String, Option<f64>> {
    m.into_iter().map(|(p, v)| (p.key().to_string(), v)).collect()
}

impl TryFrom<RawConfig> for DatedConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let base = parse_params(raw.parameters)?;
        let mut overrides = raw
            .schedule
            .into_iter()
            .map(|o| parse_params(o.parameters).map(|p| (o.from, p)))
            .collect::<Result<Vec<_>, _>>()?;
        // Stable: two entries on one date apply in document order.
        overrides.sort_by_key(|(d, _)| *d);
        Ok(Self { base, overrides })
    }
}

impl From<DatedConfig> for RawConfig {
    fn from(c: DatedConfig) -> Self {
        RawConfig {
            parameters: render_params(c.base),
            schedule: c
                .overrides
                .into_iter()
                .map(|(from, p)| RawOverride {
                    from,
                    parameters: render_params(p),
                })
                .collect(),
        }
    }
}

impl DatedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a merged config JSON document.
    pub fn from_json(v: &Value) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_json::from_value(v.clone()).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Set an undated base value.
    pub fn with(mut self, param: ConfigParam, value: f64) -> Self {
        self.base.insert(param, Some(value));
        self
    }

    /// Set a value effective from `from` onwards.
    pub fn with_from(mut self, from: NaiveDate, param: ConfigParam, value: Option<f64>) -> Self {
        match self.overrides.iter_mut().find(|(d, _)| *d == from) {
            Some((_, m)) => {
                m.insert(param, value);
            }
            None => {
                let mut m = ParamMap::new();
                m.insert(param, value);
                self.overrides.push((from, m));
                self.overrides.sort_by_key(|(d, _)| *d);
            }
        }
        self
    }

    pub fn set(&mut self, param: ConfigParam, value: Option<f64>) {
        self.base.insert(param, value);
    }

    /// Value in effect on `date`; the latest override dated on or before
    /// `date` wins over the base.
    pub fn value(&self, date: NaiveDate, param: ConfigParam) -> Option<f64> {
        for (from, m) in self.overrides.iter().rev() {
            if *from > date {
                continue;
            }
            if let Some(v) = m.get(&param) {
                return *v;
            }
        }
        self.base.get(&param).copied().flatten()
    }
}

/// A single `DatedConfig` serves every portfolio.
impl ConfigSource for DatedConfig {
    fn config_value(&self, _portfolio: PortfolioId, date: NaiveDate, param: ConfigParam) -> Option<f64> {
        self.value(date, param)
    }
}
