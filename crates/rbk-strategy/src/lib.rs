//! rbk-strategy
//!
//! The risk-budget allocator and its cash-accrual sibling.
//!
//! Evaluation flow for one (strategy, date):
//! - reference AUM = fixed notional if positive, else host AUM; zero skips the date
//! - bootstrap (no lookback / no vol target / no eligible history): size each
//!   unheld instrument at the full reference AUM
//! - otherwise, when the rebalance schedule (or an open order) makes it due,
//!   run the seven weighting stages and gate the resulting orders
//!
//! Reads go through `&dyn Host`; orders are returned, not sent. The caller
//! applies them with `rbk_execution::apply_orders`.

mod deposit;
mod error;
pub mod pipeline;
mod schedule;
mod strategy;

pub use deposit::{Accrual, DepositStrategy, DAY_COUNT_BASIS, DEFAULT_INITIAL_NAV};
pub use error::StrategyError;
pub use pipeline::StageTrace;
pub use schedule::RebalanceFrequency;
pub use strategy::{Evaluation, RiskBudgetStrategy};
