//! rbk-execution
//!
//! Turns final weights into target-order requests:
//! - target notional = |weight| × reference AUM × notional adjustment
//! - compared against the open order's implied notional, else the position's value
//! - emitted only when `|target − current| / AUM > threshold` (anti-churn gate)
//! - Update mode when an order is already open, Create otherwise
//!
//! Deterministic: requests come out in instrument-id order with
//! (portfolio, instrument, date)-derived ids.

mod book;
mod engine;
mod types;

pub use book::{current_notional, current_book};
pub use engine::{apply_orders, targets_to_order_requests};
pub use types::{Current, CurrentBook, GateOutcome, RebalanceDecision, TargetWeight};
