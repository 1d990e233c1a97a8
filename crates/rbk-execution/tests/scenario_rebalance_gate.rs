//! Rebalance gate and idempotence
//!
//! GREEN when:
//! - A change below `threshold × AUM` emits nothing; above it emits one request.
//! - Applying the requests and re-running on the same weights emits nothing.
//! - Re-deriving a request for the same (portfolio, instrument, date) yields the same id.

use chrono::NaiveDate;
use rbk_execution::{apply_orders, current_book, targets_to_order_requests, TargetWeight};
use rbk_host::{MemoryHost, PortfolioBook};
use rbk_schemas::{Instrument, InstrumentCategory, InstrumentId, OrderMode, OrderSize, PortfolioId, SeriesKind};
use rbk_timeseries::TimeSeries;

const P: PortfolioId = PortfolioId(1);
const A: InstrumentId = InstrumentId(10);
const AUM: f64 = 1_000_000.0;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 28).unwrap()
}

fn host() -> MemoryHost {
    MemoryHost::new()
        .with_instrument(Instrument::new(10, "A", InstrumentCategory::Etf, "USD"))
        .with_series(A, SeriesKind::AdjustedClose, TimeSeries::daily(date(), &[100.0]))
        .with_portfolio(P, "USD")
        .with_member(P, A)
        .with_aum(P, AUM)
}

#[test]
fn small_changes_are_filtered_by_threshold() {
    // 4990 × 100 = 499k held, 500k targeted: 0.1% change.
    let h = host().with_position(P, A, 4_990.0);
    let book = current_book(&h, P, &[A], date()).unwrap();
    let targets = [TargetWeight::leaf(A, 0.5)];

    let quiet = targets_to_order_requests(P, date(), AUM, 0.002, &targets, &book);
    assert!(quiet.orders.is_empty());
    assert!(!quiet.gates[0].emitted);
    assert!((quiet.gates[0].change - 0.001).abs() < 1e-12);

    let loud = targets_to_order_requests(P, date(), AUM, 0.0005, &targets, &book);
    assert_eq!(loud.orders.len(), 1);
    assert_eq!(loud.orders[0].size, OrderSize::Notional(500_000.0));
    assert_eq!(loud.orders[0].mode, OrderMode::Create);
}

#[test]
fn rerun_after_apply_emits_nothing() {
    let mut h = host();
    let targets = [TargetWeight::leaf(A, -0.25)];

    let book = current_book(&h, P, &[A], date()).unwrap();
    let first = targets_to_order_requests(P, date(), AUM, 0.0, &targets, &book);
    assert_eq!(first.orders.len(), 1);
    assert_eq!(apply_orders(&mut h, &first.orders).unwrap(), 1);
    assert!(h.open_order(P, A).is_some());

    let book = current_book(&h, P, &[A], date()).unwrap();
    assert!(book[&A].has_open_order);
    let second = targets_to_order_requests(P, date(), AUM, 0.0, &targets, &book);
    assert!(second.orders.is_empty(), "second run emitted {:?}", second.orders);

    // A changed weight on the same date updates the open order in place.
    let moved = [TargetWeight::leaf(A, -0.5)];
    let third = targets_to_order_requests(P, date(), AUM, 0.0, &moved, &book);
    assert_eq!(third.orders[0].mode, OrderMode::Update);
    assert_eq!(third.orders[0].request_id, first.orders[0].request_id);
}
