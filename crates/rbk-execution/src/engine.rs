use chrono::NaiveDate;
use rbk_host::{HostError, OrderSink};
use rbk_schemas::{Direction, OrderMode, OrderSize, PortfolioId, TargetOrderRequest};

use crate::{CurrentBook, GateOutcome, RebalanceDecision, TargetWeight};

/// Convert final weights into target-order requests.
///
/// Rules:
/// - target = weight × reference AUM × adjustment (signed)
/// - current = open order's implied notional, else position value (0 if absent)
/// - emit only when `|target − current| / reference AUM > threshold`
/// - leaves carry a signed notional; nested strategies an unsigned notional
///   plus a direction
/// - `Update` when an order is already open, `Create` otherwise
/// - deterministic ordering by instrument id
pub fn targets_to_order_requests(
    portfolio: PortfolioId,
    date: NaiveDate,
    reference_aum: f64,
    threshold: f64,
    targets: &[TargetWeight],
    current: &CurrentBook,
) -> RebalanceDecision {
    let mut sorted: Vec<&TargetWeight> = targets.iter().collect();
    sorted.sort_by_key(|t| t.instrument);

    let mut decision = RebalanceDecision::default();
    if reference_aum == 0.0 {
        return decision;
    }

    for t in sorted {
        let cur = current.get(&t.instrument).copied().unwrap_or_default();
        let target = t.target_notional(reference_aum);
        let change = (target - cur.notional).abs() / reference_aum.abs();
        let emitted = change > threshold;

        decision.gates.push(GateOutcome {
            instrument: t.instrument,
            target,
            current: cur.notional,
            change,
            emitted,
        });
        if !emitted {
            continue;
        }

        let mode = if cur.has_open_order {
            OrderMode::Update
        } else {
            OrderMode::Create
        };
        let request = if t.nested {
            TargetOrderRequest::new(portfolio, t.instrument, date, OrderSize::Notional(target.abs()), mode)
                .with_direction(Direction::from_sign(t.weight))
        } else {
            TargetOrderRequest::new(portfolio, t.instrument, date, OrderSize::Notional(target), mode)
        };
        decision.orders.push(request);
    }

    decision
}

/// Send requests to the host in order. Returns how many were accepted.
pub fn apply_orders<S: OrderSink + ?Sized>(sink: &mut S, orders: &[TargetOrderRequest]) -> Result<usize, HostError> {
    for req in orders {
        match req.mode {
            OrderMode::Create => sink.create_target_order(req)?,
            OrderMode::Update => sink.update_target_order(req)?,
        }
        tracing::info!(
            request_id = %req.request_id,
            instrument = %req.instrument,
            mode = ?req.mode,
            size = ?req.size,
            "target order sent"
        );
    }
    Ok(orders.len())
}
