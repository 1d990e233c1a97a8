//! Current notional per instrument, read from the host.

use chrono::NaiveDate;
use rbk_host::{Host, HostError};
use rbk_schemas::{Instrument, InstrumentId, OrderSize, PortfolioId};

use crate::{Current, CurrentBook};

/// Signed notional currently targeted for `instrument` in portfolio
/// currency: the open order's implied notional if one exists, else the
/// position's market value. 0.0 when neither can be valued.
pub fn current_notional(
    host: &dyn Host,
    portfolio: PortfolioId,
    instrument: &Instrument,
    date: NaiveDate,
) -> Result<Current, HostError> {
    let currency = host.portfolio_currency(portfolio)?;
    let unit_value = || -> Option<f64> {
        let price = host.price(instrument, date)?;
        let fx = host.fx_rate(&instrument.currency, &currency, date)?;
        Some(price * instrument.multiplier() * fx).filter(|v| v.is_finite())
    };

    if let Some(order) = host.open_order(portfolio, instrument.id) {
        let notional = match order.size {
            OrderSize::Notional(n) => order.direction.map(|d| d.sign() * n.abs()).unwrap_or(n),
            OrderSize::Units(u) => unit_value().map(|v| u * v).unwrap_or(0.0),
        };
        return Ok(Current {
            notional,
            has_open_order: true,
        });
    }

    let units = host
        .position(portfolio, instrument.id)
        .map(|p| p.units)
        .unwrap_or(0.0);
    let notional = if units == 0.0 {
        0.0
    } else {
        unit_value().map(|v| units * v).unwrap_or(0.0)
    };
    Ok(Current {
        notional,
        has_open_order: false,
    })
}

pub fn current_book(
    host: &dyn Host,
    portfolio: PortfolioId,
    instruments: &[InstrumentId],
    date: NaiveDate,
) -> Result<CurrentBook, HostError> {
    let mut book = CurrentBook::new();
    for id in instruments {
        let inst = host.instrument(*id)?;
        book.insert(*id, current_notional(host, portfolio, &inst, date)?);
    }
    Ok(book)
}
