//! Per-division order sizing.
//!
//! Earlier divisions take the floor of an even split; the final division
//! takes whatever remains, so no residue is left unexecuted.

use tracing::info;

use crate::domain::forced_trade::ForcedTradeState;

fn divisions_left(state: &ForcedTradeState) -> i64 {
    i64::from(state.division_count.saturating_sub(state.divisions_done).max(1))
}

fn split(base: i64, left: i64) -> i64 {
    let base = base.max(0);
    if left <= 1 { base } else { base / left }
}

/// Shares to buy for the current division. `0` means nothing to do this cycle.
pub fn compute_division_size(
    state: &ForcedTradeState,
    current_price: i64,
    available_cash: i64,
) -> i64 {
    let left = divisions_left(state);

    if state.is_quantity_sized() {
        return split(state.remaining_quantity, left);
    }

    let mut order_amount = split(state.remaining_amount, left);
    let cash = available_cash.max(0);
    if order_amount > cash {
        info!(
            stock_code = %state.stock_code,
            order_amount,
            available_cash = cash,
            "division amount clamped to available cash"
        );
        order_amount = cash;
    }
    if current_price <= 0 {
        return 0;
    }
    (order_amount / current_price).max(0)
}

/// Shares to sell for the current division of a plain SELL trade.
///
/// Quantity-sized trades split the remaining target; otherwise the live
/// sellable quantity is split. Either way the result never exceeds what the
/// account can actually sell.
pub fn compute_sell_division_size(state: &ForcedTradeState, sellable_quantity: i64) -> i64 {
    let sellable = sellable_quantity.max(0);
    let left = divisions_left(state);
    let base = if state.is_quantity_sized() {
        state.remaining_quantity
    } else {
        sellable
    };
    split(base, left).min(sellable)
}
