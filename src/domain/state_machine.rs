//! Forced-trade state machine.
//!
//! Planning and applying are split: [`plan`] looks at the record and the cycle
//! snapshot and decides one [`Step`]; the caller submits any order, and only
//! after a confirmed success calls [`apply_success`] to advance the record. A
//! failed submission therefore never touches the persisted state.
//!
//! ```text
//!            AUTO                         BUY              SELL
//!  BUYING --(all divisions)--> SELLING    BUYING -> done   SELLING -> done
//!    ^                            |
//!    +------(full exit, reset)----+
//! ```

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::domain::division::{compute_division_size, compute_sell_division_size};
use crate::domain::error::DivtraderError;
use crate::domain::forced_trade::{ForcedTradeState, Phase, TradeType};
use crate::domain::market::Snapshot;
use crate::domain::order::{Order, Side};
use crate::domain::trading_hours;

/// Why a cycle produced no order and no state change.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitReason {
    Inactive,
    MarketClosed,
    NoDivisionSize,
    NoAveragePrice,
    BelowProfitTarget { profit_percent: f64 },
    NothingSellable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// A division of an AUTO or plain BUY acquisition.
    Buy,
    /// The full exit of an AUTO cycle.
    AutoExit,
    /// A division of a plain SELL.
    Sell,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOrder {
    pub kind: StepKind,
    pub order: Order,
    /// Price used for average-cost accounting: the limit price, or the
    /// observed quote for market orders.
    pub exec_price: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Wait(WaitReason),
    /// A state change that needs no order (phase switch or deactivation).
    Transition(ForcedTradeState),
    Submit(PlannedOrder),
}

fn current_price(state: &ForcedTradeState, snapshot: &Snapshot) -> Result<i64, DivtraderError> {
    let price = snapshot
        .price(&state.stock_code)
        .ok_or_else(|| DivtraderError::QuoteUnavailable {
            stock_code: state.stock_code.clone(),
            reason: "no quote in snapshot".into(),
        })?;
    if price <= 0 {
        return Err(DivtraderError::InvalidPrice {
            stock_code: state.stock_code.clone(),
            price,
        });
    }
    Ok(price)
}

fn market_closed(state: &ForcedTradeState, now: NaiveDateTime) -> bool {
    state.check_trading_hours && !trading_hours::is_open(state.market, now)
}

fn transition_to_selling(state: &ForcedTradeState, now: NaiveDateTime) -> ForcedTradeState {
    let mut next = state.clone();
    next.current_phase = Phase::Selling;
    next.last_action_timestamp = Some(now);
    next
}

fn deactivated(state: &ForcedTradeState, now: NaiveDateTime) -> ForcedTradeState {
    let mut next = state.clone();
    next.deactivate(now);
    next
}

/// Consume a division whose even share floors to zero shares. Only reached
/// before the final division, which always takes the whole remainder.
fn skip_division(state: &ForcedTradeState, now: NaiveDateTime) -> ForcedTradeState {
    let mut next = state.clone();
    next.divisions_done = (next.divisions_done + 1).min(next.division_count);
    next.last_action_timestamp = Some(now);
    info!(
        remaining_quantity = next.remaining_quantity,
        divisions_done = next.divisions_done,
        division_count = next.division_count,
        "division rounds to zero shares, skipping"
    );
    next
}

/// Decide the next step for an active record.
///
/// Data problems (missing quote, non-positive price) are returned as errors
/// and leave the record untouched.
pub fn plan(state: &ForcedTradeState, snapshot: &Snapshot) -> Result<Step, DivtraderError> {
    if !state.active {
        return Ok(Step::Wait(WaitReason::Inactive));
    }
    match (state.original_trade_type, state.current_phase) {
        (TradeType::Auto, Phase::Selling) => plan_auto_exit(state, snapshot),
        (TradeType::Sell, _) => plan_sell(state, snapshot),
        (TradeType::Auto, Phase::Buying) | (TradeType::Buy, _) => plan_buy(state, snapshot),
    }
}

fn plan_buy(state: &ForcedTradeState, snapshot: &Snapshot) -> Result<Step, DivtraderError> {
    let now = snapshot.taken_at;
    let is_auto = state.original_trade_type == TradeType::Auto;

    if market_closed(state, now) {
        debug!(market = %state.market, "forced buy: market closed");
        return Ok(Step::Wait(WaitReason::MarketClosed));
    }
    let price = current_price(state, snapshot)?;

    let target_reached = if state.is_quantity_sized() {
        state.remaining_quantity <= 0
    } else {
        state.remaining_amount <= 0
    };
    if target_reached || state.divisions_done >= state.division_count {
        if is_auto {
            info!(
                bought_quantity = state.bought_quantity,
                "AUTO: acquisition target already held, switching to SELLING"
            );
            return Ok(Step::Transition(transition_to_selling(state, now)));
        }
        info!("BUY: nothing left to acquire, deactivating");
        return Ok(Step::Transition(deactivated(state, now)));
    }

    let size = compute_division_size(state, price, snapshot.account.available_cash);
    if size <= 0 && state.is_quantity_sized() {
        return Ok(Step::Transition(skip_division(state, now)));
    }
    if size <= 0 {
        let uncapped = compute_division_size(state, price, i64::MAX);
        if !is_auto && state.divisions_done > 0 && uncapped <= 0 {
            info!(
                divisions_done = state.divisions_done,
                "BUY: remaining division rounds to zero shares, deactivating"
            );
            return Ok(Step::Transition(deactivated(state, now)));
        }
        debug!(
            divisions_done = state.divisions_done,
            division_count = state.division_count,
            "forced buy: nothing to execute this division"
        );
        return Ok(Step::Wait(WaitReason::NoDivisionSize));
    }

    Ok(Step::Submit(PlannedOrder {
        kind: StepKind::Buy,
        order: Order {
            side: Side::Buy,
            stock_code: state.stock_code.clone(),
            quantity: size,
            price: state.price,
            market: state.market,
        },
        exec_price: if state.price > 0 { state.price } else { price },
    }))
}

fn plan_auto_exit(state: &ForcedTradeState, snapshot: &Snapshot) -> Result<Step, DivtraderError> {
    let now = snapshot.taken_at;
    if state.bought_quantity <= 0 {
        warn!("AUTO SELLING: nothing was bought, deactivating");
        return Ok(Step::Transition(deactivated(state, now)));
    }
    if state.avg_buy_price <= 0.0 {
        warn!("AUTO SELLING: average buy price is zero, cannot compute profit");
        return Ok(Step::Wait(WaitReason::NoAveragePrice));
    }

    let price = current_price(state, snapshot)?;
    let profit_percent = (price as f64 - state.avg_buy_price) / state.avg_buy_price * 100.0;
    if profit_percent < state.sell_profit_target_percent {
        debug!(
            current_price = price,
            avg_buy_price = state.avg_buy_price,
            profit_percent,
            target = state.sell_profit_target_percent,
            "AUTO SELLING: below profit target"
        );
        return Ok(Step::Wait(WaitReason::BelowProfitTarget { profit_percent }));
    }

    let sellable = snapshot.account.sellable_quantity(&state.stock_code);
    if sellable <= 0 {
        warn!("AUTO SELLING: profit target reached but nothing is sellable");
        return Ok(Step::Wait(WaitReason::NothingSellable));
    }
    if sellable != state.bought_quantity {
        warn!(
            sellable,
            bought_quantity = state.bought_quantity,
            "AUTO SELLING: sellable quantity differs from tracked position, selling sellable"
        );
    }
    info!(profit_percent, quantity = sellable, "AUTO SELLING: profit target reached");

    Ok(Step::Submit(PlannedOrder {
        kind: StepKind::AutoExit,
        order: Order {
            side: Side::Sell,
            stock_code: state.stock_code.clone(),
            quantity: sellable,
            price: 0,
            market: state.market,
        },
        exec_price: price,
    }))
}

fn plan_sell(state: &ForcedTradeState, snapshot: &Snapshot) -> Result<Step, DivtraderError> {
    let now = snapshot.taken_at;
    if market_closed(state, now) {
        debug!(market = %state.market, "forced sell: market closed");
        return Ok(Step::Wait(WaitReason::MarketClosed));
    }
    let price = current_price(state, snapshot)?;

    if state.divisions_done >= state.division_count
        || (state.is_quantity_sized() && state.remaining_quantity <= 0)
    {
        info!("SELL: all divisions executed, deactivating");
        return Ok(Step::Transition(deactivated(state, now)));
    }

    let sellable = snapshot.account.sellable_quantity(&state.stock_code);
    let size = compute_sell_division_size(state, sellable);
    if size <= 0 && state.is_quantity_sized() && sellable > 0 {
        return Ok(Step::Transition(skip_division(state, now)));
    }
    if size <= 0 {
        if state.divisions_done > 0 {
            info!(
                divisions_done = state.divisions_done,
                "SELL: nothing left to sell, deactivating"
            );
            return Ok(Step::Transition(deactivated(state, now)));
        }
        warn!(sellable, "SELL: nothing sellable for this division");
        return Ok(Step::Wait(WaitReason::NothingSellable));
    }

    Ok(Step::Submit(PlannedOrder {
        kind: StepKind::Sell,
        order: Order {
            side: Side::Sell,
            stock_code: state.stock_code.clone(),
            quantity: size,
            price: state.price,
            market: state.market,
        },
        exec_price: if state.price > 0 { state.price } else { price },
    }))
}

/// Advance the record after `planned` was confirmed by the order gateway.
pub fn apply_success(
    state: &ForcedTradeState,
    planned: &PlannedOrder,
    now: NaiveDateTime,
) -> ForcedTradeState {
    let mut next = state.clone();
    let size = planned.order.quantity.max(0);
    let spent = size.saturating_mul(planned.exec_price.max(0));

    match planned.kind {
        StepKind::Buy => {
            let prior_cost = next.avg_buy_price * next.bought_quantity as f64;
            next.bought_quantity += size;
            next.avg_buy_price = if next.bought_quantity > 0 {
                (prior_cost + planned.exec_price as f64 * size as f64) / next.bought_quantity as f64
            } else {
                0.0
            };
            next.remaining_quantity = next.remaining_quantity.saturating_sub(size).max(0);
            next.remaining_amount = next.remaining_amount.saturating_sub(spent).max(0);
            next.divisions_done = (next.divisions_done + 1).min(next.division_count);
            next.last_action_timestamp = Some(now);

            let complete = next.divisions_done >= next.division_count
                || (next.is_quantity_sized() && next.remaining_quantity <= 0);
            info!(
                quantity = size,
                bought_quantity = next.bought_quantity,
                avg_buy_price = next.avg_buy_price,
                divisions_done = next.divisions_done,
                division_count = next.division_count,
                "division bought"
            );
            if complete {
                match next.original_trade_type {
                    TradeType::Auto => {
                        info!("AUTO: acquisition complete, switching to SELLING");
                        next.current_phase = Phase::Selling;
                    }
                    _ => {
                        info!("BUY: all divisions complete, deactivating");
                        next.active = false;
                    }
                }
            }
        }
        StepKind::AutoExit => {
            info!(quantity = size, "AUTO: position exited, restarting acquisition");
            next.reset_for_rebuy(now);
        }
        StepKind::Sell => {
            next.remaining_quantity = next.remaining_quantity.saturating_sub(size).max(0);
            next.bought_quantity = next.bought_quantity.saturating_sub(size).max(0);
            if next.bought_quantity == 0 {
                next.avg_buy_price = 0.0;
            }
            next.divisions_done = (next.divisions_done + 1).min(next.division_count);
            next.last_action_timestamp = Some(now);
            info!(
                quantity = size,
                divisions_done = next.divisions_done,
                division_count = next.division_count,
                "division sold"
            );
            if next.divisions_done >= next.division_count
                || (next.is_quantity_sized() && next.remaining_quantity <= 0)
            {
                info!("SELL: all divisions complete, deactivating");
                next.active = false;
            }
        }
    }
    next
}
