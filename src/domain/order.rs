//! Orders produced by strategies and the forced-trade state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::market::Venue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

/// A concrete order. `price == 0` denotes a market order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub side: Side,
    pub stock_code: String,
    pub quantity: i64,
    pub price: i64,
    pub market: Venue,
}

impl Order {
    pub fn is_market(&self) -> bool {
        self.price == 0
    }
}

/// Who produced an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSource {
    Rule(String),
    ForcedTrade,
}

impl fmt::Display for ActionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionSource::Rule(name) => f.write_str(name),
            ActionSource::ForcedTrade => f.write_str("FORCED_TRADE"),
        }
    }
}

/// The action exposed to the orchestrator: an order stamped with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub order: Order,
    pub source: ActionSource,
}

/// Broker acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReceipt {
    pub order_ref: String,
}

/// One journal row per accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: String,
    pub cycle_id: String,
    pub source: String,
    pub side: Side,
    pub stock_code: String,
    pub quantity: i64,
    pub price: i64,
    pub market: Venue,
    pub order_ref: String,
}

impl TradeRecord {
    pub fn new(
        timestamp: chrono::NaiveDateTime,
        cycle_id: &str,
        action: &Action,
        receipt: &OrderReceipt,
    ) -> Self {
        TradeRecord {
            timestamp: timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            cycle_id: cycle_id.to_string(),
            source: action.source.to_string(),
            side: action.order.side,
            stock_code: action.order.stock_code.clone(),
            quantity: action.order.quantity,
            price: action.order.price,
            market: action.order.market,
            order_ref: receipt.order_ref.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_price_is_market_order() {
        let order = Order {
            side: Side::Buy,
            stock_code: "005930".into(),
            quantity: 3,
            price: 0,
            market: Venue::Krx,
        };
        assert!(order.is_market());
        assert!(!Order { price: 70_000, ..order }.is_market());
    }

    #[test]
    fn source_display() {
        assert_eq!(ActionSource::Rule("buy_dip".into()).to_string(), "buy_dip");
        assert_eq!(ActionSource::ForcedTrade.to_string(), "FORCED_TRADE");
    }
}
