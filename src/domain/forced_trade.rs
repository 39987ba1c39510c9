//! Persisted forced-trade record.
//!
//! A [`ForcedTradeState`] is the single piece of mutable state owned by the
//! engine. It is created at start-up from [`ForcedTradeConfig`] (seeded with
//! any real holding of the instrument), mutated only by the state machine after
//! a confirmed order, and written back as a whole on every change.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::domain::market::{Holding, Venue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    Buy,
    Sell,
    #[default]
    Auto,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Buy => "BUY",
            TradeType::Sell => "SELL",
            TradeType::Auto => "AUTO",
        }
    }

    /// Phase a fresh record of this type starts in.
    pub fn initial_phase(&self) -> Phase {
        match self {
            TradeType::Sell => Phase::Selling,
            TradeType::Buy | TradeType::Auto => Phase::Buying,
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(TradeType::Buy),
            "SELL" => Ok(TradeType::Sell),
            "AUTO" => Ok(TradeType::Auto),
            other => Err(format!(
                "unknown trade type '{}', expected BUY, SELL or AUTO",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    #[default]
    Buying,
    Selling,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Buying => f.write_str("BUYING"),
            Phase::Selling => f.write_str("SELLING"),
        }
    }
}

/// Operator-supplied description of the forced trade, read from `[forced_trade]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForcedTradeConfig {
    pub enabled: bool,
    pub trade_type: TradeType,
    pub stock_code: String,
    pub quantity: i64,
    pub amount: i64,
    pub price: i64,
    pub division_count: u32,
    pub sell_profit_target_percent: f64,
    pub market: Venue,
    pub check_trading_hours: bool,
}

impl Default for ForcedTradeConfig {
    fn default() -> Self {
        ForcedTradeConfig {
            enabled: false,
            trade_type: TradeType::Auto,
            stock_code: String::new(),
            quantity: 0,
            amount: 0,
            price: 0,
            division_count: 1,
            sell_profit_target_percent: 0.5,
            market: Venue::Krx,
            check_trading_hours: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForcedTradeState {
    pub active: bool,
    pub trade_id: String,
    pub original_trade_type: TradeType,
    pub current_phase: Phase,
    pub stock_code: String,
    pub total_quantity: i64,
    pub remaining_quantity: i64,
    pub total_amount: i64,
    pub remaining_amount: i64,
    /// 0 means a market order.
    pub price: i64,
    pub market: Venue,
    pub division_count: u32,
    pub divisions_done: u32,
    pub bought_quantity: i64,
    pub avg_buy_price: f64,
    pub sell_profit_target_percent: f64,
    pub check_trading_hours: bool,
    pub last_action_timestamp: Option<NaiveDateTime>,
}

impl Default for ForcedTradeState {
    fn default() -> Self {
        ForcedTradeState {
            active: false,
            trade_id: String::new(),
            original_trade_type: TradeType::Auto,
            current_phase: Phase::Buying,
            stock_code: String::new(),
            total_quantity: 0,
            remaining_quantity: 0,
            total_amount: 0,
            remaining_amount: 0,
            price: 0,
            market: Venue::Krx,
            division_count: 1,
            divisions_done: 0,
            bought_quantity: 0,
            avg_buy_price: 0.0,
            sell_profit_target_percent: 0.5,
            check_trading_hours: true,
            last_action_timestamp: None,
        }
    }
}

pub fn new_trade_id(prefix: &str, now: NaiveDateTime) -> String {
    format!("{}_{}", prefix, now.format("%Y%m%d%H%M%S%3f"))
}

impl ForcedTradeState {
    /// Build a fresh record from configuration, accounting for shares already
    /// held so that a restart does not buy them a second time.
    pub fn from_config(
        config: &ForcedTradeConfig,
        holding: Option<&Holding>,
        now: NaiveDateTime,
    ) -> Self {
        let held = holding.map(|h| h.held_quantity.max(0)).unwrap_or(0);
        let avg = holding
            .filter(|_| held > 0)
            .map(|h| h.average_buy_price.max(0.0))
            .unwrap_or(0.0);

        let (remaining_quantity, remaining_amount) = match config.trade_type {
            TradeType::Sell => (config.quantity, config.amount),
            TradeType::Buy | TradeType::Auto => {
                let held_value = (held as f64 * avg).round() as i64;
                (
                    (config.quantity - held).max(0),
                    if config.quantity > 0 {
                        config.amount
                    } else {
                        (config.amount - held_value).max(0)
                    },
                )
            }
        };

        ForcedTradeState {
            active: config.enabled,
            trade_id: new_trade_id(&config.stock_code, now),
            original_trade_type: config.trade_type,
            current_phase: config.trade_type.initial_phase(),
            stock_code: config.stock_code.clone(),
            total_quantity: config.quantity.max(0),
            remaining_quantity,
            total_amount: config.amount.max(0),
            remaining_amount,
            price: config.price.max(0),
            market: config.market,
            division_count: config.division_count.max(1),
            divisions_done: 0,
            bought_quantity: held,
            avg_buy_price: avg,
            sell_profit_target_percent: config.sell_profit_target_percent,
            check_trading_hours: config.check_trading_hours,
            last_action_timestamp: Some(now),
        }
    }

    pub fn is_quantity_sized(&self) -> bool {
        self.total_quantity > 0
    }

    /// A persisted record belongs to `config` when it trades the same
    /// instrument with the same trade type.
    pub fn matches_config(&self, config: &ForcedTradeConfig) -> bool {
        self.stock_code == config.stock_code && self.original_trade_type == config.trade_type
    }

    pub fn deactivate(&mut self, now: NaiveDateTime) {
        self.active = false;
        self.last_action_timestamp = Some(now);
    }

    /// Restart an AUTO cycle after a full exit.
    pub fn reset_for_rebuy(&mut self, now: NaiveDateTime) {
        self.current_phase = Phase::Buying;
        self.divisions_done = 0;
        self.bought_quantity = 0;
        self.avg_buy_price = 0.0;
        self.remaining_quantity = self.total_quantity;
        self.remaining_amount = self.total_amount;
        self.trade_id = new_trade_id("AUTO_REPEATED", now);
        self.last_action_timestamp = Some(now);
    }

    /// Clamp a loaded record back inside its invariants. Returns `true` when
    /// anything was changed.
    pub fn repair(&mut self) -> bool {
        let before = self.clone();

        self.total_quantity = self.total_quantity.max(0);
        self.total_amount = self.total_amount.max(0);
        self.remaining_quantity = self.remaining_quantity.max(0);
        self.remaining_amount = self.remaining_amount.max(0);
        self.price = self.price.max(0);
        self.bought_quantity = self.bought_quantity.max(0);
        self.division_count = self.division_count.max(1);
        self.divisions_done = self.divisions_done.min(self.division_count);
        if !self.avg_buy_price.is_finite() || self.avg_buy_price < 0.0 {
            self.avg_buy_price = 0.0;
        }
        if self.bought_quantity == 0 {
            self.avg_buy_price = 0.0;
        }
        match self.original_trade_type {
            TradeType::Buy => self.current_phase = Phase::Buying,
            TradeType::Sell => self.current_phase = Phase::Selling,
            TradeType::Auto => {}
        }
        if self.active && self.stock_code.trim().is_empty() {
            self.active = false;
        }
        if self.active
            && self.total_quantity == 0
            && self.total_amount == 0
            && self.bought_quantity == 0
            && self.original_trade_type != TradeType::Sell
        {
            self.active = false;
        }

        let changed = *self != before;
        if changed {
            warn!(
                trade_id = %self.trade_id,
                active = self.active,
                "forced trade record repaired on load"
            );
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_milli_opt(10, 15, 30, 250)
            .unwrap()
    }

    fn config(trade_type: TradeType, quantity: i64, amount: i64) -> ForcedTradeConfig {
        ForcedTradeConfig {
            enabled: true,
            trade_type,
            stock_code: "005930".into(),
            quantity,
            amount,
            division_count: 4,
            ..ForcedTradeConfig::default()
        }
    }

    fn holding(held: i64, avg: f64) -> Holding {
        Holding {
            stock_code: "005930".into(),
            held_quantity: held,
            sellable_quantity: held,
            average_buy_price: avg,
            valuation: 0,
            profit_rate: 0.0,
        }
    }

    #[test]
    fn trade_id_has_millisecond_stamp() {
        assert_eq!(new_trade_id("005930", now()), "005930_20240304101530250");
    }

    #[test]
    fn from_config_without_holdings() {
        let s = ForcedTradeState::from_config(&config(TradeType::Auto, 100, 0), None, now());
        assert!(s.active);
        assert_eq!(s.current_phase, Phase::Buying);
        assert_eq!(s.remaining_quantity, 100);
        assert_eq!(s.bought_quantity, 0);
        assert_eq!(s.avg_buy_price, 0.0);
        assert_eq!(s.division_count, 4);
    }

    #[test]
    fn from_config_seeds_quantity_from_holding() {
        let h = holding(30, 1_000.0);
        let s = ForcedTradeState::from_config(&config(TradeType::Auto, 100, 0), Some(&h), now());
        assert_eq!(s.remaining_quantity, 70);
        assert_eq!(s.bought_quantity, 30);
        assert_relative_eq!(s.avg_buy_price, 1_000.0);
    }

    #[test]
    fn from_config_seeds_amount_from_holding() {
        let h = holding(40, 1_000.0);
        let s = ForcedTradeState::from_config(&config(TradeType::Buy, 0, 100_000), Some(&h), now());
        assert_eq!(s.remaining_amount, 60_000);
        assert_eq!(s.total_amount, 100_000);

        let big = holding(500, 1_000.0);
        let s = ForcedTradeState::from_config(&config(TradeType::Buy, 0, 100_000), Some(&big), now());
        assert_eq!(s.remaining_amount, 0);
    }

    #[test]
    fn from_config_sell_keeps_target_quantity() {
        let h = holding(30, 1_000.0);
        let s = ForcedTradeState::from_config(&config(TradeType::Sell, 20, 0), Some(&h), now());
        assert_eq!(s.current_phase, Phase::Selling);
        assert_eq!(s.remaining_quantity, 20);
        assert_eq!(s.bought_quantity, 30);
    }

    #[test]
    fn reset_for_rebuy_restores_targets() {
        let mut s = ForcedTradeState::from_config(&config(TradeType::Auto, 100, 0), None, now());
        s.current_phase = Phase::Selling;
        s.divisions_done = 4;
        s.bought_quantity = 100;
        s.avg_buy_price = 1_010.0;
        s.remaining_quantity = 0;
        s.reset_for_rebuy(now());
        assert_eq!(s.current_phase, Phase::Buying);
        assert_eq!(s.divisions_done, 0);
        assert_eq!(s.bought_quantity, 0);
        assert_eq!(s.avg_buy_price, 0.0);
        assert_eq!(s.remaining_quantity, 100);
        assert!(s.trade_id.starts_with("AUTO_REPEATED_"));
    }

    #[test]
    fn repair_clamps_fields() {
        let mut s = ForcedTradeState {
            active: true,
            stock_code: "005930".into(),
            original_trade_type: TradeType::Buy,
            current_phase: Phase::Selling,
            total_quantity: 10,
            remaining_quantity: -3,
            division_count: 0,
            divisions_done: 5,
            avg_buy_price: 900.0,
            ..ForcedTradeState::default()
        };
        assert!(s.repair());
        assert_eq!(s.remaining_quantity, 0);
        assert_eq!(s.division_count, 1);
        assert_eq!(s.divisions_done, 1);
        assert_eq!(s.avg_buy_price, 0.0);
        assert_eq!(s.current_phase, Phase::Buying);
        assert!(s.active);
    }

    #[test]
    fn repair_deactivates_unsized_record() {
        let mut s = ForcedTradeState {
            active: true,
            stock_code: "005930".into(),
            ..ForcedTradeState::default()
        };
        assert!(s.repair());
        assert!(!s.active);
    }

    #[test]
    fn repair_leaves_valid_record_alone() {
        let mut s = ForcedTradeState::from_config(&config(TradeType::Auto, 100, 0), None, now());
        assert!(!s.repair());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let s: ForcedTradeState =
            serde_json::from_str(r#"{"active": true, "stock_code": "005930", "total_quantity": 5}"#)
                .unwrap();
        assert_eq!(s.division_count, 1);
        assert_eq!(s.original_trade_type, TradeType::Auto);
        assert_relative_eq!(s.sell_profit_target_percent, 0.5);
        assert!(s.check_trading_hours);
    }

    #[test]
    fn trade_type_parses() {
        assert_eq!("auto".parse::<TradeType>(), Ok(TradeType::Auto));
        assert_eq!("SELL".parse::<TradeType>(), Ok(TradeType::Sell));
        assert!("HOLD".parse::<TradeType>().is_err());
    }

    #[test]
    fn serializes_enums_in_upper_case() {
        let s = ForcedTradeState::default();
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"original_trade_type\":\"AUTO\""));
        assert!(json.contains("\"current_phase\":\"BUYING\""));
        assert!(json.contains("\"market\":\"KRX\""));
    }
}
