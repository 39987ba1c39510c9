//! Market and account snapshot types.
//!
//! A [`Snapshot`] is fetched once at the start of a cycle and shared read-only
//! by every condition, strategy and state-machine step within that cycle.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Trading venue. Used for order routing and trading-hours gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Venue {
    #[default]
    #[serde(rename = "KRX")]
    Krx,
    #[serde(rename = "NXT")]
    Nxt,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Krx => "KRX",
            Venue::Nxt => "NXT",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "KRX" => Ok(Venue::Krx),
            "NXT" => Ok(Venue::Nxt),
            other => Err(format!("unknown venue '{}', expected KRX or NXT", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub last_price: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub stock_code: String,
    pub held_quantity: i64,
    pub sellable_quantity: i64,
    pub average_buy_price: f64,
    pub valuation: i64,
    /// Evaluated profit rate in percent, as reported by the broker.
    pub profit_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountSnapshot {
    pub available_cash: i64,
    pub holdings: HashMap<String, Holding>,
}

impl AccountSnapshot {
    pub fn new(available_cash: i64) -> Self {
        AccountSnapshot {
            available_cash,
            holdings: HashMap::new(),
        }
    }

    pub fn with_holding(mut self, holding: Holding) -> Self {
        self.holdings.insert(holding.stock_code.clone(), holding);
        self
    }

    pub fn holding(&self, stock_code: &str) -> Option<&Holding> {
        self.holdings.get(stock_code)
    }

    pub fn sellable_quantity(&self, stock_code: &str) -> i64 {
        self.holding(stock_code)
            .map(|h| h.sellable_quantity.max(0))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub taken_at: NaiveDateTime,
    pub quotes: HashMap<String, Quote>,
    pub account: AccountSnapshot,
}

impl Snapshot {
    pub fn new(taken_at: NaiveDateTime, account: AccountSnapshot) -> Self {
        Snapshot {
            taken_at,
            quotes: HashMap::new(),
            account,
        }
    }

    pub fn with_quote(mut self, stock_code: &str, last_price: i64) -> Self {
        self.quotes
            .insert(stock_code.to_string(), Quote { last_price });
        self
    }

    pub fn price(&self, stock_code: &str) -> Option<i64> {
        self.quotes.get(stock_code).map(|q| q.last_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_holding(sellable: i64) -> Holding {
        Holding {
            stock_code: "005930".into(),
            held_quantity: 10,
            sellable_quantity: sellable,
            average_buy_price: 70_000.0,
            valuation: 720_000,
            profit_rate: 2.86,
        }
    }

    #[test]
    fn venue_parses_case_insensitively() {
        assert_eq!("krx".parse::<Venue>(), Ok(Venue::Krx));
        assert_eq!(" NXT ".parse::<Venue>(), Ok(Venue::Nxt));
        assert!("NYSE".parse::<Venue>().is_err());
    }

    #[test]
    fn venue_serializes_as_code() {
        assert_eq!(serde_json::to_string(&Venue::Nxt).unwrap(), "\"NXT\"");
    }

    #[test]
    fn sellable_quantity_for_missing_holding_is_zero() {
        let account = AccountSnapshot::new(1_000);
        assert_eq!(account.sellable_quantity("005930"), 0);
    }

    #[test]
    fn sellable_quantity_never_negative() {
        let account = AccountSnapshot::new(0).with_holding(sample_holding(-3));
        assert_eq!(account.sellable_quantity("005930"), 0);
    }

    #[test]
    fn snapshot_price_lookup() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let snap = Snapshot::new(at, AccountSnapshot::new(0)).with_quote("005930", 71_000);
        assert_eq!(snap.price("005930"), Some(71_000));
        assert_eq!(snap.price("000660"), None);
    }
}
