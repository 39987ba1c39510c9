//! Rule data structures.
//!
//! - `Params`: textual key/value parameters with typed accessors
//! - `Call`: a parsed `name(key=value, ...)` expression
//! - `Rule`: an AND-conjunction of conditions bound to a strategy

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::condition::Condition;
use crate::domain::strategy::StrategySpec;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>, String> {
        match self.get_str(key) {
            None => Ok(None),
            Some(v) => v
                .parse::<i64>()
                .map(Some)
                .map_err(|_| format!("'{}' is not an integer", v)),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<Option<f64>, String> {
        match self.get_str(key) {
            None => Ok(None),
            Some(v) => v
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("'{}' is not a number", v)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, String> {
        match self.get_str(key) {
            None => Ok(None),
            Some(v) => match v.to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Some(true)),
                "false" | "no" | "0" => Ok(Some(false)),
                _ => Err(format!("'{}' is not a boolean", v)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub params: Params,
    /// Character offset of the call name in the source text.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub strategy: StrategySpec,
}

impl Rule {
    /// The instrument this rule trades: the strategy's own code wins, else the
    /// first condition carrying one.
    pub fn stock_code(&self) -> Option<&str> {
        if let Some(code) = self.strategy.stock_code() {
            return Some(code);
        }
        self.conditions.iter().find_map(|c| c.stock_code())
    }
}

/// Collect every instrument code a rule book refers to, for quote prefetch.
pub fn extract_stock_codes(rules: &[Rule]) -> BTreeSet<String> {
    let mut codes = BTreeSet::new();
    for rule in rules {
        if let Some(code) = rule.strategy.stock_code() {
            codes.insert(code.to_string());
        }
        for cond in &rule.conditions {
            if let Some(code) = cond.stock_code() {
                codes.insert(code.to_string());
            }
        }
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Venue;
    use crate::domain::strategy::{BuySizing, SellSizing};

    fn buy_rule(strategy_code: Option<&str>, cond_code: Option<&str>) -> Rule {
        Rule {
            name: "r".into(),
            conditions: vec![
                Condition::TradingHours {
                    check_enabled: false,
                    market: None,
                },
                Condition::PriceBelowTarget {
                    stock_code: cond_code.map(String::from),
                    target_price: 50_000,
                },
            ],
            strategy: match strategy_code {
                Some(code) => StrategySpec::FixedBuy {
                    stock_code: Some(code.into()),
                    sizing: BuySizing::Quantity(1),
                    price: 0,
                    market: Venue::Krx,
                },
                None => StrategySpec::FixedSell {
                    stock_code: None,
                    sizing: SellSizing::All,
                    price: 0,
                    market: Venue::Krx,
                },
            },
        }
    }

    #[test]
    fn params_typed_accessors() {
        let mut p = Params::new();
        p.insert("code", "005930");
        p.insert("qty", "12");
        p.insert("pct", "1.5");
        p.insert("flag", "yes");
        assert_eq!(p.get_str("code"), Some("005930"));
        assert_eq!(p.get_int("code"), Ok(Some(5930)));
        assert_eq!(p.get_int("qty"), Ok(Some(12)));
        assert_eq!(p.get_float("pct"), Ok(Some(1.5)));
        assert_eq!(p.get_bool("flag"), Ok(Some(true)));
        assert_eq!(p.get_int("missing"), Ok(None));
    }

    #[test]
    fn params_reject_malformed_values() {
        let mut p = Params::new();
        p.insert("qty", "ten");
        p.insert("flag", "maybe");
        assert!(p.get_int("qty").is_err());
        assert!(p.get_float("qty").is_err());
        assert!(p.get_bool("flag").is_err());
    }

    #[test]
    fn stock_code_prefers_strategy() {
        let rule = buy_rule(Some("005930"), Some("000660"));
        assert_eq!(rule.stock_code(), Some("005930"));
    }

    #[test]
    fn stock_code_falls_back_to_conditions() {
        let rule = buy_rule(None, Some("000660"));
        assert_eq!(rule.stock_code(), Some("000660"));
    }

    #[test]
    fn stock_code_missing() {
        let rule = buy_rule(None, None);
        assert_eq!(rule.stock_code(), None);
    }

    #[test]
    fn extract_codes_deduplicates() {
        let rules = vec![
            buy_rule(Some("005930"), Some("000660")),
            buy_rule(Some("005930"), None),
        ];
        let codes: Vec<String> = extract_stock_codes(&rules).into_iter().collect();
        assert_eq!(codes, vec!["000660".to_string(), "005930".to_string()]);
    }
}
