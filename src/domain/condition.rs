//! Condition predicates and their evaluation.
//!
//! Conditions are resolved from [`Call`]s once, at configuration load, into a
//! closed set of variants. An unknown name is a load-time error, so a rule that
//! references one never reaches evaluation.
//!
//! # Evaluation Semantics
//!
//! - Each predicate sees only the snapshot slice it needs and never performs I/O
//! - A list is a strict AND that short-circuits on the first `false`
//! - An empty list is `true`

use chrono::NaiveDateTime;
use tracing::{debug, error};

use crate::domain::error::DivtraderError;
use crate::domain::market::{Snapshot, Venue};
use crate::domain::rule::Call;
use crate::domain::trading_hours;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    TradingHours {
        check_enabled: bool,
        market: Option<Venue>,
    },
    PriceBelowTarget {
        stock_code: Option<String>,
        target_price: i64,
    },
    SufficientCash {
        stock_code: Option<String>,
        min_cash_amount: i64,
    },
    ProfitTargetReached {
        stock_code: Option<String>,
        target_profit_percent: f64,
    },
    StopLossReached {
        stock_code: Option<String>,
        stop_loss_percent: f64,
    },
}

/// What a condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub stock_code: &'a str,
    pub snapshot: &'a Snapshot,
    pub default_market: Venue,
}

impl Condition {
    pub fn from_call(rule: &str, call: &Call) -> Result<Condition, DivtraderError> {
        let section = format!("rule.{}", rule);
        let params = &call.params;
        let invalid = |key: &str, reason: String| DivtraderError::ConfigInvalid {
            section: section.clone(),
            key: format!("{}.{}", call.name, key),
            reason,
        };
        let missing = |key: &str| DivtraderError::ConfigMissing {
            section: section.clone(),
            key: format!("{}.{}", call.name, key),
        };
        let stock_code = params.get_str("stock_code").map(String::from);

        match call.name.as_str() {
            "trading_hours" | "is_trading_hours" => {
                let check_enabled = params
                    .get_bool("check_enabled")
                    .map_err(|r| invalid("check_enabled", r))?
                    .unwrap_or(true);
                let market = match params.get_str("market") {
                    Some(m) => Some(m.parse::<Venue>().map_err(|r| invalid("market", r))?),
                    None => None,
                };
                Ok(Condition::TradingHours {
                    check_enabled,
                    market,
                })
            }
            "price_below_target" | "is_price_below_target" => {
                let key = if params.contains("target_price") {
                    "target_price"
                } else {
                    "target"
                };
                let target_price = params
                    .get_int(key)
                    .map_err(|r| invalid(key, r))?
                    .ok_or_else(|| missing("target_price"))?;
                Ok(Condition::PriceBelowTarget {
                    stock_code,
                    target_price,
                })
            }
            "sufficient_cash" | "has_sufficient_cash" => {
                let min_cash_amount = params
                    .get_int("min_cash_amount")
                    .map_err(|r| invalid("min_cash_amount", r))?
                    .ok_or_else(|| missing("min_cash_amount"))?;
                Ok(Condition::SufficientCash {
                    stock_code,
                    min_cash_amount,
                })
            }
            "profit_target_reached" | "is_target_profit_reached" => {
                let target_profit_percent = params
                    .get_float("target_profit_percent")
                    .map_err(|r| invalid("target_profit_percent", r))?
                    .ok_or_else(|| missing("target_profit_percent"))?;
                Ok(Condition::ProfitTargetReached {
                    stock_code,
                    target_profit_percent,
                })
            }
            "stop_loss_reached" | "is_stop_loss_reached" => {
                let stop_loss_percent = params
                    .get_float("stop_loss_percent")
                    .map_err(|r| invalid("stop_loss_percent", r))?
                    .ok_or_else(|| missing("stop_loss_percent"))?;
                Ok(Condition::StopLossReached {
                    stock_code,
                    stop_loss_percent,
                })
            }
            other => Err(DivtraderError::UnknownCondition {
                rule: rule.to_string(),
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Condition::TradingHours { .. } => "trading_hours",
            Condition::PriceBelowTarget { .. } => "price_below_target",
            Condition::SufficientCash { .. } => "sufficient_cash",
            Condition::ProfitTargetReached { .. } => "profit_target_reached",
            Condition::StopLossReached { .. } => "stop_loss_reached",
        }
    }

    pub fn stock_code(&self) -> Option<&str> {
        match self {
            Condition::TradingHours { .. } => None,
            Condition::PriceBelowTarget { stock_code, .. }
            | Condition::SufficientCash { stock_code, .. }
            | Condition::ProfitTargetReached { stock_code, .. }
            | Condition::StopLossReached { stock_code, .. } => stock_code.as_deref(),
        }
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        let code = self.stock_code().unwrap_or(ctx.stock_code);
        let result = match self {
            Condition::TradingHours {
                check_enabled,
                market,
            } => trading_hours_open(
                *check_enabled,
                market.unwrap_or(ctx.default_market),
                ctx.snapshot.taken_at,
            ),
            Condition::PriceBelowTarget { target_price, .. } => {
                price_below_target(code, ctx.snapshot.price(code), *target_price)
            }
            Condition::SufficientCash {
                min_cash_amount, ..
            } => ctx.snapshot.account.available_cash >= *min_cash_amount,
            Condition::ProfitTargetReached {
                target_profit_percent,
                ..
            } => ctx
                .snapshot
                .account
                .holding(code)
                .is_some_and(|h| h.profit_rate >= *target_profit_percent),
            Condition::StopLossReached {
                stop_loss_percent, ..
            } => ctx
                .snapshot
                .account
                .holding(code)
                .is_some_and(|h| h.profit_rate <= *stop_loss_percent),
        };
        debug!(stock_code = code, condition = self.name(), result, "condition evaluated");
        result
    }
}

fn trading_hours_open(check_enabled: bool, market: Venue, now: NaiveDateTime) -> bool {
    if !check_enabled {
        return true;
    }
    trading_hours::is_open(market, now)
}

fn price_below_target(stock_code: &str, price: Option<i64>, target_price: i64) -> bool {
    match price {
        Some(p) => p < target_price,
        None => {
            error!(stock_code, "price_below_target: no quote in snapshot");
            false
        }
    }
}

/// Strict AND over `conditions`; empty is `true`.
pub fn evaluate_all(conditions: &[Condition], ctx: &EvalContext<'_>) -> bool {
    for cond in conditions {
        if !cond.evaluate(ctx) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{AccountSnapshot, Holding};
    use crate::domain::rule_parser::{parse_call, parse_calls};
    use chrono::NaiveDate;

    fn weekday_noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn sunday_noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn holding(profit_rate: f64) -> Holding {
        Holding {
            stock_code: "005930".into(),
            held_quantity: 10,
            sellable_quantity: 10,
            average_buy_price: 70_000.0,
            valuation: 700_000,
            profit_rate,
        }
    }

    fn snapshot(at: NaiveDateTime, price: i64) -> Snapshot {
        Snapshot::new(at, AccountSnapshot::new(500_000).with_holding(holding(3.0)))
            .with_quote("005930", price)
    }

    fn ctx(snap: &Snapshot) -> EvalContext<'_> {
        EvalContext {
            stock_code: "005930",
            snapshot: snap,
            default_market: Venue::Krx,
        }
    }

    fn resolve(text: &str) -> Vec<Condition> {
        parse_calls(text)
            .unwrap()
            .iter()
            .map(|c| Condition::from_call("test", c).unwrap())
            .collect()
    }

    #[test]
    fn from_call_accepts_original_aliases() {
        let conds = resolve(
            "is_trading_hours(), is_price_below_target(target_price=100), \
             has_sufficient_cash(min_cash_amount=1), is_target_profit_reached(target_profit_percent=5), \
             is_stop_loss_reached(stop_loss_percent=-3)",
        );
        let names: Vec<&str> = conds.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec![
                "trading_hours",
                "price_below_target",
                "sufficient_cash",
                "profit_target_reached",
                "stop_loss_reached"
            ]
        );
    }

    #[test]
    fn from_call_unknown_name_fails() {
        let call = parse_call("moving_average_cross(period=20)").unwrap();
        let err = Condition::from_call("r1", &call).unwrap_err();
        assert!(matches!(
            err,
            DivtraderError::UnknownCondition { ref rule, ref name } if rule == "r1" && name == "moving_average_cross"
        ));
    }

    #[test]
    fn from_call_missing_required_param() {
        let call = parse_call("price_below_target(stock_code=005930)").unwrap();
        let err = Condition::from_call("r1", &call).unwrap_err();
        assert!(matches!(err, DivtraderError::ConfigMissing { .. }));
    }

    #[test]
    fn from_call_malformed_param() {
        let call = parse_call("sufficient_cash(min_cash_amount=lots)").unwrap();
        let err = Condition::from_call("r1", &call).unwrap_err();
        assert!(matches!(err, DivtraderError::ConfigInvalid { .. }));
    }

    #[test]
    fn trading_hours_defaults_to_enabled() {
        let conds = resolve("trading_hours()");
        let snap = snapshot(sunday_noon(), 1);
        assert!(!evaluate_all(&conds, &ctx(&snap)));
    }

    #[test]
    fn trading_hours_check_disabled_is_always_true() {
        let conds = resolve("trading_hours(check_enabled=false)");
        let snap = snapshot(sunday_noon(), 1);
        assert!(evaluate_all(&conds, &ctx(&snap)));
    }

    #[test]
    fn trading_hours_uses_condition_market() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(17, 0, 0)
            .unwrap();
        let snap = snapshot(at, 1);
        assert!(!evaluate_all(&resolve("trading_hours()"), &ctx(&snap)));
        assert!(evaluate_all(
            &resolve("trading_hours(market=NXT)"),
            &ctx(&snap)
        ));
    }

    #[test]
    fn price_below_target_with_and_without_quote() {
        let conds = resolve("price_below_target(target=50000)");
        let below = snapshot(weekday_noon(), 49_000);
        assert!(evaluate_all(&conds, &ctx(&below)));

        let no_quote = Snapshot::new(weekday_noon(), AccountSnapshot::new(0));
        assert!(!evaluate_all(&conds, &ctx(&no_quote)));
    }

    #[test]
    fn price_equal_to_target_is_not_below() {
        let conds = resolve("price_below_target(target_price=50000)");
        let snap = snapshot(weekday_noon(), 50_000);
        assert!(!evaluate_all(&conds, &ctx(&snap)));
    }

    #[test]
    fn sufficient_cash_threshold_inclusive() {
        let snap = snapshot(weekday_noon(), 1);
        assert!(evaluate_all(
            &resolve("sufficient_cash(min_cash_amount=500000)"),
            &ctx(&snap)
        ));
        assert!(!evaluate_all(
            &resolve("sufficient_cash(min_cash_amount=500001)"),
            &ctx(&snap)
        ));
    }

    #[test]
    fn profit_and_stop_loss_use_holding_rate() {
        let snap = snapshot(weekday_noon(), 1);
        assert!(evaluate_all(
            &resolve("profit_target_reached(target_profit_percent=3)"),
            &ctx(&snap)
        ));
        assert!(!evaluate_all(
            &resolve("profit_target_reached(target_profit_percent=3.1)"),
            &ctx(&snap)
        ));
        assert!(!evaluate_all(
            &resolve("stop_loss_reached(stop_loss_percent=-2)"),
            &ctx(&snap)
        ));
        assert!(evaluate_all(
            &resolve("stop_loss_reached(stop_loss_percent=3)"),
            &ctx(&snap)
        ));
    }

    #[test]
    fn profit_condition_false_without_holding() {
        let snap = Snapshot::new(weekday_noon(), AccountSnapshot::new(0));
        assert!(!evaluate_all(
            &resolve("profit_target_reached(target_profit_percent=-100)"),
            &ctx(&snap)
        ));
    }

    #[test]
    fn empty_list_is_true() {
        let snap = snapshot(sunday_noon(), 1);
        assert!(evaluate_all(&[], &ctx(&snap)));
    }

    #[test]
    fn and_short_circuits_on_first_false() {
        // The second condition would be true; the first closes the gate.
        let conds = resolve("trading_hours(), sufficient_cash(min_cash_amount=0)");
        let snap = snapshot(sunday_noon(), 1);
        assert!(!evaluate_all(&conds, &ctx(&snap)));
    }
}
