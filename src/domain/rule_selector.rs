//! Priority-ordered rule selection. First satisfied rule wins.

use tracing::{debug, info, warn};

use crate::domain::condition::{evaluate_all, EvalContext};
use crate::domain::market::{Snapshot, Venue};
use crate::domain::order::{Action, ActionSource};
use crate::domain::rule::Rule;

pub fn select_action(rules: &[Rule], snapshot: &Snapshot, default_market: Venue) -> Option<Action> {
    for rule in rules {
        let Some(stock_code) = rule.stock_code() else {
            warn!(rule = %rule.name, "rule has no stock_code, skipping");
            continue;
        };

        let ctx = EvalContext {
            stock_code,
            snapshot,
            default_market,
        };
        if !evaluate_all(&rule.conditions, &ctx) {
            debug!(rule = %rule.name, stock_code, "conditions not met");
            continue;
        }

        match rule.strategy.resolve(stock_code, snapshot) {
            Some(order) => {
                info!(
                    rule = %rule.name,
                    strategy = rule.strategy.name(),
                    side = %order.side,
                    stock_code,
                    quantity = order.quantity,
                    "rule selected"
                );
                return Some(Action {
                    order,
                    source: ActionSource::Rule(rule.name.clone()),
                });
            }
            None => {
                warn!(rule = %rule.name, stock_code, "conditions met but strategy produced no order");
            }
        }
    }
    None
}
