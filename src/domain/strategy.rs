//! Order-producing strategies bound to rules.

use tracing::{debug, error, warn};

use crate::domain::error::DivtraderError;
use crate::domain::market::{Snapshot, Venue};
use crate::domain::order::{Order, Side};
use crate::domain::rule::Call;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuySizing {
    Quantity(i64),
    Amount(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellSizing {
    All,
    Quantity(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrategySpec {
    FixedBuy {
        stock_code: Option<String>,
        sizing: BuySizing,
        price: i64,
        market: Venue,
    },
    FixedSell {
        stock_code: Option<String>,
        sizing: SellSizing,
        price: i64,
        market: Venue,
    },
}

impl StrategySpec {
    pub fn from_call(
        rule: &str,
        call: &Call,
        default_market: Venue,
    ) -> Result<StrategySpec, DivtraderError> {
        let section = format!("rule.{}", rule);
        let params = &call.params;
        let invalid = |key: &str, reason: String| DivtraderError::ConfigInvalid {
            section: section.clone(),
            key: format!("{}.{}", call.name, key),
            reason,
        };

        let stock_code = params.get_str("stock_code").map(String::from);
        let price = params
            .get_int("price")
            .map_err(|r| invalid("price", r))?
            .unwrap_or(0);
        if price < 0 {
            return Err(invalid("price", "price must be non-negative".into()));
        }
        let market = match params.get_str("market") {
            Some(m) => m.parse::<Venue>().map_err(|r| invalid("market", r))?,
            None => default_market,
        };
        let quantity = params
            .get_int("quantity")
            .map_err(|r| invalid("quantity", r))?
            .filter(|q| *q > 0);

        match call.name.as_str() {
            "fixed_buy" | "simple_buy" => {
                let amount = params
                    .get_int("amount")
                    .map_err(|r| invalid("amount", r))?
                    .filter(|a| *a > 0);
                let sizing = match (quantity, amount) {
                    (Some(q), _) => BuySizing::Quantity(q),
                    (None, Some(a)) => BuySizing::Amount(a),
                    (None, None) => {
                        return Err(invalid(
                            "quantity",
                            "either a positive 'amount' or 'quantity' is required".into(),
                        ));
                    }
                };
                Ok(StrategySpec::FixedBuy {
                    stock_code,
                    sizing,
                    price,
                    market,
                })
            }
            "fixed_sell" | "simple_sell" | "sell_all" => {
                let sell_all = call.name == "sell_all"
                    || params
                        .get_bool("sell_all")
                        .map_err(|r| invalid("sell_all", r))?
                        .unwrap_or(false);
                let sizing = match (sell_all, quantity) {
                    (true, _) => SellSizing::All,
                    (false, Some(q)) => SellSizing::Quantity(q),
                    (false, None) => {
                        return Err(invalid(
                            "quantity",
                            "'sell_all=true' or a positive 'quantity' is required".into(),
                        ));
                    }
                };
                Ok(StrategySpec::FixedSell {
                    stock_code,
                    sizing,
                    price,
                    market,
                })
            }
            other => Err(DivtraderError::UnknownStrategy {
                rule: rule.to_string(),
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategySpec::FixedBuy { .. } => "fixed_buy",
            StrategySpec::FixedSell { .. } => "fixed_sell",
        }
    }

    pub fn stock_code(&self) -> Option<&str> {
        match self {
            StrategySpec::FixedBuy { stock_code, .. } | StrategySpec::FixedSell { stock_code, .. } => {
                stock_code.as_deref()
            }
        }
    }

    /// Compute a concrete order for `stock_code`, or `None` when the strategy
    /// cannot produce a tradable quantity from this snapshot.
    pub fn resolve(&self, stock_code: &str, snapshot: &Snapshot) -> Option<Order> {
        match self {
            StrategySpec::FixedBuy {
                sizing,
                price,
                market,
                ..
            } => {
                let quantity = match *sizing {
                    BuySizing::Quantity(q) => q,
                    BuySizing::Amount(amount) => {
                        let current_price = snapshot.price(stock_code).unwrap_or(0);
                        if current_price <= 0 {
                            error!(stock_code, current_price, "fixed_buy: no usable price to size order");
                            return None;
                        }
                        let q = amount / current_price;
                        if q == 0 {
                            warn!(
                                stock_code,
                                amount, current_price, "fixed_buy: amount buys less than one share"
                            );
                            return None;
                        }
                        debug!(stock_code, amount, current_price, quantity = q, "fixed_buy sized by amount");
                        q
                    }
                };
                Some(Order {
                    side: Side::Buy,
                    stock_code: stock_code.to_string(),
                    quantity,
                    price: *price,
                    market: *market,
                })
            }
            StrategySpec::FixedSell {
                sizing,
                price,
                market,
                ..
            } => {
                let quantity = match *sizing {
                    SellSizing::Quantity(q) => q,
                    SellSizing::All => {
                        let sellable = snapshot.account.sellable_quantity(stock_code);
                        if sellable <= 0 {
                            warn!(stock_code, "fixed_sell: sell_all requested but nothing is sellable");
                            return None;
                        }
                        sellable
                    }
                };
                Some(Order {
                    side: Side::Sell,
                    stock_code: stock_code.to_string(),
                    quantity,
                    price: *price,
                    market: *market,
                })
            }
        }
    }
}
