//! File-backed paper trading account.
//!
//! Implements both [`MarketPort`] and [`OrderPort`] so the engine can run
//! without a brokerage connection. Quotes are synthetic: a base price (or a
//! held position's average marked up slightly) plus a deterministic drift that
//! advances on every quote or market fill.

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adapters::json_state_adapter::write_atomic;
use crate::domain::error::DivtraderError;
use crate::domain::market::{AccountSnapshot, Holding, Quote};
use crate::domain::order::{Order, OrderReceipt, Side};
use crate::ports::market_port::MarketPort;
use crate::ports::order_port::OrderPort;

const DRIFT_STEPS: [i64; 8] = [0, 3, -2, 5, -4, 1, -1, 2];
const DRIFT_TICK: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperPosition {
    pub stock_code: String,
    pub quantity: i64,
    pub avg_buy_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperAccount {
    pub cash: i64,
    #[serde(default)]
    pub positions: Vec<PaperPosition>,
    #[serde(default)]
    pub orders_filled: u64,
}

impl PaperAccount {
    fn position(&self, stock_code: &str) -> Option<&PaperPosition> {
        self.positions.iter().find(|p| p.stock_code == stock_code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaperConfig {
    pub account_file: PathBuf,
    pub initial_cash: i64,
    pub base_price: i64,
}

pub struct PaperBroker {
    path: PathBuf,
    base_price: i64,
    account: RefCell<PaperAccount>,
    tick: Cell<usize>,
}

impl PaperBroker {
    /// Open the account file, creating a fresh account with `initial_cash`
    /// when it does not exist yet.
    pub fn open(config: &PaperConfig) -> Result<Self, DivtraderError> {
        let account = match fs::read_to_string(&config.account_file) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                DivtraderError::StateCorrupt {
                    file: config.account_file.display().to_string(),
                    reason: e.to_string(),
                }
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    path = %config.account_file.display(),
                    initial_cash = config.initial_cash,
                    "creating paper account"
                );
                PaperAccount {
                    cash: config.initial_cash,
                    positions: Vec::new(),
                    orders_filled: 0,
                }
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: config.account_file.clone(),
            base_price: config.base_price,
            account: RefCell::new(account),
            tick: Cell::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn account(&self) -> PaperAccount {
        self.account.borrow().clone()
    }

    /// Current synthetic price without moving the drift forward.
    fn mark_price(&self, stock_code: &str) -> i64 {
        let base = match self.account.borrow().position(stock_code) {
            Some(p) if p.quantity > 0 && p.avg_buy_price > 0.0 => {
                (p.avg_buy_price * 1.01).round() as i64
            }
            _ => self.base_price,
        };
        let drift = DRIFT_STEPS[self.tick.get() % DRIFT_STEPS.len()] * DRIFT_TICK;
        (base + drift).max(1)
    }

    /// Price for a quote or a market fill; advances the drift.
    fn quote_price(&self, stock_code: &str) -> i64 {
        let price = self.mark_price(stock_code);
        self.tick.set(self.tick.get().wrapping_add(1));
        price
    }

    fn persist(&self, account: &PaperAccount) -> Result<(), DivtraderError> {
        let json = serde_json::to_string_pretty(account)?;
        write_atomic(&self.path, json.as_bytes())
    }

    fn reject(order: &Order, reason: String) -> DivtraderError {
        warn!(stock_code = %order.stock_code, side = %order.side, %reason, "paper order rejected");
        DivtraderError::OrderRejected {
            stock_code: order.stock_code.clone(),
            reason,
        }
    }
}

impl MarketPort for PaperBroker {
    fn get_quote(&self, stock_code: &str) -> Result<Quote, DivtraderError> {
        Ok(Quote {
            last_price: self.quote_price(stock_code),
        })
    }

    fn get_account(&self) -> Result<AccountSnapshot, DivtraderError> {
        let positions = self.account.borrow().positions.clone();
        let cash = self.account.borrow().cash;
        let mut snapshot = AccountSnapshot::new(cash);
        for p in positions.into_iter().filter(|p| p.quantity > 0) {
            let price = self.mark_price(&p.stock_code);
            let profit_rate = if p.avg_buy_price > 0.0 {
                (price as f64 - p.avg_buy_price) / p.avg_buy_price * 100.0
            } else {
                0.0
            };
            snapshot = snapshot.with_holding(Holding {
                stock_code: p.stock_code.clone(),
                held_quantity: p.quantity,
                sellable_quantity: p.quantity,
                average_buy_price: p.avg_buy_price,
                valuation: price * p.quantity,
                profit_rate,
            });
        }
        Ok(snapshot)
    }
}

impl OrderPort for PaperBroker {
    fn submit_order(&self, order: &Order) -> Result<OrderReceipt, DivtraderError> {
        if order.quantity <= 0 {
            return Err(Self::reject(order, "quantity must be positive".into()));
        }
        let trade_price = if order.price > 0 {
            order.price
        } else {
            self.quote_price(&order.stock_code)
        };
        let value = trade_price.saturating_mul(order.quantity);

        let mut account = self.account();
        match order.side {
            Side::Buy => {
                if value > account.cash {
                    return Err(Self::reject(
                        order,
                        format!("insufficient cash: need {}, have {}", value, account.cash),
                    ));
                }
                account.cash -= value;
                match account
                    .positions
                    .iter_mut()
                    .find(|p| p.stock_code == order.stock_code)
                {
                    Some(p) => {
                        let cost = p.avg_buy_price * p.quantity as f64 + value as f64;
                        p.quantity += order.quantity;
                        p.avg_buy_price = cost / p.quantity as f64;
                    }
                    None => account.positions.push(PaperPosition {
                        stock_code: order.stock_code.clone(),
                        quantity: order.quantity,
                        avg_buy_price: trade_price as f64,
                    }),
                }
            }
            Side::Sell => {
                let held = account
                    .position(&order.stock_code)
                    .map(|p| p.quantity)
                    .unwrap_or(0);
                if order.quantity > held {
                    return Err(Self::reject(
                        order,
                        format!("insufficient quantity: sell {}, hold {}", order.quantity, held),
                    ));
                }
                account.cash += value;
                for p in account.positions.iter_mut() {
                    if p.stock_code == order.stock_code {
                        p.quantity -= order.quantity;
                    }
                }
                account.positions.retain(|p| p.quantity > 0);
            }
        }
        account.orders_filled += 1;

        // The in-memory account only changes once the file has it.
        self.persist(&account)?;
        let order_ref = format!("PAPER-{}", account.orders_filled);
        *self.account.borrow_mut() = account;
        info!(
            order_ref = %order_ref,
            side = %order.side,
            stock_code = %order.stock_code,
            quantity = order.quantity,
            price = trade_price,
            "paper order filled"
        );
        Ok(OrderReceipt { order_ref })
    }
}
