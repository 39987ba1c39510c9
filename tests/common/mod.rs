#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use divtrader::domain::error::DivtraderError;
use divtrader::domain::forced_trade::ForcedTradeState;
use divtrader::domain::market::{AccountSnapshot, Holding, Quote};
use divtrader::domain::order::{Order, OrderReceipt, TradeRecord};
use divtrader::ports::journal_port::JournalPort;
use divtrader::ports::market_port::MarketPort;
use divtrader::ports::order_port::OrderPort;
use divtrader::ports::state_port::StatePort;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

pub struct MockMarketPort {
    pub prices: RefCell<HashMap<String, i64>>,
    pub account: RefCell<AccountSnapshot>,
    pub quote_errors: HashMap<String, String>,
    pub account_error: Option<String>,
    /// Number of upcoming account fetches to fail.
    pub failing_account_calls: Cell<usize>,
    pub quote_calls: RefCell<Vec<String>>,
}

impl MockMarketPort {
    pub fn new(cash: i64) -> Self {
        Self {
            prices: RefCell::new(HashMap::new()),
            account: RefCell::new(AccountSnapshot::new(cash)),
            quote_errors: HashMap::new(),
            account_error: None,
            failing_account_calls: Cell::new(0),
            quote_calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_price(self, code: &str, price: i64) -> Self {
        self.prices.borrow_mut().insert(code.to_string(), price);
        self
    }

    pub fn with_holding(self, code: &str, quantity: i64, avg: f64) -> Self {
        self.set_holding(code, quantity, avg);
        self
    }

    pub fn with_quote_error(mut self, code: &str, reason: &str) -> Self {
        self.quote_errors.insert(code.to_string(), reason.to_string());
        self
    }

    pub fn with_account_error(mut self, reason: &str) -> Self {
        self.account_error = Some(reason.to_string());
        self
    }

    pub fn set_price(&self, code: &str, price: i64) {
        self.prices.borrow_mut().insert(code.to_string(), price);
    }

    pub fn set_cash(&self, cash: i64) {
        self.account.borrow_mut().available_cash = cash;
    }

    pub fn set_holding(&self, code: &str, quantity: i64, avg: f64) {
        let mut account = self.account.borrow_mut();
        if quantity <= 0 {
            account.holdings.remove(code);
            return;
        }
        account.holdings.insert(
            code.to_string(),
            Holding {
                stock_code: code.to_string(),
                held_quantity: quantity,
                sellable_quantity: quantity,
                average_buy_price: avg,
                valuation: 0,
                profit_rate: 0.0,
            },
        );
    }

    pub fn set_profit_rate(&self, code: &str, rate: f64) {
        if let Some(h) = self.account.borrow_mut().holdings.get_mut(code) {
            h.profit_rate = rate;
        }
    }
}

impl MarketPort for MockMarketPort {
    fn get_quote(&self, stock_code: &str) -> Result<Quote, DivtraderError> {
        self.quote_calls.borrow_mut().push(stock_code.to_string());
        if let Some(reason) = self.quote_errors.get(stock_code) {
            return Err(DivtraderError::QuoteUnavailable {
                stock_code: stock_code.to_string(),
                reason: reason.clone(),
            });
        }
        match self.prices.borrow().get(stock_code) {
            Some(p) => Ok(Quote { last_price: *p }),
            None => Err(DivtraderError::QuoteUnavailable {
                stock_code: stock_code.to_string(),
                reason: "unknown instrument".into(),
            }),
        }
    }

    fn get_account(&self) -> Result<AccountSnapshot, DivtraderError> {
        let failing = self.failing_account_calls.get();
        if failing > 0 {
            self.failing_account_calls.set(failing - 1);
            return Err(DivtraderError::AccountUnavailable {
                reason: "gateway timeout".into(),
            });
        }
        if let Some(reason) = &self.account_error {
            return Err(DivtraderError::AccountUnavailable {
                reason: reason.clone(),
            });
        }
        Ok(self.account.borrow().clone())
    }
}

/// Records every order; rejects while `fail` is set.
pub struct MockOrderPort {
    pub submitted: RefCell<Vec<Order>>,
    pub fail: Cell<bool>,
}

impl MockOrderPort {
    pub fn new() -> Self {
        Self {
            submitted: RefCell::new(Vec::new()),
            fail: Cell::new(false),
        }
    }

    pub fn failing() -> Self {
        let port = Self::new();
        port.fail.set(true);
        port
    }

    pub fn quantities(&self) -> Vec<i64> {
        self.submitted.borrow().iter().map(|o| o.quantity).collect()
    }
}

impl OrderPort for MockOrderPort {
    fn submit_order(&self, order: &Order) -> Result<OrderReceipt, DivtraderError> {
        self.submitted.borrow_mut().push(order.clone());
        if self.fail.get() {
            return Err(DivtraderError::OrderRejected {
                stock_code: order.stock_code.clone(),
                reason: "mock rejection".into(),
            });
        }
        Ok(OrderReceipt {
            order_ref: format!("MOCK-{}", self.submitted.borrow().len()),
        })
    }
}

/// In-memory state store that keeps the serialized JSON, so byte-level
/// comparisons see exactly what a file store would write.
pub struct MemoryStatePort {
    pub json: RefCell<Option<String>>,
    pub saves: Cell<usize>,
    /// Number of upcoming saves to reject.
    pub failing_saves: Cell<usize>,
}

impl MemoryStatePort {
    pub fn new() -> Self {
        Self {
            json: RefCell::new(None),
            saves: Cell::new(0),
            failing_saves: Cell::new(0),
        }
    }

    pub fn with_state(state: &ForcedTradeState) -> Self {
        let port = Self::new();
        *port.json.borrow_mut() = Some(serde_json::to_string(state).unwrap());
        port
    }

    pub fn with_raw(raw: &str) -> Self {
        let port = Self::new();
        *port.json.borrow_mut() = Some(raw.to_string());
        port
    }

    pub fn current(&self) -> Option<ForcedTradeState> {
        self.json
            .borrow()
            .as_ref()
            .map(|j| serde_json::from_str(j).unwrap())
    }

    pub fn raw(&self) -> Option<String> {
        self.json.borrow().clone()
    }
}

impl StatePort for MemoryStatePort {
    fn load(&self) -> Result<Option<ForcedTradeState>, DivtraderError> {
        match self.json.borrow().as_ref() {
            None => Ok(None),
            Some(j) => serde_json::from_str(j)
                .map(Some)
                .map_err(|e| DivtraderError::StateCorrupt {
                    file: "memory".into(),
                    reason: e.to_string(),
                }),
        }
    }

    fn save(&self, state: &ForcedTradeState) -> Result<(), DivtraderError> {
        let failing = self.failing_saves.get();
        if failing > 0 {
            self.failing_saves.set(failing - 1);
            return Err(DivtraderError::Io(std::io::Error::other("disk full")));
        }
        *self.json.borrow_mut() = Some(serde_json::to_string(state)?);
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

pub struct MemoryJournal {
    pub entries: RefCell<Vec<TradeRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }
}

impl JournalPort for MemoryJournal {
    fn record(&self, entry: &TradeRecord) -> Result<(), DivtraderError> {
        self.entries.borrow_mut().push(entry.clone());
        Ok(())
    }
}

/// 2024-03-04 is a Monday.
pub fn monday(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

pub fn sunday(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 10)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}
