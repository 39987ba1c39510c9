//! Market snapshot gateway port.

use crate::domain::error::DivtraderError;
use crate::domain::market::{AccountSnapshot, Quote};

pub trait MarketPort {
    fn get_quote(&self, stock_code: &str) -> Result<Quote, DivtraderError>;
    fn get_account(&self) -> Result<AccountSnapshot, DivtraderError>;
}
