//! Order gateway port.

use crate::domain::error::DivtraderError;
use crate::domain::order::{Order, OrderReceipt};

pub trait OrderPort {
    /// Submit `order`. A rejection is reported as
    /// [`DivtraderError::OrderRejected`]; `Ok` means the broker accepted it.
    fn submit_order(&self, order: &Order) -> Result<OrderReceipt, DivtraderError>;
}
