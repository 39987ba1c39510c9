//! Append-only journal of executed orders.

use crate::domain::error::DivtraderError;
use crate::domain::order::TradeRecord;

pub trait JournalPort {
    fn record(&self, entry: &TradeRecord) -> Result<(), DivtraderError>;
}

/// Journal that discards every entry, used when no journal file is configured.
pub struct NullJournal;

impl JournalPort for NullJournal {
    fn record(&self, _entry: &TradeRecord) -> Result<(), DivtraderError> {
        Ok(())
    }
}
