//! Durable store for the single forced-trade record.

use crate::domain::error::DivtraderError;
use crate::domain::forced_trade::ForcedTradeState;

pub trait StatePort {
    /// `Ok(None)` when no record has been written yet.
    fn load(&self) -> Result<Option<ForcedTradeState>, DivtraderError>;
    /// Replace the stored record as a whole.
    fn save(&self, state: &ForcedTradeState) -> Result<(), DivtraderError>;
}
