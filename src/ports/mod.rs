//! Port traits for the engine's external collaborators.

pub mod config_port;
pub mod journal_port;
pub mod market_port;
pub mod order_port;
pub mod state_port;
