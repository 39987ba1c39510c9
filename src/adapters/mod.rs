//! Concrete adapter implementations for ports.

pub mod csv_journal_adapter;
pub mod file_config_adapter;
pub mod json_state_adapter;
pub mod paper_adapter;
