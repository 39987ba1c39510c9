//! Core domain types and logic.

pub mod market;
pub mod order;
pub mod rule;
pub mod rule_parser;
pub mod condition;
pub mod strategy;
pub mod rule_selector;
pub mod trading_hours;
pub mod division;
pub mod forced_trade;
pub mod state_machine;
pub mod engine;
pub mod config_validation;
pub mod error;
