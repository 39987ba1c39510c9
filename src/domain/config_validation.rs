//! Configuration validation.
//!
//! Runs before the polling loop starts so that range and type mistakes in the
//! INI file surface as a single error instead of a misbehaving cycle.

use crate::domain::error::DivtraderError;
use crate::domain::forced_trade::TradeType;
use crate::domain::market::Venue;
use crate::ports::config_port::ConfigPort;

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), DivtraderError> {
    validate_loop_interval(config)?;
    validate_venue(config, "engine", "market")?;
    validate_rule_list(config)?;
    Ok(())
}

pub fn validate_forced_trade_config(config: &dyn ConfigPort) -> Result<(), DivtraderError> {
    if !config.get_bool("forced_trade", "enabled", false) {
        return Ok(());
    }
    validate_stock_code(config)?;
    validate_trade_type(config)?;
    validate_venue(config, "forced_trade", "market")?;
    validate_sizing(config)?;
    validate_division_count(config)?;
    validate_profit_target(config)?;
    Ok(())
}

pub fn validate_paper_config(config: &dyn ConfigPort) -> Result<(), DivtraderError> {
    if !config.get_bool("paper", "enabled", false) {
        return Ok(());
    }
    if int_value(config, "paper", "initial_cash")?.unwrap_or(0) < 0 {
        return Err(invalid("paper", "initial_cash", "initial_cash must be non-negative"));
    }
    if int_value(config, "paper", "base_price")?.unwrap_or(1) <= 0 {
        return Err(invalid("paper", "base_price", "base_price must be positive"));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> DivtraderError {
    DivtraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Present-but-unparsable integers are errors rather than silent defaults.
fn int_value(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<i64>, DivtraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid(section, key, &format!("'{}' is not an integer", s))),
    }
}

fn float_value(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, DivtraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(invalid(section, key, &format!("'{}' is not a number", s))),
        },
    }
}

fn validate_loop_interval(config: &dyn ConfigPort) -> Result<(), DivtraderError> {
    if let Some(value) = int_value(config, "engine", "loop_interval_seconds")? {
        if value < 1 {
            return Err(invalid(
                "engine",
                "loop_interval_seconds",
                "loop_interval_seconds must be at least 1",
            ));
        }
    }
    Ok(())
}

fn validate_venue(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), DivtraderError> {
    if let Some(value) = config.get_string(section, key) {
        value
            .parse::<Venue>()
            .map_err(|reason| invalid(section, key, &reason))?;
    }
    Ok(())
}

fn validate_rule_list(config: &dyn ConfigPort) -> Result<(), DivtraderError> {
    let Some(list) = config.get_string("engine", "rules") else {
        return Ok(());
    };
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let section = format!("rule.{}", name);
        if !config.get_bool(&section, "enabled", true) {
            continue;
        }
        match config.get_string(&section, "strategy") {
            Some(s) if !s.trim().is_empty() => {}
            _ => {
                return Err(DivtraderError::ConfigMissing {
                    section,
                    key: "strategy".to_string(),
                });
            }
        }
    }
    Ok(())
}

fn validate_stock_code(config: &dyn ConfigPort) -> Result<(), DivtraderError> {
    match config.get_string("forced_trade", "stock_code") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(DivtraderError::ConfigMissing {
            section: "forced_trade".to_string(),
            key: "stock_code".to_string(),
        }),
    }
}

fn validate_trade_type(config: &dyn ConfigPort) -> Result<(), DivtraderError> {
    if let Some(value) = config.get_string("forced_trade", "trade_type") {
        value
            .parse::<TradeType>()
            .map_err(|reason| invalid("forced_trade", "trade_type", &reason))?;
    }
    Ok(())
}

fn validate_sizing(config: &dyn ConfigPort) -> Result<(), DivtraderError> {
    let quantity = int_value(config, "forced_trade", "quantity")?.unwrap_or(0);
    let amount = int_value(config, "forced_trade", "amount")?.unwrap_or(0);
    let price = int_value(config, "forced_trade", "price")?.unwrap_or(0);
    if quantity < 0 {
        return Err(invalid("forced_trade", "quantity", "quantity must be non-negative"));
    }
    if amount < 0 {
        return Err(invalid("forced_trade", "amount", "amount must be non-negative"));
    }
    if price < 0 {
        return Err(invalid("forced_trade", "price", "price must be non-negative"));
    }

    let trade_type = config
        .get_string("forced_trade", "trade_type")
        .and_then(|s| s.parse::<TradeType>().ok())
        .unwrap_or_default();
    if trade_type != TradeType::Sell && quantity == 0 && amount == 0 {
        return Err(invalid(
            "forced_trade",
            "quantity",
            "BUY and AUTO trades need a positive quantity or amount",
        ));
    }
    Ok(())
}

fn validate_division_count(config: &dyn ConfigPort) -> Result<(), DivtraderError> {
    if let Some(value) = int_value(config, "forced_trade", "division_count")? {
        if value < 1 || value > i64::from(u32::MAX) {
            return Err(invalid(
                "forced_trade",
                "division_count",
                "division_count must be at least 1",
            ));
        }
    }
    Ok(())
}

fn validate_profit_target(config: &dyn ConfigPort) -> Result<(), DivtraderError> {
    float_value(config, "forced_trade", "sell_profit_target_percent")?;
    Ok(())
}
