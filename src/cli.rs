//! CLI definition and dispatch.

use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_journal_adapter::CsvJournalAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_state_adapter::JsonStateAdapter;
use crate::adapters::paper_adapter::{PaperBroker, PaperConfig};
use crate::domain::condition::Condition;
use crate::domain::config_validation::{
    validate_engine_config, validate_forced_trade_config, validate_paper_config,
};
use crate::domain::engine::{initialize_state, CycleOutcome, Engine, EngineConfig};
use crate::domain::error::DivtraderError;
use crate::domain::forced_trade::{ForcedTradeConfig, ForcedTradeState, TradeType};
use crate::domain::market::Venue;
use crate::domain::rule::Rule;
use crate::domain::rule_parser;
use crate::domain::strategy::StrategySpec;
use crate::ports::config_port::ConfigPort;
use crate::ports::journal_port::{JournalPort, NullJournal};
use crate::ports::market_port::MarketPort;
use crate::ports::state_port::StatePort;

#[derive(Parser, Debug)]
#[command(name = "divtrader", about = "Polling divisional trading engine")]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the polling loop
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the persisted forced-trade record
    Status {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Deactivate the persisted forced-trade record
    Stop {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing(&cli.log_level);
    match cli.command {
        Command::Run { config, once } => run_engine(&config, once),
        Command::Validate { config } => run_validate(&config),
        Command::Status { config } => run_status(&config),
        Command::Stop { config } => run_stop(&config),
    }
}

/// Install the stderr subscriber. A second call is a no-op.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        error!("{err}");
        ExitCode::from(&err)
    })
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn parse_venue(config: &dyn ConfigPort, section: &str, default: Venue) -> Result<Venue, DivtraderError> {
    match config.get_string(section, "market") {
        Some(m) => m.parse::<Venue>().map_err(|reason| DivtraderError::ConfigInvalid {
            section: section.into(),
            key: "market".into(),
            reason,
        }),
        None => Ok(default),
    }
}

pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, DivtraderError> {
    let defaults = EngineConfig::default();
    let interval = config.get_int("engine", "loop_interval_seconds", 60);
    Ok(EngineConfig {
        loop_interval_seconds: u64::try_from(interval).unwrap_or(1).max(1),
        state_file: config
            .get_string("engine", "state_file")
            .map(PathBuf::from)
            .unwrap_or(defaults.state_file),
        journal_file: config
            .get_string("engine", "journal_file")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from),
        market: parse_venue(config, "engine", defaults.market)?,
        rule_names: config
            .get_string("engine", "rules")
            .map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
    })
}

pub fn build_forced_trade_config(
    config: &dyn ConfigPort,
    default_market: Venue,
) -> Result<ForcedTradeConfig, DivtraderError> {
    let defaults = ForcedTradeConfig::default();
    let trade_type = match config.get_string("forced_trade", "trade_type") {
        Some(t) => t
            .parse::<TradeType>()
            .map_err(|reason| DivtraderError::ConfigInvalid {
                section: "forced_trade".into(),
                key: "trade_type".into(),
                reason,
            })?,
        None => defaults.trade_type,
    };
    let division_count = config.get_int("forced_trade", "division_count", 1);
    Ok(ForcedTradeConfig {
        enabled: config.get_bool("forced_trade", "enabled", false),
        trade_type,
        stock_code: config
            .get_string("forced_trade", "stock_code")
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        quantity: config.get_int("forced_trade", "quantity", 0).max(0),
        amount: config.get_int("forced_trade", "amount", 0).max(0),
        price: config.get_int("forced_trade", "price", 0).max(0),
        division_count: u32::try_from(division_count).unwrap_or(1).max(1),
        sell_profit_target_percent: config.get_double(
            "forced_trade",
            "sell_profit_target_percent",
            defaults.sell_profit_target_percent,
        ),
        market: parse_venue(config, "forced_trade", default_market)?,
        check_trading_hours: config.get_bool("forced_trade", "check_trading_hours", true),
    })
}

pub fn build_paper_config(config: &dyn ConfigPort) -> Option<PaperConfig> {
    if !config.get_bool("paper", "enabled", false) {
        return None;
    }
    Some(PaperConfig {
        account_file: config
            .get_string("paper", "account_file")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("paper_account.json")),
        initial_cash: config.get_int("paper", "initial_cash", 10_000_000).max(0),
        base_price: config.get_int("paper", "base_price", 75_000).max(1),
    })
}

fn build_rule(config: &dyn ConfigPort, name: &str, default_market: Venue) -> Result<Rule, DivtraderError> {
    let section = format!("rule.{}", name);

    let conditions_src = config.get_string(&section, "conditions").unwrap_or_default();
    let calls = rule_parser::parse_calls(&conditions_src).map_err(|e| {
        error!(
            rule = name,
            "failed to parse conditions:\n{}",
            e.display_with_context(&conditions_src)
        );
        DivtraderError::from(e)
    })?;
    let conditions = calls
        .iter()
        .map(|call| Condition::from_call(name, call))
        .collect::<Result<Vec<_>, _>>()?;

    let strategy_src = config
        .get_string(&section, "strategy")
        .ok_or_else(|| DivtraderError::ConfigMissing {
            section: section.clone(),
            key: "strategy".into(),
        })?;
    let call = rule_parser::parse_call(&strategy_src).map_err(|e| {
        error!(
            rule = name,
            "failed to parse strategy:\n{}",
            e.display_with_context(&strategy_src)
        );
        DivtraderError::from(e)
    })?;
    let strategy = StrategySpec::from_call(name, &call, default_market)?;

    Ok(Rule {
        name: name.to_string(),
        conditions,
        strategy,
    })
}

/// Resolve every listed rule. Rules that fail to resolve are excluded from the
/// returned book and reported alongside it.
pub fn load_rules(
    config: &dyn ConfigPort,
    engine: &EngineConfig,
) -> (Vec<Rule>, Vec<DivtraderError>) {
    let mut rules = Vec::new();
    let mut errors = Vec::new();
    for name in &engine.rule_names {
        let section = format!("rule.{}", name);
        if !config.get_bool(&section, "enabled", true) {
            info!(rule = %name, "rule disabled, skipping");
            continue;
        }
        match build_rule(config, name, engine.market) {
            Ok(rule) => {
                if rule.stock_code().is_none() {
                    warn!(rule = %name, "rule has no stock_code and will never fire");
                }
                rules.push(rule);
            }
            Err(e) => errors.push(e),
        }
    }
    (rules, errors)
}

/// Everything `run` and `validate` need, loaded and checked.
pub struct LoadedConfig {
    pub engine: EngineConfig,
    pub forced_trade: ForcedTradeConfig,
    pub paper: Option<PaperConfig>,
    pub rules: Vec<Rule>,
    pub rule_errors: Vec<DivtraderError>,
}

pub fn load_all(config: &dyn ConfigPort) -> Result<LoadedConfig, DivtraderError> {
    validate_engine_config(config)?;
    validate_forced_trade_config(config)?;
    validate_paper_config(config)?;
    let engine = build_engine_config(config)?;
    let forced_trade = build_forced_trade_config(config, engine.market)?;
    let paper = build_paper_config(config);
    let (rules, rule_errors) = load_rules(config, &engine);
    Ok(LoadedConfig {
        engine,
        forced_trade,
        paper,
        rules,
        rule_errors,
    })
}

fn run_engine(config_path: &Path, once: bool) -> ExitCode {
    info!(path = %config_path.display(), "loading config");
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let loaded = match load_all(&adapter) {
        Ok(l) => l,
        Err(e) => {
            error!("{e}");
            return (&e).into();
        }
    };
    for e in &loaded.rule_errors {
        error!("{e}; rule excluded");
    }

    let Some(paper) = loaded.paper.as_ref() else {
        let err = DivtraderError::ConfigMissing {
            section: "paper".into(),
            key: "enabled".into(),
        };
        error!("{err}: no brokerage adapter is available, enable the paper account");
        return (&err).into();
    };
    let broker = match PaperBroker::open(paper) {
        Ok(b) => b,
        Err(e) => {
            error!("{e}");
            return (&e).into();
        }
    };

    let store = JsonStateAdapter::new(&loaded.engine.state_file);
    let journal: Box<dyn JournalPort> = match &loaded.engine.journal_file {
        Some(path) => Box::new(CsvJournalAdapter::new(path)),
        None => Box::new(NullJournal),
    };

    let interval = Duration::from_secs(loaded.engine.loop_interval_seconds);
    let attempts = if once { Some(1) } else { None };
    if let Err(e) = initialize_with_retry(&loaded.forced_trade, &broker, &store, interval, attempts) {
        error!("failed to initialize forced trade: {e}");
        return (&e).into();
    }

    let engine = Engine::new(
        &broker,
        &broker,
        &store,
        journal.as_ref(),
        loaded.rules,
        loaded.engine.market,
    );
    info!(
        rules = engine.rules().len(),
        interval_seconds = loaded.engine.loop_interval_seconds,
        "engine started"
    );

    loop {
        let result = engine.run_cycle(local_now());
        match &result {
            Ok(outcome) => log_outcome(outcome),
            Err(e) if e.is_transient() => warn!("cycle aborted: {e}"),
            Err(e) => error!("cycle failed: {e}"),
        }
        if once {
            return match result {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => (&e).into(),
            };
        }
        thread::sleep(interval);
    }
}

/// Start-up reconciliation that waits out broker outages. Transient errors
/// are retried every `pause` until `max_attempts` runs out (`None` retries
/// forever); anything else is returned at once.
pub fn initialize_with_retry(
    config: &ForcedTradeConfig,
    market: &dyn MarketPort,
    store: &dyn StatePort,
    pause: Duration,
    max_attempts: Option<u32>,
) -> Result<Option<ForcedTradeState>, DivtraderError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match initialize_state(config, market, store, local_now()) {
            Err(e) if e.is_transient() && max_attempts.is_none_or(|max| attempt < max) => {
                warn!(attempt, retry_in_seconds = pause.as_secs(), "start-up deferred: {e}");
                thread::sleep(pause);
            }
            result => return result,
        }
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Idle => debug!("idle"),
        CycleOutcome::Waiting(reason) => debug!(?reason, "forced trade waiting"),
        CycleOutcome::Transitioned(state) => info!(
            active = state.active,
            phase = %state.current_phase,
            "forced trade state changed"
        ),
        CycleOutcome::Executed { action, receipt } => info!(
            source = %action.source,
            order_ref = %receipt.order_ref,
            "cycle executed an order"
        ),
        CycleOutcome::OrderFailed { action, reason } => {
            warn!(source = %action.source, %reason, "cycle order failed")
        }
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let loaded = match load_all(&adapter) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    if let Some(first) = loaded.rule_errors.first() {
        for e in &loaded.rule_errors {
            eprintln!("error: {e}");
        }
        return first.into();
    }

    let listed: Vec<String> = loaded
        .engine
        .rule_names
        .iter()
        .map(|n| format!("rule.{}", n.to_lowercase()))
        .collect();
    for section in adapter.sections() {
        if section.starts_with("rule.") && !listed.contains(&section) {
            eprintln!("warning: [{}] is not listed in [engine] rules", section);
        }
    }

    eprintln!("\nRules ({} active, priority order):", loaded.rules.len());
    for (i, rule) in loaded.rules.iter().enumerate() {
        let conditions: Vec<&str> = rule.conditions.iter().map(|c| c.name()).collect();
        eprintln!(
            "  {}. {} [{}] -> {} {}",
            i + 1,
            rule.name,
            conditions.join(", "),
            rule.strategy.name(),
            rule.stock_code().unwrap_or("<no stock_code>")
        );
    }

    let ft = &loaded.forced_trade;
    if ft.enabled {
        eprintln!(
            "\nForced trade: {} {} qty={} amount={} price={} divisions={} target={}% market={}",
            ft.trade_type,
            ft.stock_code,
            ft.quantity,
            ft.amount,
            ft.price,
            ft.division_count,
            ft.sell_profit_target_percent,
            ft.market
        );
    } else {
        eprintln!("\nForced trade: disabled");
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn open_store(config_path: &Path) -> Result<JsonStateAdapter, ExitCode> {
    let adapter = load_config(config_path)?;
    let engine = build_engine_config(&adapter).map_err(|e| {
        error!("{e}");
        ExitCode::from(&e)
    })?;
    Ok(JsonStateAdapter::new(engine.state_file))
}

fn run_status(config_path: &Path) -> ExitCode {
    let store = match open_store(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let state = match store.load() {
        Ok(s) => s,
        Err(e) => {
            error!("{e}");
            return (&e).into();
        }
    };
    match state {
        Some(state) => match serde_json::to_string_pretty(&state) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                let err = DivtraderError::from(e);
                error!("{err}");
                (&err).into()
            }
        },
        None => {
            eprintln!("No forced trade record at {}", store.path().display());
            ExitCode::SUCCESS
        }
    }
}

fn run_stop(config_path: &Path) -> ExitCode {
    let store = match open_store(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    match stop_forced_trade(&store, local_now()) {
        Ok(true) => {
            eprintln!("Forced trade deactivated.");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            eprintln!("No active forced trade.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            (&e).into()
        }
    }
}

/// Operator disable. Returns whether an active record was deactivated.
pub fn stop_forced_trade(store: &dyn StatePort, now: NaiveDateTime) -> Result<bool, DivtraderError> {
    match store.load()? {
        Some(mut state) if state.active => {
            state.deactivate(now);
            store.save(&state)?;
            info!(trade_id = %state.trade_id, "forced trade stopped by operator");
            Ok(true)
        }
        _ => Ok(false),
    }
}
