//! Decision-cycle orchestration.
//!
//! One cycle: load the forced-trade record, fetch a snapshot, let either the
//! state machine or the rule selector decide, submit at most one order, and
//! persist state only after a confirmed success.

use chrono::NaiveDateTime;
use std::cell::RefCell;
use std::path::PathBuf;
use tracing::{debug, error, info, info_span, warn};

use crate::domain::error::DivtraderError;
use crate::domain::forced_trade::{ForcedTradeConfig, ForcedTradeState};
use crate::domain::market::{Snapshot, Venue};
use crate::domain::order::{Action, ActionSource, OrderReceipt, TradeRecord};
use crate::domain::rule::{extract_stock_codes, Rule};
use crate::domain::rule_selector::select_action;
use crate::domain::state_machine::{self, Step, WaitReason};
use crate::ports::journal_port::JournalPort;
use crate::ports::market_port::MarketPort;
use crate::ports::order_port::OrderPort;
use crate::ports::state_port::StatePort;

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No forced trade and no rule fired.
    Idle,
    /// The forced trade is active but has nothing to do this cycle.
    Waiting(WaitReason),
    /// The forced trade changed state without an order.
    Transitioned(ForcedTradeState),
    /// An order was accepted.
    Executed {
        action: Action,
        receipt: OrderReceipt,
    },
    /// An order was rejected; nothing was persisted.
    OrderFailed { action: Action, reason: String },
}

/// `[engine]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub loop_interval_seconds: u64,
    pub state_file: PathBuf,
    pub journal_file: Option<PathBuf>,
    pub market: Venue,
    /// Rule names in priority order.
    pub rule_names: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            loop_interval_seconds: 60,
            state_file: PathBuf::from("trade_state.json"),
            journal_file: None,
            market: Venue::Krx,
            rule_names: Vec::new(),
        }
    }
}

pub fn cycle_id(now: NaiveDateTime) -> String {
    format!("#{}", now.format("%Y%m%d%H%M%S"))
}

pub struct Engine<'a> {
    market: &'a dyn MarketPort,
    orders: &'a dyn OrderPort,
    store: &'a dyn StatePort,
    journal: &'a dyn JournalPort,
    rules: Vec<Rule>,
    default_market: Venue,
    /// Record advanced by an accepted order but not yet written. Until it is
    /// persisted the file on disk is stale and must not be planned from.
    unsaved: RefCell<Option<ForcedTradeState>>,
}

impl<'a> Engine<'a> {
    pub fn new(
        market: &'a dyn MarketPort,
        orders: &'a dyn OrderPort,
        store: &'a dyn StatePort,
        journal: &'a dyn JournalPort,
        rules: Vec<Rule>,
        default_market: Venue,
    ) -> Self {
        Self {
            market,
            orders,
            store,
            journal,
            rules,
            default_market,
            unsaved: RefCell::new(None),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn run_cycle(&self, now: NaiveDateTime) -> Result<CycleOutcome, DivtraderError> {
        let id = cycle_id(now);
        let span = info_span!("cycle", id = %id);
        let _enter = span.enter();
        debug!("cycle start");

        self.flush_unsaved()?;
        let state = self.store.load()?.filter(|s| s.active);
        let outcome = match state {
            Some(state) => {
                let codes = [state.stock_code.clone()];
                let snapshot = self.fetch_snapshot(now, codes.iter())?;
                self.run_forced_trade(&id, &state, &snapshot)?
            }
            None => {
                let codes = extract_stock_codes(&self.rules);
                let snapshot = self.fetch_snapshot(now, codes.iter())?;
                self.run_rules(&id, &snapshot)?
            }
        };
        debug!(?outcome, "cycle end");
        Ok(outcome)
    }

    /// Whether an accepted order's state change is still waiting to be saved.
    pub fn has_unsaved_state(&self) -> bool {
        self.unsaved.borrow().is_some()
    }

    fn flush_unsaved(&self) -> Result<(), DivtraderError> {
        let pending = self.unsaved.borrow().clone();
        if let Some(state) = pending {
            self.store.save(&state).inspect_err(|e| {
                error!(error = %e, trade_id = %state.trade_id, "failed to persist state, retrying before next decision");
            })?;
            info!(trade_id = %state.trade_id, "unsaved state persisted");
            self.unsaved.borrow_mut().take();
        }
        Ok(())
    }

    fn fetch_snapshot<'c>(
        &self,
        now: NaiveDateTime,
        codes: impl Iterator<Item = &'c String>,
    ) -> Result<Snapshot, DivtraderError> {
        let account = self.market.get_account()?;
        let mut snapshot = Snapshot::new(now, account);
        for code in codes {
            let quote = self.market.get_quote(code)?;
            snapshot.quotes.insert(code.clone(), quote);
        }
        Ok(snapshot)
    }

    fn run_forced_trade(
        &self,
        cycle_id: &str,
        state: &ForcedTradeState,
        snapshot: &Snapshot,
    ) -> Result<CycleOutcome, DivtraderError> {
        debug!(
            trade_id = %state.trade_id,
            trade_type = %state.original_trade_type,
            phase = %state.current_phase,
            "forced trade owns this cycle"
        );
        match state_machine::plan(state, snapshot)? {
            Step::Wait(reason) => Ok(CycleOutcome::Waiting(reason)),
            Step::Transition(next) => {
                self.store.save(&next)?;
                Ok(CycleOutcome::Transitioned(next))
            }
            Step::Submit(planned) => {
                let action = Action {
                    order: planned.order.clone(),
                    source: ActionSource::ForcedTrade,
                };
                match self.orders.submit_order(&action.order) {
                    Ok(receipt) => {
                        let next = state_machine::apply_success(state, &planned, snapshot.taken_at);
                        self.journal_entry(cycle_id, snapshot.taken_at, &action, &receipt);
                        *self.unsaved.borrow_mut() = Some(next);
                        self.flush_unsaved()?;
                        Ok(CycleOutcome::Executed { action, receipt })
                    }
                    Err(e) => {
                        error!(error = %e, "forced trade order failed, retrying next cycle");
                        Ok(CycleOutcome::OrderFailed {
                            action,
                            reason: e.to_string(),
                        })
                    }
                }
            }
        }
    }

    fn run_rules(&self, cycle_id: &str, snapshot: &Snapshot) -> Result<CycleOutcome, DivtraderError> {
        let Some(action) = select_action(&self.rules, snapshot, self.default_market) else {
            debug!("no rule matched");
            return Ok(CycleOutcome::Idle);
        };
        match self.orders.submit_order(&action.order) {
            Ok(receipt) => {
                self.journal_entry(cycle_id, snapshot.taken_at, &action, &receipt);
                Ok(CycleOutcome::Executed { action, receipt })
            }
            Err(e) => {
                error!(rule = %action.source, error = %e, "rule order failed, discarding");
                Ok(CycleOutcome::OrderFailed {
                    action,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Journal failures are logged only; the order has already been accepted.
    fn journal_entry(
        &self,
        cycle_id: &str,
        at: NaiveDateTime,
        action: &Action,
        receipt: &OrderReceipt,
    ) {
        info!(
            source = %action.source,
            side = %action.order.side,
            stock_code = %action.order.stock_code,
            quantity = action.order.quantity,
            price = action.order.price,
            order_ref = %receipt.order_ref,
            "order accepted"
        );
        let entry = TradeRecord::new(at, cycle_id, action, receipt);
        if let Err(e) = self.journal.record(&entry) {
            warn!(error = %e, "failed to write trade journal");
        }
    }
}

/// Reconcile the persisted record with configuration at start-up.
///
/// Returns the record the engine should start from, if any.
pub fn initialize_state(
    config: &ForcedTradeConfig,
    market: &dyn MarketPort,
    store: &dyn StatePort,
    now: NaiveDateTime,
) -> Result<Option<ForcedTradeState>, DivtraderError> {
    let existing = match store.load() {
        Ok(s) => s,
        Err(e @ DivtraderError::StateCorrupt { .. }) => {
            warn!(error = %e, "discarding unreadable state record");
            None
        }
        Err(e) => return Err(e),
    };

    if !config.enabled {
        return match existing {
            Some(mut s) if s.active => {
                info!(trade_id = %s.trade_id, "forced trade disabled, deactivating record");
                s.deactivate(now);
                store.save(&s)?;
                Ok(Some(s))
            }
            other => Ok(other),
        };
    }

    if config.stock_code.trim().is_empty() {
        return Err(DivtraderError::ConfigMissing {
            section: "forced_trade".into(),
            key: "stock_code".into(),
        });
    }

    if let Some(s) = existing.as_ref().filter(|s| s.active && s.matches_config(config)) {
        info!(
            trade_id = %s.trade_id,
            phase = %s.current_phase,
            divisions_done = s.divisions_done,
            division_count = s.division_count,
            "resuming forced trade"
        );
        return Ok(existing);
    }

    let account = market.get_account()?;
    let holding = account.holding(&config.stock_code);
    if let Some(h) = holding.filter(|h| h.held_quantity > 0) {
        info!(
            stock_code = %config.stock_code,
            held_quantity = h.held_quantity,
            average_buy_price = h.average_buy_price,
            "seeding forced trade from existing holding"
        );
    }
    let state = ForcedTradeState::from_config(config, holding, now);
    store.save(&state)?;
    info!(
        trade_id = %state.trade_id,
        trade_type = %state.original_trade_type,
        stock_code = %state.stock_code,
        "forced trade initialized"
    );
    Ok(Some(state))
}
