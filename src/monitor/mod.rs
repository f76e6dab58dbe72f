//! Position monitoring and exit evaluation
//!
//! WARNING: TP/SL is best-effort, not guaranteed. At seconds-level
//! polling, fast rugs can gap through a stop-loss before detection.
//! This is unavoidable without sub-second polling or on-chain stop
//! mechanisms, which pump.fun does not offer.

pub mod paper;

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::VariantConfig;
use crate::error::{Error, Result};
use crate::pump::price::{lamports_to_sol, min_sol_with_slippage, percent_to_bps, sol_to_lamports};
use crate::pump::CurveState;
use crate::rpc::{RpcFacade, SellRequest};
use crate::store::{ExitReason, StateStore};

pub use paper::{PaperTracker, TradeClosedEvent};

/// One monitored position
#[derive(Debug, Clone)]
pub struct Position {
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    /// SOL committed at entry, basis for PnL percent
    pub entry_amount_sol: f64,
    /// Entry plus rent and fees
    pub actual_cost_sol: f64,
    pub token_amount: u64,
    pub entry_timestamp_ms: i64,
    pub buy_signature: Option<String>,
    pub is_token_2022: Option<bool>,
    /// Monotonic entry time; wall clock is for persistence only
    pub entered_at: Instant,
    pub last_value_sol: Option<f64>,
    pub last_check_ms: Option<i64>,
    /// Highest PnL percent observed; never decreases while open
    pub high_water_mark_percent: Option<f64>,
}

impl Position {
    pub fn new(
        mint: Pubkey,
        bonding_curve: Pubkey,
        entry_amount_sol: f64,
        actual_cost_sol: f64,
        token_amount: u64,
    ) -> Self {
        Self {
            mint,
            bonding_curve,
            entry_amount_sol,
            actual_cost_sol,
            token_amount,
            entry_timestamp_ms: chrono::Utc::now().timestamp_millis(),
            buy_signature: None,
            is_token_2022: None,
            entered_at: Instant::now(),
            last_value_sol: None,
            last_check_ms: None,
            high_water_mark_percent: None,
        }
    }
}

/// A decided exit for one position
#[derive(Debug, Clone, Copy)]
pub struct ExitTrigger {
    pub reason: ExitReason,
    /// Valuation the exit was decided at
    pub value_sol: f64,
    pub pnl_percent: f64,
}

/// Evaluate the exit rules for one position against the tick's curve
/// state. Mutates the position's last-seen value and high-water mark.
///
/// Rule order: max-hold, graduation, then the priced rules off a
/// finite current valuation (trailing stop, hard take-profit, plain
/// take-profit, stop-loss). A missing or unpriceable state skips the
/// priced rules but never the time exit.
pub fn evaluate_exit(
    position: &mut Position,
    state: Option<&CurveState>,
    config: &VariantConfig,
) -> Option<ExitTrigger> {
    let entry = position.entry_amount_sol;

    let current_value = state.and_then(|s| {
        if s.complete {
            return None;
        }
        let lamports = s.sell_out(position.token_amount).ok()?;
        let value = lamports_to_sol(lamports);
        (value.is_finite() && value >= 0.0).then_some(value)
    });

    // Max hold fires regardless of pricing
    let held = position.entered_at.elapsed();
    if held >= Duration::from_millis(config.max_hold_duration_ms) {
        let value = current_value
            .or(position.last_value_sol)
            .unwrap_or(entry);
        return Some(ExitTrigger {
            reason: ExitReason::TimeExit,
            value_sol: value,
            pnl_percent: (value - entry) / entry * 100.0,
        });
    }

    if state.is_some_and(|s| s.complete) {
        // Graduated curves are unsellable through the venue
        return Some(ExitTrigger {
            reason: ExitReason::Graduated,
            value_sol: 0.0,
            pnl_percent: -100.0,
        });
    }

    let value = current_value?;
    let pnl_pct = (value - entry) / entry * 100.0;

    position.last_value_sol = Some(value);
    position.last_check_ms = Some(chrono::Utc::now().timestamp_millis());
    let hwm = position
        .high_water_mark_percent
        .map_or(pnl_pct, |hwm| hwm.max(pnl_pct));
    position.high_water_mark_percent = Some(hwm);

    let trailing = config.trailing();

    if let Some(ts) = trailing {
        if hwm >= ts.activation_percent {
            let trail_level = hwm - ts.distance_percent;
            if pnl_pct <= trail_level {
                return Some(ExitTrigger {
                    reason: ExitReason::TrailingStop,
                    value_sol: value,
                    pnl_percent: pnl_pct,
                });
            }
        }
        if ts.hard_take_profit_percent > 0.0 && pnl_pct >= ts.hard_take_profit_percent {
            return Some(ExitTrigger {
                reason: ExitReason::TakeProfit,
                value_sol: value,
                pnl_percent: pnl_pct,
            });
        }
    } else if pnl_pct >= config.take_profit_percent {
        return Some(ExitTrigger {
            reason: ExitReason::TakeProfit,
            value_sol: value,
            pnl_percent: pnl_pct,
        });
    }

    // Stop-loss is always active
    if pnl_pct <= -config.stop_loss_percent {
        return Some(ExitTrigger {
            reason: ExitReason::StopLoss,
            value_sol: value,
            pnl_percent: pnl_pct,
        });
    }

    None
}

/// Events emitted by the live monitor
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// An exit rule fired; the sell is about to be attempted
    Trigger {
        mint: Pubkey,
        reason: ExitReason,
        value_sol: f64,
        pnl_percent: f64,
    },
    /// The sell confirmed and the position is closed
    SellComplete {
        mint: Pubkey,
        reason: ExitReason,
        sol_received: f64,
        pnl_percent: f64,
    },
}

/// Live position monitor: re-prices all open positions every tick with
/// one batch RPC and sells through the facade when an exit fires.
pub struct PositionMonitor {
    config: VariantConfig,
    rpc: Arc<dyn RpcFacade>,
    store: Arc<StateStore>,
    exposure: Option<Arc<crate::guard::ExposureGuard>>,
    positions: Arc<RwLock<BTreeMap<String, Position>>>,
    /// Per-mint single-flight guard for outgoing sells
    selling: Arc<Mutex<HashSet<String>>>,
    events: broadcast::Sender<MonitorEvent>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl PositionMonitor {
    pub fn new(config: VariantConfig, rpc: Arc<dyn RpcFacade>, store: Arc<StateStore>) -> Self {
        let (events, _) = broadcast::channel(64);
        let (shutdown, _) = broadcast::channel(1);
        Self {
            config,
            rpc,
            store,
            exposure: None,
            positions: Arc::new(RwLock::new(BTreeMap::new())),
            selling: Arc::new(Mutex::new(HashSet::new())),
            events,
            shutdown,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_exposure(mut self, guard: Arc<crate::guard::ExposureGuard>) -> Self {
        self.exposure = Some(guard);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub async fn add_position(&self, position: Position) -> Result<()> {
        if position.entry_amount_sol <= 0.0 {
            return Err(Error::PositionRejected(format!(
                "entry amount {} SOL is not positive",
                position.entry_amount_sol
            )));
        }

        let mint = position.mint.to_string();
        let mut positions = self.positions.write().await;
        if positions.contains_key(&mint) {
            return Err(Error::PositionRejected(format!(
                "position already open for {}",
                mint
            )));
        }
        positions.insert(mint.clone(), position);
        info!(mint = %mint, "position added to monitor");
        Ok(())
    }

    /// Remove a position without selling (external override)
    pub async fn remove_position(&self, mint: &Pubkey) -> Option<Position> {
        self.positions.write().await.remove(&mint.to_string())
    }

    pub async fn open_count(&self) -> usize {
        self.positions.read().await.len()
    }

    /// Start the tick loop
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("position monitor already running");
            return;
        }

        let monitor = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(monitor.config.price_check_interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!(
                interval_ms = monitor.config.price_check_interval_ms,
                "position monitor started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        monitor.tick().await;
                    }
                }
            }

            info!("position monitor stopped");
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown.send(());
    }

    /// One monitoring pass: batch fetch, serial evaluation, exits
    pub async fn tick(&self) {
        let targets: Vec<(String, Pubkey)> = {
            let positions = self.positions.read().await;
            positions
                .iter()
                .map(|(mint, p)| (mint.clone(), p.bonding_curve))
                .collect()
        };
        if targets.is_empty() {
            return;
        }

        let curves: Vec<Pubkey> = targets.iter().map(|(_, c)| *c).collect();
        let states = match self.rpc.batch_fetch_curve_states(&curves).await {
            Ok(states) => states,
            Err(e) => {
                warn!("curve batch fetch failed, pricing skipped this tick: {}", e);
                vec![None; targets.len()]
            }
        };

        // Serial evaluation in mint order; triggers collected first so
        // no RPC happens under the positions lock
        let mut triggers: Vec<(String, ExitTrigger)> = Vec::new();
        {
            let mut positions = self.positions.write().await;
            for ((mint, _), state) in targets.iter().zip(states.iter()) {
                let Some(position) = positions.get_mut(mint) else {
                    continue;
                };
                if let Some(trigger) = evaluate_exit(position, state.as_ref(), &self.config) {
                    triggers.push((mint.clone(), trigger));
                }
            }
        }

        for (mint, trigger) in triggers {
            self.execute_exit(&mint, trigger).await;
        }
    }

    async fn execute_exit(&self, mint: &str, trigger: ExitTrigger) {
        let mint_key: Pubkey = match mint.parse() {
            Ok(key) => key,
            Err(_) => return,
        };

        let _ = self.events.send(MonitorEvent::Trigger {
            mint: mint_key,
            reason: trigger.reason,
            value_sol: trigger.value_sol,
            pnl_percent: trigger.pnl_percent,
        });

        // A subscriber may have pulled the position on the trigger
        // event (manual intervention); abort if so
        let position = {
            let positions = self.positions.read().await;
            match positions.get(mint) {
                Some(p) => p.clone(),
                None => {
                    debug!(mint = %mint, "position removed by subscriber, exit aborted");
                    return;
                }
            }
        };

        // Single flight per mint: a slow sell must not be raced by the
        // next tick
        {
            let mut selling = self.selling.lock().expect("selling lock");
            if !selling.insert(mint.to_string()) {
                debug!(mint = %mint, "sell already in flight");
                return;
            }
        }

        let expected_lamports = sol_to_lamports(trigger.value_sol);
        let request = SellRequest {
            mint: mint_key,
            bonding_curve: position.bonding_curve,
            token_amount: position.token_amount,
            min_sol_out_lamports: min_sol_with_slippage(
                expected_lamports,
                percent_to_bps(self.config.sell_slippage_percent),
            ),
            slippage_bps: percent_to_bps(self.config.sell_slippage_percent),
            is_token_2022: position.is_token_2022.unwrap_or(false),
        };

        let result = self.rpc.submit_sell(&request).await;

        match result {
            Ok(outcome) if outcome.confirmed => {
                // Prefer the verified delivered amount over the quote
                let sol_received = outcome
                    .verified_out_lamports
                    .map(lamports_to_sol)
                    .unwrap_or(trigger.value_sol);
                let pnl_percent = (sol_received - position.entry_amount_sol)
                    / position.entry_amount_sol
                    * 100.0;

                if let Err(e) = self.store.close_position(mint, trigger.reason) {
                    error!(mint = %mint, "position close not persisted: {}", e);
                }
                if let Some(guard) = &self.exposure {
                    guard.release(position.entry_amount_sol).await;
                }
                self.positions.write().await.remove(mint);

                info!(
                    mint = %mint,
                    reason = %trigger.reason,
                    sol_received,
                    pnl_percent,
                    "position closed"
                );
                let _ = self.events.send(MonitorEvent::SellComplete {
                    mint: mint_key,
                    reason: trigger.reason,
                    sol_received,
                    pnl_percent,
                });
            }
            Ok(outcome) => {
                warn!(
                    mint = %mint,
                    error = outcome.error.as_deref().unwrap_or("unconfirmed"),
                    "sell not confirmed, will retry next tick"
                );
            }
            Err(e) => {
                warn!(mint = %mint, "sell submission failed, will retry next tick: {}", e);
            }
        }

        self.selling.lock().expect("selling lock").remove(mint);
    }
}
