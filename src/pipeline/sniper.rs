//! Sniper gate
//!
//! Polls a curve's trade history and classifies every buying wallet as
//! sniper (bought within `slot_threshold` slots of curve creation) or
//! organic. A wallet tagged sniper can only move to exited, never back
//! to organic. The gate admits once enough snipers have left and enough
//! organic buyers remain; in log-only mode it runs every check for data
//! collection and always passes.

use std::collections::HashMap;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::time::sleep;
use tracing::debug;

use crate::config::SniperGateConfig;
use crate::pump::TradeSide;
use crate::rpc::tx_scan::scan_trades_oldest_first;
use crate::rpc::RpcFacade;
use crate::store::ab::SniperObservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalletState {
    Sniper,
    SniperExited,
    Organic,
}

#[derive(Debug, Clone)]
pub enum SniperVerdict {
    Pass,
    /// Snipers still present under the exit threshold
    Timeout,
    /// Snipers cleared but organic interest never materialised
    LowOrganic,
    RpcFailed(String),
}

/// Gate result plus every per-poll snapshot, retained for persistence
/// even on rejection
#[derive(Debug, Clone)]
pub struct SniperOutcome {
    pub verdict: SniperVerdict,
    pub observations: Vec<SniperObservation>,
}

#[derive(Default)]
struct WalletTracker {
    wallets: HashMap<Pubkey, WalletState>,
    total_buys: u64,
    total_sells: u64,
}

impl WalletTracker {
    fn record_buy(&mut self, payer: Pubkey, tx_slot: u64, creation_slot: u64, threshold: u64) {
        self.total_buys += 1;
        self.wallets.entry(payer).or_insert_with(|| {
            if tx_slot.saturating_sub(creation_slot) <= threshold {
                WalletState::Sniper
            } else {
                WalletState::Organic
            }
        });
    }

    fn record_sell(&mut self, payer: Pubkey) {
        self.total_sells += 1;
        if let Some(state) = self.wallets.get_mut(&payer) {
            if *state == WalletState::Sniper {
                *state = WalletState::SniperExited;
            }
        }
    }

    fn snipers(&self) -> u64 {
        self.wallets
            .values()
            .filter(|s| matches!(s, WalletState::Sniper | WalletState::SniperExited))
            .count() as u64
    }

    fn exited(&self) -> u64 {
        self.wallets
            .values()
            .filter(|s| matches!(s, WalletState::SniperExited))
            .count() as u64
    }

    fn organic(&self) -> u64 {
        self.wallets
            .values()
            .filter(|s| matches!(s, WalletState::Organic))
            .count() as u64
    }

    fn bot_exit_percent(&self) -> f64 {
        let snipers = self.snipers();
        if snipers == 0 {
            return 0.0;
        }
        self.exited() as f64 / snipers as f64 * 100.0
    }

    fn sniper_wallets(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .wallets
            .iter()
            .filter(|(_, s)| matches!(s, WalletState::Sniper | WalletState::SniperExited))
            .map(|(w, _)| w.to_string())
            .collect();
        out.sort();
        out
    }
}

fn pass_conditions_met(tracker: &WalletTracker, config: &SniperGateConfig) -> bool {
    let snipers_clear =
        tracker.snipers() == 0 || tracker.bot_exit_percent() >= config.min_bot_exit_percent;
    snipers_clear && tracker.organic() >= config.min_organic_buyers as u64
}

/// Run the sniper protocol against one bonding curve.
///
/// `creation_slot` comes from the detection event; when the source did
/// not carry a slot the first observed trade's slot stands in for it.
pub async fn run(
    rpc: &dyn RpcFacade,
    curve: &Pubkey,
    creation_slot: u64,
    config: &SniperGateConfig,
) -> SniperOutcome {
    sleep(Duration::from_millis(config.initial_delay_ms)).await;

    let mut tracker = WalletTracker::default();
    let mut observations = Vec::with_capacity(config.max_checks as usize);
    let mut creation_slot = creation_slot;

    for check in 1..=config.max_checks {
        let trades = match scan_trades_oldest_first(rpc, curve).await {
            Ok(trades) => trades,
            Err(e) => {
                return SniperOutcome {
                    verdict: SniperVerdict::RpcFailed(e.to_string()),
                    observations,
                }
            }
        };

        if creation_slot == 0 {
            creation_slot = trades.iter().map(|t| t.slot).min().unwrap_or(0);
        }

        // Each poll re-reads the whole window; the tracker dedups by
        // wallet, so replayed buys only bump the raw counters
        tracker.total_buys = 0;
        tracker.total_sells = 0;
        for trade in &trades {
            match trade.side {
                TradeSide::Buy => tracker.record_buy(
                    trade.fee_payer,
                    trade.slot,
                    creation_slot,
                    config.slot_threshold,
                ),
                TradeSide::Sell => tracker.record_sell(trade.fee_payer),
            }
        }

        let met = pass_conditions_met(&tracker, config);
        observations.push(SniperObservation {
            check_number: check,
            bot_count: tracker.snipers(),
            bot_exit_count: tracker.exited(),
            organic_count: tracker.organic(),
            total_buys: tracker.total_buys,
            total_sells: tracker.total_sells,
            unique_buyers: tracker.wallets.len() as u64,
            pass_conditions_met: met,
            sniper_wallets: tracker.sniper_wallets(),
            observed_at_ms: chrono::Utc::now().timestamp_millis(),
        });

        debug!(
            curve = %curve,
            check,
            snipers = tracker.snipers(),
            exited = tracker.exited(),
            organic = tracker.organic(),
            met,
            "sniper check"
        );

        // Log-only mode collects every snapshot and never short-circuits
        if met && !config.log_only {
            return SniperOutcome {
                verdict: SniperVerdict::Pass,
                observations,
            };
        }

        if check < config.max_checks {
            sleep(Duration::from_millis(config.recheck_interval_ms)).await;
        }
    }

    let verdict = if config.log_only {
        SniperVerdict::Pass
    } else if tracker.snipers() > 0 && tracker.bot_exit_percent() < config.min_bot_exit_percent {
        SniperVerdict::Timeout
    } else {
        SniperVerdict::LowOrganic
    };

    SniperOutcome {
        verdict,
        observations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pump::program::DISCRIMINATORS;
    use crate::rpc::mock::{tx_with_payer, MockRpc};
    use crate::rpc::SignatureInfo;

    fn buy_b58() -> String {
        let mut data = DISCRIMINATORS::BUY.to_vec();
        data.extend_from_slice(&[0u8; 8]);
        bs58::encode(data).into_string()
    }

    fn sell_b58() -> String {
        let mut data = DISCRIMINATORS::SELL.to_vec();
        data.extend_from_slice(&[0u8; 8]);
        bs58::encode(data).into_string()
    }

    fn config(max_checks: u32, log_only: bool) -> SniperGateConfig {
        SniperGateConfig {
            enabled: true,
            slot_threshold: 3,
            min_bot_exit_percent: 50.0,
            min_organic_buyers: 2,
            initial_delay_ms: 50,
            recheck_interval_ms: 50,
            max_checks,
            log_only,
        }
    }

    /// One poll: newest-first signature list plus backing transactions
    fn script_poll(rpc: &MockRpc, curve: Pubkey, txs: Vec<crate::rpc::ParsedTx>) {
        let mut sigs: Vec<SignatureInfo> = txs
            .iter()
            .map(|tx| SignatureInfo {
                signature: tx.signature.clone(),
                slot: tx.slot,
            })
            .collect();
        sigs.reverse(); // newest first, as the RPC returns it
        for tx in txs {
            rpc.insert_tx(tx.clone());
        }
        rpc.push_signatures(curve, sigs);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_delta_classification() {
        let rpc = MockRpc::new();
        let curve = Pubkey::new_unique();
        let sniper = Pubkey::new_unique();
        let organic_a = Pubkey::new_unique();
        let organic_b = Pubkey::new_unique();

        // Creation at slot 100. Sniper buys at slot 101 (delta 1) and
        // again at 150 (already tagged, stays sniper), then sells.
        // Two organic wallets buy late.
        script_poll(
            &rpc,
            curve,
            vec![
                tx_with_payer("t1", 101, true, &buy_b58(), sniper),
                tx_with_payer("t2", 150, true, &buy_b58(), sniper),
                tx_with_payer("t3", 160, true, &buy_b58(), organic_a),
                tx_with_payer("t4", 170, true, &buy_b58(), organic_b),
                tx_with_payer("t5", 180, true, &sell_b58(), sniper),
            ],
        );

        let outcome = run(&rpc, &curve, 100, &config(1, false)).await;
        assert!(matches!(outcome.verdict, SniperVerdict::Pass));

        let obs = &outcome.observations[0];
        assert_eq!(obs.bot_count, 1);
        assert_eq!(obs.bot_exit_count, 1);
        assert_eq!(obs.organic_count, 2);
        assert_eq!(obs.unique_buyers, 3);
        assert_eq!(obs.sniper_wallets, vec![sniper.to_string()]);
        assert!(obs.pass_conditions_met);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_snipers_hold() {
        let rpc = MockRpc::new();
        let curve = Pubkey::new_unique();
        let sniper_a = Pubkey::new_unique();
        let sniper_b = Pubkey::new_unique();

        // Two snipers, neither exits; organic buyers are plentiful
        script_poll(
            &rpc,
            curve,
            vec![
                tx_with_payer("t1", 100, true, &buy_b58(), sniper_a),
                tx_with_payer("t2", 101, true, &buy_b58(), sniper_b),
                tx_with_payer("t3", 200, true, &buy_b58(), Pubkey::new_unique()),
                tx_with_payer("t4", 201, true, &buy_b58(), Pubkey::new_unique()),
            ],
        );

        let outcome = run(&rpc, &curve, 100, &config(2, false)).await;
        assert!(matches!(outcome.verdict, SniperVerdict::Timeout));
        assert_eq!(outcome.observations.len(), 2);
        assert!(!outcome.observations[1].pass_conditions_met);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_organic_rejection() {
        let rpc = MockRpc::new();
        let curve = Pubkey::new_unique();

        // No snipers at all, but only one organic buyer (need 2)
        script_poll(
            &rpc,
            curve,
            vec![tx_with_payer("t1", 200, true, &buy_b58(), Pubkey::new_unique())],
        );

        let outcome = run(&rpc, &curve, 100, &config(2, false)).await;
        assert!(matches!(outcome.verdict, SniperVerdict::LowOrganic));
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_only_runs_full_loop_and_passes() {
        let rpc = MockRpc::new();
        let curve = Pubkey::new_unique();

        // Conditions are met immediately, but log-only must still run
        // all five checks and pass at the end
        script_poll(
            &rpc,
            curve,
            vec![
                tx_with_payer("t1", 200, true, &buy_b58(), Pubkey::new_unique()),
                tx_with_payer("t2", 201, true, &buy_b58(), Pubkey::new_unique()),
            ],
        );

        let outcome = run(&rpc, &curve, 100, &config(5, true)).await;
        assert!(matches!(outcome.verdict, SniperVerdict::Pass));
        assert_eq!(outcome.observations.len(), 5);
        assert!(outcome.observations.iter().all(|o| o.pass_conditions_met));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exited_sniper_never_rebecomes_organic() {
        let rpc = MockRpc::new();
        let curve = Pubkey::new_unique();
        let wallet = Pubkey::new_unique();

        // Buys at delta 1, sells, then buys again far from creation.
        // The late re-buy must not reclassify the wallet as organic.
        script_poll(
            &rpc,
            curve,
            vec![
                tx_with_payer("t1", 101, true, &buy_b58(), wallet),
                tx_with_payer("t2", 120, true, &sell_b58(), wallet),
                tx_with_payer("t3", 500, true, &buy_b58(), wallet),
            ],
        );

        let outcome = run(&rpc, &curve, 100, &config(1, false)).await;
        let obs = &outcome.observations[0];
        assert_eq!(obs.bot_count, 1);
        assert_eq!(obs.bot_exit_count, 1);
        assert_eq!(obs.organic_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rpc_failure() {
        let rpc = MockRpc::new();
        let curve = Pubkey::new_unique();
        rpc.fail_signature_fetches(true);

        let outcome = run(&rpc, &curve, 100, &config(3, false)).await;
        assert!(matches!(outcome.verdict, SniperVerdict::RpcFailed(_)));
        assert!(outcome.observations.is_empty());
    }
}
