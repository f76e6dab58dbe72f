//! Momentum gate
//!
//! Bounded polling over a curve's recent trade history: after an
//! initial settling delay, the gate re-checks buy counts up to
//! `max_checks` times and passes as soon as the threshold is met. Any
//! RPC failure ends the gate immediately; retries are the polling
//! structure itself.

use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::time::sleep;
use tracing::debug;

use crate::config::VariantConfig;
use crate::rpc::tx_scan::count_buys_sells;
use crate::rpc::RpcFacade;

/// Counts observed when the gate resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MomentumData {
    pub buy_count: u64,
    pub sell_count: u64,
    pub checks_performed: u32,
}

#[derive(Debug, Clone)]
pub enum MomentumVerdict {
    Pass(MomentumData),
    ThresholdNotMet(MomentumData),
    RpcFailed(String),
}

/// Run the momentum protocol against one bonding curve
pub async fn run(
    rpc: &dyn RpcFacade,
    curve: &Pubkey,
    config: &VariantConfig,
) -> MomentumVerdict {
    sleep(Duration::from_millis(config.momentum_initial_delay_ms)).await;

    let mut last = MomentumData {
        buy_count: 0,
        sell_count: 0,
        checks_performed: 0,
    };

    for check in 1..=config.momentum_max_checks {
        let counts = match count_buys_sells(rpc, curve).await {
            Ok(counts) => counts,
            Err(e) => return MomentumVerdict::RpcFailed(e.to_string()),
        };

        last = MomentumData {
            buy_count: counts.buys,
            sell_count: counts.sells,
            checks_performed: check,
        };

        debug!(
            curve = %curve,
            check,
            buys = counts.buys,
            needed = config.momentum_min_total_buys,
            "momentum check"
        );

        if counts.buys >= config.momentum_min_total_buys {
            return MomentumVerdict::Pass(last);
        }

        if check < config.momentum_max_checks {
            sleep(Duration::from_millis(config.momentum_recheck_interval_ms)).await;
        }
    }

    MomentumVerdict::ThresholdNotMet(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pump::program::DISCRIMINATORS;
    use crate::rpc::mock::{tx_with_instruction, MockRpc};
    use crate::rpc::SignatureInfo;

    fn buy_b58() -> String {
        let mut data = DISCRIMINATORS::BUY.to_vec();
        data.extend_from_slice(&[0u8; 16]);
        bs58::encode(data).into_string()
    }

    fn sell_b58() -> String {
        let mut data = DISCRIMINATORS::SELL.to_vec();
        data.extend_from_slice(&[0u8; 16]);
        bs58::encode(data).into_string()
    }

    fn config(min_buys: u64, max_checks: u32) -> VariantConfig {
        VariantConfig {
            momentum_min_total_buys: min_buys,
            momentum_max_checks: max_checks,
            momentum_initial_delay_ms: 100,
            momentum_recheck_interval_ms: 100,
            ..Default::default()
        }
    }

    /// Script a poll where the curve shows `buys` buys and `sells` sells
    fn script_poll(rpc: &MockRpc, curve: Pubkey, poll: usize, buys: usize, sells: usize) {
        let mut sigs = Vec::new();
        for i in 0..buys {
            let sig = format!("p{}buy{}", poll, i);
            sigs.push(SignatureInfo { signature: sig.clone(), slot: 100 });
            rpc.insert_tx(tx_with_instruction(&sig, 100, true, &buy_b58()));
        }
        for i in 0..sells {
            let sig = format!("p{}sell{}", poll, i);
            sigs.push(SignatureInfo { signature: sig.clone(), slot: 100 });
            rpc.insert_tx(tx_with_instruction(&sig, 100, true, &sell_b58()));
        }
        rpc.push_signatures(curve, sigs);
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_on_second_check() {
        let rpc = MockRpc::new();
        let curve = Pubkey::new_unique();

        script_poll(&rpc, curve, 1, 3, 0);
        script_poll(&rpc, curve, 2, 12, 1);

        let verdict = run(&rpc, &curve, &config(10, 3)).await;
        match verdict {
            MomentumVerdict::Pass(data) => {
                assert_eq!(data.buy_count, 12);
                assert_eq!(data.sell_count, 1);
                assert_eq!(data.checks_performed, 2);
            }
            other => panic!("expected pass, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_not_met_after_all_checks() {
        let rpc = MockRpc::new();
        let curve = Pubkey::new_unique();

        script_poll(&rpc, curve, 1, 2, 0);

        let verdict = run(&rpc, &curve, &config(10, 3)).await;
        match verdict {
            MomentumVerdict::ThresholdNotMet(data) => {
                assert_eq!(data.checks_performed, 3);
                assert_eq!(data.buy_count, 2);
            }
            other => panic!("expected threshold miss, got {:?}", other),
        }
        // Exactly one signature fetch per check
        assert_eq!(
            rpc.signature_calls.load(std::sync::atomic::Ordering::SeqCst),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rpc_failure_short_circuits() {
        let rpc = MockRpc::new();
        let curve = Pubkey::new_unique();
        rpc.fail_signature_fetches(true);

        let verdict = run(&rpc, &curve, &config(10, 5)).await;
        assert!(matches!(verdict, MomentumVerdict::RpcFailed(_)));
        // No retries beyond the failing poll
        assert_eq!(
            rpc.signature_calls.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_check_gate() {
        let rpc = MockRpc::new();
        let curve = Pubkey::new_unique();
        script_poll(&rpc, curve, 1, 10, 0);

        let verdict = run(&rpc, &curve, &config(10, 1)).await;
        assert!(matches!(verdict, MomentumVerdict::Pass(data) if data.checks_performed == 1));
    }
}
