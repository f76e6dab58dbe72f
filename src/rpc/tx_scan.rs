//! Buy/sell extraction from recent transaction history
//!
//! Both polling gates reduce an address's recent history to classified
//! pump.fun trades: fetch signatures, fetch the parsed transactions in
//! one batch, then walk outer and inner instructions keeping only those
//! that target the venue program with a payload of at least 8 bytes.

use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::error::Result;
use crate::pump::program::{classify_base58_data, PUMP_PROGRAM_ID};
use crate::pump::TradeSide;
use crate::rpc::{ParsedTx, RpcFacade};

/// Signatures fetched per gate poll
pub const SCAN_SIGNATURE_LIMIT: usize = 100;

/// Aggregate buy/sell counts over a scan window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeCounts {
    pub buys: u64,
    pub sells: u64,
}

impl TradeCounts {
    pub fn total(&self) -> u64 {
        self.buys + self.sells
    }
}

/// One classified trade with the context the sniper gate needs
#[derive(Debug, Clone)]
pub struct TradeObservation {
    pub side: TradeSide,
    pub fee_payer: Pubkey,
    pub slot: u64,
}

/// Classify every venue instruction of one transaction
fn classify_tx(tx: &ParsedTx) -> Vec<TradeSide> {
    tx.all_instructions()
        .filter(|ix| ix.program_id == *PUMP_PROGRAM_ID)
        .filter_map(|ix| classify_base58_data(&ix.data_b58))
        .collect()
}

/// Count buys and sells in the recent history of a bonding curve
pub async fn count_buys_sells(rpc: &dyn RpcFacade, curve: &Pubkey) -> Result<TradeCounts> {
    let signatures = rpc
        .get_signatures_for_address(curve, SCAN_SIGNATURE_LIMIT)
        .await?;

    if signatures.is_empty() {
        return Ok(TradeCounts::default());
    }

    let sigs: Vec<String> = signatures.iter().map(|s| s.signature.clone()).collect();
    let txs = rpc.get_parsed_transactions(&sigs).await?;

    let mut counts = TradeCounts::default();
    for tx in txs.iter().flatten() {
        if !tx.success {
            continue;
        }
        for side in classify_tx(tx) {
            match side {
                TradeSide::Buy => counts.buys += 1,
                TradeSide::Sell => counts.sells += 1,
            }
        }
    }

    debug!(
        curve = %curve,
        buys = counts.buys,
        sells = counts.sells,
        "scanned recent curve history"
    );

    Ok(counts)
}

/// Collect classified trades for a curve, oldest first.
///
/// The signatures endpoint returns newest first; the sniper gate wants
/// to replay history in causal order, so the window is reversed before
/// the transaction fetch.
pub async fn scan_trades_oldest_first(
    rpc: &dyn RpcFacade,
    curve: &Pubkey,
) -> Result<Vec<TradeObservation>> {
    let mut signatures = rpc
        .get_signatures_for_address(curve, SCAN_SIGNATURE_LIMIT)
        .await?;
    signatures.reverse();

    if signatures.is_empty() {
        return Ok(Vec::new());
    }

    let sigs: Vec<String> = signatures.iter().map(|s| s.signature.clone()).collect();
    let txs = rpc.get_parsed_transactions(&sigs).await?;

    let mut observations = Vec::new();
    for tx in txs.iter().flatten() {
        if !tx.success {
            continue;
        }
        let Some(payer) = tx.fee_payer else {
            continue;
        };
        for side in classify_tx(tx) {
            observations.push(TradeObservation {
                side,
                fee_payer: payer,
                slot: tx.slot,
            });
        }
    }

    Ok(observations)
}
