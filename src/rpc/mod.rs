//! Narrow RPC interface the core depends on
//!
//! Everything venue-specific behind this trait is replaceable: the live
//! implementation talks to a Solana RPC node, the mock replays scripted
//! responses for tests. The pipeline, gates, and monitors only ever see
//! this surface.

pub mod mock;
pub mod solana;
pub mod tx_scan;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::error::Result;
use crate::pump::{CurveState, MintInfo, TokenProgram};

pub use mock::MockRpc;
pub use solana::SolanaRpc;

/// One entry of a signatures-for-address response, newest first
#[derive(Debug, Clone)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
}

/// An instruction as seen in a parsed transaction: the owning program
/// and the raw data still base58-encoded
#[derive(Debug, Clone)]
pub struct RawInstruction {
    pub program_id: Pubkey,
    pub data_b58: String,
}

/// A parsed transaction reduced to what classification needs
#[derive(Debug, Clone)]
pub struct ParsedTx {
    pub signature: String,
    pub slot: u64,
    /// First signer; absent for transactions we could not decode
    pub fee_payer: Option<Pubkey>,
    /// False when the transaction errored on chain
    pub success: bool,
    /// Outer instructions in order
    pub instructions: Vec<RawInstruction>,
    /// Inner (CPI) instructions, flattened in order
    pub inner_instructions: Vec<RawInstruction>,
}

impl ParsedTx {
    /// Outer followed by inner instructions
    pub fn all_instructions(&self) -> impl Iterator<Item = &RawInstruction> {
        self.instructions.iter().chain(self.inner_instructions.iter())
    }
}

/// A sell to submit through whatever executor is wired in
#[derive(Debug, Clone)]
pub struct SellRequest {
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub token_amount: u64,
    pub min_sol_out_lamports: u64,
    pub slippage_bps: u32,
    pub is_token_2022: bool,
}

/// Result of a submit-and-confirm round trip
#[derive(Debug, Clone, Default)]
pub struct SubmitOutcome {
    pub confirmed: bool,
    pub signature: Option<String>,
    /// Actual lamports delivered, when the confirmation could verify it
    pub verified_out_lamports: Option<u64>,
    pub slippage_percent: Option<f64>,
    pub error: Option<String>,
}

/// The capabilities the core requires from an RPC provider
#[async_trait]
pub trait RpcFacade: Send + Sync {
    /// Fetch and decode one bonding curve account. `None` when the
    /// account does not exist.
    async fn fetch_curve_state(&self, curve: &Pubkey) -> Result<Option<CurveState>>;

    /// Fetch many curve accounts in one call. The response has the same
    /// length and order as the request.
    async fn batch_fetch_curve_states(&self, curves: &[Pubkey]) -> Result<Vec<Option<CurveState>>>;

    /// Recent signatures for an address, newest first, confirmed
    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>>;

    /// Parsed transactions for a batch of signatures; positional, `None`
    /// for transactions that could not be fetched
    async fn get_parsed_transactions(&self, signatures: &[String]) -> Result<Vec<Option<ParsedTx>>>;

    /// Mint account info under a specific token program. `None` when the
    /// mint is not owned by that program or does not exist.
    async fn get_mint_info(&self, mint: &Pubkey, program: TokenProgram)
        -> Result<Option<MintInfo>>;

    /// Wallet balance in lamports
    async fn get_balance(&self, wallet: &Pubkey) -> Result<u64>;

    /// Submit a sell and wait for confirmation
    async fn submit_sell(&self, request: &SellRequest) -> Result<SubmitOutcome>;
}

/// Fetch mint info trying Token-2022 first, then classic SPL.
///
/// Pump.fun launches both flavours; the 2022 probe goes first because a
/// 2022 mint will never be owned by the classic program.
pub async fn fetch_mint_info_any(
    rpc: &dyn RpcFacade,
    mint: &Pubkey,
) -> Result<Option<MintInfo>> {
    if let Some(info) = rpc.get_mint_info(mint, TokenProgram::Token2022).await? {
        return Ok(Some(info));
    }
    rpc.get_mint_info(mint, TokenProgram::Spl).await
}
