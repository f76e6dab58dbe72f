//! Scripted RPC double for tests and dry runs
//!
//! Responses are queued per address: each fetch consumes the next
//! scripted value, and the last value sticks so steady-state polling
//! keeps observing it. Error injection flips whole capability groups
//! into transient failures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;

use crate::error::{Error, Result};
use crate::pump::program::PUMP_PROGRAM_ID;
use crate::pump::{CurveState, MintInfo, TokenProgram};
use crate::rpc::{
    ParsedTx, RawInstruction, RpcFacade, SellRequest, SignatureInfo, SubmitOutcome,
};

#[derive(Default)]
pub struct MockRpc {
    curve_states: DashMap<Pubkey, VecDeque<Option<CurveState>>>,
    signatures: DashMap<Pubkey, VecDeque<Vec<SignatureInfo>>>,
    txs: DashMap<String, ParsedTx>,
    mints: DashMap<(Pubkey, TokenProgram), MintInfo>,
    balances: DashMap<Pubkey, u64>,
    sell_outcomes: Mutex<VecDeque<SubmitOutcome>>,
    submitted_sells: Mutex<Vec<SellRequest>>,

    fail_curve_fetch: AtomicBool,
    fail_signatures: AtomicBool,

    pub curve_fetch_calls: AtomicUsize,
    pub signature_calls: AtomicUsize,
}

impl MockRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next curve state observed for an address. The final
    /// queued value repeats forever.
    pub fn push_curve_state(&self, curve: Pubkey, state: Option<CurveState>) {
        self.curve_states.entry(curve).or_default().push_back(state);
    }

    /// Replace any queued states with a single persistent one
    pub fn set_curve_state(&self, curve: Pubkey, state: Option<CurveState>) {
        let mut queue = VecDeque::new();
        queue.push_back(state);
        self.curve_states.insert(curve, queue);
    }

    /// Queue one poll's worth of signatures for an address
    pub fn push_signatures(&self, address: Pubkey, sigs: Vec<SignatureInfo>) {
        self.signatures.entry(address).or_default().push_back(sigs);
    }

    pub fn insert_tx(&self, tx: ParsedTx) {
        self.txs.insert(tx.signature.clone(), tx);
    }

    pub fn set_mint_info(&self, mint: Pubkey, program: TokenProgram, info: MintInfo) {
        self.mints.insert((mint, program), info);
    }

    pub fn set_balance(&self, wallet: Pubkey, lamports: u64) {
        self.balances.insert(wallet, lamports);
    }

    pub fn push_sell_outcome(&self, outcome: SubmitOutcome) {
        self.sell_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn submitted_sells(&self) -> Vec<SellRequest> {
        self.submitted_sells.lock().unwrap().clone()
    }

    pub fn fail_curve_fetches(&self, fail: bool) {
        self.fail_curve_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_signature_fetches(&self, fail: bool) {
        self.fail_signatures.store(fail, Ordering::SeqCst);
    }

    fn next_curve_state(&self, curve: &Pubkey) -> Option<CurveState> {
        let mut entry = self.curve_states.get_mut(curve)?;
        if entry.len() > 1 {
            entry.pop_front().flatten()
        } else {
            entry.front().cloned().flatten()
        }
    }
}

#[async_trait]
impl RpcFacade for MockRpc {
    async fn fetch_curve_state(&self, curve: &Pubkey) -> Result<Option<CurveState>> {
        self.curve_fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_curve_fetch.load(Ordering::SeqCst) {
            return Err(Error::Rpc("scripted curve fetch failure".to_string()));
        }
        Ok(self.next_curve_state(curve))
    }

    async fn batch_fetch_curve_states(
        &self,
        curves: &[Pubkey],
    ) -> Result<Vec<Option<CurveState>>> {
        self.curve_fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_curve_fetch.load(Ordering::SeqCst) {
            return Err(Error::Rpc("scripted batch fetch failure".to_string()));
        }
        Ok(curves.iter().map(|c| self.next_curve_state(c)).collect())
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>> {
        self.signature_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_signatures.load(Ordering::SeqCst) {
            return Err(Error::Rpc("scripted signature fetch failure".to_string()));
        }
        let Some(mut entry) = self.signatures.get_mut(address) else {
            return Ok(Vec::new());
        };
        let batch = if entry.len() > 1 {
            entry.pop_front().unwrap_or_default()
        } else {
            entry.front().cloned().unwrap_or_default()
        };
        Ok(batch.into_iter().take(limit).collect())
    }

    async fn get_parsed_transactions(
        &self,
        signatures: &[String],
    ) -> Result<Vec<Option<ParsedTx>>> {
        Ok(signatures
            .iter()
            .map(|sig| self.txs.get(sig).map(|tx| tx.clone()))
            .collect())
    }

    async fn get_mint_info(
        &self,
        mint: &Pubkey,
        program: TokenProgram,
    ) -> Result<Option<MintInfo>> {
        Ok(self.mints.get(&(*mint, program)).map(|m| m.clone()))
    }

    async fn get_balance(&self, wallet: &Pubkey) -> Result<u64> {
        Ok(self.balances.get(wallet).map(|b| *b).unwrap_or(0))
    }

    async fn submit_sell(&self, request: &SellRequest) -> Result<SubmitOutcome> {
        self.submitted_sells.lock().unwrap().push(request.clone());
        let scripted = self.sell_outcomes.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or(SubmitOutcome {
            confirmed: true,
            signature: Some(format!("mock-sell-{}", request.mint)),
            verified_out_lamports: Some(request.min_sol_out_lamports),
            slippage_percent: None,
            error: None,
        }))
    }
}

/// A successful single-instruction venue transaction with a fresh payer
pub fn tx_with_instruction(signature: &str, slot: u64, success: bool, data_b58: &str) -> ParsedTx {
    tx_with_payer(signature, slot, success, data_b58, Pubkey::new_unique())
}

/// Same, with an explicit fee payer (sniper classification tests)
pub fn tx_with_payer(
    signature: &str,
    slot: u64,
    success: bool,
    data_b58: &str,
    payer: Pubkey,
) -> ParsedTx {
    ParsedTx {
        signature: signature.to_string(),
        slot,
        fee_payer: Some(payer),
        success,
        instructions: vec![RawInstruction {
            program_id: *PUMP_PROGRAM_ID,
            data_b58: data_b58.to_string(),
        }],
        inner_instructions: Vec::new(),
    }
}
