//! Live RpcFacade implementation over a Solana RPC node

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, UiInstruction, UiMessage,
    UiParsedInstruction, UiTransactionEncoding,
};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pump::{CurveState, MintInfo, TokenProgram};
use crate::rpc::{
    ParsedTx, RawInstruction, RpcFacade, SellRequest, SignatureInfo, SubmitOutcome,
};

/// Pluggable sell execution. The monitor only needs submit-and-confirm;
/// the actual transaction builder (standard, bundled, or fallback)
/// lives behind this seam.
#[async_trait]
pub trait SellExecutor: Send + Sync {
    async fn execute_sell(&self, request: &SellRequest) -> Result<SubmitOutcome>;
}

/// RpcFacade backed by a Solana JSON-RPC endpoint
pub struct SolanaRpc {
    client: Arc<RpcClient>,
    executor: Option<Arc<dyn SellExecutor>>,
}

impl SolanaRpc {
    pub fn new(endpoint: &str, timeout_ms: u64) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(
            endpoint.to_string(),
            Duration::from_millis(timeout_ms),
            CommitmentConfig::confirmed(),
        );
        Self {
            client: Arc::new(client),
            executor: None,
        }
    }

    /// Wire in a sell executor for live trading
    pub fn with_executor(mut self, executor: Arc<dyn SellExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    fn decode_curve(data: &[u8], address: &Pubkey) -> Option<CurveState> {
        match CurveState::try_from_account_data(data) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(curve = %address, error = %e, "undecodable bonding curve account");
                None
            }
        }
    }
}

fn raw_from_ui(ix: &UiInstruction) -> Option<RawInstruction> {
    // Venue instructions have no registered parser, so they always come
    // back partially decoded with base58 data intact.
    if let UiInstruction::Parsed(UiParsedInstruction::PartiallyDecoded(pd)) = ix {
        let program_id = Pubkey::from_str(&pd.program_id).ok()?;
        Some(RawInstruction {
            program_id,
            data_b58: pd.data.clone(),
        })
    } else {
        None
    }
}

fn parse_encoded_tx(
    signature: &str,
    encoded: &EncodedConfirmedTransactionWithStatusMeta,
) -> Option<ParsedTx> {
    let EncodedTransaction::Json(ui_tx) = &encoded.transaction.transaction else {
        return None;
    };
    let UiMessage::Parsed(message) = &ui_tx.message else {
        return None;
    };

    let fee_payer = message
        .account_keys
        .iter()
        .find(|key| key.signer)
        .and_then(|key| Pubkey::from_str(&key.pubkey).ok());

    let meta = encoded.transaction.meta.as_ref();
    let success = meta.map(|m| m.err.is_none()).unwrap_or(false);

    let instructions: Vec<RawInstruction> =
        message.instructions.iter().filter_map(raw_from_ui).collect();

    let inner_instructions: Vec<RawInstruction> = match meta.map(|m| &m.inner_instructions) {
        Some(OptionSerializer::Some(inner)) => inner
            .iter()
            .flat_map(|set| set.instructions.iter())
            .filter_map(raw_from_ui)
            .collect(),
        _ => Vec::new(),
    };

    Some(ParsedTx {
        signature: signature.to_string(),
        slot: encoded.slot,
        fee_payer,
        success,
        instructions,
        inner_instructions,
    })
}

#[async_trait]
impl RpcFacade for SolanaRpc {
    async fn fetch_curve_state(&self, curve: &Pubkey) -> Result<Option<CurveState>> {
        let response = self
            .client
            .get_account_with_commitment(curve, CommitmentConfig::confirmed())
            .await?;

        Ok(response
            .value
            .and_then(|account| Self::decode_curve(&account.data, curve)))
    }

    async fn batch_fetch_curve_states(
        &self,
        curves: &[Pubkey],
    ) -> Result<Vec<Option<CurveState>>> {
        if curves.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get_multiple_accounts_with_commitment(curves, CommitmentConfig::confirmed())
            .await?;

        Ok(response
            .value
            .iter()
            .zip(curves)
            .map(|(account, address)| {
                account
                    .as_ref()
                    .and_then(|acc| Self::decode_curve(&acc.data, address))
            })
            .collect())
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(limit),
            commitment: Some(CommitmentConfig::confirmed()),
        };

        let statuses = self
            .client
            .get_signatures_for_address_with_config(address, config)
            .await?;

        Ok(statuses
            .into_iter()
            .map(|s| SignatureInfo {
                signature: s.signature,
                slot: s.slot,
            })
            .collect())
    }

    async fn get_parsed_transactions(
        &self,
        signatures: &[String],
    ) -> Result<Vec<Option<ParsedTx>>> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        let fetches = signatures.iter().map(|sig_str| {
            let client = Arc::clone(&self.client);
            let config = config.clone();
            async move {
                let sig = Signature::from_str(sig_str).ok()?;
                match client.get_transaction_with_config(&sig, config).await {
                    Ok(encoded) => parse_encoded_tx(sig_str, &encoded),
                    Err(e) => {
                        debug!(signature = %sig_str, error = %e, "transaction fetch failed");
                        None
                    }
                }
            }
        });

        Ok(futures::future::join_all(fetches).await)
    }

    async fn get_mint_info(
        &self,
        mint: &Pubkey,
        program: TokenProgram,
    ) -> Result<Option<MintInfo>> {
        let response = self
            .client
            .get_account_with_commitment(mint, CommitmentConfig::confirmed())
            .await?;

        let Some(account) = response.value else {
            return Ok(None);
        };
        if account.owner != program.id() {
            return Ok(None);
        }

        let info = MintInfo::parse(&account.data, program == TokenProgram::Token2022)?;
        Ok(Some(info))
    }

    async fn get_balance(&self, wallet: &Pubkey) -> Result<u64> {
        Ok(self.client.get_balance(wallet).await?)
    }

    async fn submit_sell(&self, request: &SellRequest) -> Result<SubmitOutcome> {
        match &self.executor {
            Some(executor) => executor.execute_sell(request).await,
            None => Err(Error::SellSubmit(
                "no transaction executor configured".to_string(),
            )),
        }
    }
}
