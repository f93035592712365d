//! `ChainClient` over an alloy HTTP provider
//!
//! SECURITY NOTE:
//! - The signer lives inside the provider's wallet filler; this module only
//!   ever sees the public address.

use super::contracts::IERC20;
use super::{
    BlockInfo, ChainClient, ChainError, ContractCall, GasCeiling, Receipt, TransferLog, TxHandle,
};
use crate::config::RpcConfig;
use crate::tokens::{Asset, TokenAmount};
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::primitives::Address;
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::rpc::json_rpc::ErrorPayload;
use alloy::rpc::types::{BlockNumberOrTag, TransactionReceipt, TransactionRequest};
use alloy::sol_types::decode_revert_reason;
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use std::time::Duration;

/// Production chain client bound to one RPC endpoint and one signer
#[derive(Clone)]
pub struct RpcChainClient {
    provider: DynProvider,
    signer: Address,
    confirmation_timeout: Duration,
}

impl RpcChainClient {
    /// Connect a signing provider to the configured endpoint
    pub fn connect(rpc: &RpcConfig, wallet: &SecureWallet) -> Result<Self> {
        let url = rpc.url()?;
        let provider = ProviderBuilder::new()
            .wallet(wallet.wallet().clone())
            .connect_http(url)
            .erased();

        Ok(Self {
            provider,
            signer: wallet.address(),
            confirmation_timeout: rpc.confirmation_timeout(),
        })
    }

    /// Connect a read-only provider; submissions will be rejected by the node
    pub fn connect_read_only(rpc: &RpcConfig, address: Address) -> Result<Self> {
        let url = rpc.url()?;
        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            provider,
            signer: address,
            confirmation_timeout: rpc.confirmation_timeout(),
        })
    }

    /// Fail fast when the endpoint serves a different chain than configured
    pub async fn verify_chain_id(&self, expected: u64) -> Result<()> {
        let actual = self
            .provider
            .get_chain_id()
            .await
            .map_err(|e| Error::Config(format!("Failed to read chain id: {}", e)))?;
        if actual != expected {
            return Err(Error::Config(format!(
                "RPC endpoint serves chain {} but chain {} is configured",
                actual, expected
            )));
        }
        Ok(())
    }

    /// Reverts are recognized from the JSON-RPC error object the node
    /// returned. Anything without one is a transport failure.
    fn classify(error: &RpcError<TransportErrorKind>) -> ChainError {
        match error.as_error_resp() {
            Some(payload) if is_revert(payload) => ChainError::revert(revert_reason(payload)),
            _ => ChainError::transport(error.to_string()),
        }
    }

    fn classify_call(error: &alloy::contract::Error) -> ChainError {
        match error {
            alloy::contract::Error::TransportError(e) => Self::classify(e),
            // Empty or undecodable return data from the contract itself
            other => ChainError::revert(other.to_string()),
        }
    }

    fn transfers(receipt: &TransactionReceipt) -> Vec<TransferLog> {
        receipt
            .inner
            .logs()
            .iter()
            .filter_map(|log| {
                let decoded = log.log_decode::<IERC20::Transfer>().ok()?;
                let event = decoded.inner.data;
                Some(TransferLog {
                    token: Asset::new(decoded.inner.address),
                    from: event.from,
                    to: event.to,
                    value: event.value,
                })
            })
            .collect()
    }

    /// Re-run a failed transaction as `eth_call` at its block to recover the
    /// revert reason. Best effort.
    async fn replay_revert_reason(&self, receipt: &TransactionReceipt) -> String {
        let Ok(Some(tx)) = self
            .provider
            .get_transaction_by_hash(receipt.transaction_hash)
            .await
        else {
            return "transaction execution reverted".to_string();
        };

        let Some(to) = receipt.to else {
            return "transaction execution reverted".to_string();
        };

        use alloy::consensus::Transaction as _;
        let request = TransactionRequest::default()
            .from(receipt.from)
            .to(to)
            .input(tx.input().clone().into());

        let block = receipt
            .block_number
            .map(BlockNumberOrTag::Number)
            .unwrap_or(BlockNumberOrTag::Latest);

        match self.provider.call(request).block(block.into()).await {
            Ok(_) => "transaction execution reverted".to_string(),
            Err(e) => match Self::classify(&e) {
                ChainError::Revert { reason } | ChainError::Transport { reason } => reason,
            },
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn signer(&self) -> Address {
        self.signer
    }

    async fn latest_block(&self) -> std::result::Result<Option<BlockInfo>, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| Self::classify(&e))?;

        Ok(block.map(|b| BlockInfo {
            number: b.header.number,
            gas_limit: b.header.gas_limit,
        }))
    }

    async fn balance_of(
        &self,
        token: Asset,
        owner: Address,
    ) -> std::result::Result<TokenAmount, ChainError> {
        IERC20::new(token.address(), self.provider.clone())
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| Self::classify_call(&e))
    }

    async fn allowance(
        &self,
        token: Asset,
        owner: Address,
        spender: Address,
    ) -> std::result::Result<TokenAmount, ChainError> {
        IERC20::new(token.address(), self.provider.clone())
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| Self::classify_call(&e))
    }

    async fn decimals(&self, token: Asset) -> std::result::Result<u8, ChainError> {
        IERC20::new(token.address(), self.provider.clone())
            .decimals()
            .call()
            .await
            .map_err(|e| Self::classify_call(&e))
    }

    async fn submit_transaction(
        &self,
        call: ContractCall,
        gas: GasCeiling,
    ) -> std::result::Result<TxHandle, ChainError> {
        let tx = TransactionRequest::default()
            .from(self.signer)
            .to(call.to)
            .input(call.data.into())
            .gas_limit(gas.units());

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| Self::classify(&e))?;

        tracing::debug!(tx_hash = %pending.tx_hash(), gas = gas.units(), "Transaction submitted");
        Ok(TxHandle {
            tx_hash: *pending.tx_hash(),
        })
    }

    async fn wait_for_confirmation(
        &self,
        handle: TxHandle,
    ) -> std::result::Result<Receipt, ChainError> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), handle.tx_hash)
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
            .map_err(|e| ChainError::transport(e.to_string()))?;

        if !receipt.status() {
            let reason = self.replay_revert_reason(&receipt).await;
            return Err(ChainError::revert(reason));
        }

        Ok(Receipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            transfers: Self::transfers(&receipt),
        })
    }
}

/// JSON-RPC error code geth-style nodes use for reverted calls
const EXECUTION_REVERTED_CODE: i64 = 3;

fn is_revert(payload: &ErrorPayload) -> bool {
    payload.code == EXECUTION_REVERTED_CODE
        || payload.as_revert_data().is_some()
        || payload.message.starts_with("execution reverted")
}

/// Decoded `Error(string)` / `Panic(uint256)` data when present, otherwise the
/// reason embedded in the node's message
fn revert_reason(payload: &ErrorPayload) -> String {
    if let Some(data) = payload.as_revert_data() {
        if let Some(reason) = decode_revert_reason(&data) {
            return reason;
        }
        if !data.is_empty() {
            return format!("Reverted with data: {}", data);
        }
    }
    parse_revert_reason(&payload.message)
}

/// Reason text from a node message such as `execution reverted: STF`
pub(crate) fn parse_revert_reason(message: &str) -> String {
    if let Some(start) = message.find("revert: ") {
        let reason = &message[start + 8..];
        return reason.split('"').next().unwrap_or(reason).to_string();
    }
    match message.strip_prefix("execution reverted: ") {
        Some(reason) if !reason.trim().is_empty() => reason.trim().to_string(),
        _ => message.to_string(),
    }
}
