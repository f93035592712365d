//! Chain access capability
//!
//! Everything the agent reads from or writes to the chain goes through
//! [`ChainClient`]. The production implementation lives in [`rpc`]; tests use
//! an in-memory double.

pub mod contracts;
mod rpc;

#[cfg(test)]
pub(crate) mod mock;

pub use rpc::RpcChainClient;

use crate::tokens::{Asset, TokenAmount};
use alloy::primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Failure of a single chain interaction.
///
/// The split mirrors how the agent reacts: a revert is a trading signal, a
/// transport failure is environmental noise.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("execution reverted: {reason}")]
    Revert { reason: String },

    #[error("transport failure: {reason}")]
    Transport { reason: String },
}

impl ChainError {
    pub fn revert(reason: impl Into<String>) -> Self {
        Self::Revert {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// Header fields of the latest block the agent cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    /// Zero when the node did not report a gas limit
    pub gas_limit: u64,
}

/// Upper bound on gas units for one transaction (always positive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GasCeiling(u64);

impl GasCeiling {
    pub fn new(units: u64) -> Option<Self> {
        (units > 0).then_some(Self(units))
    }

    /// For constants; a zero argument fails const evaluation
    pub(crate) const fn const_new(units: u64) -> Self {
        assert!(units > 0, "gas ceiling must be positive");
        Self(units)
    }

    pub fn units(&self) -> u64 {
        self.0
    }

    pub fn min(self, other: GasCeiling) -> GasCeiling {
        if other.0 < self.0 {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for GasCeiling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoded contract call ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub data: Bytes,
}

/// Handle of a submitted, not yet confirmed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle {
    pub tx_hash: TxHash,
}

/// ERC-20 `Transfer` event emitted inside a confirmed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLog {
    pub token: Asset,
    pub from: Address,
    pub to: Address,
    pub value: TokenAmount,
}

/// Receipt of a successfully executed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub transfers: Vec<TransferLog>,
}

impl Receipt {
    /// Total amount of `token` transferred to `recipient` in this transaction
    pub fn received(&self, token: Asset, recipient: Address) -> TokenAmount {
        self.transfers
            .iter()
            .filter(|t| t.token == token && t.to == recipient)
            .fold(TokenAmount::ZERO, |acc, t| acc.saturating_add(t.value))
    }
}

/// On-chain reads and writes used by the trading engine
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address that signs every submitted transaction
    fn signer(&self) -> Address;

    /// Latest block, or `None` when the node has none to report
    async fn latest_block(&self) -> Result<Option<BlockInfo>, ChainError>;

    async fn balance_of(&self, token: Asset, owner: Address) -> Result<TokenAmount, ChainError>;

    async fn allowance(
        &self,
        token: Asset,
        owner: Address,
        spender: Address,
    ) -> Result<TokenAmount, ChainError>;

    async fn decimals(&self, token: Asset) -> Result<u8, ChainError>;

    async fn submit_transaction(
        &self,
        call: ContractCall,
        gas: GasCeiling,
    ) -> Result<TxHandle, ChainError>;

    /// Waits for the receipt. A receipt with a failed status is reported as
    /// [`ChainError::Revert`].
    async fn wait_for_confirmation(&self, handle: TxHandle) -> Result<Receipt, ChainError>;
}

/// Decimals of `token`, falling back to 18 when the token does not answer
pub async fn decimals_or_default(chain: &dyn ChainClient, token: Asset) -> u8 {
    match chain.decimals(token).await {
        Ok(decimals) => decimals,
        Err(e) => {
            tracing::debug!(
                token = %token,
                error = %e,
                default = crate::tokens::DEFAULT_DECIMALS,
                "Could not read token decimals, using default"
            );
            crate::tokens::DEFAULT_DECIMALS
        }
    }
}
