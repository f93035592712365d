//! Spender authorization before token transfers

use super::gas::GasBudgetEstimator;
use crate::chain::{contracts, ChainClient, ChainError};
use crate::config::ApprovalPolicy;
use crate::tokens::{Asset, TokenAmount};
use alloy::primitives::{Address, TxHash};
use thiserror::Error;

/// Snapshot of an allowance, read fresh for every decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowanceState {
    pub owner: Address,
    pub spender: Address,
    pub token: Asset,
    pub current_allowance: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// No transaction was needed
    AlreadySufficient { current: TokenAmount },
    /// One approval transaction was confirmed
    Approved { amount: TokenAmount, tx_hash: TxHash },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("approval reverted: {0}")]
    Reverted(String),

    #[error("approval transport failure: {0}")]
    Transport(String),
}

impl From<ChainError> for ApprovalError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Revert { reason } => ApprovalError::Reverted(reason),
            ChainError::Transport { reason } => ApprovalError::Transport(reason),
        }
    }
}

/// Makes sure the router may pull the tokens a swap is about to spend
#[derive(Debug, Clone, Copy)]
pub struct AllowanceGate {
    policy: ApprovalPolicy,
    estimator: GasBudgetEstimator,
}

impl AllowanceGate {
    pub fn new(policy: ApprovalPolicy, estimator: GasBudgetEstimator) -> Self {
        Self { policy, estimator }
    }

    pub async fn read(
        &self,
        chain: &dyn ChainClient,
        token: Asset,
        owner: Address,
        spender: Address,
    ) -> Result<AllowanceState, ApprovalError> {
        let current_allowance = chain.allowance(token, owner, spender).await?;
        Ok(AllowanceState {
            owner,
            spender,
            token,
            current_allowance,
        })
    }

    /// Approve `spender` for `token` unless the current allowance already
    /// covers `required`. Waits for the approval to confirm.
    pub async fn ensure(
        &self,
        chain: &dyn ChainClient,
        token: Asset,
        owner: Address,
        spender: Address,
        required: TokenAmount,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let state = self.read(chain, token, owner, spender).await?;

        if state.current_allowance >= required {
            tracing::debug!(
                token = %token,
                current = %state.current_allowance,
                required = %required,
                "Allowance already sufficient"
            );
            return Ok(ApprovalOutcome::AlreadySufficient {
                current: state.current_allowance,
            });
        }

        let amount = self.policy.approval_amount(required);
        let budget = self.estimator.estimate(chain).await;
        let gas = self.estimator.approval_ceiling(&budget);

        tracing::info!(
            token = %token,
            spender = %spender,
            current = %state.current_allowance,
            required = %required,
            policy = ?self.policy,
            gas = gas.units(),
            "Approving router"
        );

        let call = contracts::approve_call(token, spender, amount);
        let handle = chain.submit_transaction(call, gas).await?;
        let receipt = chain.wait_for_confirmation(handle).await?;

        tracing::info!(tx_hash = %receipt.tx_hash, "Approval confirmed");
        Ok(ApprovalOutcome::Approved {
            amount,
            tx_hash: receipt.tx_hash,
        })
    }
}
