//! Single-pool exact-input swaps with classified outcomes

use super::allowance::{AllowanceGate, ApprovalError};
use crate::chain::contracts::{self, ExactInputSingle};
use crate::chain::{ChainClient, ChainError, GasCeiling};
use crate::tokens::{Asset, TokenAmount};
use alloy::primitives::{Address, TxHash};
use serde::Serialize;

/// One swap to attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRequest {
    pub asset_in: Asset,
    pub asset_out: Asset,
    pub amount_in: TokenAmount,
    /// Slippage floor; zero accepts any price
    pub min_amount_out: TokenAmount,
    /// Unix timestamp (seconds) after which the router rejects the swap
    pub deadline: u64,
}

impl SwapRequest {
    /// Local preconditions, checked before any network I/O
    pub fn validate(&self, now: u64) -> Result<(), String> {
        if self.amount_in.is_zero() {
            return Err("amount_in must be positive".to_string());
        }
        if self.deadline <= now {
            return Err(format!(
                "deadline {} is not in the future (now {})",
                self.deadline, now
            ));
        }
        if self.asset_in == self.asset_out {
            return Err("asset_in and asset_out must differ".to_string());
        }
        Ok(())
    }
}

/// How an attempt ended. The orchestrator and the recovery controller react
/// to the kind, never to provider error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    Confirmed {
        amount_out: TokenAmount,
        tx_hash: TxHash,
        gas_used: u64,
    },
    Reverted {
        reason: String,
    },
    TransportFailure {
        reason: String,
    },
    /// Balance below `amount_in`; nothing was submitted
    InsufficientBalance {
        required: TokenAmount,
        available: TokenAmount,
    },
    /// Request failed local validation; nothing was submitted
    Rejected {
        reason: String,
    },
}

/// Failure classes used for escalation decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Rejected by contract logic; counts toward sell-only escalation
    Revert,
    /// RPC unreachable or timed out
    Transport,
    /// Local precondition failed before submission
    Precondition,
}

impl SwapOutcome {
    /// `None` for a confirmed swap
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            SwapOutcome::Confirmed { .. } => None,
            SwapOutcome::Reverted { .. } => Some(FailureClass::Revert),
            SwapOutcome::TransportFailure { .. } => Some(FailureClass::Transport),
            SwapOutcome::InsufficientBalance { .. } | SwapOutcome::Rejected { .. } => {
                Some(FailureClass::Precondition)
            }
        }
    }

    /// Short label for logs and the trade journal
    pub fn kind(&self) -> &'static str {
        match self {
            SwapOutcome::Confirmed { .. } => "confirmed",
            SwapOutcome::Reverted { .. } => "reverted",
            SwapOutcome::TransportFailure { .. } => "transport_failure",
            SwapOutcome::InsufficientBalance { .. } => "insufficient_balance",
            SwapOutcome::Rejected { .. } => "rejected",
        }
    }
}

impl From<ChainError> for SwapOutcome {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Revert { reason } => SwapOutcome::Reverted { reason },
            ChainError::Transport { reason } => SwapOutcome::TransportFailure { reason },
        }
    }
}

impl From<ApprovalError> for SwapOutcome {
    fn from(err: ApprovalError) -> Self {
        match err {
            ApprovalError::Reverted(_) => SwapOutcome::Reverted {
                reason: err.to_string(),
            },
            ApprovalError::Transport(_) => SwapOutcome::TransportFailure {
                reason: err.to_string(),
            },
        }
    }
}

/// Submits swaps through one router with one fee tier
#[derive(Debug, Clone, Copy)]
pub struct SwapExecutor {
    router: Address,
    fee_tier: u32,
    gate: AllowanceGate,
}

impl SwapExecutor {
    pub fn new(router: Address, fee_tier: u32, gate: AllowanceGate) -> Self {
        Self {
            router,
            fee_tier,
            gate,
        }
    }

    /// Execute one swap. Never submits anything when the balance of
    /// `asset_in` is below `amount_in`.
    pub async fn execute(
        &self,
        chain: &dyn ChainClient,
        request: &SwapRequest,
        gas: GasCeiling,
    ) -> SwapOutcome {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.execute_at(chain, request, gas, now).await
    }

    async fn execute_at(
        &self,
        chain: &dyn ChainClient,
        request: &SwapRequest,
        gas: GasCeiling,
        now: u64,
    ) -> SwapOutcome {
        if let Err(reason) = request.validate(now) {
            tracing::warn!(reason = %reason, "Swap request rejected");
            return SwapOutcome::Rejected { reason };
        }

        let signer = chain.signer();
        let available = match chain.balance_of(request.asset_in, signer).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(token = %request.asset_in, error = %e, "Balance check failed");
                return e.into();
            }
        };
        if available < request.amount_in {
            tracing::warn!(
                token = %request.asset_in,
                required = %request.amount_in,
                available = %available,
                "Insufficient balance, swap not submitted"
            );
            return SwapOutcome::InsufficientBalance {
                required: request.amount_in,
                available,
            };
        }

        if let Err(e) = self
            .gate
            .ensure(chain, request.asset_in, signer, self.router, request.amount_in)
            .await
        {
            tracing::error!(token = %request.asset_in, error = %e, "Approval failed");
            return e.into();
        }

        let call = contracts::exact_input_single_call(
            self.router,
            &ExactInputSingle {
                asset_in: request.asset_in,
                asset_out: request.asset_out,
                fee_tier: self.fee_tier,
                recipient: signer,
                deadline: request.deadline,
                amount_in: request.amount_in,
                min_amount_out: request.min_amount_out,
            },
        );

        tracing::info!(
            asset_in = %request.asset_in,
            asset_out = %request.asset_out,
            amount_in = %request.amount_in,
            min_amount_out = %request.min_amount_out,
            gas = gas.units(),
            "Submitting swap"
        );

        let handle = match chain.submit_transaction(call, gas).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "Swap submission failed");
                return e.into();
            }
        };

        match chain.wait_for_confirmation(handle).await {
            Ok(receipt) => {
                let amount_out = receipt.received(request.asset_out, signer);
                tracing::info!(
                    tx_hash = %receipt.tx_hash,
                    amount_out = %amount_out,
                    gas_used = receipt.gas_used,
                    "Swap confirmed"
                );
                SwapOutcome::Confirmed {
                    amount_out,
                    tx_hash: receipt.tx_hash,
                    gas_used: receipt.gas_used,
                }
            }
            Err(e) => {
                tracing::error!(tx_hash = %handle.tx_hash, error = %e, "Swap failed");
                e.into()
            }
        }
    }
}
