//! In-memory chain used by unit tests
//!
//! Keeps ERC-20 balances and allowances, applies approvals and swaps on
//! confirmation, and can be scripted to fail reads, submissions or
//! confirmations.

use super::contracts::{IERC20, ISwapRouter};
use super::*;
use alloy::primitives::{address, B256, U256};
use alloy::sol_types::SolCall;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

pub(crate) const SIGNER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
pub(crate) const ROUTER: Address = address!("4e2960a8cd19b467b82d26d83facb0fae26b094d");
pub(crate) const POOL: Address = address!("00000000000000000000000000000000000000aa");
pub(crate) const BASE: Asset = Asset::new(address!("5555555555555555555555555555555555555555"));
pub(crate) const TARGET: Asset = Asset::new(address!("dd493377c2ac801639439dcc1c3c95474aec6a40"));

#[derive(Debug, Clone)]
pub(crate) struct SubmittedTx {
    pub call: ContractCall,
    pub gas: GasCeiling,
}

#[derive(Debug)]
pub(crate) struct MockState {
    pub block: Result<Option<BlockInfo>, ChainError>,
    pub balances: HashMap<(Asset, Address), U256>,
    pub allowances: HashMap<(Asset, Address, Address), U256>,
    pub decimals: HashMap<Asset, u8>,
    /// Fails every balance read while set
    pub balance_error: Option<ChainError>,
    /// Fails every allowance read while set
    pub allowance_error: Option<ChainError>,
    /// Consumed one per submission
    pub submit_failures: VecDeque<ChainError>,
    /// Consumed one per approval confirmation
    pub approve_failures: VecDeque<ChainError>,
    /// Consumed one per swap confirmation
    pub swap_failures: VecDeque<ChainError>,
    /// Output units credited per input unit on a successful swap
    pub swap_rate: u64,
    pub submitted: Vec<SubmittedTx>,
    pending: HashMap<B256, ContractCall>,
    nonce: u64,
}

pub(crate) struct MockChain {
    signer: Address,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            signer: SIGNER,
            state: Mutex::new(MockState {
                block: Ok(Some(BlockInfo {
                    number: 1,
                    gas_limit: 30_000_000,
                })),
                balances: HashMap::new(),
                allowances: HashMap::new(),
                decimals: HashMap::new(),
                balance_error: None,
                allowance_error: None,
                submit_failures: VecDeque::new(),
                approve_failures: VecDeque::new(),
                swap_failures: VecDeque::new(),
                swap_rate: 2,
                submitted: Vec::new(),
                pending: HashMap::new(),
                nonce: 0,
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn with_balance(self, token: Asset, amount: u64) -> Self {
        self.set_balance(token, U256::from(amount));
        self
    }

    pub fn with_allowance(self, token: Asset, spender: Address, amount: u64) -> Self {
        self.state()
            .allowances
            .insert((token, self.signer, spender), U256::from(amount));
        self
    }

    pub fn set_balance(&self, token: Asset, amount: U256) {
        let signer = self.signer;
        self.state().balances.insert((token, signer), amount);
    }

    pub fn balance(&self, token: Asset) -> U256 {
        self.state()
            .balances
            .get(&(token, self.signer))
            .copied()
            .unwrap_or_default()
    }

    pub fn allowance_of(&self, token: Asset, spender: Address) -> U256 {
        self.state()
            .allowances
            .get(&(token, self.signer, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn fail_next_swaps(&self, errors: impl IntoIterator<Item = ChainError>) {
        self.state().swap_failures.extend(errors);
    }

    pub fn submitted(&self) -> Vec<SubmittedTx> {
        self.state().submitted.clone()
    }

    pub fn approvals(&self) -> Vec<IERC20::approveCall> {
        self.submitted()
            .iter()
            .filter_map(|tx| IERC20::approveCall::abi_decode(&tx.call.data).ok())
            .collect()
    }

    pub fn swaps(&self) -> Vec<ISwapRouter::ExactInputSingleParams> {
        self.submitted()
            .iter()
            .filter_map(|tx| ISwapRouter::exactInputSingleCall::abi_decode(&tx.call.data).ok())
            .map(|call| call.params)
            .collect()
    }

    fn confirm_approve(
        state: &mut MockState,
        signer: Address,
        token: Address,
        call: IERC20::approveCall,
    ) -> Result<Vec<TransferLog>, ChainError> {
        if let Some(err) = state.approve_failures.pop_front() {
            return Err(err);
        }
        state
            .allowances
            .insert((Asset::new(token), signer, call.spender), call.amount);
        Ok(Vec::new())
    }

    fn confirm_swap(
        state: &mut MockState,
        signer: Address,
        router: Address,
        params: ISwapRouter::ExactInputSingleParams,
    ) -> Result<Vec<TransferLog>, ChainError> {
        if let Some(err) = state.swap_failures.pop_front() {
            return Err(err);
        }
        let asset_in = Asset::new(params.tokenIn);
        let asset_out = Asset::new(params.tokenOut);

        let allowance = state
            .allowances
            .get(&(asset_in, signer, router))
            .copied()
            .unwrap_or_default();
        if allowance < params.amountIn {
            return Err(ChainError::revert("STF"));
        }
        let balance_in = state
            .balances
            .get(&(asset_in, signer))
            .copied()
            .unwrap_or_default();
        if balance_in < params.amountIn {
            return Err(ChainError::revert("STF"));
        }

        let amount_out = params.amountIn * U256::from(state.swap_rate);
        if amount_out < params.amountOutMinimum {
            return Err(ChainError::revert("Too little received"));
        }

        state
            .balances
            .insert((asset_in, signer), balance_in - params.amountIn);
        let balance_out = state.balances.entry((asset_out, params.recipient)).or_default();
        *balance_out += amount_out;

        Ok(vec![
            TransferLog {
                token: asset_in,
                from: signer,
                to: POOL,
                value: params.amountIn,
            },
            TransferLog {
                token: asset_out,
                from: POOL,
                to: params.recipient,
                value: amount_out,
            },
        ])
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn signer(&self) -> Address {
        self.signer
    }

    async fn latest_block(&self) -> Result<Option<BlockInfo>, ChainError> {
        self.state().block.clone()
    }

    async fn balance_of(&self, token: Asset, owner: Address) -> Result<TokenAmount, ChainError> {
        let state = self.state();
        if let Some(err) = &state.balance_error {
            return Err(err.clone());
        }
        Ok(state
            .balances
            .get(&(token, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn allowance(
        &self,
        token: Asset,
        owner: Address,
        spender: Address,
    ) -> Result<TokenAmount, ChainError> {
        let state = self.state();
        if let Some(err) = &state.allowance_error {
            return Err(err.clone());
        }
        Ok(state
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn decimals(&self, token: Asset) -> Result<u8, ChainError> {
        self.state()
            .decimals
            .get(&token)
            .copied()
            .ok_or_else(|| ChainError::revert("decimals() not implemented"))
    }

    async fn submit_transaction(
        &self,
        call: ContractCall,
        gas: GasCeiling,
    ) -> Result<TxHandle, ChainError> {
        let mut state = self.state();
        state.submitted.push(SubmittedTx {
            call: call.clone(),
            gas,
        });
        if let Some(err) = state.submit_failures.pop_front() {
            return Err(err);
        }
        state.nonce += 1;
        let tx_hash = B256::left_padding_from(&state.nonce.to_be_bytes());
        state.pending.insert(tx_hash, call);
        Ok(TxHandle { tx_hash })
    }

    async fn wait_for_confirmation(&self, handle: TxHandle) -> Result<Receipt, ChainError> {
        let signer = self.signer;
        let mut state = self.state();
        let call = state
            .pending
            .remove(&handle.tx_hash)
            .ok_or_else(|| ChainError::transport("unknown transaction"))?;

        let transfers = if let Ok(approve) = IERC20::approveCall::abi_decode(&call.data) {
            Self::confirm_approve(&mut state, signer, call.to, approve)?
        } else if let Ok(swap) = ISwapRouter::exactInputSingleCall::abi_decode(&call.data) {
            Self::confirm_swap(&mut state, signer, call.to, swap.params)?
        } else {
            return Err(ChainError::revert("unknown selector"));
        };

        Ok(Receipt {
            tx_hash: handle.tx_hash,
            block_number: Some(state.nonce),
            gas_used: 100_000,
            transfers,
        })
    }
}
