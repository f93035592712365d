//! Router and token ABIs plus calldata builders

use super::ContractCall;
use crate::tokens::{Asset, TokenAmount};
use alloy::primitives::aliases::{U160, U24};
use alloy::primitives::Address;
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function decimals() external view returns (uint8);
    }

    #[sol(rpc)]
    interface ISwapRouter {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
    }
}

/// `approve(spender, amount)` on `token`
pub fn approve_call(token: Asset, spender: Address, amount: TokenAmount) -> ContractCall {
    let data = IERC20::approveCall { spender, amount }.abi_encode();
    ContractCall {
        to: token.address(),
        data: data.into(),
    }
}

/// Arguments of a single-pool exact-input swap
#[derive(Debug, Clone, Copy)]
pub struct ExactInputSingle {
    pub asset_in: Asset,
    pub asset_out: Asset,
    pub fee_tier: u32,
    pub recipient: Address,
    pub deadline: u64,
    pub amount_in: TokenAmount,
    pub min_amount_out: TokenAmount,
}

/// `exactInputSingle(params)` on `router`, with no price limit
pub fn exact_input_single_call(router: Address, swap: &ExactInputSingle) -> ContractCall {
    let params = ISwapRouter::ExactInputSingleParams {
        tokenIn: swap.asset_in.address(),
        tokenOut: swap.asset_out.address(),
        fee: U24::from(swap.fee_tier),
        recipient: swap.recipient,
        deadline: TokenAmount::from(swap.deadline),
        amountIn: swap.amount_in,
        amountOutMinimum: swap.min_amount_out,
        sqrtPriceLimitX96: U160::ZERO,
    };
    let data = ISwapRouter::exactInputSingleCall { params }.abi_encode();
    ContractCall {
        to: router,
        data: data.into(),
    }
}
