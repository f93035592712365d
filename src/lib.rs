//! Swap Cycler
//!
//! An agent that repeatedly buys a target token with a base token on a
//! Uniswap-V3-style router and sells part of the position back, adapting to
//! on-chain failures without human intervention:
//! - Gas ceilings are derived from the latest block, with a fixed fallback
//! - The router is approved only when the current allowance falls short
//! - Every swap attempt yields a classified outcome
//! - Repeated reverts switch the agent into a temporary sell-only mode
//!
//! # Security Model
//!
//! - Private keys never leave the wallet module
//! - Nothing is submitted when the balance cannot cover a swap
//! - Optional JSONL journal of every swap attempt

pub mod audit;
pub mod chain;
pub mod config;
pub mod engine;
pub mod runner;
pub mod tokens;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use chain::{ChainClient, ChainError, RpcChainClient};
pub use config::{Config, RpcConfig};
pub use engine::{Mode, RecoveryController, SwapExecutor, SwapOutcome};
pub use error::{Error, Result};
pub use runner::{CycleReport, CycleRunner, RunSummary};
