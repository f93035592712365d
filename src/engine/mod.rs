//! Adaptive execution engine
//!
//! Gas budgeting, spender authorization, swap execution and the recovery
//! state machine. The orchestrator in [`crate::runner`] wires them together.

pub mod allowance;
pub mod gas;
pub mod recovery;
pub mod swap;

pub use allowance::{AllowanceGate, AllowanceState, ApprovalError, ApprovalOutcome};
pub use gas::{GasBudget, GasBudgetEstimator, GasSource};
pub use recovery::{
    Mode, ModeChange, RecoveryController, RecoveryEvent, RecoveryParams, RecoveryState,
    TradingPolicy,
};
pub use swap::{FailureClass, SwapExecutor, SwapOutcome, SwapRequest};
