//! Revert-driven escalation into sell-only mode
//!
//! Repeated on-chain reverts suggest the pool or token is in a state the
//! agent cannot trade through. After `failure_threshold` consecutive reverts
//! the agent stops buying and unwinds its target position for
//! `sell_only_iterations` cycles, then resumes normal trading.

use super::swap::{FailureClass, SwapOutcome};
use crate::config::RecoveryConfig;
use crate::tokens::Fraction;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Normal,
    SellOnly,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Normal => write!(f, "normal"),
            Mode::SellOnly => write!(f, "sell_only"),
        }
    }
}

/// Escalation parameters, both at least one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryParams {
    pub failure_threshold: u32,
    pub sell_only_iterations: u32,
}

impl From<RecoveryConfig> for RecoveryParams {
    fn from(config: RecoveryConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            sell_only_iterations: config.sell_only_iterations.max(1),
        }
    }
}

impl Default for RecoveryParams {
    fn default() -> Self {
        RecoveryConfig::default().into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryEvent {
    Success,
    RevertFailure,
    SellOnlyIterationConsumed { did_sell: bool },
}

/// Emitted when an event switches the mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    EnteredSellOnly { iterations: u32 },
    ResumedNormal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryState {
    pub mode: Mode,
    pub consecutive_failures: u32,
    pub sell_only_iterations_remaining: u32,
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self {
            mode: Mode::Normal,
            consecutive_failures: 0,
            sell_only_iterations_remaining: 0,
        }
    }
}

impl RecoveryState {
    /// The only place recovery state changes
    pub fn apply(&mut self, params: &RecoveryParams, event: RecoveryEvent) -> Option<ModeChange> {
        match event {
            RecoveryEvent::Success => {
                self.consecutive_failures = 0;
                None
            }
            RecoveryEvent::RevertFailure => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.mode == Mode::Normal
                    && self.consecutive_failures >= params.failure_threshold
                {
                    self.mode = Mode::SellOnly;
                    self.sell_only_iterations_remaining = params.sell_only_iterations;
                    self.consecutive_failures = 0;
                    return Some(ModeChange::EnteredSellOnly {
                        iterations: params.sell_only_iterations,
                    });
                }
                None
            }
            RecoveryEvent::SellOnlyIterationConsumed { .. } => {
                if self.mode != Mode::SellOnly {
                    return None;
                }
                self.sell_only_iterations_remaining =
                    self.sell_only_iterations_remaining.saturating_sub(1);
                if self.sell_only_iterations_remaining == 0 {
                    self.mode = Mode::Normal;
                    self.consecutive_failures = 0;
                    return Some(ModeChange::ResumedNormal);
                }
                None
            }
        }
    }
}

/// What the orchestrator may do this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingPolicy {
    pub attempt_buy: bool,
    /// Share of the target balance to sell back
    pub sell_fraction: Fraction,
}

#[derive(Debug, Default)]
pub struct RecoveryController {
    params: RecoveryParams,
    state: RecoveryState,
}

impl RecoveryController {
    pub fn new(params: RecoveryParams) -> Self {
        Self {
            params,
            state: RecoveryState::default(),
        }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn report_success(&mut self) {
        self.apply(RecoveryEvent::Success);
    }

    pub fn report_revert_failure(&mut self) {
        self.apply(RecoveryEvent::RevertFailure);
    }

    /// Called once at the end of every cycle that started in sell-only mode.
    /// The countdown advances whether or not anything was sold.
    pub fn consume_sell_only_iteration(&mut self, did_sell: bool) {
        self.apply(RecoveryEvent::SellOnlyIterationConsumed { did_sell });
    }

    pub fn current_policy(&self) -> TradingPolicy {
        match self.state.mode {
            Mode::Normal => TradingPolicy {
                attempt_buy: true,
                sell_fraction: Fraction::HALF,
            },
            Mode::SellOnly => TradingPolicy {
                attempt_buy: false,
                sell_fraction: Fraction::WHOLE,
            },
        }
    }

    /// Confirmed swaps reset the counter and reverts count toward escalation.
    /// Transport and precondition failures leave the state untouched.
    pub fn report_outcome(&mut self, outcome: &SwapOutcome) {
        match outcome.failure_class() {
            None => self.report_success(),
            Some(FailureClass::Revert) => self.report_revert_failure(),
            Some(FailureClass::Transport) | Some(FailureClass::Precondition) => {
                tracing::debug!(outcome = outcome.kind(), "Outcome not counted toward recovery");
            }
        }
    }

    fn apply(&mut self, event: RecoveryEvent) {
        let change = self.state.apply(&self.params, event);
        match change {
            Some(ModeChange::EnteredSellOnly { iterations }) => {
                tracing::warn!(
                    threshold = self.params.failure_threshold,
                    iterations,
                    "Consecutive reverts reached threshold, entering sell-only mode"
                );
            }
            Some(ModeChange::ResumedNormal) => {
                tracing::info!("Sell-only period finished, resuming normal trading");
            }
            None => {
                if let RecoveryEvent::RevertFailure = event {
                    tracing::warn!(
                        consecutive_failures = self.state.consecutive_failures,
                        threshold = self.params.failure_threshold,
                        mode = %self.state.mode,
                        "Revert recorded"
                    );
                }
                if let RecoveryEvent::SellOnlyIterationConsumed { did_sell } = event {
                    if self.state.mode == Mode::SellOnly {
                        tracing::info!(
                            remaining = self.state.sell_only_iterations_remaining,
                            did_sell,
                            "Sell-only iteration consumed"
                        );
                    }
                }
            }
        }
    }
}
