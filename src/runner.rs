//! Trading loop
//!
//! Each cycle buys a fixed notional of the target token (unless recovery
//! forbids it) and sells a share of the target balance back. Every outcome is
//! reported to the [`RecoveryController`], which decides the next cycle's
//! policy.

use crate::audit::{self, Direction, TradeJournal};
use crate::chain::{decimals_or_default, ChainClient};
use crate::config::{Config, SlippagePolicy};
use crate::engine::{
    AllowanceGate, GasBudgetEstimator, Mode, RecoveryController, RecoveryParams, RecoveryState,
    SwapExecutor, SwapOutcome, SwapRequest, TradingPolicy,
};
use crate::tokens::{format_units, parse_units, Asset, TokenAmount, DEFAULT_DECIMALS};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

/// What happened in one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub mode_at_start: Mode,
    /// Zero when no buy was attempted
    pub buy_amount: TokenAmount,
    /// `None` when the buy was skipped or in dry-run mode
    pub buy: Option<SwapOutcome>,
    /// Zero when no sell was attempted
    pub sell_amount: TokenAmount,
    pub sell: Option<SwapOutcome>,
    pub mode_at_end: Mode,
}

impl CycleReport {
    fn new(cycle: u64, mode: Mode) -> Self {
        Self {
            cycle,
            mode_at_start: mode,
            buy_amount: TokenAmount::ZERO,
            buy: None,
            sell_amount: TokenAmount::ZERO,
            sell: None,
            mode_at_end: mode,
        }
    }

    /// A sell was attempted this cycle, whatever its outcome
    pub fn did_sell(&self) -> bool {
        self.sell.is_some()
    }
}

/// Totals over a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub cycles: u64,
    pub confirmed: u64,
    pub reverted: u64,
    pub final_state: RecoveryState,
}

pub struct CycleRunner {
    chain: Arc<dyn ChainClient>,
    executor: SwapExecutor,
    estimator: GasBudgetEstimator,
    recovery: RecoveryController,
    journal: Option<TradeJournal>,
    base: Asset,
    target: Asset,
    base_decimals: u8,
    target_decimals: u8,
    /// Buy size in smallest units of the base token
    notional: TokenAmount,
    slippage: SlippagePolicy,
    deadline_secs: u64,
    check_interval: Duration,
    settle_delay: Duration,
    dry_run: bool,
    cycles: u64,
}

impl CycleRunner {
    /// Build a runner from configuration, converting the trade notional with
    /// the base token's on-chain decimals.
    pub async fn from_config(chain: Arc<dyn ChainClient>, config: &Config) -> Result<Self> {
        let trading = &config.trading;
        let base_decimals = decimals_or_default(chain.as_ref(), trading.base_token).await;
        let target_decimals = decimals_or_default(chain.as_ref(), trading.target_token).await;
        let notional = parse_units(&trading.trade_notional, base_decimals)?;

        let mut runner = Self::new(chain, config, notional);
        runner.base_decimals = base_decimals;
        runner.target_decimals = target_decimals;
        Ok(runner)
    }

    pub fn new(chain: Arc<dyn ChainClient>, config: &Config, notional: TokenAmount) -> Self {
        let trading = &config.trading;
        let estimator = GasBudgetEstimator::new(config.gas);
        let gate = AllowanceGate::new(trading.approval, estimator);

        Self {
            chain,
            executor: SwapExecutor::new(trading.router, trading.fee_tier, gate),
            estimator,
            recovery: RecoveryController::new(RecoveryParams::from(config.recovery)),
            journal: audit::open(config.audit_log_path.as_deref()),
            base: trading.base_token,
            target: trading.target_token,
            base_decimals: DEFAULT_DECIMALS,
            target_decimals: DEFAULT_DECIMALS,
            notional,
            slippage: trading.slippage.clone(),
            deadline_secs: trading.deadline_secs,
            check_interval: Duration::from_millis(config.check_interval_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            dry_run: false,
            cycles: 0,
        }
    }

    /// Log intended trades instead of submitting them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn recovery_state(&self) -> RecoveryState {
        self.recovery.state()
    }

    pub fn notional(&self) -> TokenAmount {
        self.notional
    }

    /// Run cycles until `stop` turns true, its sender is dropped, or
    /// `max_cycles` cycles have completed. Failed cycles never end the loop.
    pub async fn run(
        &mut self,
        mut stop: watch::Receiver<bool>,
        max_cycles: Option<u64>,
    ) -> RunSummary {
        let mut summary = RunSummary {
            cycles: 0,
            confirmed: 0,
            reverted: 0,
            final_state: self.recovery.state(),
        };

        info!(
            base = %self.base,
            target = %self.target,
            notional = %format_units(self.notional, self.base_decimals),
            max_cycles = ?max_cycles,
            dry_run = self.dry_run,
            "Starting trading loop"
        );

        let limit_reached = |cycles: u64| max_cycles.is_some_and(|max| cycles >= max);

        loop {
            if *stop.borrow() {
                info!("Stop requested");
                break;
            }
            if limit_reached(summary.cycles) {
                info!(cycles = summary.cycles, "Cycle limit reached");
                break;
            }

            let report = self.run_cycle().await;
            summary.cycles += 1;
            for outcome in [&report.buy, &report.sell].into_iter().flatten() {
                match outcome {
                    SwapOutcome::Confirmed { .. } => summary.confirmed += 1,
                    SwapOutcome::Reverted { .. } => summary.reverted += 1,
                    _ => {}
                }
            }

            if limit_reached(summary.cycles) {
                info!(cycles = summary.cycles, "Cycle limit reached");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        info!("Stop signal sender dropped");
                        break;
                    }
                }
            }
        }

        summary.final_state = self.recovery.state();
        info!(
            cycles = summary.cycles,
            confirmed = summary.confirmed,
            reverted = summary.reverted,
            mode = %summary.final_state.mode,
            "Trading loop stopped"
        );
        summary
    }

    /// One buy/sell cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        let span = tracing::info_span!("cycle", n = self.cycles, mode = %self.recovery.mode());
        self.cycle().instrument(span).await
    }

    async fn cycle(&mut self) -> CycleReport {
        let policy = self.recovery.current_policy();
        let mut report = CycleReport::new(self.cycles, self.recovery.mode());
        debug!(
            attempt_buy = policy.attempt_buy,
            sell_fraction = %policy.sell_fraction,
            "Cycle started"
        );

        if policy.attempt_buy {
            if let Some(amount) = self.buy_amount().await {
                report.buy_amount = amount;
                let request = self.request(
                    self.base,
                    self.target,
                    amount,
                    self.slippage.buy_min_out(),
                );
                report.buy = self.swap(Direction::Buy, &request, report.mode_at_start).await;
                tokio::time::sleep(self.settle_delay).await;
            }
        } else {
            debug!("Buying disabled in sell-only mode");
        }

        if let Some(amount) = self.sell_amount(&policy).await {
            report.sell_amount = amount;
            let request = self.request(
                self.target,
                self.base,
                amount,
                self.slippage.sell_min_out(),
            );
            report.sell = self.swap(Direction::Sell, &request, report.mode_at_start).await;
        }

        if report.mode_at_start == Mode::SellOnly {
            self.recovery.consume_sell_only_iteration(report.did_sell());
        }

        report.mode_at_end = self.recovery.mode();
        report
    }

    /// `min(notional, base balance)`, or `None` when there is nothing to buy with
    async fn buy_amount(&self) -> Option<TokenAmount> {
        let signer = self.chain.signer();
        let balance = match self.chain.balance_of(self.base, signer).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(token = %self.base, error = %e, "Failed to read base balance, skipping buy");
                return None;
            }
        };
        info!(
            token = %self.base,
            balance = %format_units(balance, self.base_decimals),
            "Base balance"
        );

        let amount = self.notional.min(balance);
        if amount.is_zero() {
            info!("No base balance to buy with, skipping buy");
            return None;
        }
        Some(amount)
    }

    /// Policy share of the target balance, or `None` when it rounds to zero
    async fn sell_amount(&self, policy: &TradingPolicy) -> Option<TokenAmount> {
        let signer = self.chain.signer();
        let balance = match self.chain.balance_of(self.target, signer).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(token = %self.target, error = %e, "Failed to read target balance, skipping sell");
                return None;
            }
        };
        info!(
            token = %self.target,
            balance = %format_units(balance, self.target_decimals),
            "Target balance"
        );

        let amount = sell_amount(policy, balance);
        if amount.is_zero() {
            debug!("Nothing to sell");
            return None;
        }
        Some(amount)
    }

    fn request(
        &self,
        asset_in: Asset,
        asset_out: Asset,
        amount_in: TokenAmount,
        min_amount_out: TokenAmount,
    ) -> SwapRequest {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        SwapRequest {
            asset_in,
            asset_out,
            amount_in,
            min_amount_out,
            deadline: now.saturating_add(self.deadline_secs),
        }
    }

    /// Execute (or in dry-run mode, describe) one leg and feed the outcome
    /// back into recovery
    async fn swap(
        &mut self,
        direction: Direction,
        request: &SwapRequest,
        mode: Mode,
    ) -> Option<SwapOutcome> {
        let budget = self.estimator.estimate(self.chain.as_ref()).await;

        if self.dry_run {
            info!(
                direction = %direction,
                asset_in = %request.asset_in,
                asset_out = %request.asset_out,
                amount_in = %request.amount_in,
                min_amount_out = %request.min_amount_out,
                gas = budget.working.units(),
                "Dry run: swap not submitted"
            );
            return None;
        }

        let outcome = self
            .executor
            .execute(self.chain.as_ref(), request, budget.working)
            .await;

        match &outcome {
            SwapOutcome::Confirmed { amount_out, .. } => {
                info!(direction = %direction, amount_out = %amount_out, "Swap succeeded");
            }
            other => {
                warn!(direction = %direction, outcome = other.kind(), "Swap did not succeed");
            }
        }

        self.recovery.report_outcome(&outcome);
        if let Some(journal) = &self.journal {
            journal
                .record(self.cycles, mode, direction, request, &outcome)
                .await;
        }
        Some(outcome)
    }
}

/// Amount of the target token to sell under `policy`
pub fn sell_amount(policy: &TradingPolicy, target_balance: TokenAmount) -> TokenAmount {
    policy.sell_fraction.apply(target_balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockChain, BASE, TARGET};
    use crate::chain::ChainError;
    use alloy::primitives::U256;
    use tokio_test::assert_ok;

    fn test_config() -> Config {
        Config {
            check_interval_ms: 0,
            settle_delay_ms: 0,
            ..Config::default()
        }
    }

    fn runner(chain: &Arc<MockChain>, notional: u64) -> CycleRunner {
        CycleRunner::new(chain.clone(), &test_config(), U256::from(notional))
    }

    fn stop_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn test_normal_cycle_buys_then_sells_half() {
        let chain = Arc::new(MockChain::new().with_balance(BASE, 1_000));
        let mut runner = runner(&chain, 50);

        let report = runner.run_cycle().await;

        assert_eq!(report.buy_amount, U256::from(50u64));
        assert!(matches!(report.buy, Some(SwapOutcome::Confirmed { .. })));
        // Bought 100 target at rate 2, sells half of it back
        assert_eq!(report.sell_amount, U256::from(50u64));
        assert!(report.did_sell());
        assert_eq!(report.mode_at_end, Mode::Normal);
        assert_eq!(chain.balance(TARGET), U256::from(50u64));
    }

    #[tokio::test]
    async fn test_buy_is_capped_by_base_balance() {
        let chain = Arc::new(MockChain::new().with_balance(BASE, 30));
        let mut runner = runner(&chain, 50);

        let report = runner.run_cycle().await;

        assert_eq!(report.buy_amount, U256::from(30u64));
        assert_eq!(chain.swaps()[0].amountIn, U256::from(30u64));
    }

    #[tokio::test]
    async fn test_empty_balances_submit_nothing() {
        let chain = Arc::new(MockChain::new());
        let mut runner = runner(&chain, 50);

        let report = runner.run_cycle().await;

        assert!(report.buy.is_none());
        assert!(report.sell.is_none());
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_normal_mode_sells_half_of_target_balance() {
        let chain = Arc::new(MockChain::new().with_balance(TARGET, 1_000));
        let mut runner = runner(&chain, 50);

        let report = runner.run_cycle().await;

        assert!(report.buy.is_none());
        assert_eq!(report.sell_amount, U256::from(500u64));
        assert_eq!(chain.swaps()[0].amountIn, U256::from(500u64));
        assert_eq!(chain.swaps()[0].tokenIn, TARGET.address());
    }

    #[tokio::test]
    async fn test_sell_only_mode_sells_everything_and_skips_buy() {
        let chain = Arc::new(
            MockChain::new()
                .with_balance(BASE, 1_000)
                .with_balance(TARGET, 1_000),
        );
        let mut runner = runner(&chain, 50);
        for _ in 0..3 {
            runner.recovery.report_revert_failure();
        }

        let report = runner.run_cycle().await;

        assert_eq!(report.mode_at_start, Mode::SellOnly);
        assert!(report.buy.is_none());
        assert_eq!(report.sell_amount, U256::from(1_000u64));
        assert_eq!(chain.swaps().len(), 1);
        assert_eq!(chain.balance(TARGET), U256::ZERO);
        assert_eq!(runner.recovery_state().sell_only_iterations_remaining, 11);
    }

    #[tokio::test]
    async fn test_three_reverts_then_twelve_cycles_recover() {
        let chain = Arc::new(MockChain::new().with_balance(BASE, 1_000));
        chain.fail_next_swaps([
            ChainError::revert("STF"),
            ChainError::revert("STF"),
            ChainError::revert("STF"),
        ]);
        let mut runner = runner(&chain, 50);

        for _ in 0..3 {
            let report = runner.run_cycle().await;
            assert!(matches!(report.buy, Some(SwapOutcome::Reverted { .. })));
        }
        assert_eq!(
            runner.recovery_state(),
            RecoveryState {
                mode: Mode::SellOnly,
                consecutive_failures: 0,
                sell_only_iterations_remaining: 12,
            }
        );
        let swaps_before = chain.swaps().len();

        for _ in 0..12 {
            let report = runner.run_cycle().await;
            assert_eq!(report.mode_at_start, Mode::SellOnly);
            assert!(report.buy.is_none());
        }

        assert_eq!(runner.recovery_state(), RecoveryState::default());
        assert_eq!(chain.swaps().len(), swaps_before);
        assert_eq!(chain.approvals().len(), 1);
    }

    #[tokio::test]
    async fn test_reverted_sell_still_counts_as_sell_attempt() {
        let chain = Arc::new(MockChain::new().with_balance(TARGET, 1_000));
        chain.fail_next_swaps([ChainError::revert("STF")]);
        let mut runner = runner(&chain, 50);

        let report = runner.run_cycle().await;

        assert!(matches!(report.sell, Some(SwapOutcome::Reverted { .. })));
        assert!(report.did_sell());
    }

    #[tokio::test]
    async fn test_approval_transport_failures_do_not_escalate() {
        let chain = Arc::new(MockChain::new().with_balance(BASE, 1_000));
        chain
            .state()
            .approve_failures
            .extend((0..3).map(|_| ChainError::transport("connection reset")));
        let mut runner = runner(&chain, 50);

        for _ in 0..3 {
            let report = runner.run_cycle().await;
            assert!(matches!(report.buy, Some(SwapOutcome::TransportFailure { .. })));
        }

        assert_eq!(runner.recovery_state(), RecoveryState::default());
        assert!(chain.swaps().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failures_do_not_escalate() {
        let chain = Arc::new(MockChain::new().with_balance(BASE, 1_000));
        chain.fail_next_swaps((0..5).map(|_| ChainError::transport("timeout")));
        let mut runner = runner(&chain, 50);

        for _ in 0..5 {
            runner.run_cycle().await;
        }

        assert_eq!(runner.recovery_state(), RecoveryState::default());
    }

    #[tokio::test]
    async fn test_dry_run_submits_nothing() {
        let chain = Arc::new(
            MockChain::new()
                .with_balance(BASE, 1_000)
                .with_balance(TARGET, 1_000),
        );
        let mut runner = runner(&chain, 50).with_dry_run(true);

        let report = runner.run_cycle().await;

        assert_eq!(report.buy_amount, U256::from(50u64));
        assert_eq!(report.sell_amount, U256::from(500u64));
        assert!(report.buy.is_none() && report.sell.is_none());
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_after_max_cycles() {
        let chain = Arc::new(MockChain::new().with_balance(BASE, 1_000));
        let mut runner = runner(&chain, 50);
        let (_tx, rx) = stop_channel();

        let summary = runner.run(rx, Some(3)).await;

        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.reverted, 0);
        assert_eq!(summary.confirmed, 6);
    }

    #[tokio::test]
    async fn test_zero_cycle_limit_runs_nothing() {
        let chain = Arc::new(MockChain::new().with_balance(BASE, 1_000));
        let mut runner = runner(&chain, 50);
        let (_tx, rx) = stop_channel();

        let summary = runner.run(rx, Some(0)).await;

        assert_eq!(summary.cycles, 0);
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_run_honors_stop_before_first_cycle() {
        let chain = Arc::new(MockChain::new().with_balance(BASE, 1_000));
        let mut runner = runner(&chain, 50);
        let (tx, rx) = stop_channel();
        tx.send(true).unwrap();

        let summary = runner.run(rx, None).await;

        assert_eq!(summary.cycles, 0);
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_signal_during_sleep() {
        let chain = Arc::new(MockChain::new());
        let config = Config {
            check_interval_ms: 60_000,
            settle_delay_ms: 0,
            ..Config::default()
        };
        let mut runner = CycleRunner::new(chain.clone(), &config, U256::from(50u64));
        let (tx, rx) = stop_channel();

        let handle = tokio::spawn(async move { runner.run(rx, None).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let summary = assert_ok!(handle.await);
        assert_eq!(summary.cycles, 1);
    }

    #[tokio::test]
    async fn test_from_config_converts_notional_with_token_decimals() {
        let chain = Arc::new(MockChain::new());
        chain.state().decimals.insert(BASE, 6);
        let mut config = test_config();
        config.trading.trade_notional = "1.5".to_string();

        let runner = assert_ok!(CycleRunner::from_config(chain.clone(), &config).await);
        assert_eq!(runner.notional(), U256::from(1_500_000u64));

        // Target has no decimals() answer and falls back to 18
        let chain = Arc::new(MockChain::new());
        let runner = assert_ok!(CycleRunner::from_config(chain, &config).await);
        assert_eq!(runner.notional(), U256::from(1_500_000_000_000_000_000u128));
    }

    #[test]
    fn test_sell_amount_per_policy() {
        let normal = RecoveryController::default().current_policy();
        assert_eq!(sell_amount(&normal, U256::from(1_000u64)), U256::from(500u64));
        assert_eq!(sell_amount(&normal, U256::from(1u64)), U256::ZERO);
    }
}
