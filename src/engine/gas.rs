//! Gas ceiling derivation from the latest block
//!
//! Estimation is advisory: any failure degrades to a fixed fallback ceiling
//! and is only logged.

use crate::chain::{ChainClient, GasCeiling};
use crate::config::GasConfig;

/// Where a working ceiling came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasSource {
    /// Derived from the gas limit of this block
    Block { number: u64, gas_limit: u64 },
    Fallback,
}

/// Gas budget for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasBudget {
    pub working: GasCeiling,
    pub source: GasSource,
}

#[derive(Debug, Clone, Copy)]
pub struct GasBudgetEstimator {
    config: GasConfig,
}

impl GasBudgetEstimator {
    pub fn new(config: GasConfig) -> Self {
        Self { config }
    }

    /// Working ceiling for the next transaction. Never fails.
    pub async fn estimate(&self, chain: &dyn ChainClient) -> GasBudget {
        match chain.latest_block().await {
            Ok(Some(block)) => match self.ceiling_for(block.gas_limit) {
                Some(working) => {
                    return GasBudget {
                        working,
                        source: GasSource::Block {
                            number: block.number,
                            gas_limit: block.gas_limit,
                        },
                    }
                }
                None => {
                    tracing::warn!(
                        block = block.number,
                        gas_limit = block.gas_limit,
                        "Block carries no usable gas limit, using fallback ceiling"
                    );
                }
            },
            Ok(None) => {
                tracing::warn!("Latest block not found, using fallback ceiling");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read latest block, using fallback ceiling");
            }
        }

        GasBudget {
            working: self.fallback(),
            source: GasSource::Fallback,
        }
    }

    /// Ceiling for approval transactions: the working ceiling, capped
    pub fn approval_ceiling(&self, budget: &GasBudget) -> GasCeiling {
        budget.working.min(self.cap())
    }

    /// `gas_limit * percent / 100`, or `None` when that is zero
    fn ceiling_for(&self, gas_limit: u64) -> Option<GasCeiling> {
        let scaled = u128::from(gas_limit) * u128::from(self.config.block_limit_percent) / 100;
        GasCeiling::new(u64::try_from(scaled).unwrap_or(u64::MAX))
    }

    fn fallback(&self) -> GasCeiling {
        GasCeiling::new(self.config.fallback_ceiling).unwrap_or(DEFAULT_FALLBACK)
    }

    fn cap(&self) -> GasCeiling {
        GasCeiling::new(self.config.approval_cap).unwrap_or(DEFAULT_APPROVAL_CAP)
    }
}

impl Default for GasBudgetEstimator {
    fn default() -> Self {
        Self::new(GasConfig::default())
    }
}

// Used only if a zero slipped past config validation
const DEFAULT_FALLBACK: GasCeiling = GasCeiling::const_new(800_000);
const DEFAULT_APPROVAL_CAP: GasCeiling = GasCeiling::const_new(300_000);
