//! RPC endpoint configuration
//!
//! Resolution order:
//! 1. `RPC_URL` environment variable
//! 2. `rpc_url` from the config file
//! 3. Public HyperEVM endpoint (rate limited, for testing only)
//!
//! ```bash
//! export RPC_URL="https://rpc.hyperliquid.xyz/evm"
//! ```

use crate::{Error, Result};
use std::time::Duration;

/// Environment variable holding the endpoint URL
pub const RPC_URL_ENV: &str = "RPC_URL";

/// Public HyperEVM endpoint used when nothing else is configured
pub const PUBLIC_RPC: &str = "https://rpc.hyperliquid.xyz/evm";

/// Where the agent talks to the chain, and how long it waits for receipts
#[derive(Debug, Clone)]
pub struct RpcConfig {
    url: String,
    confirmation_timeout: Duration,
}

impl RpcConfig {
    /// Resolve the endpoint from the environment, then the config file, then the public RPC
    pub fn from_env(configured: Option<&str>, confirmation_timeout_secs: u64) -> Self {
        let url = match std::env::var(RPC_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => {
                tracing::debug!("Using RPC_URL from environment");
                url
            }
            _ => match configured {
                Some(url) => url.to_string(),
                None => {
                    tracing::warn!("No RPC configured, using public RPC (rate limited)");
                    PUBLIC_RPC.to_string()
                }
            },
        };
        Self::new(url, confirmation_timeout_secs)
    }

    /// Create with an explicit endpoint
    pub fn new(url: impl Into<String>, confirmation_timeout_secs: u64) -> Self {
        Self {
            url: url.into(),
            confirmation_timeout: Duration::from_secs(confirmation_timeout_secs),
        }
    }

    /// Parsed endpoint
    pub fn url(&self) -> Result<url::Url> {
        self.url
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RPC URL: {}", e)))
    }

    /// Endpoint host, safe to log
    pub fn host(&self) -> String {
        self.url()
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "<invalid>".to_string())
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }
}
