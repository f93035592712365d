//! Signer credential holder
//!
//! SECURITY: This is the ONLY place where the private key exists.
//! - The raw key is held as a `SecretString` only until it is parsed
//! - The parsed key lives in alloy's PrivateKeySigner
//! - Keys are never serialized and never logged

use crate::{Error, Result};
use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use secrecy::{ExposeSecret, SecretString};

/// Wallet that signs swap and approval transactions
pub struct SecureWallet {
    /// Public address (safe to expose)
    address: Address,
    /// Ethereum wallet for alloy providers
    wallet: EthereumWallet,
}

impl SecureWallet {
    /// Create a wallet from an environment variable holding a hex private key
    pub fn from_env(var_name: &str) -> Result<Self> {
        let key = std::env::var(var_name).map_err(|_| {
            Error::Wallet(format!(
                "Environment variable {} not set. Required for wallet initialization.",
                var_name
            ))
        })?;

        Self::from_secret(&SecretString::from(key))
    }

    /// Create a wallet from a hex-encoded private key
    pub fn from_secret(key: &SecretString) -> Result<Self> {
        let key_hex = key.expose_secret().trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| Error::Wallet(format!("Invalid private key: {}", e)))?;

        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        Ok(Self { address, wallet })
    }

    /// Get the public address (safe to share)
    pub fn address(&self) -> Address {
        self.address
    }

    /// Wallet filler for alloy providers. Exposes signing only, never the raw key.
    pub fn wallet(&self) -> &EthereumWallet {
        &self.wallet
    }
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureWallet")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key, never holds funds
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: Address =
        alloy::primitives::address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

    fn wallet(key: &str) -> Result<SecureWallet> {
        SecureWallet::from_secret(&SecretString::from(key.to_string()))
    }

    #[test]
    fn test_prefixed_and_unprefixed_keys_yield_same_signer() {
        let prefixed = wallet(TEST_KEY).unwrap();
        let unprefixed = wallet(TEST_KEY.trim_start_matches("0x")).unwrap();

        assert_eq!(prefixed.address(), TEST_ADDRESS);
        assert_eq!(unprefixed.address(), TEST_ADDRESS);
    }

    #[test]
    fn test_from_env_requires_variable() {
        let err = SecureWallet::from_env("SWAP_CYCLER_TEST_UNSET_KEY").unwrap_err();
        assert!(matches!(err, Error::Wallet(_)));
    }

    #[test]
    fn test_invalid_key_is_wallet_error() {
        let err = wallet("0x1234").unwrap_err();
        assert!(matches!(err, Error::Wallet(_)));
        assert!(!err.to_string().contains("0x1234"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug_str = format!("{:?}", wallet(TEST_KEY).unwrap());

        assert!(!debug_str.contains("ac0974bec"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
