//! Token identifiers, amounts and unit conversion
//!
//! Amounts are always carried in the token's smallest unit as `U256`.
//! Human-readable strings only appear at the edges (config, logs).

use crate::{Error, Result};
use alloy::primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Amount of a token in its smallest unit
pub type TokenAmount = U256;

/// Decimals assumed when a token does not answer `decimals()`
pub const DEFAULT_DECIMALS: u8 = 18;

/// Well-known HyperEVM addresses used as configuration defaults
pub mod addresses {
    use super::*;

    /// Wrapped HYPE
    pub const WHYPE: Address = address!("5555555555555555555555555555555555555555");
    /// HyperSwap V3 swap router
    pub const HYPERSWAP_V3_ROUTER: Address = address!("4e2960a8cd19b467b82d26d83facb0fae26b094d");
    pub const ZERO_ADDRESS: Address = address!("0000000000000000000000000000000000000000");
}

/// A fungible token, identified by its contract address.
///
/// Equality is on the 20 address bytes, so two textual identifiers that only
/// differ in letter case name the same asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(Address);

impl Asset {
    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    pub fn address(&self) -> Address {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Address::ZERO
    }
}

impl From<Address> for Asset {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl FromStr for Asset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        // Lowercase first so mixed-case input is never rejected on checksum grounds
        Address::from_str(&trimmed.to_ascii_lowercase())
            .map(Self)
            .map_err(|e| Error::InvalidArgument(format!("Invalid asset address '{}': {}", s, e)))
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A proportion in `[0, 1]` applied to token amounts with floor rounding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    numerator: u64,
    denominator: u64,
}

impl Fraction {
    pub const HALF: Fraction = Fraction {
        numerator: 1,
        denominator: 2,
    };
    pub const WHOLE: Fraction = Fraction {
        numerator: 1,
        denominator: 1,
    };

    /// Returns `None` for a zero denominator or a fraction above one
    pub fn new(numerator: u64, denominator: u64) -> Option<Self> {
        if denominator == 0 || numerator > denominator {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
        })
    }

    /// `floor(amount * numerator / denominator)` without overflowing
    pub fn apply(&self, amount: TokenAmount) -> TokenAmount {
        let n = U256::from(self.numerator);
        let d = U256::from(self.denominator);
        (amount / d) * n + (amount % d) * n / d
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Format a raw amount with the given number of decimals
pub fn format_units(value: TokenAmount, decimals: u8) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = remainder_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, trimmed)
        }
    }
}

/// Parse a human-readable decimal string ("50", "0.25") into smallest units
pub fn parse_units(value: &str, decimals: u8) -> Result<TokenAmount> {
    let value = value.trim();
    let invalid =
        |reason: &str| Error::InvalidArgument(format!("Invalid amount '{}': {}", value, reason));

    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("empty"));
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid("expected digits with an optional decimal point"));
    }
    if frac.len() > decimals as usize {
        return Err(invalid("more fractional digits than the token supports"));
    }

    let digits = format!("{}{:0<width$}", whole, frac, width = decimals as usize);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|_| invalid("out of range"))
}
