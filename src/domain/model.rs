//! Core data model shared by the watcher, the TUI, and the API surface.

use std::collections::HashMap;
use std::fmt;

use alloy::primitives::U256;
use serde::{Serialize, Serializer};

/// Decimal scale of native EVM balances (wei per coin).
pub const NATIVE_SCALE: u8 = 18;

/// An exact on-chain amount: the raw integer plus its decimal scale.
///
/// Arithmetic stays in `U256`; division by `10^scale` happens only when the
/// value is rendered or converted for fiat valuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount {
    raw: U256,
    scale: u8,
}

impl Amount {
    pub fn new(raw: U256, scale: u8) -> Self {
        Self { raw, scale }
    }

    /// A native-coin amount from raw wei.
    pub fn from_wei(raw: U256) -> Self {
        Self::new(raw, NATIVE_SCALE)
    }

    pub fn zero(scale: u8) -> Self {
        Self::new(U256::ZERO, scale)
    }

    pub fn raw(&self) -> U256 {
        self.raw
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    fn parts(&self) -> (U256, U256) {
        let divisor = U256::from(10u64).pow(U256::from(self.scale));
        (self.raw / divisor, self.raw % divisor)
    }

    /// Approximate value as `f64`, for fiat valuation and sorting only.
    pub fn to_f64(&self) -> f64 {
        let (whole, frac) = self.parts();
        let whole: f64 = whole.to_string().parse().unwrap_or(0.0);
        let frac: f64 = frac.to_string().parse().unwrap_or(0.0);
        whole + frac / 10f64.powi(self.scale as i32)
    }

    /// Fractional digits, left-padded with zeros to the full scale.
    fn frac_digits(&self, frac: U256) -> String {
        let digits = frac.to_string();
        let scale = self.scale as usize;
        let mut padded = String::with_capacity(scale);
        for _ in digits.len()..scale {
            padded.push('0');
        }
        padded.push_str(&digits);
        padded
    }

    /// Fixed-point rendering at `decimals` fractional digits (truncating).
    pub fn format(&self, decimals: usize) -> String {
        let (whole, frac) = self.parts();
        if decimals == 0 {
            return whole.to_string();
        }
        let frac_digits = self.frac_digits(frac);
        let mut shown: String = frac_digits.chars().take(decimals).collect();
        while shown.len() < decimals {
            shown.push('0');
        }
        format!("{whole}.{shown}")
    }

    /// Full-precision decimal string with trailing zeros trimmed.
    pub fn to_decimal_string(&self) -> String {
        let (whole, frac) = self.parts();
        if frac.is_zero() {
            return whole.to_string();
        }
        let frac_digits = self.frac_digits(frac);
        let trimmed = frac_digits.trim_end_matches('0');
        format!("{whole}.{trimmed}")
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

/// A transaction touching a monitored address, already rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxRecord {
    pub hash: String,
    pub from: String,
    /// Literal `"Contract"` when the transaction has no recipient.
    pub to: String,
    /// Native value at the configured token-decimal precision.
    pub value: String,
    pub block_number: u64,
    pub gas_limit: u64,
    /// `"<f2> Gwei"`.
    pub gas_price: String,
    pub nonce: u64,
}

/// Snapshot state for one monitored address. All maps are keyed by chain name.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub balances: HashMap<String, Amount>,
    /// chain name -> token symbol -> balance
    pub token_balances: HashMap<String, HashMap<String, Amount>>,
    pub balances_24h: HashMap<String, Amount>,
    pub errors: HashMap<String, String>,
    /// Most-recent-first, at most five entries.
    pub transactions: Vec<TxRecord>,
}

impl Account {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
            balances: HashMap::new(),
            token_balances: HashMap::new(),
            balances_24h: HashMap::new(),
            errors: HashMap::new(),
            transactions: Vec::new(),
        }
    }

    /// Address equality folds case; the stored form is whatever config supplied.
    pub fn matches(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.address)
    }
}

/// Fetched balances for one address on one chain.
#[derive(Debug, Clone, Serialize)]
pub struct AccountChainData {
    pub address: String,
    pub balance: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_24h: Option<Amount>,
    pub token_balances: HashMap<String, Amount>,
}

/// Result of a bulk fetch for one chain. Partial success is first-class:
/// `results` and `failed_urls` are both populated in the same message, and
/// `error` is set only when some address remained unfetched on every URL.
#[derive(Debug, Clone, Serialize)]
pub struct ChainData {
    pub chain_name: String,
    pub results: Vec<AccountChainData>,
    pub failed_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceData {
    pub coin_id: String,
    pub usd: f64,
}

/// Gas price for a chain, with the URLs that failed before one answered.
#[derive(Debug, Clone)]
pub struct GasPriceData {
    pub wei: u128,
    pub failed_urls: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wei(hex: &str) -> Amount {
        Amount::from_wei(U256::from_str_radix(hex, 16).unwrap())
    }

    #[test]
    fn amount_renders_exact_wei() {
        // 2.5 coins in wei
        let amount = wei("22B1C8C1227A0000");
        assert_eq!(amount.to_decimal_string(), "2.5");
        assert_eq!(amount.format(2), "2.50");
        assert_eq!(amount.to_f64(), 2.5);
    }

    #[test]
    fn amount_formats_one_coin_at_four_decimals() {
        let amount = wei("de0b6b3a7640000");
        assert_eq!(amount.format(4), "1.0000");
    }

    #[test]
    fn amount_token_scale() {
        // 500 tokens at 6 decimals
        let amount = Amount::new(U256::from(500_000_000u64), 6);
        assert_eq!(amount.to_decimal_string(), "500");
        assert_eq!(amount.to_f64(), 500.0);
    }

    #[test]
    fn amount_truncates_only_at_render() {
        let amount = Amount::from_wei(U256::from(1u64));
        assert_eq!(amount.to_decimal_string(), "0.000000000000000001");
        assert_eq!(amount.format(2), "0.00");
        assert!(!amount.is_zero());
    }

    #[test]
    fn account_matching_folds_case() {
        let account = Account::new("0xAbCd", None);
        assert!(account.matches("0xABCD"));
        assert!(account.matches("0xabcd"));
        assert!(!account.matches("0xabce"));
    }
}
