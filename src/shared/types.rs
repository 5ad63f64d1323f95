//! Common types used across the application

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Token representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub mint: Pubkey,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(mint: Pubkey, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            mint,
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// Amount representation with precision
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount {
    pub value: u64,
    pub decimals: u8,
}

impl Amount {
    pub fn new(value: u64, decimals: u8) -> Self {
        Self { value, decimals }
    }

    pub fn to_ui(&self) -> f64 {
        self.value as f64 / 10_f64.powi(self.decimals as i32)
    }

    /// Integer percentage of this amount, truncating toward zero.
    pub fn percent_of(&self, percent: u64) -> Amount {
        Self {
            value: (self.value as u128 * percent as u128 / 100) as u64,
            decimals: self.decimals,
        }
    }
}
