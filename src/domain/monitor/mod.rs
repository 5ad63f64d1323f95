//! Monitor domain - per-iteration observations of price, positions and balances

mod balance_monitor;
mod position_monitor;
mod price_monitor;

pub use balance_monitor::BalanceMonitor;
pub use position_monitor::PositionMonitor;
pub use price_monitor::PriceMonitor;

use std::collections::HashMap;

use crate::domain::gateway::{Position, TokenBalance};

/// One price observation
#[derive(Debug, Clone)]
pub struct PriceSample {
    pub price: f64,
    pub previous_price: Option<f64>,
    /// |price - previous| / previous; None on the first observation
    pub change_pct: Option<f64>,
    pub significant_change: bool,
}

/// Classification of the wallet's open positions for one iteration
#[derive(Debug, Clone)]
pub struct PositionSummary {
    pub count: usize,
    pub out_of_range_count: usize,
    pub positions: Vec<Position>,
}

impl PositionSummary {
    pub fn from_positions(positions: Vec<Position>) -> Self {
        let out_of_range_count = positions.iter().filter(|p| !p.is_in_range()).count();
        Self {
            count: positions.len(),
            out_of_range_count,
            positions,
        }
    }
}

/// Wallet balances for one iteration; recomputed fresh every time
#[derive(Debug, Clone)]
pub struct BalanceSnapshot {
    pub native_sol: f64,
    pub tokens: HashMap<String, TokenBalance>,
}
