//! Rebalance decision engine
//!
//! A pure function of the monitors' outputs. No clock, no gateway, no
//! hidden state, so the full truth table is unit-testable.

use crate::domain::monitor::{PositionSummary, PriceSample};

/// Why a rebalance was triggered, for logging and notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceReason {
    SignificantPriceChange,
    PositionOutOfRange,
    NoOpenPosition,
}

impl RebalanceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceReason::SignificantPriceChange => "significant price change",
            RebalanceReason::PositionOutOfRange => "position out of range",
            RebalanceReason::NoOpenPosition => "no open position",
        }
    }
}

/// True iff the managed position needs to be withdrawn and recreated.
pub fn rebalance_needed(price: &PriceSample, positions: &PositionSummary) -> bool {
    rebalance_reason(price, positions).is_some()
}

/// First matching trigger, or None when no rebalance is required.
pub fn rebalance_reason(
    price: &PriceSample,
    positions: &PositionSummary,
) -> Option<RebalanceReason> {
    if price.significant_change {
        Some(RebalanceReason::SignificantPriceChange)
    } else if positions.out_of_range_count > 0 {
        Some(RebalanceReason::PositionOutOfRange)
    } else if positions.count == 0 {
        Some(RebalanceReason::NoOpenPosition)
    } else {
        None
    }
}
