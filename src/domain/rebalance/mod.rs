//! Rebalance domain - decision engine and position lifecycle management

mod decision;
mod lifecycle;

pub use decision::{rebalance_needed, rebalance_reason, RebalanceReason};
pub use lifecycle::{PositionLifecycleManager, MIN_TOKEN_RAW_AMOUNT, SETTLE_DELAY};
