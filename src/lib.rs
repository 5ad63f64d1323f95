//! Poolkeeper - Solana CLMM position rebalancer
//! Built with Domain-Driven Design principles

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use application::ControlLoop;
pub use domain::gateway::PoolGateway;
pub use domain::monitor::{BalanceMonitor, PositionMonitor, PriceMonitor};
pub use domain::rebalance::PositionLifecycleManager;
pub use infrastructure::blockchain::SolanaPoolGateway;
