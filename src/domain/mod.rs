//! Domain layer - core business logic and entities

pub mod gateway;
pub mod monitor;
pub mod notification;
pub mod rebalance;
