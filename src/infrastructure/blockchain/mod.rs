//! Blockchain infrastructure - Solana-backed pool gateway

mod rpc_gateway;
mod whirlpool;

pub use rpc_gateway::SolanaPoolGateway;
pub use whirlpool::{PositionAccount, WhirlpoolAccount};
