//! Pool gateway contract - the chain access layer the core consumes
//!
//! The gateway is owned by the infrastructure layer; the domain only sees
//! this trait. All reads fail with `GatewayError`, all submissions with
//! `TxError`.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::shared::errors::{GatewayError, TxError};
use crate::shared::types::Token;

/// An open concentrated-liquidity position as observed on chain
#[derive(Debug, Clone)]
pub struct Position {
    /// Position account address (opaque handle)
    pub address: String,
    pub token_a: Token,
    pub token_b: Token,
    pub liquidity: u128,
    pub lower_price: f64,
    pub upper_price: f64,
    /// Pool price at the time this position was observed
    pub current_price: f64,
}

impl Position {
    /// True when the observed price sits inside the position's band.
    pub fn is_in_range(&self) -> bool {
        self.lower_price <= self.current_price && self.current_price <= self.upper_price
    }
}

/// Static pool facts resolved once at startup
#[derive(Debug, Clone)]
pub struct PoolMetadata {
    pub address: String,
    pub token_a: Token,
    pub token_b: Token,
    pub tick_spacing: u16,
}

/// One wallet token balance as reported by the chain
#[derive(Debug, Clone, Copy)]
pub struct TokenBalance {
    pub amount: u64,
    pub decimals: u8,
    pub ui_amount: f64,
}

/// Chain access contract consumed by monitors and the lifecycle manager
#[async_trait]
pub trait PoolGateway: Send + Sync {
    /// Current pool price (token B per token A)
    async fn current_price(&self) -> Result<f64, GatewayError>;

    /// Open positions owned by the wallet on the managed pool
    async fn list_positions(&self) -> Result<Vec<Position>, GatewayError>;

    /// Native SOL balance of the wallet
    async fn native_balance(&self) -> Result<f64, GatewayError>;

    /// Wallet token balances keyed by mint address
    async fn token_balances(&self) -> Result<HashMap<String, TokenBalance>, GatewayError>;

    /// Resolve static pool metadata; called once during startup
    async fn pool_metadata(&self) -> Result<PoolMetadata, GatewayError>;

    /// Open a new position over [lower_price, upper_price] depositing at
    /// most the given raw token amounts. Returns the transaction signature.
    async fn open_position(
        &self,
        lower_price: f64,
        upper_price: f64,
        max_amount_a: u64,
        max_amount_b: u64,
    ) -> Result<String, TxError>;

    /// Close an existing position and withdraw its liquidity
    async fn close_position(&self, position_address: &str) -> Result<String, TxError>;
}
