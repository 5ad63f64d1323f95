//! Configuration loading and validation
//!
//! Config.toml sections with CLI overrides applied in main. The loader
//! validates everything the core relies on up front: percentages must be
//! non-negative, the check interval positive, and the pool address must
//! parse as a pubkey.

use anyhow::{Context, Result};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::{fs, path::Path, str::FromStr, time::Duration};

use crate::shared::errors::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcCfg {
    pub url: String,
    /// Per-call timeout applied to every RPC and HTTP request
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletCfg {
    pub keypair: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolCfg {
    /// Whirlpool address of the managed pool
    pub address: String,
    /// Whirlpool program ID
    pub program: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyCfg {
    /// Half-width of the symmetric band around current price, in percent
    pub price_range_percent: f64,
    /// Price drift that counts as a significant change, in percent
    pub rebalance_threshold_percent: f64,
    /// Low-balance warning floor, in SOL
    pub min_native_balance_sol: f64,
    /// Seconds between iterations
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsCfg {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcCfg,
    pub wallet: WalletCfg,
    pub pool: PoolCfg,
    pub strategy: StrategyCfg,
    pub notifications: Option<NotificationsCfg>,
}

pub const DEFAULT_WHIRLPOOL_PROGRAM: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 30_000;

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read {}", path.as_ref().display()))?;
        let cfg: Self = toml::from_str(&s).context("parse Config.toml")?;
        cfg.validate().map_err(|e| anyhow::anyhow!(e))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.strategy.price_range_percent < 0.0 {
            return Err(AppError::ConfigError(format!(
                "price_range_percent must be non-negative, got {}",
                self.strategy.price_range_percent
            )));
        }
        if self.strategy.rebalance_threshold_percent < 0.0 {
            return Err(AppError::ConfigError(format!(
                "rebalance_threshold_percent must be non-negative, got {}",
                self.strategy.rebalance_threshold_percent
            )));
        }
        if self.strategy.min_native_balance_sol < 0.0 {
            return Err(AppError::ConfigError(format!(
                "min_native_balance_sol must be non-negative, got {}",
                self.strategy.min_native_balance_sol
            )));
        }
        if self.strategy.check_interval_secs == 0 {
            return Err(AppError::ConfigError(
                "check_interval_secs must be positive".to_string(),
            ));
        }
        self.pool_address()?;
        self.whirlpool_program()?;
        Ok(())
    }

    pub fn pool_address(&self) -> Result<Pubkey, AppError> {
        Pubkey::from_str(&self.pool.address).map_err(|e| {
            AppError::ConfigError(format!("invalid pool address {}: {}", self.pool.address, e))
        })
    }

    pub fn whirlpool_program(&self) -> Result<Pubkey, AppError> {
        let program = self
            .pool
            .program
            .as_deref()
            .unwrap_or(DEFAULT_WHIRLPOOL_PROGRAM);
        Pubkey::from_str(program)
            .map_err(|e| AppError::ConfigError(format!("invalid program ID {}: {}", program, e)))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.strategy.check_interval_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.timeout_ms.unwrap_or(DEFAULT_RPC_TIMEOUT_MS))
    }
}
