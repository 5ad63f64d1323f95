//! Error handling for the application

use thiserror::Error;

/// Read-side failures against the chain (pool, accounts, RPC)
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Pool account unreadable: {0}")]
    PoolUnreadable(String),

    #[error("Position lookup failed: {0}")]
    PositionLookupFailed(String),

    #[error("Balance lookup failed: {0}")]
    BalanceLookupFailed(String),

    #[error("Malformed account data: {0}")]
    MalformedAccount(String),
}

/// Transaction submission/confirmation failures
#[derive(Error, Debug)]
pub enum TxError {
    #[error("Transaction failed: {0}")]
    SubmissionFailed(String),

    #[error("Failed to get latest blockhash: {0}")]
    BlockhashUnavailable(String),

    #[error("Instruction build failed: {0}")]
    InstructionBuildFailed(String),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Gateway error: {0}")]
    GatewayError(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Startup error: {0}")]
    StartupError(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::GatewayError(err.to_string())
    }
}

impl From<TxError> for AppError {
    fn from(err: TxError) -> Self {
        AppError::TxError(err.to_string())
    }
}
