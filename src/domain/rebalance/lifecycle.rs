//! Position lifecycle management - withdraw-then-create sequencing
//!
//! All chain writes from this process go through one manager so that
//! transactions from the single wallet signer never race each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::domain::gateway::{PoolGateway, PoolMetadata, Position};
use crate::domain::notification::{NotificationSink, Severity};
use crate::shared::errors::GatewayError;
use crate::shared::types::Amount;

/// Wait after a withdrawal before a dependent create, to let the chain
/// finalize the closed position
pub const SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Smallest raw token amount worth opening a position with
pub const MIN_TOKEN_RAW_AMOUNT: u64 = 1_000;

/// Fraction of each token balance deposited into a new position; the
/// remainder covers fees and slippage
const DEPOSIT_PERCENT: u64 = 95;

pub struct PositionLifecycleManager {
    gateway: Arc<dyn PoolGateway>,
    notifier: Arc<dyn NotificationSink>,
    metadata: PoolMetadata,
    price_range_percent: f64,
}

impl PositionLifecycleManager {
    pub fn new(
        gateway: Arc<dyn PoolGateway>,
        notifier: Arc<dyn NotificationSink>,
        metadata: PoolMetadata,
        price_range_percent: f64,
    ) -> Self {
        Self {
            gateway,
            notifier,
            metadata,
            price_range_percent,
        }
    }

    /// Open one position banded symmetrically around the current price,
    /// sized at 95% of each available token balance.
    ///
    /// Returns the transaction signature, or None when there was nothing
    /// to do (a position already exists, balances below the floor) or the
    /// attempt failed. Failures are reported via notification and
    /// swallowed; callers cannot distinguish the two None cases.
    pub async fn create_optimal_position(&self) -> Option<String> {
        let positions = match self.gateway.list_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                error!("Position read failed before create: {}", e);
                self.notify_error("Position create failed", &e.to_string())
                    .await;
                return None;
            }
        };

        // Never double exposure: one managed position per pool
        if !positions.is_empty() {
            info!(
                "Skipping create: {} position(s) already open on pool",
                positions.len()
            );
            return None;
        }

        let balances = match self.gateway.token_balances().await {
            Ok(balances) => balances,
            Err(e) => {
                error!("Balance read failed before create: {}", e);
                self.notify_error("Position create failed", &e.to_string())
                    .await;
                return None;
            }
        };

        let raw_a = balances
            .get(&self.metadata.token_a.mint.to_string())
            .map(|b| b.amount)
            .unwrap_or(0);
        let raw_b = balances
            .get(&self.metadata.token_b.mint.to_string())
            .map(|b| b.amount)
            .unwrap_or(0);

        if raw_a < MIN_TOKEN_RAW_AMOUNT || raw_b < MIN_TOKEN_RAW_AMOUNT {
            warn!(
                "Skipping create: balances below floor ({} {} raw, {} {} raw, floor {})",
                raw_a,
                self.metadata.token_a.symbol,
                raw_b,
                self.metadata.token_b.symbol,
                MIN_TOKEN_RAW_AMOUNT
            );
            return None;
        }

        let price = match self.gateway.current_price().await {
            Ok(price) => price,
            Err(e) => {
                error!("Price read failed before create: {}", e);
                self.notify_error("Position create failed", &e.to_string())
                    .await;
                return None;
            }
        };

        // Integer sizing with truncation; the 5% remainder stays liquid
        let deposit_a =
            Amount::new(raw_a, self.metadata.token_a.decimals).percent_of(DEPOSIT_PERCENT);
        let deposit_b =
            Amount::new(raw_b, self.metadata.token_b.decimals).percent_of(DEPOSIT_PERCENT);

        let range = self.price_range_percent / 100.0;
        let lower_price = price * (1.0 - range);
        let upper_price = price * (1.0 + range);

        info!(
            "🚀 Opening position [{:.6}, {:.6}] around {:.6} with {:.6} {} / {:.6} {}",
            lower_price,
            upper_price,
            price,
            deposit_a.to_ui(),
            self.metadata.token_a.symbol,
            deposit_b.to_ui(),
            self.metadata.token_b.symbol
        );

        match self
            .gateway
            .open_position(lower_price, upper_price, deposit_a.value, deposit_b.value)
            .await
        {
            Ok(signature) => {
                info!("✅ Position opened: {}", signature);
                let mut fields = HashMap::new();
                fields.insert("signature".to_string(), signature.clone());
                fields.insert(
                    "band".to_string(),
                    format!("[{:.6}, {:.6}]", lower_price, upper_price),
                );
                fields.insert("price".to_string(), format!("{:.6}", price));
                fields.insert(
                    format!("amount_{}", self.metadata.token_a.symbol),
                    deposit_a.value.to_string(),
                );
                fields.insert(
                    format!("amount_{}", self.metadata.token_b.symbol),
                    deposit_b.value.to_string(),
                );
                self.notifier
                    .notify(
                        "Position created",
                        "Opened a new position centered on the current price",
                        Severity::Info,
                        fields,
                    )
                    .await;
                Some(signature)
            }
            Err(e) => {
                error!("❌ Position open failed: {}", e);
                self.notify_error("Position create failed", &e.to_string())
                    .await;
                None
            }
        }
    }

    /// Withdraw every out-of-range position, strictly one at a time.
    ///
    /// The first failed withdrawal aborts the loop; the signatures
    /// collected so far are still returned, so callers must not assume
    /// all-or-nothing. Err is only returned when the initial position
    /// read fails.
    pub async fn withdraw_out_of_range_positions(&self) -> Result<Vec<String>, GatewayError> {
        let positions = self.gateway.list_positions().await?;
        let out_of_range: Vec<&Position> =
            positions.iter().filter(|p| !p.is_in_range()).collect();

        if out_of_range.is_empty() {
            return Ok(Vec::new());
        }

        info!("Withdrawing {} out-of-range position(s)", out_of_range.len());

        let mut signatures = Vec::new();
        for position in out_of_range {
            match self.gateway.close_position(&position.address).await {
                Ok(signature) => {
                    info!("✅ Closed position {}: {}", position.address, signature);
                    signatures.push(signature);
                }
                Err(e) => {
                    error!(
                        "❌ Close failed for {}: {} ({} withdrawal(s) already confirmed)",
                        position.address,
                        e,
                        signatures.len()
                    );
                    self.notify_error("Position withdrawal failed", &e.to_string())
                        .await;
                    break;
                }
            }
        }

        Ok(signatures)
    }

    /// Full rebalance: withdraw whatever is out of range, wait for the
    /// chain to settle, then recreate around the current price.
    ///
    /// Returns true iff a create ultimately succeeded. Never propagates
    /// an error; everything is reported via notification and converted
    /// to false.
    pub async fn rebalance_if_needed(&self) -> bool {
        let positions = match self.gateway.list_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                error!("Rebalance aborted, position read failed: {}", e);
                self.notify_error("Rebalance failed", &e.to_string()).await;
                return false;
            }
        };

        if positions.is_empty() {
            info!("🔄 No open position, creating one");
            return self.create_optimal_position().await.is_some();
        }

        let out_of_range = positions.iter().filter(|p| !p.is_in_range()).count();
        if out_of_range == 0 {
            return false;
        }

        info!("🔄 Rebalancing: {} position(s) out of range", out_of_range);

        match self.withdraw_out_of_range_positions().await {
            Ok(signatures) => {
                if signatures.is_empty() {
                    // Nothing was withdrawn; do not stack a new position on top
                    warn!("Rebalance stopped: no withdrawal confirmed");
                    return false;
                }
                tokio::time::sleep(SETTLE_DELAY).await;
                self.create_optimal_position().await.is_some()
            }
            Err(e) => {
                error!("Rebalance aborted, withdraw read failed: {}", e);
                self.notify_error("Rebalance failed", &e.to_string()).await;
                false
            }
        }
    }

    async fn notify_error(&self, title: &str, body: &str) {
        self.notifier
            .notify(title, body, Severity::Error, HashMap::new())
            .await;
    }
}
