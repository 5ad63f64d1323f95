//! Wallet balance observation and low-balance alerting

use std::collections::HashMap;
use tracing::{debug, warn};

use super::BalanceSnapshot;
use crate::domain::gateway::PoolGateway;
use crate::domain::notification::{NotificationSink, Severity};
use crate::shared::errors::GatewayError;

/// Fetches wallet balances fresh each iteration and warns when the
/// native balance drops below the configured floor.
///
/// The warning fires on every iteration the balance stays low. There is
/// no dedup across iterations; downstream sinks are expected to tolerate
/// repeats.
pub struct BalanceMonitor {
    min_native_sol: f64,
}

impl BalanceMonitor {
    pub fn new(min_native_sol: f64) -> Self {
        Self { min_native_sol }
    }

    pub async fn observe_balances(
        &self,
        gateway: &dyn PoolGateway,
        notifier: &dyn NotificationSink,
    ) -> Result<BalanceSnapshot, GatewayError> {
        let native_sol = gateway.native_balance().await?;
        let tokens = gateway.token_balances().await?;

        debug!(
            "Balances: {:.6} SOL, {} token accounts",
            native_sol,
            tokens.len()
        );

        if native_sol < self.min_native_sol {
            warn!(
                "Native balance {:.6} SOL below floor {:.6} SOL",
                native_sol, self.min_native_sol
            );
            let mut fields = HashMap::new();
            fields.insert("balance_sol".to_string(), format!("{:.6}", native_sol));
            fields.insert(
                "min_balance_sol".to_string(),
                format!("{:.6}", self.min_native_sol),
            );
            notifier
                .notify(
                    "Low SOL balance",
                    "Wallet native balance is below the configured floor; fee payment may fail",
                    Severity::Warning,
                    fields,
                )
                .await;
        }

        Ok(BalanceSnapshot { native_sol, tokens })
    }
}
