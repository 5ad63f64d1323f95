//! Position range classification

use tracing::debug;

use super::PositionSummary;
use crate::domain::gateway::PoolGateway;
use crate::shared::errors::GatewayError;

/// Classifies each open position as in-range or out-of-range.
///
/// Stateless: classification always uses the price fetched in the same
/// iteration, never a price the gateway would report at lookup time, so
/// one iteration never mixes samples from different ticks.
pub struct PositionMonitor;

impl PositionMonitor {
    pub fn new() -> Self {
        Self
    }

    pub async fn observe_positions(
        &self,
        gateway: &dyn PoolGateway,
        current_price: f64,
    ) -> Result<PositionSummary, GatewayError> {
        let mut positions = gateway.list_positions().await?;

        // Re-anchor every position on this iteration's price sample
        for position in &mut positions {
            position.current_price = current_price;
        }

        let summary = PositionSummary::from_positions(positions);
        debug!(
            "Positions: {} open, {} out of range (price {:.6})",
            summary.count, summary.out_of_range_count, current_price
        );

        Ok(summary)
    }
}

impl Default for PositionMonitor {
    fn default() -> Self {
        Self::new()
    }
}
