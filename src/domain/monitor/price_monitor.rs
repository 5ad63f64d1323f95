//! Price monitoring and drift detection

use tracing::{debug, info};

use super::PriceSample;
use crate::domain::gateway::PoolGateway;
use crate::shared::errors::GatewayError;

/// Tracks the last observed pool price and flags significant drift.
///
/// The previous price is the only state the monitor owns; it is updated
/// unconditionally after the change is computed, so a failed iteration
/// downstream never skews the next drift calculation.
pub struct PriceMonitor {
    /// Fraction of drift that counts as significant (threshold percent / 100)
    threshold: f64,
    last_price: Option<f64>,
}

impl PriceMonitor {
    pub fn new(rebalance_threshold_percent: f64) -> Self {
        Self {
            threshold: rebalance_threshold_percent / 100.0,
            last_price: None,
        }
    }

    /// Fetch the current price and compute drift against the previous
    /// observation. The first call has no baseline: change is undefined
    /// and never significant.
    pub async fn observe_price(
        &mut self,
        gateway: &dyn PoolGateway,
    ) -> Result<PriceSample, GatewayError> {
        let price = gateway.current_price().await?;
        let sample = self.record(price);

        match sample.change_pct {
            Some(change) => debug!(
                "Price {:.6} (prev {:.6}, drift {:.4}%, significant: {})",
                sample.price,
                sample.previous_price.unwrap_or_default(),
                change * 100.0,
                sample.significant_change
            ),
            None => info!("First price observation: {:.6}", sample.price),
        }

        Ok(sample)
    }

    /// Pure drift computation against the stored previous price, then
    /// store the new price. Split out so the formula is testable without
    /// a gateway.
    pub fn record(&mut self, price: f64) -> PriceSample {
        let previous_price = self.last_price;
        let change_pct = previous_price.map(|prev| (price - prev).abs() / prev);
        let significant_change = change_pct.map(|c| c > self.threshold).unwrap_or(false);

        self.last_price = Some(price);

        PriceSample {
            price,
            previous_price,
            change_pct,
            significant_change,
        }
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;

    #[test]
    fn test_first_observation_has_no_change() {
        let mut monitor = PriceMonitor::new(1.0);
        let sample = monitor.record(100.0);
        assert_eq!(sample.price, 100.0);
        assert!(sample.previous_price.is_none());
        assert!(sample.change_pct.is_none());
        assert!(!sample.significant_change);
    }

    #[test]
    fn test_change_pct_formula() {
        let mut monitor = PriceMonitor::new(1.0);
        monitor.record(100.0);

        let sample = monitor.record(103.0);
        assert_eq!(sample.previous_price, Some(100.0));
        assert!((sample.change_pct.unwrap() - 0.03).abs() < 1e-12);
        assert!(sample.significant_change);

        // Drift is absolute: a drop counts the same as a rise
        let sample = monitor.record(100.0);
        assert!((sample.change_pct.unwrap() - 3.0 / 103.0).abs() < 1e-12);
        assert!(sample.significant_change);
    }

    #[test]
    fn test_change_at_threshold_is_not_significant() {
        // Threshold is strict: exactly 1% drift is not significant
        let mut monitor = PriceMonitor::new(1.0);
        monitor.record(100.0);
        let sample = monitor.record(101.0);
        assert!(!sample.significant_change);

        let sample = monitor.record(102.5);
        assert!(sample.significant_change);
    }

    #[test]
    fn test_last_price_updated_unconditionally() {
        let mut monitor = PriceMonitor::new(50.0);
        monitor.record(100.0);
        let sample = monitor.record(100.5);
        assert!(!sample.significant_change);
        // Baseline moved even though the change was insignificant
        assert_eq!(monitor.last_price(), Some(100.5));
    }

    #[tokio::test]
    async fn test_observe_price_reads_gateway() {
        let gateway = MockGateway::new().with_price(42.0);
        let mut monitor = PriceMonitor::new(1.0);

        let sample = monitor.observe_price(&gateway).await.unwrap();
        assert_eq!(sample.price, 42.0);
        assert_eq!(monitor.last_price(), Some(42.0));
    }

    #[tokio::test]
    async fn test_observe_price_propagates_gateway_error() {
        let gateway = MockGateway::new().with_price_error();
        let mut monitor = PriceMonitor::new(1.0);

        assert!(monitor.observe_price(&gateway).await.is_err());
        // A failed read must not disturb the stored baseline
        assert!(monitor.last_price().is_none());
    }
}
