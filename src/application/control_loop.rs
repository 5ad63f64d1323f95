//! Fixed-interval control loop
//!
//! One timer, one iteration at a time: observe price, positions and
//! balances, decide, rebalance. Each step's failure is contained at the
//! iteration boundary; the next tick retries naturally. A tick that
//! fires while the previous iteration is still running is skipped, never
//! overlapped - overlapping iterations could double-submit transactions
//! from the same signer.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::domain::gateway::PoolGateway;
use crate::domain::monitor::{
    BalanceMonitor, BalanceSnapshot, PositionMonitor, PositionSummary, PriceMonitor, PriceSample,
};
use crate::domain::notification::{NotificationSink, Severity};
use crate::domain::rebalance::{rebalance_reason, PositionLifecycleManager};
use crate::shared::errors::{AppError, GatewayError};

const STATS_REPORT_INTERVAL: Duration = Duration::from_secs(300);

/// Control loop configuration
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    pub check_interval: Duration,
    pub price_range_percent: f64,
    pub rebalance_threshold_percent: f64,
    pub min_native_balance_sol: f64,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            price_range_percent: 5.0,
            rebalance_threshold_percent: 1.0,
            min_native_balance_sol: 0.05,
        }
    }
}

/// Lifecycle state of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Initializing,
    Running,
}

/// Latest observations, exposed to the host while the loop is active
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub price: Option<PriceSample>,
    pub positions: Option<PositionSummary>,
    pub balances: Option<BalanceSnapshot>,
    pub updated_at: DateTime<Utc>,
}

/// Iteration counters, logged periodically
#[derive(Debug)]
struct LoopStats {
    started_at: Instant,
    iterations: u64,
    rebalances_triggered: u64,
    rebalances_succeeded: u64,
    skipped_ticks: u64,
    last_report: Instant,
}

impl LoopStats {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            iterations: 0,
            rebalances_triggered: 0,
            rebalances_succeeded: 0,
            skipped_ticks: 0,
            last_report: now,
        }
    }
}

pub struct ControlLoop {
    config: ControlLoopConfig,
    gateway: Arc<dyn PoolGateway>,
    notifier: Arc<dyn NotificationSink>,
    state: RwLock<LoopState>,
    price_monitor: Mutex<PriceMonitor>,
    position_monitor: PositionMonitor,
    balance_monitor: BalanceMonitor,
    lifecycle: RwLock<Option<Arc<PositionLifecycleManager>>>,
    /// Single-flight guard: held for the whole of one iteration
    iteration_guard: Mutex<()>,
    status: RwLock<Option<StatusSnapshot>>,
    stats: RwLock<LoopStats>,
    /// Run flag of the currently armed timer; a fresh one per start()
    timer_flag: RwLock<Option<Arc<AtomicBool>>>,
}

impl ControlLoop {
    pub fn new(
        gateway: Arc<dyn PoolGateway>,
        notifier: Arc<dyn NotificationSink>,
        config: ControlLoopConfig,
    ) -> Self {
        Self {
            price_monitor: Mutex::new(PriceMonitor::new(config.rebalance_threshold_percent)),
            position_monitor: PositionMonitor::new(),
            balance_monitor: BalanceMonitor::new(config.min_native_balance_sol),
            config,
            gateway,
            notifier,
            state: RwLock::new(LoopState::Stopped),
            lifecycle: RwLock::new(None),
            iteration_guard: Mutex::new(()),
            status: RwLock::new(None),
            stats: RwLock::new(LoopStats::new()),
            timer_flag: RwLock::new(None),
        }
    }

    /// Start the loop: resolve pool metadata (the only fatal failure),
    /// notify, arm the timer, and run one iteration synchronously.
    pub async fn start(self: &Arc<Self>) -> Result<(), AppError> {
        {
            let mut state = self.state.write().await;
            // Initializing counts as active too: a second start() racing
            // the first would arm a second timer that stop() could never
            // disarm.
            if *state != LoopState::Stopped {
                warn!("start() called while already active, ignoring");
                return Ok(());
            }
            *state = LoopState::Initializing;
        }

        let metadata = match self.gateway.pool_metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                *self.state.write().await = LoopState::Stopped;
                error!("Startup aborted, pool metadata unresolvable: {}", e);
                return Err(AppError::StartupError(format!(
                    "pool metadata unresolvable: {}",
                    e
                )));
            }
        };

        info!(
            "Managing pool {} ({}/{})",
            metadata.address, metadata.token_a.symbol, metadata.token_b.symbol
        );

        let lifecycle = Arc::new(PositionLifecycleManager::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.notifier),
            metadata.clone(),
            self.config.price_range_percent,
        ));
        *self.lifecycle.write().await = Some(lifecycle);
        *self.stats.write().await = LoopStats::new();

        let mut fields = HashMap::new();
        fields.insert("pool".to_string(), metadata.address.clone());
        fields.insert(
            "pair".to_string(),
            format!("{}/{}", metadata.token_a.symbol, metadata.token_b.symbol),
        );
        fields.insert(
            "interval_secs".to_string(),
            self.config.check_interval.as_secs().to_string(),
        );
        self.notifier
            .notify("Bot started", "Position monitoring active", Severity::Info, fields)
            .await;

        *self.state.write().await = LoopState::Running;

        // Arm the recurring timer. The flag belongs to this start(); a
        // stale task from an earlier run sees its own flag lowered and
        // exits without ticking.
        let flag = Arc::new(AtomicBool::new(true));
        *self.timer_flag.write().await = Some(Arc::clone(&flag));

        let this = Arc::clone(self);
        let interval = self.config.check_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                this.run_iteration().await;
            }
        });

        // First iteration runs before start() returns
        self.run_iteration().await;

        Ok(())
    }

    /// Stop the loop. Future ticks are disarmed; an iteration already in
    /// flight runs to completion.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            if *state != LoopState::Running {
                warn!("stop() called while not running, ignoring");
                return;
            }
            *state = LoopState::Stopped;
        }

        if let Some(flag) = self.timer_flag.write().await.take() {
            flag.store(false, Ordering::SeqCst);
        }

        self.notifier
            .notify(
                "Bot stopped",
                "Position monitoring halted",
                Severity::Info,
                HashMap::new(),
            )
            .await;
        info!("Control loop stopped");
    }

    pub async fn is_active(&self) -> bool {
        *self.state.read().await == LoopState::Running
    }

    /// Latest observations; None while the loop is stopped
    pub async fn status(&self) -> Option<StatusSnapshot> {
        if !self.is_active().await {
            return None;
        }
        self.status.read().await.clone()
    }

    /// One iteration: observe everything, decide, act. Never panics and
    /// never returns an error; each step degrades on its own.
    pub async fn run_iteration(&self) {
        let _guard = match self.iteration_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Tick fired while previous iteration still running, skipping");
                self.stats.write().await.skipped_ticks += 1;
                return;
            }
        };

        let price_sample = self.observe_price_step().await;

        // Downstream steps fall back to the last known price so one bad
        // read does not blind the whole iteration.
        let current_price = match &price_sample {
            Some(sample) => Some(sample.price),
            None => self.price_monitor.lock().await.last_price(),
        };

        let position_summary = self.observe_positions_step(current_price).await;
        let balance_snapshot = self.observe_balances_step().await;

        *self.status.write().await = Some(StatusSnapshot {
            price: price_sample.clone(),
            positions: position_summary.clone(),
            balances: balance_snapshot,
            updated_at: Utc::now(),
        });

        if let (Some(price), Some(positions)) = (&price_sample, &position_summary) {
            if let Some(reason) = rebalance_reason(price, positions) {
                info!("Rebalance required: {}", reason.as_str());
                self.stats.write().await.rebalances_triggered += 1;

                let lifecycle = self.lifecycle.read().await.clone();
                match lifecycle {
                    Some(lifecycle) => {
                        if lifecycle.rebalance_if_needed().await {
                            self.stats.write().await.rebalances_succeeded += 1;
                        }
                    }
                    None => error!("Rebalance skipped: lifecycle manager not initialized"),
                }
            }
        }

        let mut stats = self.stats.write().await;
        stats.iterations += 1;
        if stats.last_report.elapsed() >= STATS_REPORT_INTERVAL {
            info!(
                "📊 Loop stats: {} iterations, {} rebalances triggered, {} succeeded, {} ticks skipped, uptime {:.1} min",
                stats.iterations,
                stats.rebalances_triggered,
                stats.rebalances_succeeded,
                stats.skipped_ticks,
                stats.started_at.elapsed().as_secs_f64() / 60.0
            );
            stats.last_report = Instant::now();
        }
    }

    async fn observe_price_step(&self) -> Option<PriceSample> {
        let mut monitor = self.price_monitor.lock().await;
        match monitor.observe_price(self.gateway.as_ref()).await {
            Ok(sample) => Some(sample),
            Err(e) => {
                error!("Price check failed: {}", e);
                self.notify_step_error("Price check failed", &e).await;
                None
            }
        }
    }

    async fn observe_positions_step(&self, current_price: Option<f64>) -> Option<PositionSummary> {
        let price = match current_price {
            Some(price) => price,
            None => {
                error!("Position check skipped: no price sample available");
                return None;
            }
        };
        match self
            .position_monitor
            .observe_positions(self.gateway.as_ref(), price)
            .await
        {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!("Position check failed: {}", e);
                self.notify_step_error("Position check failed", &e).await;
                None
            }
        }
    }

    async fn observe_balances_step(&self) -> Option<BalanceSnapshot> {
        match self
            .balance_monitor
            .observe_balances(self.gateway.as_ref(), self.notifier.as_ref())
            .await
        {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                error!("Balance check failed: {}", e);
                self.notify_step_error("Balance check failed", &e).await;
                None
            }
        }
    }

    async fn notify_step_error(&self, title: &str, err: &GatewayError) {
        self.notifier
            .notify(title, &err.to_string(), Severity::Error, HashMap::new())
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_position, MockGateway, MockNotifier};

    fn control_loop(
        gateway: MockGateway,
    ) -> (Arc<ControlLoop>, Arc<MockGateway>, Arc<MockNotifier>) {
        let gateway = Arc::new(gateway);
        let notifier = Arc::new(MockNotifier::new());
        let config = ControlLoopConfig {
            check_interval: Duration::from_secs(60),
            ..Default::default()
        };
        let control = Arc::new(ControlLoop::new(gateway.clone(), notifier.clone(), config));
        (control, gateway, notifier)
    }

    #[tokio::test]
    async fn test_start_transitions_and_runs_first_iteration() {
        let gateway = MockGateway::new()
            .with_price(100.0)
            .with_positions(vec![test_position(90.0, 110.0)]);
        let (control, _gateway, notifier) = control_loop(gateway);

        assert!(!control.is_active().await);
        control.start().await.unwrap();
        assert!(control.is_active().await);

        // First iteration ran synchronously, so status is already there
        let status = control.status().await.unwrap();
        assert_eq!(status.price.unwrap().price, 100.0);
        assert_eq!(status.positions.unwrap().count, 1);

        let titles: Vec<String> = notifier.sent().iter().map(|n| n.title.clone()).collect();
        assert_eq!(titles, vec!["Bot started"]);

        control.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_single_notification() {
        let gateway = MockGateway::new()
            .with_price(100.0)
            .with_positions(vec![test_position(90.0, 110.0)]);
        let (control, _gateway, notifier) = control_loop(gateway);

        control.start().await.unwrap();
        control.start().await.unwrap();

        let started = notifier
            .sent()
            .iter()
            .filter(|n| n.title == "Bot started")
            .count();
        assert_eq!(started, 1);

        control.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_start_arms_single_timer() {
        let gateway = MockGateway::new()
            .with_price(100.0)
            .with_positions(vec![test_position(90.0, 110.0)])
            .with_metadata_delay(Duration::from_millis(100));
        let (control, gateway, notifier) = control_loop(gateway);

        // Second start() lands while the first is still resolving pool
        // metadata; it must no-op instead of arming a second timer.
        let first = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.start().await })
        };
        let second = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.start().await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let started = notifier
            .sent()
            .iter()
            .filter(|n| n.title == "Bot started")
            .count();
        assert_eq!(started, 1);

        control.stop().await;
        let calls_at_stop = gateway.price_calls();

        // A leaked timer would keep driving iterations past stop()
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(gateway.price_calls(), calls_at_stop);
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_silent() {
        let gateway = MockGateway::new();
        let (control, _gateway, notifier) = control_loop(gateway);

        control.stop().await;
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_stop_notifies_and_deactivates() {
        let gateway = MockGateway::new()
            .with_price(100.0)
            .with_positions(vec![test_position(90.0, 110.0)]);
        let (control, _gateway, notifier) = control_loop(gateway);

        control.start().await.unwrap();
        control.stop().await;

        assert!(!control.is_active().await);
        assert!(control.status().await.is_none());
        let titles: Vec<String> = notifier.sent().iter().map(|n| n.title.clone()).collect();
        assert_eq!(titles, vec!["Bot started", "Bot stopped"]);
    }

    #[tokio::test]
    async fn test_metadata_failure_is_fatal() {
        let gateway = MockGateway::new().with_metadata_error();
        let (control, _gateway, notifier) = control_loop(gateway);

        assert!(control.start().await.is_err());
        assert!(!control.is_active().await);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_guard_skips_overlapping_tick() {
        let gateway = MockGateway::new()
            .with_price(100.0)
            .with_positions(vec![test_position(90.0, 110.0)])
            .with_price_delay(Duration::from_millis(500));
        let (control, gateway, _notifier) = control_loop(gateway);

        // Two concurrent triggers: the second must be skipped, not queued
        let first = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.run_iteration().await })
        };
        let second = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.run_iteration().await })
        };
        first.await.unwrap();
        second.await.unwrap();

        let stats = control.stats.read().await;
        assert_eq!(stats.iterations, 1);
        assert_eq!(stats.skipped_ticks, 1);
    }

    #[tokio::test]
    async fn test_price_failure_degrades_not_crashes() {
        let gateway = MockGateway::new()
            .with_price_error()
            .with_positions(vec![test_position(90.0, 110.0)]);
        let (control, _gateway, notifier) = control_loop(gateway);

        control.start().await.unwrap();

        // Price failed and there is no previous price, so the position
        // step degrades too; balances still observed.
        let status = control.status().await.unwrap();
        assert!(status.price.is_none());
        assert!(status.positions.is_none());
        assert!(status.balances.is_some());

        let errors = notifier
            .sent()
            .iter()
            .filter(|n| n.severity == Severity::Error)
            .count();
        assert_eq!(errors, 1);

        control.stop().await;
    }

    #[tokio::test]
    async fn test_empty_wallet_triggers_rebalance_create() {
        let gateway = MockGateway::new()
            .with_price(100.0)
            .with_token_balance_a(1_000_000)
            .with_token_balance_b(1_000_000);
        let (control, gateway, _notifier) = control_loop(gateway);

        control.start().await.unwrap();

        assert_eq!(gateway.open_calls().len(), 1);
        let stats = control.stats.read().await;
        assert_eq!(stats.rebalances_triggered, 1);
        assert_eq!(stats.rebalances_succeeded, 1);
        drop(stats);

        control.stop().await;
    }
}
