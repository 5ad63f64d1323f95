use anyhow::{Context, Result};
use clap::Parser;
use solana_sdk::signature::read_keypair_file;
use std::sync::Arc;
use tracing::info;

use poolkeeper::application::{ControlLoop, ControlLoopConfig};
use poolkeeper::domain::notification::NotificationSink;
use poolkeeper::infrastructure::blockchain::SolanaPoolGateway;
use poolkeeper::infrastructure::notification::{LogNotifier, WebhookNotifier};
use poolkeeper::shared::config::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Automated rebalancer for a single Orca Whirlpool position")]
struct Args {
    /// Path to config file
    #[arg(long, default_value = "Config.toml")]
    config: String,

    /// RPC endpoint URL (overrides config)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Path to keypair file (overrides config)
    #[arg(long)]
    keypair: Option<String>,

    /// Whirlpool address to manage (overrides config)
    #[arg(long)]
    pool: Option<String>,

    /// Seconds between checks (overrides config)
    #[arg(long)]
    interval: Option<u64>,

    /// Webhook URL for notifications (overrides config)
    #[arg(long)]
    webhook_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    // Load configuration with priority: CLI args > Config file
    let mut config = Config::from_file(&args.config)?;
    if let Some(rpc_url) = args.rpc_url {
        config.rpc.url = rpc_url;
    }
    if let Some(keypair) = args.keypair {
        config.wallet.keypair = keypair;
    }
    if let Some(pool) = args.pool {
        config.pool.address = pool;
    }
    if let Some(interval) = args.interval {
        config.strategy.check_interval_secs = interval;
    }
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let wallet = read_keypair_file(&config.wallet.keypair)
        .map_err(|e| anyhow::anyhow!("read keypair {}: {}", config.wallet.keypair, e))?;

    let gateway = Arc::new(SolanaPoolGateway::new(
        config.rpc.url.clone(),
        config.rpc_timeout(),
        wallet,
        config.pool_address()?,
        config.whirlpool_program()?,
    ));

    let webhook_url = args.webhook_url.or_else(|| {
        config
            .notifications
            .as_ref()
            .and_then(|n| n.webhook_url.clone())
    });
    let notifier: Arc<dyn NotificationSink> = match webhook_url {
        Some(url) => {
            info!("Notifications via webhook");
            Arc::new(WebhookNotifier::new(url))
        }
        None => Arc::new(LogNotifier),
    };

    let control = Arc::new(ControlLoop::new(
        gateway,
        notifier,
        ControlLoopConfig {
            check_interval: config.check_interval(),
            price_range_percent: config.strategy.price_range_percent,
            rebalance_threshold_percent: config.strategy.rebalance_threshold_percent,
            min_native_balance_sol: config.strategy.min_native_balance_sol,
        },
    ));

    control.start().await.context("start control loop")?;

    tokio::signal::ctrl_c()
        .await
        .context("listen for shutdown signal")?;
    info!("Shutdown signal received");
    control.stop().await;

    Ok(())
}
