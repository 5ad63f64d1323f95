//! In-crate test doubles for the gateway and notification seams

use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;

use crate::domain::gateway::{PoolGateway, PoolMetadata, Position, TokenBalance};
use crate::domain::notification::{NotificationSink, Severity};
use crate::shared::errors::{GatewayError, TxError};
use crate::shared::types::Token;

pub const TEST_MINT_A: &str = "So11111111111111111111111111111111111111112";
pub const TEST_MINT_B: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

pub fn test_metadata() -> PoolMetadata {
    PoolMetadata {
        address: "HJPjoWUrhoZzkNfRpHuieeFk9WcZWjwy6PBjZ81ngndJ".to_string(),
        token_a: Token::new(Pubkey::from_str(TEST_MINT_A).unwrap(), "SOL", 9),
        token_b: Token::new(Pubkey::from_str(TEST_MINT_B).unwrap(), "USDC", 6),
        tick_spacing: 64,
    }
}

/// Position with a unique address, observed at price 100.0
pub fn test_position(lower: f64, upper: f64) -> Position {
    Position {
        address: Pubkey::new_unique().to_string(),
        token_a: Token::new(Pubkey::from_str(TEST_MINT_A).unwrap(), "SOL", 9),
        token_b: Token::new(Pubkey::from_str(TEST_MINT_B).unwrap(), "USDC", 6),
        liquidity: 1_000_000,
        lower_price: lower,
        upper_price: upper,
        current_price: 100.0,
    }
}

/// Recorded open_position arguments
#[derive(Debug, Clone)]
pub struct OpenCall {
    pub lower_price: f64,
    pub upper_price: f64,
    pub max_amount_a: u64,
    pub max_amount_b: u64,
}

/// Scripted gateway: fixed responses, recorded writes, optional failures.
pub struct MockGateway {
    price: f64,
    price_error: bool,
    price_delay: Option<Duration>,
    price_calls: AtomicUsize,
    positions: Mutex<Vec<Position>>,
    position_error: bool,
    native_balance: f64,
    balance_error: bool,
    token_balances: HashMap<String, TokenBalance>,
    metadata_error: bool,
    metadata_delay: Option<Duration>,
    open_error: bool,
    open_calls: Mutex<Vec<OpenCall>>,
    /// Number of close_position calls allowed to succeed; None = all
    close_successes: Option<usize>,
    close_calls: Mutex<Vec<String>>,
    signature_counter: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            price: 100.0,
            price_error: false,
            price_delay: None,
            price_calls: AtomicUsize::new(0),
            positions: Mutex::new(Vec::new()),
            position_error: false,
            native_balance: 1.0,
            balance_error: false,
            token_balances: HashMap::new(),
            metadata_error: false,
            metadata_delay: None,
            open_error: false,
            open_calls: Mutex::new(Vec::new()),
            close_successes: None,
            close_calls: Mutex::new(Vec::new()),
            signature_counter: AtomicUsize::new(0),
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn with_price_error(mut self) -> Self {
        self.price_error = true;
        self
    }

    pub fn with_price_delay(mut self, delay: Duration) -> Self {
        self.price_delay = Some(delay);
        self
    }

    pub fn with_positions(self, positions: Vec<Position>) -> Self {
        *self.positions.lock().unwrap() = positions;
        self
    }

    pub fn with_position_error(mut self) -> Self {
        self.position_error = true;
        self
    }

    pub fn with_native_balance(mut self, sol: f64) -> Self {
        self.native_balance = sol;
        self
    }

    pub fn with_balance_error(mut self) -> Self {
        self.balance_error = true;
        self
    }

    pub fn with_token_balance(mut self, mint: &str, amount: u64, decimals: u8) -> Self {
        self.token_balances.insert(
            mint.to_string(),
            TokenBalance {
                amount,
                decimals,
                ui_amount: amount as f64 / 10_f64.powi(decimals as i32),
            },
        );
        self
    }

    pub fn with_token_balance_a(self, amount: u64) -> Self {
        self.with_token_balance(TEST_MINT_A, amount, 9)
    }

    pub fn with_token_balance_b(self, amount: u64) -> Self {
        self.with_token_balance(TEST_MINT_B, amount, 6)
    }

    pub fn with_metadata_error(mut self) -> Self {
        self.metadata_error = true;
        self
    }

    pub fn with_metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = Some(delay);
        self
    }

    pub fn with_open_error(mut self) -> Self {
        self.open_error = true;
        self
    }

    pub fn with_close_error_after(mut self, successes: usize) -> Self {
        self.close_successes = Some(successes);
        self
    }

    pub fn open_calls(&self) -> Vec<OpenCall> {
        self.open_calls.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> Vec<String> {
        self.close_calls.lock().unwrap().clone()
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    fn next_signature(&self, prefix: &str) -> String {
        let n = self.signature_counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-sig-{}", prefix, n)
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolGateway for MockGateway {
    async fn current_price(&self) -> Result<f64, GatewayError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.price_delay {
            tokio::time::sleep(delay).await;
        }
        if self.price_error {
            return Err(GatewayError::PoolUnreadable("mock price error".to_string()));
        }
        Ok(self.price)
    }

    async fn list_positions(&self) -> Result<Vec<Position>, GatewayError> {
        if self.position_error {
            return Err(GatewayError::PositionLookupFailed(
                "mock position error".to_string(),
            ));
        }
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn native_balance(&self) -> Result<f64, GatewayError> {
        if self.balance_error {
            return Err(GatewayError::BalanceLookupFailed(
                "mock balance error".to_string(),
            ));
        }
        Ok(self.native_balance)
    }

    async fn token_balances(&self) -> Result<HashMap<String, TokenBalance>, GatewayError> {
        if self.balance_error {
            return Err(GatewayError::BalanceLookupFailed(
                "mock balance error".to_string(),
            ));
        }
        Ok(self.token_balances.clone())
    }

    async fn pool_metadata(&self) -> Result<PoolMetadata, GatewayError> {
        if let Some(delay) = self.metadata_delay {
            tokio::time::sleep(delay).await;
        }
        if self.metadata_error {
            return Err(GatewayError::PoolUnreadable(
                "mock metadata error".to_string(),
            ));
        }
        Ok(test_metadata())
    }

    async fn open_position(
        &self,
        lower_price: f64,
        upper_price: f64,
        max_amount_a: u64,
        max_amount_b: u64,
    ) -> Result<String, TxError> {
        self.open_calls.lock().unwrap().push(OpenCall {
            lower_price,
            upper_price,
            max_amount_a,
            max_amount_b,
        });
        if self.open_error {
            return Err(TxError::SubmissionFailed("mock open error".to_string()));
        }
        Ok(self.next_signature("open"))
    }

    async fn close_position(&self, position_address: &str) -> Result<String, TxError> {
        let attempted = {
            let mut calls = self.close_calls.lock().unwrap();
            calls.push(position_address.to_string());
            calls.len()
        };
        if let Some(successes) = self.close_successes {
            if attempted > successes {
                return Err(TxError::SubmissionFailed("mock close error".to_string()));
            }
        }
        self.positions
            .lock()
            .unwrap()
            .retain(|p| p.address != position_address);
        Ok(self.next_signature("close"))
    }
}

/// One captured notification
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub fields: HashMap<String, String>,
}

/// Records notifications instead of delivering them.
pub struct MockNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for MockNotifier {
    async fn notify(
        &self,
        title: &str,
        body: &str,
        severity: Severity,
        fields: HashMap<String, String>,
    ) {
        self.sent.lock().unwrap().push(SentNotification {
            title: title.to_string(),
            body: body.to_string(),
            severity,
            fields,
        });
    }
}
