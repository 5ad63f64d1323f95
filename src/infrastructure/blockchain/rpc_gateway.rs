//! Solana-backed pool gateway
//!
//! All chain reads and writes behind the `PoolGateway` trait. Reads go
//! through a shared RPC client with the configured per-call timeout;
//! writes are signed with the single wallet keypair and confirmed before
//! returning.

use async_trait::async_trait;
use serde_json::Value;
use solana_account_decoder::UiAccountData;
use solana_client::{rpc_client::RpcClient, rpc_request::TokenAccountsFilter};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::whirlpool::{
    align_tick_down, align_tick_up, build_close_position_ix, build_collect_fees_ix,
    build_decrease_liquidity_ix, build_increase_liquidity_ix, build_open_position_ix,
    estimate_liquidity, position_pda, price_to_tick, tick_array_pda, tick_array_start_index,
    tick_to_price, LiquidityAccounts, PositionAccount, WhirlpoolAccount,
};
use crate::domain::gateway::{PoolGateway, PoolMetadata, Position, TokenBalance};
use crate::shared::errors::{GatewayError, TxError};
use crate::shared::types::Token;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// SPL mint layout: decimals byte offset
const MINT_DECIMALS_OFFSET: usize = 44;

/// Static pool facts resolved once and cached
#[derive(Debug, Clone)]
struct PoolContext {
    token_a: Token,
    token_b: Token,
    token_vault_a: Pubkey,
    token_vault_b: Pubkey,
    tick_spacing: u16,
}

pub struct SolanaPoolGateway {
    rpc: RpcClient,
    wallet: Keypair,
    pool: Pubkey,
    program: Pubkey,
    context: RwLock<Option<PoolContext>>,
}

impl SolanaPoolGateway {
    pub fn new(
        rpc_url: String,
        timeout: Duration,
        wallet: Keypair,
        pool: Pubkey,
        program: Pubkey,
    ) -> Self {
        Self {
            rpc: RpcClient::new_with_timeout_and_commitment(
                rpc_url,
                timeout,
                CommitmentConfig::confirmed(),
            ),
            wallet,
            pool,
            program,
            context: RwLock::new(None),
        }
    }

    /// Fetch and parse the pool account
    fn fetch_pool(&self) -> Result<WhirlpoolAccount, GatewayError> {
        let account = self
            .rpc
            .get_account(&self.pool)
            .map_err(|e| GatewayError::PoolUnreadable(format!("{}: {}", self.pool, e)))?;
        WhirlpoolAccount::parse(&account.data)
    }

    fn fetch_mint_decimals(&self, mint: &Pubkey) -> Result<u8, GatewayError> {
        let account = self
            .rpc
            .get_account(mint)
            .map_err(|e| GatewayError::PoolUnreadable(format!("mint {}: {}", mint, e)))?;
        if account.data.len() <= MINT_DECIMALS_OFFSET {
            return Err(GatewayError::MalformedAccount(format!(
                "mint account {} too short",
                mint
            )));
        }
        Ok(account.data[MINT_DECIMALS_OFFSET])
    }

    /// Cached pool context, resolving it on first use
    async fn context(&self) -> Result<PoolContext, GatewayError> {
        if let Some(ctx) = self.context.read().await.clone() {
            return Ok(ctx);
        }

        let pool = self.fetch_pool()?;
        let decimals_a = self.fetch_mint_decimals(&pool.token_mint_a)?;
        let decimals_b = self.fetch_mint_decimals(&pool.token_mint_b)?;

        let ctx = PoolContext {
            token_a: Token::new(pool.token_mint_a, known_symbol(&pool.token_mint_a), decimals_a),
            token_b: Token::new(pool.token_mint_b, known_symbol(&pool.token_mint_b), decimals_b),
            token_vault_a: pool.token_vault_a,
            token_vault_b: pool.token_vault_b,
            tick_spacing: pool.tick_spacing,
        };

        info!(
            "Resolved pool {}: {}/{} (tick spacing {})",
            self.pool, ctx.token_a.symbol, ctx.token_b.symbol, ctx.tick_spacing
        );

        *self.context.write().await = Some(ctx.clone());
        Ok(ctx)
    }

    fn submit(&self, instructions: &[solana_sdk::instruction::Instruction], extra_signer: Option<&Keypair>) -> Result<String, TxError> {
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .map_err(|e| TxError::BlockhashUnavailable(e.to_string()))?;

        let message = Message::new(instructions, Some(&self.wallet.pubkey()));
        let mut transaction = Transaction::new_unsigned(message);
        match extra_signer {
            Some(signer) => transaction
                .try_sign(&[&self.wallet, signer], blockhash)
                .map_err(|e| TxError::SubmissionFailed(format!("signing: {}", e)))?,
            None => transaction
                .try_sign(&[&self.wallet], blockhash)
                .map_err(|e| TxError::SubmissionFailed(format!("signing: {}", e)))?,
        }

        let signature = self
            .rpc
            .send_and_confirm_transaction(&transaction)
            .map_err(|e| TxError::SubmissionFailed(e.to_string()))?;
        Ok(signature.to_string())
    }

    /// Position NFT candidates: wallet token accounts holding exactly one
    /// unit of a zero-decimal mint
    fn position_mint_candidates(&self) -> Result<Vec<Pubkey>, GatewayError> {
        let accounts = self
            .rpc
            .get_token_accounts_by_owner(
                &self.wallet.pubkey(),
                TokenAccountsFilter::ProgramId(spl_token::id()),
            )
            .map_err(|e| GatewayError::PositionLookupFailed(e.to_string()))?;

        let mut candidates = Vec::new();
        for keyed in accounts {
            if let UiAccountData::Json(parsed) = keyed.account.data {
                let info = &parsed.parsed["info"];
                let amount = info["tokenAmount"]["amount"].as_str().unwrap_or("0");
                let decimals = info["tokenAmount"]["decimals"].as_u64().unwrap_or(9);
                if amount == "1" && decimals == 0 {
                    if let Some(mint) = info["mint"].as_str() {
                        if let Ok(mint) = Pubkey::from_str(mint) {
                            candidates.push(mint);
                        }
                    }
                }
            }
        }
        Ok(candidates)
    }

    fn liquidity_accounts(
        &self,
        ctx: &PoolContext,
        position: &Pubkey,
        position_mint: &Pubkey,
        tick_lower: i32,
        tick_upper: i32,
    ) -> LiquidityAccounts {
        let owner = self.wallet.pubkey();
        LiquidityAccounts {
            whirlpool: self.pool,
            position: *position,
            position_token_account:
                spl_associated_token_account::get_associated_token_address(&owner, position_mint),
            token_owner_account_a: spl_associated_token_account::get_associated_token_address(
                &owner,
                &ctx.token_a.mint,
            ),
            token_owner_account_b: spl_associated_token_account::get_associated_token_address(
                &owner,
                &ctx.token_b.mint,
            ),
            token_vault_a: ctx.token_vault_a,
            token_vault_b: ctx.token_vault_b,
            tick_array_lower: tick_array_pda(
                &self.program,
                &self.pool,
                tick_array_start_index(tick_lower, ctx.tick_spacing),
            )
            .0,
            tick_array_upper: tick_array_pda(
                &self.program,
                &self.pool,
                tick_array_start_index(tick_upper, ctx.tick_spacing),
            )
            .0,
        }
    }
}

#[async_trait]
impl PoolGateway for SolanaPoolGateway {
    async fn current_price(&self) -> Result<f64, GatewayError> {
        let ctx = self.context().await?;
        let pool = self.fetch_pool()?;
        Ok(pool.price(ctx.token_a.decimals, ctx.token_b.decimals))
    }

    async fn list_positions(&self) -> Result<Vec<Position>, GatewayError> {
        let ctx = self.context().await?;
        let pool = self.fetch_pool()?;
        let current_price = pool.price(ctx.token_a.decimals, ctx.token_b.decimals);

        let mut positions = Vec::new();
        for mint in self.position_mint_candidates()? {
            let (address, _) = position_pda(&self.program, &mint);
            let account = match self.rpc.get_account(&address) {
                Ok(account) => account,
                // Not every NFT in the wallet is a position
                Err(_) => continue,
            };
            let parsed = match PositionAccount::parse(&account.data) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!("Skipping non-position account {}: {}", address, e);
                    continue;
                }
            };
            if parsed.whirlpool != self.pool {
                continue;
            }

            positions.push(Position {
                address: address.to_string(),
                token_a: ctx.token_a.clone(),
                token_b: ctx.token_b.clone(),
                liquidity: parsed.liquidity,
                lower_price: tick_to_price(
                    parsed.tick_lower_index,
                    ctx.token_a.decimals,
                    ctx.token_b.decimals,
                ),
                upper_price: tick_to_price(
                    parsed.tick_upper_index,
                    ctx.token_a.decimals,
                    ctx.token_b.decimals,
                ),
                current_price,
            });
        }
        Ok(positions)
    }

    async fn native_balance(&self) -> Result<f64, GatewayError> {
        let lamports = self
            .rpc
            .get_balance(&self.wallet.pubkey())
            .map_err(|e| GatewayError::BalanceLookupFailed(e.to_string()))?;
        Ok(lamports as f64 / LAMPORTS_PER_SOL)
    }

    async fn token_balances(&self) -> Result<HashMap<String, TokenBalance>, GatewayError> {
        let accounts = self
            .rpc
            .get_token_accounts_by_owner(
                &self.wallet.pubkey(),
                TokenAccountsFilter::ProgramId(spl_token::id()),
            )
            .map_err(|e| GatewayError::BalanceLookupFailed(e.to_string()))?;

        let mut balances = HashMap::new();
        for keyed in accounts {
            if let UiAccountData::Json(parsed) = keyed.account.data {
                if let Some((mint, balance)) = parse_token_account(&parsed.parsed) {
                    balances.insert(mint, balance);
                }
            }
        }
        Ok(balances)
    }

    async fn pool_metadata(&self) -> Result<PoolMetadata, GatewayError> {
        let ctx = self.context().await?;
        Ok(PoolMetadata {
            address: self.pool.to_string(),
            token_a: ctx.token_a,
            token_b: ctx.token_b,
            tick_spacing: ctx.tick_spacing,
        })
    }

    async fn open_position(
        &self,
        lower_price: f64,
        upper_price: f64,
        max_amount_a: u64,
        max_amount_b: u64,
    ) -> Result<String, TxError> {
        let ctx = self
            .context()
            .await
            .map_err(|e| TxError::SubmissionFailed(e.to_string()))?;
        let pool = self
            .fetch_pool()
            .map_err(|e| TxError::SubmissionFailed(e.to_string()))?;

        let decimals = (ctx.token_a.decimals, ctx.token_b.decimals);
        let mut tick_lower = align_tick_down(
            price_to_tick(lower_price, decimals.0, decimals.1),
            ctx.tick_spacing,
        );
        let mut tick_upper = align_tick_up(
            price_to_tick(upper_price, decimals.0, decimals.1),
            ctx.tick_spacing,
        );
        if tick_lower >= tick_upper {
            // Degenerate band after alignment; widen by one spacing each way
            tick_lower -= ctx.tick_spacing as i32;
            tick_upper += ctx.tick_spacing as i32;
        }

        let position_mint = Keypair::new();
        let (position, position_bump) = position_pda(&self.program, &position_mint.pubkey());
        let owner = self.wallet.pubkey();
        let position_token_account =
            spl_associated_token_account::get_associated_token_address(&owner, &position_mint.pubkey());

        let liquidity = estimate_liquidity(
            pool.sqrt_price,
            tick_lower,
            tick_upper,
            max_amount_a,
            max_amount_b,
        );
        if liquidity == 0 {
            return Err(TxError::InstructionBuildFailed(
                "zero liquidity for requested amounts".to_string(),
            ));
        }

        let open_ix = build_open_position_ix(
            &self.program,
            &owner,
            &self.pool,
            &position,
            position_bump,
            &position_mint.pubkey(),
            &position_token_account,
            tick_lower,
            tick_upper,
        )?;
        let accounts = self.liquidity_accounts(
            &ctx,
            &position,
            &position_mint.pubkey(),
            tick_lower,
            tick_upper,
        );
        let increase_ix = build_increase_liquidity_ix(
            &self.program,
            &owner,
            &accounts,
            liquidity,
            max_amount_a,
            max_amount_b,
        )?;

        debug!(
            "Opening position over ticks [{}, {}] with liquidity {}",
            tick_lower, tick_upper, liquidity
        );
        self.submit(&[open_ix, increase_ix], Some(&position_mint))
    }

    async fn close_position(&self, position_address: &str) -> Result<String, TxError> {
        let ctx = self
            .context()
            .await
            .map_err(|e| TxError::SubmissionFailed(e.to_string()))?;
        let position = Pubkey::from_str(position_address)
            .map_err(|e| TxError::InstructionBuildFailed(format!("bad position address: {}", e)))?;

        let account = self
            .rpc
            .get_account(&position)
            .map_err(|e| TxError::SubmissionFailed(format!("position fetch: {}", e)))?;
        let parsed = PositionAccount::parse(&account.data)
            .map_err(|e| TxError::SubmissionFailed(e.to_string()))?;

        let owner = self.wallet.pubkey();
        let position_token_account = spl_associated_token_account::get_associated_token_address(
            &owner,
            &parsed.position_mint,
        );
        let accounts = self.liquidity_accounts(
            &ctx,
            &position,
            &parsed.position_mint,
            parsed.tick_lower_index,
            parsed.tick_upper_index,
        );

        let mut instructions = Vec::new();
        if parsed.liquidity > 0 {
            instructions.push(build_decrease_liquidity_ix(
                &self.program,
                &owner,
                &accounts,
                parsed.liquidity,
            )?);
        } else {
            warn!("Position {} holds no liquidity, closing empty", position);
        }
        instructions.push(build_collect_fees_ix(&self.program, &owner, &accounts));
        instructions.push(build_close_position_ix(
            &self.program,
            &owner,
            &owner,
            &position,
            &parsed.position_mint,
            &position_token_account,
        ));

        self.submit(&instructions, None)
    }
}

/// Symbols for well-known mints; everything else shows a shortened address
fn known_symbol(mint: &Pubkey) -> String {
    match mint.to_string().as_str() {
        "So11111111111111111111111111111111111111112" => "SOL".to_string(),
        "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v" => "USDC".to_string(),
        "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB" => "USDT".to_string(),
        other => other.chars().take(4).collect(),
    }
}

/// Extract mint and balance from a jsonParsed SPL token account
fn parse_token_account(parsed: &Value) -> Option<(String, TokenBalance)> {
    let info = parsed.get("info")?;
    let mint = info.get("mint")?.as_str()?.to_string();
    let token_amount = info.get("tokenAmount")?;
    let amount = token_amount.get("amount")?.as_str()?.parse::<u64>().ok()?;
    let decimals = token_amount.get("decimals")?.as_u64()? as u8;
    let ui_amount = token_amount
        .get("uiAmount")
        .and_then(|v| v.as_f64())
        .unwrap_or(amount as f64 / 10_f64.powi(decimals as i32));
    Some((
        mint,
        TokenBalance {
            amount,
            decimals,
            ui_amount,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_token_account() {
        let parsed = json!({
            "info": {
                "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                "tokenAmount": {
                    "amount": "123456789",
                    "decimals": 6,
                    "uiAmount": 123.456789
                }
            },
            "type": "account"
        });

        let (mint, balance) = parse_token_account(&parsed).unwrap();
        assert_eq!(mint, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
        assert_eq!(balance.amount, 123_456_789);
        assert_eq!(balance.decimals, 6);
        assert!((balance.ui_amount - 123.456789).abs() < 1e-9);
    }

    #[test]
    fn test_parse_token_account_rejects_malformed() {
        assert!(parse_token_account(&json!({})).is_none());
        assert!(parse_token_account(&json!({"info": {"mint": 5}})).is_none());
    }

    #[test]
    fn test_known_symbol_fallback() {
        assert_eq!(
            known_symbol(&Pubkey::from_str("So11111111111111111111111111111111111111112").unwrap()),
            "SOL"
        );
        let unknown = Pubkey::new_unique();
        assert_eq!(known_symbol(&unknown).len(), 4);
    }
}
