//! Whirlpool account layouts, price/tick math and instruction building
//!
//! Accounts are parsed at fixed offsets from the raw anchor account data
//! (8-byte discriminator first). Instruction data is the anchor sighash
//! followed by borsh-serialized args.

use borsh::BorshSerialize;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::shared::errors::{GatewayError, TxError};

/// Ticks per tick array account
pub const TICK_ARRAY_SIZE: i32 = 88;

// Anchor instruction discriminators (sha256("global:<name>")[0..8])
const IX_OPEN_POSITION: [u8; 8] = [135, 128, 47, 77, 15, 152, 240, 49];
const IX_INCREASE_LIQUIDITY: [u8; 8] = [46, 156, 243, 118, 13, 205, 251, 178];
const IX_DECREASE_LIQUIDITY: [u8; 8] = [160, 38, 208, 111, 104, 91, 44, 1];
const IX_COLLECT_FEES: [u8; 8] = [164, 152, 207, 99, 30, 186, 19, 182];
const IX_CLOSE_POSITION: [u8; 8] = [123, 134, 81, 0, 49, 68, 98, 98];

/// Parsed Whirlpool pool account
#[derive(Debug, Clone)]
pub struct WhirlpoolAccount {
    pub tick_spacing: u16,
    pub liquidity: u128,
    pub sqrt_price: u128,
    pub tick_current_index: i32,
    pub token_mint_a: Pubkey,
    pub token_vault_a: Pubkey,
    pub token_mint_b: Pubkey,
    pub token_vault_b: Pubkey,
}

impl WhirlpoolAccount {
    pub const MIN_LEN: usize = 245;

    /// Parse the fields we need from raw account data.
    pub fn parse(data: &[u8]) -> Result<Self, GatewayError> {
        if data.len() < Self::MIN_LEN {
            return Err(GatewayError::MalformedAccount(format!(
                "whirlpool account too short: {} bytes",
                data.len()
            )));
        }

        let tick_spacing = read_u16(data, 41);
        if tick_spacing == 0 {
            return Err(GatewayError::MalformedAccount(
                "whirlpool account has zero tick spacing".to_string(),
            ));
        }

        Ok(Self {
            tick_spacing,
            liquidity: read_u128(data, 49),
            sqrt_price: read_u128(data, 65),
            tick_current_index: read_i32(data, 81),
            token_mint_a: read_pubkey(data, 101)?,
            token_vault_a: read_pubkey(data, 133)?,
            token_mint_b: read_pubkey(data, 181)?,
            token_vault_b: read_pubkey(data, 213)?,
        })
    }

    /// Pool price in UI terms (token B per token A)
    pub fn price(&self, decimals_a: u8, decimals_b: u8) -> f64 {
        sqrt_price_x64_to_price(self.sqrt_price, decimals_a, decimals_b)
    }
}

/// Parsed Whirlpool position account
#[derive(Debug, Clone)]
pub struct PositionAccount {
    pub whirlpool: Pubkey,
    pub position_mint: Pubkey,
    pub liquidity: u128,
    pub tick_lower_index: i32,
    pub tick_upper_index: i32,
}

impl PositionAccount {
    pub const MIN_LEN: usize = 96;

    pub fn parse(data: &[u8]) -> Result<Self, GatewayError> {
        if data.len() < Self::MIN_LEN {
            return Err(GatewayError::MalformedAccount(format!(
                "position account too short: {} bytes",
                data.len()
            )));
        }

        Ok(Self {
            whirlpool: read_pubkey(data, 8)?,
            position_mint: read_pubkey(data, 40)?,
            liquidity: read_u128(data, 72),
            tick_lower_index: read_i32(data, 88),
            tick_upper_index: read_i32(data, 92),
        })
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    bytemuck::pod_read_unaligned(&data[offset..offset + 2])
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    bytemuck::pod_read_unaligned(&data[offset..offset + 4])
}

fn read_u128(data: &[u8], offset: usize) -> u128 {
    bytemuck::pod_read_unaligned(&data[offset..offset + 16])
}

fn read_pubkey(data: &[u8], offset: usize) -> Result<Pubkey, GatewayError> {
    Pubkey::try_from(&data[offset..offset + 32])
        .map_err(|e| GatewayError::MalformedAccount(format!("bad pubkey at {}: {}", offset, e)))
}

// --- price/tick math ---

const Q64: f64 = 18446744073709551616.0; // 2^64

/// sqrt price (Q64.64) to UI price (token B per token A)
pub fn sqrt_price_x64_to_price(sqrt_price: u128, decimals_a: u8, decimals_b: u8) -> f64 {
    let sqrt = sqrt_price as f64 / Q64;
    let raw = sqrt * sqrt;
    raw * 10_f64.powi(decimals_a as i32 - decimals_b as i32)
}

/// UI price to the nearest tick index (floored)
pub fn price_to_tick(price: f64, decimals_a: u8, decimals_b: u8) -> i32 {
    let raw = price * 10_f64.powi(decimals_b as i32 - decimals_a as i32);
    (raw.ln() / 1.0001_f64.ln()).floor() as i32
}

/// Tick index back to UI price
pub fn tick_to_price(tick: i32, decimals_a: u8, decimals_b: u8) -> f64 {
    1.0001_f64.powi(tick) * 10_f64.powi(decimals_a as i32 - decimals_b as i32)
}

/// Align a tick down to a multiple of the pool's tick spacing
pub fn align_tick_down(tick: i32, tick_spacing: u16) -> i32 {
    let spacing = tick_spacing as i32;
    tick.div_euclid(spacing) * spacing
}

/// Align a tick up to a multiple of the pool's tick spacing
pub fn align_tick_up(tick: i32, tick_spacing: u16) -> i32 {
    let spacing = tick_spacing as i32;
    let aligned = align_tick_down(tick, tick_spacing);
    if aligned == tick {
        aligned
    } else {
        aligned + spacing
    }
}

/// Start tick of the tick array containing the given tick
pub fn tick_array_start_index(tick: i32, tick_spacing: u16) -> i32 {
    let span = tick_spacing as i32 * TICK_ARRAY_SIZE;
    tick.div_euclid(span) * span
}

/// Estimate the position liquidity deposited when supplying both token
/// amounts over [tick_lower, tick_upper] at the current sqrt price. The
/// chain recomputes exactly; this only feeds the liquidity_amount arg,
/// with the max amounts bounding the actual deposit.
pub fn estimate_liquidity(
    sqrt_price: u128,
    tick_lower: i32,
    tick_upper: i32,
    amount_a: u64,
    amount_b: u64,
) -> u128 {
    let sqrt_current = sqrt_price as f64 / Q64;
    let sqrt_lower = 1.0001_f64.powf(tick_lower as f64 / 2.0);
    let sqrt_upper = 1.0001_f64.powf(tick_upper as f64 / 2.0);

    if sqrt_current <= sqrt_lower {
        // All token A
        let l = amount_a as f64 * (sqrt_lower * sqrt_upper) / (sqrt_upper - sqrt_lower);
        return l.max(0.0) as u128;
    }
    if sqrt_current >= sqrt_upper {
        // All token B
        let l = amount_b as f64 / (sqrt_upper - sqrt_lower);
        return l.max(0.0) as u128;
    }

    let l_a = amount_a as f64 * (sqrt_current * sqrt_upper) / (sqrt_upper - sqrt_current);
    let l_b = amount_b as f64 / (sqrt_current - sqrt_lower);
    l_a.min(l_b).max(0.0) as u128
}

// --- PDA derivation ---

pub fn position_pda(program: &Pubkey, position_mint: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[b"position", position_mint.as_ref()], program)
}

pub fn tick_array_pda(program: &Pubkey, whirlpool: &Pubkey, start_tick: i32) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            b"tick_array",
            whirlpool.as_ref(),
            start_tick.to_string().as_bytes(),
        ],
        program,
    )
}

// --- instruction building ---

#[derive(BorshSerialize)]
struct OpenPositionArgs {
    position_bump: u8,
    tick_lower_index: i32,
    tick_upper_index: i32,
}

#[derive(BorshSerialize)]
struct IncreaseLiquidityArgs {
    liquidity_amount: u128,
    token_max_a: u64,
    token_max_b: u64,
}

#[derive(BorshSerialize)]
struct DecreaseLiquidityArgs {
    liquidity_amount: u128,
    token_min_a: u64,
    token_min_b: u64,
}

fn instruction_data<T: BorshSerialize>(discriminator: [u8; 8], args: &T) -> Result<Vec<u8>, TxError> {
    let mut data = discriminator.to_vec();
    args.serialize(&mut data)
        .map_err(|e| TxError::InstructionBuildFailed(format!("borsh serialize: {}", e)))?;
    Ok(data)
}

/// Accounts shared by the liquidity instructions
pub struct LiquidityAccounts {
    pub whirlpool: Pubkey,
    pub position: Pubkey,
    pub position_token_account: Pubkey,
    pub token_owner_account_a: Pubkey,
    pub token_owner_account_b: Pubkey,
    pub token_vault_a: Pubkey,
    pub token_vault_b: Pubkey,
    pub tick_array_lower: Pubkey,
    pub tick_array_upper: Pubkey,
}

#[allow(clippy::too_many_arguments)]
pub fn build_open_position_ix(
    program: &Pubkey,
    funder: &Pubkey,
    whirlpool: &Pubkey,
    position: &Pubkey,
    position_bump: u8,
    position_mint: &Pubkey,
    position_token_account: &Pubkey,
    tick_lower_index: i32,
    tick_upper_index: i32,
) -> Result<Instruction, TxError> {
    let data = instruction_data(
        IX_OPEN_POSITION,
        &OpenPositionArgs {
            position_bump,
            tick_lower_index,
            tick_upper_index,
        },
    )?;

    Ok(Instruction {
        program_id: *program,
        accounts: vec![
            AccountMeta::new(*funder, true),
            AccountMeta::new_readonly(*funder, false), // position owner
            AccountMeta::new(*position, false),
            AccountMeta::new(*position_mint, true),
            AccountMeta::new(*position_token_account, false),
            AccountMeta::new_readonly(*whirlpool, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(solana_sdk::system_program::id(), false),
            AccountMeta::new_readonly(solana_sdk::sysvar::rent::id(), false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
        ],
        data,
    })
}

pub fn build_increase_liquidity_ix(
    program: &Pubkey,
    authority: &Pubkey,
    accounts: &LiquidityAccounts,
    liquidity_amount: u128,
    token_max_a: u64,
    token_max_b: u64,
) -> Result<Instruction, TxError> {
    let data = instruction_data(
        IX_INCREASE_LIQUIDITY,
        &IncreaseLiquidityArgs {
            liquidity_amount,
            token_max_a,
            token_max_b,
        },
    )?;

    Ok(Instruction {
        program_id: *program,
        accounts: liquidity_account_metas(authority, accounts),
        data,
    })
}

pub fn build_decrease_liquidity_ix(
    program: &Pubkey,
    authority: &Pubkey,
    accounts: &LiquidityAccounts,
    liquidity_amount: u128,
) -> Result<Instruction, TxError> {
    let data = instruction_data(
        IX_DECREASE_LIQUIDITY,
        &DecreaseLiquidityArgs {
            liquidity_amount,
            token_min_a: 0,
            token_min_b: 0,
        },
    )?;

    Ok(Instruction {
        program_id: *program,
        accounts: liquidity_account_metas(authority, accounts),
        data,
    })
}

pub fn build_collect_fees_ix(
    program: &Pubkey,
    authority: &Pubkey,
    accounts: &LiquidityAccounts,
) -> Instruction {
    Instruction {
        program_id: *program,
        accounts: vec![
            AccountMeta::new(accounts.whirlpool, false),
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(accounts.position, false),
            AccountMeta::new_readonly(accounts.position_token_account, false),
            AccountMeta::new(accounts.token_owner_account_a, false),
            AccountMeta::new(accounts.token_vault_a, false),
            AccountMeta::new(accounts.token_owner_account_b, false),
            AccountMeta::new(accounts.token_vault_b, false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data: IX_COLLECT_FEES.to_vec(),
    }
}

pub fn build_close_position_ix(
    program: &Pubkey,
    authority: &Pubkey,
    receiver: &Pubkey,
    position: &Pubkey,
    position_mint: &Pubkey,
    position_token_account: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program,
        accounts: vec![
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(*receiver, false),
            AccountMeta::new(*position, false),
            AccountMeta::new(*position_mint, false),
            AccountMeta::new(*position_token_account, false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data: IX_CLOSE_POSITION.to_vec(),
    }
}

fn liquidity_account_metas(authority: &Pubkey, accounts: &LiquidityAccounts) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new(accounts.whirlpool, false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(*authority, true),
        AccountMeta::new(accounts.position, false),
        AccountMeta::new_readonly(accounts.position_token_account, false),
        AccountMeta::new(accounts.token_owner_account_a, false),
        AccountMeta::new(accounts.token_owner_account_b, false),
        AccountMeta::new(accounts.token_vault_a, false),
        AccountMeta::new(accounts.token_vault_b, false),
        AccountMeta::new(accounts.tick_array_lower, false),
        AccountMeta::new(accounts.tick_array_upper, false),
    ]
}
