//! Raydium AMM v4 pool state
//!
//! # WARNING: Layout mirrors `LiquidityStateV4` (752 bytes)
//! Offsets are also used by the program subscription filters in
//! `stream::listener`, keep them in sync.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use super::program::{SWAP_FEE_DENOMINATOR, SWAP_FEE_NUMERATOR};
use crate::error::{Error, Result};

/// Size of a v4 pool account
pub const POOL_ACCOUNT_SIZE: usize = 752;

/// Byte offsets used by memcmp filters
pub const STATUS_OFFSET: usize = 0;
pub const BASE_MINT_OFFSET: usize = 400;
pub const QUOTE_MINT_OFFSET: usize = 432;
pub const MARKET_PROGRAM_OFFSET: usize = 560;

/// Raw on-chain layout. Only the fields the bot reads are named.
#[derive(Debug, Clone, BorshDeserialize, BorshSerialize)]
struct LiquidityStateV4 {
    status: u64,
    _nonce: u64,
    _max_order: u64,
    _depth: u64,
    base_decimal: u64,
    quote_decimal: u64,
    /// state .. baseNeedTakePnl style bookkeeping
    _params: [u64; 22],
    pool_open_time: u64,
    _punish_and_init: [u64; 3],
    /// swap volume and fee counters (u128/u64 mix)
    _swap_stats: [u8; 80],
    base_vault: [u8; 32],
    quote_vault: [u8; 32],
    base_mint: [u8; 32],
    quote_mint: [u8; 32],
    lp_mint: [u8; 32],
    open_orders: [u8; 32],
    market_id: [u8; 32],
    market_program_id: [u8; 32],
    target_orders: [u8; 32],
    _withdraw_queue: [u8; 32],
    _lp_vault: [u8; 32],
    owner: [u8; 32],
    lp_reserve: u64,
    _padding: [u64; 3],
}

/// Decoded pool, oriented so that `quote_mint` is the configured quote token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRecord {
    pub status: u64,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub lp_mint: Pubkey,
    pub lp_reserve: u64,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program_id: Pubkey,
    pub owner: Pubkey,
    /// Unix seconds the pool opens for trading
    pub open_time: u64,
    /// True when base and quote were swapped relative to the on-chain layout
    pub flipped: bool,
}

impl PoolRecord {
    /// Decode raw account bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < POOL_ACCOUNT_SIZE {
            return Err(Error::Decode(format!(
                "pool account is {} bytes, expected {}",
                data.len(),
                POOL_ACCOUNT_SIZE
            )));
        }

        let raw = LiquidityStateV4::deserialize(&mut &data[..POOL_ACCOUNT_SIZE])
            .map_err(|e| Error::Decode(format!("pool borsh decode failed: {}", e)))?;

        Ok(Self {
            status: raw.status,
            base_mint: Pubkey::new_from_array(raw.base_mint),
            quote_mint: Pubkey::new_from_array(raw.quote_mint),
            base_vault: Pubkey::new_from_array(raw.base_vault),
            quote_vault: Pubkey::new_from_array(raw.quote_vault),
            base_decimals: raw.base_decimal as u8,
            quote_decimals: raw.quote_decimal as u8,
            lp_mint: Pubkey::new_from_array(raw.lp_mint),
            lp_reserve: raw.lp_reserve,
            open_orders: Pubkey::new_from_array(raw.open_orders),
            target_orders: Pubkey::new_from_array(raw.target_orders),
            market_id: Pubkey::new_from_array(raw.market_id),
            market_program_id: Pubkey::new_from_array(raw.market_program_id),
            owner: Pubkey::new_from_array(raw.owner),
            open_time: raw.pool_open_time,
            flipped: false,
        })
    }

    /// Re-orient around `quote`. Returns None when neither side is the quote token.
    pub fn oriented(mut self, quote: &Pubkey) -> Option<Self> {
        if self.quote_mint == *quote {
            return Some(self);
        }
        if self.base_mint != *quote {
            return None;
        }

        std::mem::swap(&mut self.base_mint, &mut self.quote_mint);
        std::mem::swap(&mut self.base_vault, &mut self.quote_vault);
        std::mem::swap(&mut self.base_decimals, &mut self.quote_decimals);
        self.flipped = !self.flipped;
        Some(self)
    }

    /// Vaults in the pool's native (coin, pc) order, as the swap instruction expects
    pub fn amm_vaults(&self) -> (Pubkey, Pubkey) {
        if self.flipped {
            (self.quote_vault, self.base_vault)
        } else {
            (self.base_vault, self.quote_vault)
        }
    }

    /// Encode back into the on-chain layout, test fixtures only
    #[cfg(test)]
    pub fn encode(&self) -> Vec<u8> {
        let (base_mint, quote_mint, base_vault, quote_vault, base_dec, quote_dec) = if self.flipped
        {
            (
                self.quote_mint,
                self.base_mint,
                self.quote_vault,
                self.base_vault,
                self.quote_decimals,
                self.base_decimals,
            )
        } else {
            (
                self.base_mint,
                self.quote_mint,
                self.base_vault,
                self.quote_vault,
                self.base_decimals,
                self.quote_decimals,
            )
        };

        let raw = LiquidityStateV4 {
            status: self.status,
            _nonce: 254,
            _max_order: 7,
            _depth: 3,
            base_decimal: base_dec as u64,
            quote_decimal: quote_dec as u64,
            _params: [0; 22],
            pool_open_time: self.open_time,
            _punish_and_init: [0; 3],
            _swap_stats: [0; 80],
            base_vault: base_vault.to_bytes(),
            quote_vault: quote_vault.to_bytes(),
            base_mint: base_mint.to_bytes(),
            quote_mint: quote_mint.to_bytes(),
            lp_mint: self.lp_mint.to_bytes(),
            open_orders: self.open_orders.to_bytes(),
            market_id: self.market_id.to_bytes(),
            market_program_id: self.market_program_id.to_bytes(),
            target_orders: self.target_orders.to_bytes(),
            _withdraw_queue: [0; 32],
            _lp_vault: [0; 32],
            owner: self.owner.to_bytes(),
            lp_reserve: self.lp_reserve,
            _padding: [0; 3],
        };
        borsh::to_vec(&raw).unwrap()
    }
}

/// Constant-product output for `amount_in`, after the pool trade fee
pub fn quote_swap_out(amount_in: u64, reserve_in: u64, reserve_out: u64) -> u64 {
    if amount_in == 0 || reserve_in == 0 || reserve_out == 0 {
        return 0;
    }

    let fee = (amount_in as u128 * SWAP_FEE_NUMERATOR as u128).div_ceil(SWAP_FEE_DENOMINATOR as u128);
    let amount_in = amount_in as u128 - fee;
    let out = amount_in * reserve_out as u128 / (reserve_in as u128 + amount_in);
    out.min(u64::MAX as u128) as u64
}

/// Apply a slippage tolerance to an expected amount
pub fn min_amount_out(expected: u64, slippage_pct: f64) -> u64 {
    let keep = (100.0 - slippage_pct.clamp(0.0, 100.0)) / 100.0;
    (expected as f64 * keep).floor() as u64
}
