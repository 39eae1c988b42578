//! Raydium v4 `swapBaseIn` instruction

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use super::market::MarketRecord;
use super::pool::PoolRecord;
use super::program::{RAYDIUM_AMM_AUTHORITY, RAYDIUM_AMM_V4, SWAP_BASE_IN_TAG};

/// Accounts of a fixed-input swap through one pool
pub struct SwapAccounts<'a> {
    pub pool_id: &'a Pubkey,
    pub pool: &'a PoolRecord,
    pub market: &'a MarketRecord,
    pub user_source: Pubkey,
    pub user_destination: Pubkey,
    pub owner: Pubkey,
}

/// Build a `swapBaseIn` instruction spending exactly `amount_in`
pub fn swap_base_in(accounts: &SwapAccounts<'_>, amount_in: u64, min_amount_out: u64) -> Instruction {
    let mut data = Vec::with_capacity(17);
    data.push(SWAP_BASE_IN_TAG);
    data.extend_from_slice(&amount_in.to_le_bytes());
    data.extend_from_slice(&min_amount_out.to_le_bytes());

    let pool = accounts.pool;
    let market = accounts.market;
    let (coin_vault, pc_vault) = pool.amm_vaults();

    let metas = vec![
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new(*accounts.pool_id, false),
        AccountMeta::new_readonly(RAYDIUM_AMM_AUTHORITY, false),
        AccountMeta::new(pool.open_orders, false),
        AccountMeta::new(pool.target_orders, false),
        AccountMeta::new(coin_vault, false),
        AccountMeta::new(pc_vault, false),
        AccountMeta::new_readonly(pool.market_program_id, false),
        AccountMeta::new(pool.market_id, false),
        AccountMeta::new(market.bids, false),
        AccountMeta::new(market.asks, false),
        AccountMeta::new(market.event_queue, false),
        AccountMeta::new(market.base_vault, false),
        AccountMeta::new(market.quote_vault, false),
        AccountMeta::new_readonly(market.vault_signer, false),
        AccountMeta::new(accounts.user_source, false),
        AccountMeta::new(accounts.user_destination, false),
        AccountMeta::new_readonly(accounts.owner, true),
    ];

    Instruction {
        program_id: RAYDIUM_AMM_V4,
        accounts: metas,
        data,
    }
}
