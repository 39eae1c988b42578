//! Buy / sell instruction sets for Raydium v4 pools

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use std::sync::Arc;
use tracing::debug;

use crate::chain::AccountSource;
use crate::config::QuoteToken;
use crate::error::{Error, Result};
use crate::raydium::pool::{min_amount_out, quote_swap_out};
use crate::raydium::swap::{swap_base_in, SwapAccounts};
use crate::raydium::{MarketCache, PoolRecord};

/// Vault balances of a pool, raw units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reserves {
    pub base: u64,
    pub quote: u64,
}

/// Builds the instruction sets the executors sign and send
pub struct TransactionBuilder {
    source: Arc<dyn AccountSource>,
    markets: MarketCache,
    quote: QuoteToken,
    owner: Pubkey,
    quote_ata: Pubkey,
}

impl TransactionBuilder {
    pub fn new(source: Arc<dyn AccountSource>, quote: QuoteToken, owner: Pubkey) -> Self {
        Self {
            markets: MarketCache::new(source.clone()),
            source,
            quote,
            quote_ata: get_associated_token_address(&owner, &quote.mint),
            owner,
        }
    }

    pub fn owner(&self) -> &Pubkey {
        &self.owner
    }

    pub fn quote(&self) -> QuoteToken {
        self.quote
    }

    pub fn quote_ata(&self) -> Pubkey {
        self.quote_ata
    }

    pub fn token_ata(&self, mint: &Pubkey) -> Pubkey {
        get_associated_token_address(&self.owner, mint)
    }

    pub fn source(&self) -> &Arc<dyn AccountSource> {
        &self.source
    }

    pub fn markets(&self) -> &MarketCache {
        &self.markets
    }

    pub async fn reserves(&self, pool: &PoolRecord) -> Result<Reserves> {
        let accounts = self
            .source
            .get_multiple_account_data(&[pool.base_vault, pool.quote_vault])
            .await?;

        let mut amounts = [0u64; 2];
        for (amount, data) in amounts.iter_mut().zip(accounts) {
            if let Some(data) = data {
                *amount = crate::raydium::token::token_account_amount(&data)?;
            }
        }

        if amounts.contains(&0) {
            return Err(Error::Rpc("pool reserves unavailable".to_string()));
        }
        Ok(Reserves {
            base: amounts[0],
            quote: amounts[1],
        })
    }

    /// Idempotent ATA creation for the token, then swap `amount_in` quote into it
    pub async fn build_buy(
        &self,
        pool_id: &Pubkey,
        pool: &PoolRecord,
        amount_in: u64,
        slippage_pct: f64,
    ) -> Result<Vec<Instruction>> {
        let available = self.source.token_balance(&self.quote_ata).await?;
        if available < amount_in {
            return Err(Error::InsufficientBalance {
                available,
                required: amount_in,
            });
        }

        let market = self.markets.get(&pool.market_id, &pool.market_program_id).await?;
        let reserves = self.reserves(pool).await?;
        let expected = quote_swap_out(amount_in, reserves.quote, reserves.base);
        let min_out = min_amount_out(expected, slippage_pct);
        debug!(
            "Buy {} {}: expect {} tokens, min {}",
            self.quote.to_ui(amount_in),
            self.quote.symbol,
            expected,
            min_out
        );

        let token_ata = self.token_ata(&pool.base_mint);
        let swap = swap_base_in(
            &SwapAccounts {
                pool_id,
                pool,
                market: &market,
                user_source: self.quote_ata,
                user_destination: token_ata,
                owner: self.owner,
            },
            amount_in,
            min_out,
        );

        Ok(vec![
            create_associated_token_account_idempotent(
                &self.owner,
                &self.owner,
                &pool.base_mint,
                &spl_token::id(),
            ),
            swap,
        ])
    }

    /// Swap `amount` tokens back to quote, then close the emptied token account
    pub async fn build_sell(
        &self,
        pool_id: &Pubkey,
        pool: &PoolRecord,
        amount: u64,
        slippage_pct: f64,
    ) -> Result<Vec<Instruction>> {
        let market = self.markets.get(&pool.market_id, &pool.market_program_id).await?;
        let reserves = self.reserves(pool).await?;
        let expected = quote_swap_out(amount, reserves.base, reserves.quote);
        let min_out = min_amount_out(expected, slippage_pct);
        debug!(
            "Sell {} tokens: expect {} {}, min {}",
            amount,
            self.quote.to_ui(expected),
            self.quote.symbol,
            min_out
        );

        let token_ata = self.token_ata(&pool.base_mint);
        let swap = swap_base_in(
            &SwapAccounts {
                pool_id,
                pool,
                market: &market,
                user_source: token_ata,
                user_destination: self.quote_ata,
                owner: self.owner,
            },
            amount,
            min_out,
        );

        let close = spl_token::instruction::close_account(
            &spl_token::id(),
            &token_ata,
            &self.owner,
            &self.owner,
            &[],
        )
        .map_err(|e| Error::InstructionBuild(format!("close account: {}", e)))?;

        Ok(vec![swap, close])
    }
}
