//! Take-profit / stop-loss price monitor
//!
//! WARNING: TP/SL is best-effort. A pool can gap through the stop-loss
//! between two polls, the sell then lands wherever the price is.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::chain::AccountSource;
use crate::config::AutoSellConfig;
use crate::error::{Error, Result};
use crate::raydium::token::token_account_amount;
use crate::raydium::PoolRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Hold,
    TakeProfit,
    StopLoss,
    /// Check duration ran out without hitting a threshold
    Timeout,
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Spot price in quote per token
    async fn price(&self, pool_id: &Pubkey, pool: &PoolRecord) -> Result<f64>;
}

/// Spot price from the pool vault balances, decimal adjusted
pub struct PoolPriceSource {
    source: Arc<dyn AccountSource>,
}

impl PoolPriceSource {
    pub fn new(source: Arc<dyn AccountSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl PriceSource for PoolPriceSource {
    async fn price(&self, _pool_id: &Pubkey, pool: &PoolRecord) -> Result<f64> {
        let accounts = self
            .source
            .get_multiple_account_data(&[pool.base_vault, pool.quote_vault])
            .await?;

        let mut reserves = [0u64; 2];
        for (reserve, data) in reserves.iter_mut().zip(accounts) {
            let data = data.ok_or_else(|| Error::Rpc("pool vault not found".to_string()))?;
            *reserve = token_account_amount(&data)?;
        }

        spot_price(reserves[0], reserves[1], pool.base_decimals, pool.quote_decimals)
            .ok_or_else(|| Error::Rpc("pool has no base reserve".to_string()))
    }
}

/// Quote per token given raw reserves
pub fn spot_price(base_reserve: u64, quote_reserve: u64, base_decimals: u8, quote_decimals: u8) -> Option<f64> {
    if base_reserve == 0 {
        return None;
    }
    let base = base_reserve as f64 / 10f64.powi(base_decimals as i32);
    let quote = quote_reserve as f64 / 10f64.powi(quote_decimals as i32);
    Some(quote / base)
}

pub struct PriceMonitor {
    prices: Arc<dyn PriceSource>,
    take_profit_pct: f64,
    stop_loss_pct: f64,
    interval: Duration,
    duration: Duration,
}

impl PriceMonitor {
    pub fn new(
        prices: Arc<dyn PriceSource>,
        take_profit_pct: f64,
        stop_loss_pct: f64,
        interval: Duration,
        duration: Duration,
    ) -> Self {
        Self {
            prices,
            take_profit_pct,
            stop_loss_pct,
            interval,
            duration,
        }
    }

    pub fn from_config(config: &AutoSellConfig, prices: Arc<dyn PriceSource>) -> Self {
        Self::new(
            prices,
            config.take_profit_pct,
            config.stop_loss_pct,
            Duration::from_millis(config.price_check_interval_ms),
            Duration::from_millis(config.price_check_duration_ms),
        )
    }

    pub fn prices(&self) -> &Arc<dyn PriceSource> {
        &self.prices
    }

    /// Threshold check, scaled by 100 so whole-number inputs compare exactly
    pub fn decide(&self, entry: f64, current: f64) -> ExitDecision {
        if current * 100.0 >= entry * (100.0 + self.take_profit_pct) {
            ExitDecision::TakeProfit
        } else if current * 100.0 <= entry * (100.0 - self.stop_loss_pct) {
            ExitDecision::StopLoss
        } else {
            ExitDecision::Hold
        }
    }

    /// One price check. A failed read holds.
    pub async fn poll(&self, pool_id: &Pubkey, pool: &PoolRecord, entry: f64) -> ExitDecision {
        match self.prices.price(pool_id, pool).await {
            Ok(current) => {
                let decision = self.decide(entry, current);
                debug!(
                    "{}: price {:.12} vs entry {:.12} -> {:?}",
                    pool.base_mint, current, entry, decision
                );
                decision
            }
            Err(e) => {
                debug!("Price read failed for {}: {}", pool.base_mint, e);
                ExitDecision::Hold
            }
        }
    }

    fn max_ticks(&self) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        let ticks = self.duration.as_millis() / self.interval.as_millis();
        ticks.clamp(1, u32::MAX as u128) as u32
    }

    /// Poll every `interval` until a threshold hits or `duration` elapses
    pub async fn watch(&self, pool_id: &Pubkey, pool: &PoolRecord, entry: f64) -> ExitDecision {
        let max_ticks = self.max_ticks();
        for tick in 1..=max_ticks {
            let decision = self.poll(pool_id, pool, entry).await;
            if decision != ExitDecision::Hold {
                info!("{:?} hit for {} after {} checks", decision, pool.base_mint, tick);
                return decision;
            }
            if tick < max_ticks {
                tokio::time::sleep(self.interval).await;
            }
        }
        info!("Price check window elapsed for {}", pool.base_mint);
        ExitDecision::Timeout
    }
}
