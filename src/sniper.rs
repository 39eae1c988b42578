//! Event dispatch: new pools start lifecycles, wallet updates feed them
//!
//! A pool is only sniped when it opened after the bot started, trades
//! against the configured quote token and its mint is not already held.
//! Each pool account is dispatched once; its later writes (every swap)
//! are not discoveries.

use dashmap::{DashMap, DashSet};
use solana_sdk::pubkey::Pubkey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::position::{Lifecycle, Position, PositionCache};
use crate::stream::{EventStream, MarketDiscovered, PoolDiscovered, WalletBalanceChanged};

/// Balance channel of one lifecycle. `generation` tells a reclaimed mint's
/// channel apart from the one it replaced.
struct BalanceSlot {
    generation: u64,
    sender: watch::Sender<Option<u64>>,
}

pub struct Sniper {
    lifecycle: Arc<Lifecycle>,
    cache: Arc<PositionCache>,
    quote_mint: Pubkey,
    /// Single permit when trading one token at a time
    permit: Option<Arc<Semaphore>>,
    balance_senders: Arc<DashMap<Pubkey, BalanceSlot>>,
    next_generation: AtomicU64,
    seen_pools: DashSet<Pubkey>,
    /// Unix seconds; pools opened at or before this are ignored
    started_at: u64,
}

impl Sniper {
    pub fn new(lifecycle: Arc<Lifecycle>, one_token_at_a_time: bool, started_at: u64) -> Self {
        let cache = lifecycle.cache().clone();
        let quote_mint = lifecycle.builder().quote().mint;
        Self {
            lifecycle,
            cache,
            quote_mint,
            permit: one_token_at_a_time.then(|| Arc::new(Semaphore::new(1))),
            balance_senders: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            seen_pools: DashSet::new(),
            started_at,
        }
    }

    /// Consume events until every channel closes
    pub async fn run(&self, mut events: EventStream) {
        let mut pools_open = true;
        let mut wallet_open = true;
        let mut markets_open = true;

        while pools_open || wallet_open || markets_open {
            tokio::select! {
                event = events.pools.recv(), if pools_open => match event {
                    Some(event) => {
                        self.on_pool_discovered(event);
                    }
                    None => pools_open = false,
                },
                event = events.wallet.recv(), if wallet_open => match event {
                    Some(event) => self.on_wallet_balance(event),
                    None => wallet_open = false,
                },
                event = events.markets.recv(), if markets_open => match event {
                    Some(event) => self.on_market_discovered(event),
                    None => markets_open = false,
                },
            }
        }

        info!("Event channels closed, {} positions active", self.cache.active_count());
    }

    /// Start a lifecycle for a fresh pool. Returns None when the pool is skipped.
    pub fn on_pool_discovered(&self, event: PoolDiscovered) -> Option<JoinHandle<Position>> {
        let PoolDiscovered { pool_id, pool, slot } = event;

        if pool.open_time <= self.started_at {
            debug!("Ignoring pool {} opened before start", pool_id);
            return None;
        }

        let Some(pool) = pool.oriented(&self.quote_mint) else {
            debug!("Ignoring pool {} not quoted in {}", pool_id, self.quote_mint);
            return None;
        };

        if !self.seen_pools.insert(pool_id) {
            return None;
        }

        let permit = match &self.permit {
            Some(semaphore) => match semaphore.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    debug!("Busy with another token, skipping {}", pool.base_mint);
                    return None;
                }
            },
            None => None,
        };

        let position = Position::new(
            pool.base_mint,
            pool_id,
            self.lifecycle.settings().quote_amount,
        );
        if !self.cache.try_claim(position.clone()) {
            debug!("Mint {} already being processed", pool.base_mint);
            return None;
        }

        info!(
            "New pool {} for {} at slot {}",
            pool_id, pool.base_mint, slot
        );

        let (sender, balance_rx) = watch::channel(None);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.balance_senders
            .insert(pool.base_mint, BalanceSlot { generation, sender });

        let lifecycle = self.lifecycle.clone();
        let cache = self.cache.clone();
        let senders = self.balance_senders.clone();

        Some(tokio::spawn(async move {
            let _permit = permit;
            let position = lifecycle.run(position, pool_id, pool, balance_rx).await;
            // the mint may already belong to a newer lifecycle
            senders.remove_if(&position.mint, |_, slot| slot.generation == generation);
            cache.release(&position);
            info!("{} finished in state {}", position.mint, position.state);
            position
        }))
    }

    /// Forward a token balance to the lifecycle holding that mint
    pub fn on_wallet_balance(&self, event: WalletBalanceChanged) {
        if event.mint == self.quote_mint {
            return;
        }
        if let Some(slot) = self.balance_senders.get(&event.mint) {
            slot.sender.send_replace(Some(event.amount));
        }
    }

    /// Cache a market ahead of the pool that will route through it
    pub fn on_market_discovered(&self, event: MarketDiscovered) {
        debug!("Caching market {} at slot {}", event.market_id, event.slot);
        self.lifecycle
            .builder()
            .markets()
            .insert(event.market_id, event.market);
    }

    pub fn tracked_mints(&self) -> usize {
        self.balance_senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::lifecycle::tests::{open_gate, settings, Harness};
    use crate::position::PositionState;
    use crate::raydium::market::encode_market;
    use crate::raydium::program::OPENBOOK_PROGRAM_ID;
    use crate::raydium::{MarketRecord, PoolRecord};

    fn sniper(harness: &Harness, one_token_at_a_time: bool) -> Sniper {
        let lifecycle = harness.lifecycle(open_gate(), vec![Some(100.0), Some(160.0)], settings());
        Sniper::new(
            Arc::new(lifecycle),
            one_token_at_a_time,
            harness.pool.open_time - 1,
        )
    }

    fn discovered(pool_id: Pubkey, pool: PoolRecord) -> PoolDiscovered {
        PoolDiscovered {
            pool_id,
            pool,
            slot: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_discovery_ignored() {
        let harness = Harness::new(Vec::new());
        harness.hold_tokens(5_000_000);
        let sniper = sniper(&harness, false);

        let first = sniper.on_pool_discovered(discovered(harness.pool_id, harness.pool.clone()));
        let second = sniper.on_pool_discovered(discovered(harness.pool_id, harness.pool.clone()));

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(sniper.tracked_mints(), 1);

        let position = first.unwrap().await.unwrap();
        assert_eq!(position.state, PositionState::Closed);
        assert_eq!(harness.executor.submits(), 2);
        assert_eq!(sniper.tracked_mints(), 0);
    }

    fn cache_state(harness: &Harness, state: PositionState) {
        let mut position = Position::new(harness.pool.base_mint, harness.pool_id, 10_000_000);
        position.state = state;
        harness.cache.save(&position);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_updates_after_close_do_not_rebuy() {
        let harness = Harness::new(Vec::new());
        harness.hold_tokens(5_000_000);
        let sniper = sniper(&harness, false);

        let first = sniper.on_pool_discovered(discovered(harness.pool_id, harness.pool.clone()));
        let position = first.unwrap().await.unwrap();
        assert_eq!(position.state, PositionState::Closed);

        // a swap on the pool rewrites its account
        let update = PoolDiscovered {
            pool_id: harness.pool_id,
            pool: harness.pool.clone(),
            slot: 2,
        };
        assert!(sniper.on_pool_discovered(update).is_none());
        assert_eq!(harness.executor.submits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_mint_can_be_bought_in_new_pool() {
        let harness = Harness::new(Vec::new());
        let sniper = sniper(&harness, false);
        cache_state(&harness, PositionState::Closed);

        let handle =
            sniper.on_pool_discovered(discovered(Pubkey::new_unique(), harness.pool.clone()));
        assert!(handle.is_some());
        handle.unwrap().abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rediscovery_ignored_while_open_or_selling() {
        for state in [PositionState::Open, PositionState::Selling] {
            let harness = Harness::new(Vec::new());
            let sniper = sniper(&harness, false);
            cache_state(&harness, state);

            assert!(sniper
                .on_pool_discovered(discovered(Pubkey::new_unique(), harness.pool.clone()))
                .is_none());
            assert_eq!(harness.cache.get(&harness.pool.base_mint).unwrap().state, state);
            assert_eq!(sniper.tracked_mints(), 0);
            assert_eq!(harness.executor.submits(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_lifecycle_keeps_newer_balance_channel() {
        let harness = Harness::new(Vec::new());
        harness.hold_tokens(5_000_000);
        let sniper = sniper(&harness, false);
        let mint = harness.pool.base_mint;

        let first = sniper
            .on_pool_discovered(discovered(harness.pool_id, harness.pool.clone()))
            .unwrap();

        // mint closed and reclaimed by a new pool before the first task cleans up
        cache_state(&harness, PositionState::Closed);
        let second = sniper
            .on_pool_discovered(discovered(Pubkey::new_unique(), harness.pool.clone()))
            .unwrap();
        second.abort();
        let newer = sniper.balance_senders.get(&mint).unwrap().generation;

        first.await.unwrap();
        assert_eq!(sniper.balance_senders.get(&mint).unwrap().generation, newer);
    }

    #[tokio::test]
    async fn test_market_events_fill_cache() {
        let harness = Harness::new(Vec::new());
        let sniper = sniper(&harness, false);
        let market_id = Pubkey::new_unique();
        let market = MarketRecord::decode(
            &encode_market(&market_id, &OPENBOOK_PROGRAM_ID),
            &market_id,
            &OPENBOOK_PROGRAM_ID,
        )
        .unwrap();

        sniper.on_market_discovered(MarketDiscovered {
            market_id,
            market,
            slot: 3,
        });

        assert!(sniper.lifecycle.builder().markets().contains(&market_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_opened_before_start_skipped() {
        let harness = Harness::new(Vec::new());
        let sniper = sniper(&harness, false);

        let mut stale = harness.pool.clone();
        stale.open_time = sniper.started_at;

        assert!(sniper.on_pool_discovered(discovered(harness.pool_id, stale)).is_none());
        assert!(harness.cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_quote_skipped() {
        let harness = Harness::new(Vec::new());
        let sniper = sniper(&harness, false);

        let mut pool = harness.pool.clone();
        pool.quote_mint = Pubkey::new_unique();

        assert!(sniper.on_pool_discovered(discovered(harness.pool_id, pool)).is_none());
        assert!(harness.cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_token_at_a_time_skips_while_busy() {
        let harness = Harness::new(Vec::new());
        let sniper = sniper(&harness, true);

        let first = sniper.on_pool_discovered(discovered(harness.pool_id, harness.pool.clone()));

        let mut other = harness.pool.clone();
        other.base_mint = Pubkey::new_unique();
        let second = sniper.on_pool_discovered(discovered(Pubkey::new_unique(), other.clone()));

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(harness.cache.get(&other.base_mint).is_none());
        first.unwrap().abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_balance_updates_ignored() {
        let harness = Harness::new(Vec::new());
        let sniper = sniper(&harness, false);
        let (sender, rx) = watch::channel(None);
        sniper
            .balance_senders
            .insert(harness.pool.quote_mint, BalanceSlot { generation: 0, sender });

        sniper.on_wallet_balance(WalletBalanceChanged {
            mint: harness.pool.quote_mint,
            token_account: Pubkey::new_unique(),
            amount: 42,
            slot: 1,
        });

        assert!(!rx.has_changed().unwrap());
    }
}
