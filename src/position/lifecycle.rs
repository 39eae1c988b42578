//! Per-mint trade lifecycle: gate, buy, hold, sell
//!
//! One [`Lifecycle::run`] call drives a claimed position from NEW to a
//! terminal state (or leaves it OPEN when nothing ever triggers an exit).
//! Every state change is written back to the [`PositionCache`].

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::cache::PositionCache;
use super::monitor::{ExitDecision, PriceMonitor};
use super::retry::RetryPolicy;
use super::state::{Position, PositionState};
use crate::config::Config;
use crate::error::Result;
use crate::filter::FilterGate;
use crate::raydium::PoolRecord;
use crate::trading::{ExecutionResult, TransactionBuilder, TransactionExecutor};

/// Trade parameters, resolved once from configuration
#[derive(Debug, Clone)]
pub struct TradeSettings {
    /// Raw quote units per buy
    pub quote_amount: u64,
    pub buy_slippage_pct: f64,
    pub sell_slippage_pct: f64,
    /// Waited before the first buy attempt and between buy attempts
    pub auto_buy_delay: Duration,
    pub buy_retry: RetryPolicy,
    pub sell_retry: RetryPolicy,
    pub auto_sell: bool,
    pub auto_sell_delay: Duration,
    pub price_check_enabled: bool,
    pub confirm_timeout: Duration,
}

impl TradeSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let quote = config
            .trading
            .quote_token()
            .map_err(|e| crate::error::Error::Config(e.to_string()))?;

        Ok(Self {
            quote_amount: quote.to_raw(config.trading.quote_amount),
            buy_slippage_pct: config.trading.buy_slippage_pct,
            sell_slippage_pct: config.auto_sell.sell_slippage_pct,
            auto_buy_delay: config.trading.auto_buy_delay(),
            buy_retry: RetryPolicy::new(
                config.trading.max_buy_retries,
                config.trading.auto_buy_delay(),
            ),
            sell_retry: RetryPolicy::new(
                config.auto_sell.max_sell_retries,
                config.auto_sell.retry_delay(),
            ),
            auto_sell: config.auto_sell.enabled,
            auto_sell_delay: config.auto_sell.delay(),
            price_check_enabled: config.auto_sell.price_check_enabled(),
            confirm_timeout: config.executor.confirm_timeout(),
        })
    }
}

/// What moved an OPEN position to SELLING
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Auto-sell delay elapsed with price checking off
    AutoSellDelay,
    Price(ExitDecision),
    /// Wallet reported the token balance at zero
    BalanceZero,
}

pub struct Lifecycle {
    gate: Arc<FilterGate>,
    builder: Arc<TransactionBuilder>,
    executor: Arc<dyn TransactionExecutor>,
    monitor: Arc<PriceMonitor>,
    cache: Arc<PositionCache>,
    payer: Arc<Keypair>,
    settings: TradeSettings,
}

impl Lifecycle {
    pub fn new(
        gate: Arc<FilterGate>,
        builder: Arc<TransactionBuilder>,
        executor: Arc<dyn TransactionExecutor>,
        monitor: Arc<PriceMonitor>,
        cache: Arc<PositionCache>,
        payer: Arc<Keypair>,
        settings: TradeSettings,
    ) -> Self {
        Self {
            gate,
            builder,
            executor,
            monitor,
            cache,
            payer,
            settings,
        }
    }

    pub fn settings(&self) -> &TradeSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<PositionCache> {
        &self.cache
    }

    pub fn builder(&self) -> &Arc<TransactionBuilder> {
        &self.builder
    }

    /// Apply a transition and persist the snapshot. Transitions here are
    /// all forward edges, an error means a logic bug and is only logged.
    fn transition(&self, position: &mut Position, next: PositionState) {
        if let Err(e) = position.advance(next) {
            error!("{}: {}", position.mint, e);
        }
        self.cache.save(position);
    }

    fn terminate(&self, position: &mut Position, next: PositionState, reason: String) {
        if let Err(e) = position.fail(next, reason) {
            error!("{}: {}", position.mint, e);
        }
        self.cache.save(position);
    }

    /// Drive `position` through the whole pipeline.
    pub async fn run(
        &self,
        mut position: Position,
        pool_id: Pubkey,
        pool: PoolRecord,
        mut balance_rx: watch::Receiver<Option<u64>>,
    ) -> Position {
        let mint = position.mint;

        // FILTERING
        self.transition(&mut position, PositionState::Filtering);
        let verdict = self.gate.evaluate(&pool).await;
        if let Some(err) = verdict.to_error() {
            info!("Skipping {} after {} checks: {}", mint, verdict.ticks, err);
            self.terminate(&mut position, PositionState::Aborted, err.to_string());
            return position;
        }

        // BUYING
        self.transition(&mut position, PositionState::Buying);
        if !self.settings.auto_buy_delay.is_zero() {
            tokio::time::sleep(self.settings.auto_buy_delay).await;
        }

        let (this, pool_ref, pool_id_ref) = (self, &pool, &pool_id);
        let (result, attempts) = self
            .settings
            .buy_retry
            .run("buy", move |attempt| {
                info!("Buying {} (attempt {})", mint, attempt);
                this.buy_once(pool_id_ref, pool_ref)
            })
            .await;
        position.buy_attempts = attempts;

        let bought = match result {
            Ok(bought) => bought,
            Err(e) if e.is_fatal() => {
                error!("Buy for {} cannot proceed: {}", mint, e);
                self.terminate(&mut position, PositionState::Failed, e.to_string());
                return position;
            }
            Err(e) => {
                error!("Buy failed for {} after {} attempts: {}", mint, attempts, e);
                self.terminate(&mut position, PositionState::Failed, e.to_string());
                return position;
            }
        };

        // OPEN
        position.buy_signature = Some(bought.signature.to_string());
        position.token_amount = match self
            .builder
            .source()
            .token_balance(&self.builder.token_ata(&mint))
            .await
        {
            Ok(amount) => amount,
            Err(e) => {
                warn!("No token balance for {} after buy: {}", mint, e);
                0
            }
        };
        position.entry_price = match self.monitor.prices().price(&pool_id, &pool).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("No entry price for {}: {}", mint, e);
                None
            }
        };
        self.transition(&mut position, PositionState::Open);
        info!(
            "Bought {}: {} tokens at {:?}, tx {}",
            mint, position.token_amount, position.entry_price, bought.signature
        );

        // ignore balance updates from before the position opened
        balance_rx.borrow_and_update();
        let reason = self.wait_for_exit(&position, &pool_id, &pool, balance_rx).await;

        // SELLING
        info!("Selling {}: {:?}", mint, reason);
        self.transition(&mut position, PositionState::Selling);

        let (result, attempts) = self
            .settings
            .sell_retry
            .run("sell", move |attempt| {
                info!("Selling {} (attempt {})", mint, attempt);
                this.sell_once(pool_id_ref, pool_ref)
            })
            .await;
        position.sell_attempts = attempts;

        match result {
            Ok(Some(sold)) => {
                position.sell_signature = Some(sold.signature.to_string());
                position.token_amount = 0;
                self.transition(&mut position, PositionState::Closed);
                let pnl = match self.monitor.prices().price(&pool_id, &pool).await {
                    Ok(price) => position.pnl_pct(price),
                    Err(_) => None,
                };
                match pnl {
                    Some(pnl) => info!("Sold {} at {:+.2}%, tx {}", mint, pnl, sold.signature),
                    None => info!("Sold {}, tx {}", mint, sold.signature),
                }
            }
            Ok(None) => {
                position.token_amount = 0;
                self.transition(&mut position, PositionState::Closed);
                info!("{} balance already empty, closed without selling", mint);
            }
            Err(e) => {
                error!("Sell failed for {} after {} attempts: {}", mint, attempts, e);
                self.terminate(&mut position, PositionState::Failed, e.to_string());
            }
        }

        position
    }

    async fn buy_once(&self, pool_id: &Pubkey, pool: &PoolRecord) -> Result<ExecutionResult> {
        let instructions = self
            .builder
            .build_buy(
                pool_id,
                pool,
                self.settings.quote_amount,
                self.settings.buy_slippage_pct,
            )
            .await?;

        self.executor
            .execute(instructions, &self.payer, self.settings.confirm_timeout)
            .await
    }

    /// None when there is nothing left to sell
    async fn sell_once(&self, pool_id: &Pubkey, pool: &PoolRecord) -> Result<Option<ExecutionResult>> {
        let token_ata = self.builder.token_ata(&pool.base_mint);
        let amount = self.builder.source().token_balance(&token_ata).await?;
        if amount == 0 {
            return Ok(None);
        }

        let instructions = self
            .builder
            .build_sell(pool_id, pool, amount, self.settings.sell_slippage_pct)
            .await?;

        self.executor
            .execute(instructions, &self.payer, self.settings.confirm_timeout)
            .await
            .map(Some)
    }

    async fn wait_for_exit(
        &self,
        position: &Position,
        pool_id: &Pubkey,
        pool: &PoolRecord,
        mut balance_rx: watch::Receiver<Option<u64>>,
    ) -> ExitReason {
        let timed_exit = async {
            if !self.settings.auto_sell {
                return std::future::pending::<ExitReason>().await;
            }
            if !self.settings.auto_sell_delay.is_zero() {
                tokio::time::sleep(self.settings.auto_sell_delay).await;
            }
            if !self.settings.price_check_enabled {
                return ExitReason::AutoSellDelay;
            }
            match position.entry_price {
                Some(entry) => ExitReason::Price(self.monitor.watch(pool_id, pool, entry).await),
                // nothing to compare against, sell once the window would have elapsed
                None => ExitReason::Price(ExitDecision::Timeout),
            }
        };

        let balance_zero = async {
            loop {
                if balance_rx.changed().await.is_err() {
                    // no more wallet updates for this mint
                    return std::future::pending::<ExitReason>().await;
                }
                if *balance_rx.borrow_and_update() == Some(0) {
                    return ExitReason::BalanceZero;
                }
            }
        };

        tokio::select! {
            reason = timed_exit => reason,
            reason = balance_zero => reason,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::filter::{FilterPipeline, SnipeList};
    use crate::raydium::token::encode_token_account;
    use crate::testing::{MapAccountSource, MockExecutor, Outcome, ScriptedPriceSource};
    use crate::trading::transaction::tests::seed_pool;
    use crate::config::QuoteToken;
    use solana_sdk::signer::Signer;

    pub fn settings() -> TradeSettings {
        TradeSettings {
            quote_amount: 10_000_000,
            buy_slippage_pct: 20.0,
            sell_slippage_pct: 20.0,
            auto_buy_delay: Duration::ZERO,
            buy_retry: RetryPolicy::new(2, Duration::from_millis(100)),
            sell_retry: RetryPolicy::new(2, Duration::from_millis(100)),
            auto_sell: true,
            auto_sell_delay: Duration::ZERO,
            price_check_enabled: true,
            confirm_timeout: Duration::from_secs(5),
        }
    }

    pub struct Harness {
        pub source: Arc<MapAccountSource>,
        pub executor: Arc<MockExecutor>,
        pub payer: Arc<Keypair>,
        pub pool_id: Pubkey,
        pub pool: PoolRecord,
        pub cache: Arc<PositionCache>,
    }

    impl Harness {
        pub fn new(outcomes: Vec<Outcome>) -> Self {
            let source = Arc::new(MapAccountSource::default());
            let payer = Arc::new(Keypair::new());
            let pool = seed_pool(
                &source,
                &payer.pubkey(),
                1_000_000_000,
                1_000_000_000_000,
                100_000_000_000,
            );
            Self {
                source,
                executor: Arc::new(MockExecutor::with_script(outcomes)),
                payer,
                pool_id: Pubkey::new_unique(),
                pool,
                cache: Arc::new(PositionCache::new()),
            }
        }

        /// Put `amount` tokens in the wallet's token account
        pub fn hold_tokens(&self, amount: u64) {
            let ata = spl_associated_token_account::get_associated_token_address(
                &self.payer.pubkey(),
                &self.pool.base_mint,
            );
            self.source.insert(
                ata,
                encode_token_account(&self.pool.base_mint, &self.payer.pubkey(), amount),
            );
        }

        pub fn lifecycle(&self, gate: FilterGate, prices: Vec<Option<f64>>, settings: TradeSettings) -> Lifecycle {
            let monitor = PriceMonitor::new(
                Arc::new(ScriptedPriceSource::new(prices)),
                50.0,
                20.0,
                Duration::from_millis(100),
                Duration::from_secs(10),
            );
            Lifecycle::new(
                Arc::new(gate),
                Arc::new(TransactionBuilder::new(
                    self.source.clone(),
                    QuoteToken::wsol(),
                    self.payer.pubkey(),
                )),
                self.executor.clone(),
                Arc::new(monitor),
                self.cache.clone(),
                self.payer.clone(),
                settings,
            )
        }

        pub fn claim(&self) -> Position {
            let position = Position::new(self.pool.base_mint, self.pool_id, 10_000_000);
            assert!(self.cache.try_claim(position.clone()));
            position
        }
    }

    pub fn open_gate() -> FilterGate {
        FilterGate::Pipeline(FilterPipeline::new(Vec::new(), Duration::ZERO, Duration::ZERO, 1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_profit_round_trip() {
        let harness = Harness::new(Vec::new());
        harness.hold_tokens(5_000_000);
        // entry read, then monitor ticks
        let lifecycle = harness.lifecycle(
            open_gate(),
            vec![Some(100.0), Some(110.0), Some(160.0)],
            settings(),
        );
        let (_tx, rx) = watch::channel(None);

        let position = lifecycle
            .run(harness.claim(), harness.pool_id, harness.pool.clone(), rx)
            .await;

        assert_eq!(position.state, PositionState::Closed);
        assert_eq!(position.entry_price, Some(100.0));
        assert_eq!(position.buy_attempts, 1);
        assert_eq!(position.sell_attempts, 1);
        assert!(position.sell_signature.is_some());
        // exactly one buy and one sell
        assert_eq!(harness.executor.submits(), 2);
        assert_eq!(
            harness.cache.get(&position.mint).unwrap().state,
            PositionState::Closed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlisted_mint_never_buys() {
        let harness = Harness::new(Vec::new());
        let lifecycle = harness.lifecycle(
            FilterGate::SnipeList(SnipeList::default()),
            Vec::new(),
            settings(),
        );
        let (_tx, rx) = watch::channel(None);

        let position = lifecycle
            .run(harness.claim(), harness.pool_id, harness.pool.clone(), rx)
            .await;

        assert_eq!(position.state, PositionState::Aborted);
        assert_eq!(position.buy_attempts, 0);
        assert_eq!(harness.executor.submits(), 0);
        assert!(position.failure.unwrap().contains("snipe list"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_retries_exhausted() {
        let harness = Harness::new(vec![
            Outcome::SubmitError,
            Outcome::TimedOut,
            Outcome::Rejected("slippage exceeded"),
            Outcome::Confirmed,
        ]);
        let lifecycle = harness.lifecycle(open_gate(), Vec::new(), settings());
        let (_tx, rx) = watch::channel(None);

        let position = lifecycle
            .run(harness.claim(), harness.pool_id, harness.pool.clone(), rx)
            .await;

        assert_eq!(position.state, PositionState::Failed);
        // max_buy_retries = 2
        assert_eq!(position.buy_attempts, 3);
        assert_eq!(harness.executor.submits(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_balance_fails_without_retry() {
        let harness = Harness::new(Vec::new());
        let mut settings = settings();
        settings.quote_amount = 5_000_000_000;
        let lifecycle = harness.lifecycle(open_gate(), Vec::new(), settings);
        let (_tx, rx) = watch::channel(None);

        let position = lifecycle
            .run(harness.claim(), harness.pool_id, harness.pool.clone(), rx)
            .await;

        assert_eq!(position.state, PositionState::Failed);
        assert_eq!(position.buy_attempts, 1);
        assert_eq!(harness.executor.submits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_zero_closes_without_sell() {
        let harness = Harness::new(Vec::new());
        let mut settings = settings();
        settings.auto_sell = false;
        let lifecycle = harness.lifecycle(open_gate(), vec![Some(1.0)], settings);
        let (tx, rx) = watch::channel(None);
        let mint = harness.pool.base_mint;
        let cache = harness.cache.clone();

        let run = tokio::spawn({
            let pool = harness.pool.clone();
            let position = harness.claim();
            let pool_id = harness.pool_id;
            async move { lifecycle.run(position, pool_id, pool, rx).await }
        });

        // wait until the buy landed
        while cache.get(&mint).map(|p| p.state) != Some(PositionState::Open) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send_replace(Some(0));

        let position = run.await.unwrap();
        assert_eq!(position.state, PositionState::Closed);
        assert!(position.sell_signature.is_none());
        assert_eq!(harness.executor.submits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_balance_after_buy_still_opens() {
        let harness = Harness::new(Vec::new());
        let ata = spl_associated_token_account::get_associated_token_address(
            &harness.payer.pubkey(),
            &harness.pool.base_mint,
        );
        harness.source.fail_reads_of(ata);
        let mut settings = settings();
        settings.price_check_enabled = false;
        let lifecycle = harness.lifecycle(open_gate(), vec![Some(1.0)], settings);
        let (_tx, rx) = watch::channel(None);

        let position = lifecycle
            .run(harness.claim(), harness.pool_id, harness.pool.clone(), rx)
            .await;

        // bought and opened, then the sell keeps failing on the same read
        assert!(position.buy_signature.is_some());
        assert!(position.opened_at.is_some());
        assert_eq!(position.token_amount, 0);
        assert_eq!(position.state, PositionState::Failed);
        assert_eq!(position.sell_attempts, 3);
        assert_eq!(harness.executor.submits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_retries_then_fails() {
        let harness = Harness::new(vec![
            Outcome::Confirmed,
            Outcome::SubmitError,
            Outcome::SubmitError,
            Outcome::SubmitError,
        ]);
        harness.hold_tokens(1_000);
        let mut settings = settings();
        settings.price_check_enabled = false;
        let lifecycle = harness.lifecycle(open_gate(), vec![Some(1.0)], settings);
        let (_tx, rx) = watch::channel(None);

        let position = lifecycle
            .run(harness.claim(), harness.pool_id, harness.pool.clone(), rx)
            .await;

        assert_eq!(position.state, PositionState::Failed);
        assert_eq!(position.sell_attempts, 3);
        assert_eq!(harness.executor.submits(), 4);
    }
}
