//! Websocket program subscriptions feeding the event channels
//!
//! `programSubscribe` streams sharing one connection:
//! - Raydium v4 pools ready to swap with the configured token on either side
//! - SPL token accounts owned by the wallet
//! - OpenBook markets quoted in the configured token, when market caching is on
//!
//! Reconnects with exponential backoff when the connection drops.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_client::rpc_response::{Response, RpcKeyedAccount};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::events::{decode_market_event, decode_pool_event, decode_wallet_event, EventSenders};
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::raydium::market::market_filters;
use crate::raydium::pool::{
    BASE_MINT_OFFSET, MARKET_PROGRAM_OFFSET, POOL_ACCOUNT_SIZE, QUOTE_MINT_OFFSET, STATUS_OFFSET,
};
use crate::raydium::program::{OPENBOOK_PROGRAM_ID, POOL_STATUS_SWAP_ENABLED, RAYDIUM_AMM_V4};

/// SPL token account size and owner offset
const TOKEN_ACCOUNT_SIZE: u64 = 165;
const TOKEN_OWNER_OFFSET: usize = 32;

type Notifications<'a> = BoxStream<'a, Response<RpcKeyedAccount>>;

/// Reconnect bookkeeping. Delay and attempt budget both start over once a
/// connection gets its subscriptions in place.
pub struct Reconnect {
    backoff: ExponentialBackoff,
    attempts: u32,
    max_attempts: u32,
    max_delay: Duration,
}

impl Reconnect {
    pub fn new(config: &StreamConfig) -> Self {
        let initial = Duration::from_millis(config.reconnect_delay_ms);
        let max_delay = Duration::from_millis(config.max_reconnect_delay_ms).max(initial);
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(initial)
            .with_randomization_factor(0.0)
            .with_multiplier(2.0)
            .with_max_interval(max_delay)
            .with_max_elapsed_time(None)
            .build();

        Self {
            backoff,
            attempts: 0,
            max_attempts: config.max_reconnect_attempts,
            max_delay,
        }
    }

    pub fn connected(&mut self) {
        self.backoff.reset();
        self.attempts = 0;
    }

    /// Delay before the next attempt, None once `max_attempts` failures
    /// happened in a row (0 = never give up)
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.max_attempts > 0 && self.attempts >= self.max_attempts {
            return None;
        }
        Some(self.backoff.next_backoff().unwrap_or(self.max_delay))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

pub struct EventListener {
    ws_url: String,
    commitment: CommitmentConfig,
    quote_mint: Pubkey,
    owner: Pubkey,
    cache_new_markets: bool,
    config: StreamConfig,
    senders: EventSenders,
    shutdown: broadcast::Sender<()>,
}

impl EventListener {
    pub fn new(
        ws_url: String,
        commitment: CommitmentConfig,
        quote_mint: Pubkey,
        owner: Pubkey,
        cache_new_markets: bool,
        config: StreamConfig,
        senders: EventSenders,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            ws_url,
            commitment,
            quote_mint,
            owner,
            cache_new_markets,
            config,
            senders,
            shutdown,
        }
    }

    /// Pools holding `mint` at `mint_offset` (base or quote side), routed
    /// through OpenBook and open for swaps
    pub fn pool_filters(mint: &Pubkey, mint_offset: usize) -> Vec<RpcFilterType> {
        vec![
            RpcFilterType::DataSize(POOL_ACCOUNT_SIZE as u64),
            RpcFilterType::Memcmp(Memcmp::new_base58_encoded(mint_offset, mint.as_ref())),
            RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
                MARKET_PROGRAM_OFFSET,
                OPENBOOK_PROGRAM_ID.as_ref(),
            )),
            RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
                STATUS_OFFSET,
                &POOL_STATUS_SWAP_ENABLED.to_le_bytes(),
            )),
        ]
    }

    /// Token accounts owned by `owner`
    pub fn wallet_filters(owner: &Pubkey) -> Vec<RpcFilterType> {
        vec![
            RpcFilterType::DataSize(TOKEN_ACCOUNT_SIZE),
            RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
                TOKEN_OWNER_OFFSET,
                owner.as_ref(),
            )),
        ]
    }

    fn subscription_config(&self, filters: Vec<RpcFilterType>) -> RpcProgramAccountsConfig {
        RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.commitment),
                ..Default::default()
            },
            with_context: Some(true),
            ..Default::default()
        }
    }

    /// Spawn the subscription loop
    pub fn start(self) -> JoinHandle<Result<()>> {
        info!("Starting event listener on {}", self.ws_url);

        tokio::spawn(async move {
            let mut shutdown_rx = self.shutdown.subscribe();
            let mut reconnect = Reconnect::new(&self.config);

            loop {
                let outcome = tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Event listener shutting down");
                        return Ok(());
                    }
                    outcome = self.connect_and_stream(&mut reconnect) => outcome,
                };

                if let Err(e) = outcome {
                    error!("Event stream error: {}", e);
                } else {
                    // every consumer is gone
                    info!("Event consumers closed, stopping listener");
                    return Ok(());
                }

                let Some(delay) = reconnect.next_delay() else {
                    error!(
                        "Max reconnect attempts ({}) reached",
                        self.config.max_reconnect_attempts
                    );
                    return Err(Error::Stream("max reconnect attempts reached".into()));
                };
                warn!(
                    "Reconnecting in {:?} (attempt {})...",
                    delay,
                    reconnect.attempts()
                );
                sleep(delay).await;
            }
        })
    }

    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// One connection. Ok when the consumers hung up, Err on any disconnect.
    async fn connect_and_stream(&self, reconnect: &mut Reconnect) -> Result<()> {
        let client = PubsubClient::new(&self.ws_url).await?;

        let (quoted, quoted_unsubscribe) = client
            .program_subscribe(
                &RAYDIUM_AMM_V4,
                Some(self.subscription_config(Self::pool_filters(
                    &self.quote_mint,
                    QUOTE_MINT_OFFSET,
                ))),
            )
            .await?;
        let (based, based_unsubscribe) = client
            .program_subscribe(
                &RAYDIUM_AMM_V4,
                Some(self.subscription_config(Self::pool_filters(
                    &self.quote_mint,
                    BASE_MINT_OFFSET,
                ))),
            )
            .await?;
        let (mut wallet, wallet_unsubscribe) = client
            .program_subscribe(
                &spl_token::id(),
                Some(self.subscription_config(Self::wallet_filters(&self.owner))),
            )
            .await?;

        let (mut markets, markets_unsubscribe): (Notifications<'_>, _) = if self.cache_new_markets {
            let (markets, unsubscribe) = client
                .program_subscribe(
                    &OPENBOOK_PROGRAM_ID,
                    Some(self.subscription_config(market_filters(&self.quote_mint))),
                )
                .await?;
            (markets, Some(unsubscribe))
        } else {
            (stream::pending().boxed(), None)
        };

        reconnect.connected();
        info!(
            "Subscribed to Raydium pools, wallet {}{}",
            self.owner,
            if self.cache_new_markets { " and OpenBook markets" } else { "" }
        );

        let mut pools = stream::select(quoted, based);

        let result = loop {
            tokio::select! {
                update = pools.next() => {
                    let Some(update) = update else {
                        break Err(Error::Stream("pool subscription closed".into()));
                    };
                    match decode_pool_event(&update.value.pubkey, &update.value.account, update.context.slot) {
                        Ok(event) => {
                            if self.senders.pools.send(event).await.is_err() {
                                break Ok(());
                            }
                        }
                        Err(e) => debug!("Discarding pool update: {}", e),
                    }
                }
                update = wallet.next() => {
                    let Some(update) = update else {
                        break Err(Error::Stream("wallet subscription closed".into()));
                    };
                    match decode_wallet_event(&update.value.pubkey, &update.value.account, update.context.slot) {
                        Ok(event) => {
                            if self.senders.wallet.send(event).await.is_err() {
                                break Ok(());
                            }
                        }
                        Err(e) => debug!("Discarding wallet update: {}", e),
                    }
                }
                update = markets.next() => {
                    let Some(update) = update else {
                        break Err(Error::Stream("market subscription closed".into()));
                    };
                    match decode_market_event(&update.value.pubkey, &update.value.account, update.context.slot) {
                        Ok(event) => {
                            if self.senders.markets.send(event).await.is_err() {
                                break Ok(());
                            }
                        }
                        Err(e) => debug!("Discarding market update: {}", e),
                    }
                }
            }
        };

        drop(pools);
        drop(wallet);
        drop(markets);
        quoted_unsubscribe().await;
        based_unsubscribe().await;
        wallet_unsubscribe().await;
        if let Some(unsubscribe) = markets_unsubscribe {
            unsubscribe().await;
        }
        result
    }
}
