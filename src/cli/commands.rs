//! CLI command implementations

use anyhow::{Context, Result};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::signature::Signer;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::chain::{AccountSource, RpcAccountSource};
use crate::config::Config;
use crate::filter::{FilterGate, FilterPipeline, SnipeList};
use crate::keypair::load_keypair;
use crate::position::{Lifecycle, PoolPriceSource, PositionCache, PriceMonitor, TradeSettings};
use crate::raydium::token::token_account_amount;
use crate::sniper::Sniper;
use crate::stream::{self, EventListener};
use crate::trading::{Executor, TransactionBuilder};

fn rpc_client(config: &Config) -> Arc<RpcClient> {
    Arc::new(RpcClient::new_with_timeout_and_commitment(
        config.rpc.endpoint.clone(),
        Duration::from_millis(config.rpc.timeout_ms),
        config.rpc.commitment_config(),
    ))
}

/// Start the sniper bot
pub async fn start(config: &Config) -> Result<()> {
    info!("Starting Raydium sniper...");
    info!("{}", config.masked_display());

    let keypair = Arc::new(load_keypair(&config.wallet)?);
    info!("Loaded wallet: {}", keypair.pubkey());

    let quote = config.trading.quote_token()?;
    let commitment = config.rpc.commitment_config();
    let client = rpc_client(config);
    let source: Arc<dyn AccountSource> =
        Arc::new(RpcAccountSource::new(client.clone(), commitment));

    let builder = Arc::new(TransactionBuilder::new(source.clone(), quote, keypair.pubkey()));
    let quote_ata = builder.quote_ata();
    if source.get_account_data(&quote_ata).await?.is_none() {
        anyhow::bail!(
            "{} token account {} does not exist for wallet {}",
            quote.symbol,
            quote_ata,
            keypair.pubkey()
        );
    }

    if config.markets.preload_existing {
        match builder.markets().preload(&quote.mint).await {
            Ok(count) => info!("Preloaded {} {} markets", count, quote.symbol),
            Err(e) => warn!("Market preload failed, markets load on demand: {}", e),
        }
    }

    let gate = if config.snipe_list.enabled {
        let list = SnipeList::load(Path::new(&config.snipe_list.path))
            .with_context(|| format!("loading snipe list {}", config.snipe_list.path))?;
        FilterGate::SnipeList(list)
    } else {
        FilterGate::Pipeline(FilterPipeline::from_config(&config.filters, quote, source.clone()))
    };
    info!("Gate: {}", gate.describe());

    let executor = Executor::from_config(config, client.clone())?;
    info!("Executor: {}", executor.kind());

    let monitor = PriceMonitor::from_config(
        &config.auto_sell,
        Arc::new(PoolPriceSource::new(source.clone())),
    );
    let cache = Arc::new(PositionCache::new());
    let lifecycle = Arc::new(Lifecycle::new(
        Arc::new(gate),
        builder,
        Arc::new(executor),
        Arc::new(monitor),
        cache.clone(),
        keypair.clone(),
        TradeSettings::from_config(config)?,
    ));

    let started_at = chrono::Utc::now().timestamp().max(0) as u64;
    let sniper = Sniper::new(lifecycle, config.trading.one_token_at_a_time, started_at);

    let (senders, events) = stream::events::channel(config.stream.channel_capacity);
    let listener = EventListener::new(
        config.rpc.ws_endpoint.clone(),
        commitment,
        quote.mint,
        keypair.pubkey(),
        config.markets.cache_new,
        config.stream.clone(),
        senders,
    );
    let shutdown = listener.shutdown_handle();
    let listener_handle = listener.start();

    info!("Listening for new {} pools...", quote.symbol);

    tokio::select! {
        _ = sniper.run(events) => {
            // open positions still run their timed exits
            error!(
                "Event stream ended, no new pools will be sniped. {} positions active, waiting for shutdown signal",
                cache.active_count()
            );
            tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
            info!("Received shutdown signal");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    let _ = shutdown.send(());
    match listener_handle.await {
        Ok(Err(e)) => warn!("Listener stopped with error: {}", e),
        Err(e) => warn!("Listener task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!(
        "Shutdown complete, {} positions still active",
        cache.active_count()
    );
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check system health
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let mut all_healthy = true;

    print!("RPC Endpoint... ");
    match check_rpc(config).await {
        Ok(latency) => println!("OK ({}ms)", latency),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("WebSocket Endpoint... ");
    match check_websocket(config).await {
        Ok(_) => println!("OK"),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Wallet... ");
    match check_wallet(config).await {
        Ok(balance) => println!("OK (quote balance: {})", balance),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    println!("Executor... {}", config.executor.kind);

    println!();
    if all_healthy {
        println!("All systems healthy!");
    } else {
        println!("Some systems are unhealthy. Check the errors above.");
    }

    Ok(())
}

async fn check_rpc(config: &Config) -> Result<u64> {
    let client = rpc_client(config);

    let start = Instant::now();
    client.get_slot().await?;
    Ok(start.elapsed().as_millis() as u64)
}

async fn check_websocket(config: &Config) -> Result<()> {
    use solana_client::nonblocking::pubsub_client::PubsubClient;

    let timeout = Duration::from_secs(5);
    match tokio::time::timeout(timeout, PubsubClient::new(&config.rpc.ws_endpoint)).await {
        Ok(Ok(client)) => {
            client.shutdown().await?;
            Ok(())
        }
        Ok(Err(e)) => Err(anyhow::anyhow!("WebSocket connection failed: {}", e)),
        Err(_) => Err(anyhow::anyhow!("Connection timed out after {}s", timeout.as_secs())),
    }
}

/// Quote token balance of the wallet, in UI units
async fn check_wallet(config: &Config) -> Result<f64> {
    let keypair = load_keypair(&config.wallet)?;
    let quote = config.trading.quote_token()?;
    let source = RpcAccountSource::new(rpc_client(config), config.rpc.commitment_config());
    let ata = spl_associated_token_account::get_associated_token_address(
        &keypair.pubkey(),
        &quote.mint,
    );
    let data = source
        .get_account_data(&ata)
        .await?
        .ok_or_else(|| anyhow::anyhow!("{} account {} not found", quote.symbol, ata))?;
    Ok(quote.to_ui(token_account_amount(&data)?))
}
