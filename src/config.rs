//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::time::Duration;

use crate::raydium::program::{USDC_MINT, WSOL_MINT};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub auto_sell: AutoSellConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub snipe_list: SnipeListConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub markets: MarketConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_ws_endpoint")]
    pub ws_endpoint: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl RpcConfig {
    /// Commitment level used for reads, subscriptions and confirmation
    pub fn commitment_config(&self) -> CommitmentConfig {
        let commitment = match self.commitment.as_str() {
            "processed" => CommitmentLevel::Processed,
            "finalized" => CommitmentLevel::Finalized,
            _ => CommitmentLevel::Confirmed,
        };
        CommitmentConfig { commitment }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            ws_endpoint: default_ws_endpoint(),
            commitment: default_commitment(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletConfig {
    /// Base58 encoded secret key
    #[serde(default = "default_private_key")]
    pub private_key: String,
    /// Path to a JSON byte-array keypair, used when no private key is set
    #[serde(default)]
    pub keypair_path: Option<String>,
}

/// Quote token the bot buys with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteToken {
    pub mint: Pubkey,
    pub decimals: u8,
    pub symbol: &'static str,
}

impl QuoteToken {
    pub fn wsol() -> Self {
        Self {
            mint: WSOL_MINT,
            decimals: 9,
            symbol: "WSOL",
        }
    }

    pub fn usdc() -> Self {
        Self {
            mint: USDC_MINT,
            decimals: 6,
            symbol: "USDC",
        }
    }

    /// Convert a human amount (e.g. 0.01 WSOL) to raw units
    pub fn to_raw(&self, amount: f64) -> u64 {
        (amount * 10f64.powi(self.decimals as i32)).round() as u64
    }

    /// Convert raw units to a human amount
    pub fn to_ui(&self, raw: u64) -> f64 {
        raw as f64 / 10f64.powi(self.decimals as i32)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// "WSOL" or "USDC"
    #[serde(default = "default_quote_mint")]
    pub quote_mint: String,
    /// Amount of quote token spent per buy
    #[serde(default = "default_quote_amount")]
    pub quote_amount: f64,
    #[serde(default = "default_slippage_pct")]
    pub buy_slippage_pct: f64,
    #[serde(default = "default_true")]
    pub one_token_at_a_time: bool,
    #[serde(default)]
    pub auto_buy_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_buy_retries: u32,
}

impl TradingConfig {
    pub fn quote_token(&self) -> Result<QuoteToken> {
        match self.quote_mint.to_uppercase().as_str() {
            "WSOL" => Ok(QuoteToken::wsol()),
            "USDC" => Ok(QuoteToken::usdc()),
            other => anyhow::bail!("Unsupported quote token {}, use WSOL or USDC", other),
        }
    }

    pub fn auto_buy_delay(&self) -> Duration {
        Duration::from_millis(self.auto_buy_delay_ms)
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            quote_mint: default_quote_mint(),
            quote_amount: default_quote_amount(),
            buy_slippage_pct: default_slippage_pct(),
            one_token_at_a_time: true,
            auto_buy_delay_ms: 0,
            max_buy_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoSellConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Wait after the buy lands before price checking starts
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_sell_retries: u32,
    /// Fixed delay between sell attempts
    #[serde(default = "default_sell_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_slippage_pct")]
    pub sell_slippage_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_price_check_interval_ms")]
    pub price_check_interval_ms: u64,
    #[serde(default = "default_price_check_duration_ms")]
    pub price_check_duration_ms: u64,
}

impl AutoSellConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Price checking is off when either timer is zero
    pub fn price_check_enabled(&self) -> bool {
        self.price_check_interval_ms > 0 && self.price_check_duration_ms > 0
    }
}

impl Default for AutoSellConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 0,
            max_sell_retries: default_max_retries(),
            retry_delay_ms: default_sell_retry_delay_ms(),
            sell_slippage_pct: default_slippage_pct(),
            take_profit_pct: default_take_profit_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            price_check_interval_ms: default_price_check_interval_ms(),
            price_check_duration_ms: default_price_check_duration_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub check_renounced: bool,
    #[serde(default = "default_true")]
    pub check_freezable: bool,
    #[serde(default = "default_true")]
    pub check_burned: bool,
    #[serde(default = "default_true")]
    pub check_mutable: bool,
    /// Quote-token pool size bounds, 0 disables a bound
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: f64,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: f64,
    #[serde(default = "default_filter_check_interval_ms")]
    pub check_interval_ms: u64,
    #[serde(default = "default_filter_check_duration_ms")]
    pub check_duration_ms: u64,
    #[serde(default = "default_consecutive_match_count")]
    pub consecutive_match_count: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            check_renounced: true,
            check_freezable: true,
            check_burned: true,
            check_mutable: true,
            min_pool_size: default_min_pool_size(),
            max_pool_size: default_max_pool_size(),
            check_interval_ms: default_filter_check_interval_ms(),
            check_duration_ms: default_filter_check_duration_ms(),
            consecutive_match_count: default_consecutive_match_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnipeListConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_snipe_list_path")]
    pub path: String,
}

impl Default for SnipeListConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_snipe_list_path(),
        }
    }
}

/// Transaction submission channel
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Default,
    Warp,
    Jito,
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKind::Default => write!(f, "default"),
            ExecutorKind::Warp => write!(f, "warp"),
            ExecutorKind::Jito => write!(f, "jito"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_executor_kind")]
    pub kind: ExecutorKind,
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,
    /// Micro-lamports per compute unit
    #[serde(default = "default_compute_unit_price")]
    pub compute_unit_price: u64,
    /// Flat relay fee / bundle tip in SOL
    #[serde(default = "default_custom_fee_sol")]
    pub custom_fee_sol: f64,
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    #[serde(default = "default_warp_url")]
    pub warp_url: String,
    #[serde(default = "default_jito_urls")]
    pub jito_block_engine_urls: Vec<String>,
}

impl ExecutorConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn custom_fee_lamports(&self) -> u64 {
        (self.custom_fee_sol * 1e9).round() as u64
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: default_executor_kind(),
            compute_unit_limit: default_compute_unit_limit(),
            compute_unit_price: default_compute_unit_price(),
            custom_fee_sol: default_custom_fee_sol(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
            warp_url: default_warp_url(),
            jito_block_engine_urls: default_jito_urls(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    /// 0 = reconnect forever
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: 0,
        }
    }
}

/// OpenBook market caching
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketConfig {
    /// Fetch every market quoted in the quote token at startup
    #[serde(default)]
    pub preload_existing: bool,
    /// Subscribe to new markets and cache them before their pools open
    #[serde(default)]
    pub cache_new: bool,
}

// Default value functions
fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_ws_endpoint() -> String {
    std::env::var("RPC_WS_ENDPOINT").unwrap_or_else(|_| "wss://api.mainnet-beta.solana.com".into())
}

fn default_private_key() -> String {
    std::env::var("PRIVATE_KEY").unwrap_or_default()
}

fn default_commitment() -> String {
    "confirmed".into()
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_quote_mint() -> String {
    "WSOL".into()
}

fn default_quote_amount() -> f64 {
    0.01
}

fn default_slippage_pct() -> f64 {
    20.0
}

fn default_max_retries() -> u32 {
    10
}

fn default_sell_retry_delay_ms() -> u64 {
    500
}

fn default_take_profit_pct() -> f64 {
    40.0
}

fn default_stop_loss_pct() -> f64 {
    20.0
}

fn default_price_check_interval_ms() -> u64 {
    2000
}

fn default_price_check_duration_ms() -> u64 {
    600000
}

fn default_min_pool_size() -> f64 {
    5.0
}

fn default_max_pool_size() -> f64 {
    50.0
}

fn default_filter_check_interval_ms() -> u64 {
    2000
}

fn default_filter_check_duration_ms() -> u64 {
    60000
}

fn default_consecutive_match_count() -> u32 {
    3
}

fn default_snipe_list_path() -> String {
    "snipe-list.txt".into()
}

fn default_executor_kind() -> ExecutorKind {
    ExecutorKind::Default
}

fn default_compute_unit_limit() -> u32 {
    101337
}

fn default_compute_unit_price() -> u64 {
    421197
}

fn default_custom_fee_sol() -> f64 {
    0.006
}

fn default_confirm_timeout_ms() -> u64 {
    60000
}

fn default_warp_url() -> String {
    "https://tx.warp.id/transaction/execute".into()
}

fn default_jito_urls() -> Vec<String> {
    vec![
        "https://mainnet.block-engine.jito.wtf".into(),
        "https://amsterdam.mainnet.block-engine.jito.wtf".into(),
        "https://frankfurt.mainnet.block-engine.jito.wtf".into(),
        "https://ny.mainnet.block-engine.jito.wtf".into(),
        "https://tokyo.mainnet.block-engine.jito.wtf".into(),
    ]
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SNIPER_)
            .add_source(
                config::Environment::with_prefix("SNIPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.trading.quote_token()?;

        if self.trading.quote_amount <= 0.0 {
            anyhow::bail!("quote_amount must be positive");
        }

        for (name, pct) in [
            ("buy_slippage_pct", self.trading.buy_slippage_pct),
            ("sell_slippage_pct", self.auto_sell.sell_slippage_pct),
        ] {
            if !(0.0..100.0).contains(&pct) {
                anyhow::bail!("{} must be within [0, 100)", name);
            }
        }

        if self.auto_sell.enabled {
            if self.auto_sell.take_profit_pct <= 0.0 {
                anyhow::bail!("take_profit_pct must be positive");
            }
            if self.auto_sell.stop_loss_pct <= 0.0 || self.auto_sell.stop_loss_pct >= 100.0 {
                anyhow::bail!("stop_loss_pct must be between 0 and 100");
            }
        }

        if self.filters.consecutive_match_count == 0 {
            anyhow::bail!("consecutive_match_count must be at least 1");
        }

        if self.filters.max_pool_size > 0.0 && self.filters.min_pool_size > self.filters.max_pool_size
        {
            anyhow::bail!(
                "min_pool_size {} exceeds max_pool_size {}",
                self.filters.min_pool_size,
                self.filters.max_pool_size
            );
        }

        if self.executor.kind == ExecutorKind::Jito && self.executor.jito_block_engine_urls.is_empty()
        {
            anyhow::bail!("jito executor needs at least one block engine url");
        }

        if self.executor.kind != ExecutorKind::Default && self.executor.custom_fee_sol <= 0.0 {
            anyhow::bail!("custom_fee_sol must be positive for the {} executor", self.executor.kind);
        }

        if self.wallet.private_key.is_empty() && self.wallet.keypair_path.is_none() {
            tracing::warn!("No wallet configured - set PRIVATE_KEY or wallet.keypair_path");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let executor_fees = match self.executor.kind {
            ExecutorKind::Default => format!(
                "compute_unit_limit: {}\n    compute_unit_price: {} micro-lamports",
                self.executor.compute_unit_limit, self.executor.compute_unit_price
            ),
            ExecutorKind::Warp | ExecutorKind::Jito => {
                format!("fee: {} SOL", self.executor.custom_fee_sol)
            }
        };

        let filters = if self.snipe_list.enabled {
            "disabled (snipe list is on)".to_string()
        } else {
            format!(
                "\n    check_interval: {}ms\n    check_duration: {}ms\n    consecutive_matches: {}\n    renounced: {}\n    freezable: {}\n    burned: {}\n    mutable: {}\n    pool_size: [{}, {}]",
                self.filters.check_interval_ms,
                self.filters.check_duration_ms,
                self.filters.consecutive_match_count,
                self.filters.check_renounced,
                self.filters.check_freezable,
                self.filters.check_burned,
                self.filters.check_mutable,
                self.filters.min_pool_size,
                self.filters.max_pool_size,
            )
        };

        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    ws_endpoint: {}
    commitment: {}
  Wallet:
    private_key: {}
  Executor:
    kind: {}
    {}
  Buy:
    amount: {} {}
    slippage: {}%
    auto_buy_delay: {}ms
    max_retries: {}
    one_token_at_a_time: {}
  Sell:
    auto_sell: {}
    auto_sell_delay: {}ms
    max_retries: {}
    slippage: {}%
    take_profit: {}%
    stop_loss: {}%
    price_check_interval: {}ms
    price_check_duration: {}ms
  Snipe list:
    enabled: {}
    path: {}
  Markets:
    preload_existing: {}
    cache_new: {}
  Filters: {}
"#,
            mask_url(&self.rpc.endpoint),
            mask_url(&self.rpc.ws_endpoint),
            self.rpc.commitment,
            if self.wallet.private_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.executor.kind,
            executor_fees,
            self.trading.quote_amount,
            self.trading.quote_mint,
            self.trading.buy_slippage_pct,
            self.trading.auto_buy_delay_ms,
            self.trading.max_buy_retries,
            self.trading.one_token_at_a_time,
            self.auto_sell.enabled,
            self.auto_sell.delay_ms,
            self.auto_sell.max_sell_retries,
            self.auto_sell.sell_slippage_pct,
            self.auto_sell.take_profit_pct,
            self.auto_sell.stop_loss_pct,
            self.auto_sell.price_check_interval_ms,
            self.auto_sell.price_check_duration_ms,
            self.snipe_list.enabled,
            self.snipe_list.path,
            self.markets.preload_existing,
            self.markets.cache_new,
            filters,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            wallet: WalletConfig::default(),
            trading: TradingConfig::default(),
            auto_sell: AutoSellConfig::default(),
            filters: FilterConfig::default(),
            snipe_list: SnipeListConfig::default(),
            executor: ExecutorConfig::default(),
            stream: StreamConfig::default(),
            markets: MarketConfig::default(),
        }
    }
}
