//! Individual safety predicates
//!
//! Every predicate re-reads its accounts on each call since authorities,
//! LP supply and vault balances can change while the pipeline polls.

use async_trait::async_trait;
use std::sync::Arc;

use crate::chain::AccountSource;
use crate::config::{FilterConfig, QuoteToken};
use crate::error::Result;
use crate::raydium::program::metadata_address;
use crate::raydium::token::{metadata_is_mutable, MintSnapshot};
use crate::raydium::PoolRecord;

/// Result of one predicate on one tick
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCheck {
    pub ok: bool,
    pub message: Option<String>,
}

impl FilterCheck {
    pub fn pass() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait PoolFilter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, pool: &PoolRecord) -> Result<FilterCheck>;
}

/// Build the enabled predicates, in evaluation order
pub fn from_config(
    config: &FilterConfig,
    quote: QuoteToken,
    source: Arc<dyn AccountSource>,
) -> Vec<Box<dyn PoolFilter>> {
    let mut filters: Vec<Box<dyn PoolFilter>> = Vec::new();

    if config.check_renounced {
        filters.push(Box::new(MintRenouncedFilter::new(source.clone())));
    }
    if config.check_freezable {
        filters.push(Box::new(NotFreezableFilter::new(source.clone())));
    }
    if config.check_burned {
        filters.push(Box::new(LpBurnedFilter::new(source.clone())));
    }
    if config.min_pool_size > 0.0 || config.max_pool_size > 0.0 {
        filters.push(Box::new(PoolSizeFilter::new(
            source.clone(),
            quote,
            config.min_pool_size,
            config.max_pool_size,
        )));
    }
    if config.check_mutable {
        filters.push(Box::new(ImmutableMetadataFilter::new(source)));
    }

    filters
}

async fn read_base_mint(source: &dyn AccountSource, pool: &PoolRecord) -> Result<Option<MintSnapshot>> {
    match source.get_account_data(&pool.base_mint).await? {
        Some(data) => Ok(Some(MintSnapshot::decode(&data)?)),
        None => Ok(None),
    }
}

pub struct MintRenouncedFilter {
    source: Arc<dyn AccountSource>,
}

impl MintRenouncedFilter {
    pub fn new(source: Arc<dyn AccountSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl PoolFilter for MintRenouncedFilter {
    fn name(&self) -> &'static str {
        "mint_renounced"
    }

    async fn check(&self, pool: &PoolRecord) -> Result<FilterCheck> {
        Ok(match read_base_mint(self.source.as_ref(), pool).await? {
            None => FilterCheck::fail("mint account not found"),
            Some(mint) if mint.is_renounced() => FilterCheck::pass(),
            Some(_) => FilterCheck::fail("mint authority is not renounced"),
        })
    }
}

pub struct NotFreezableFilter {
    source: Arc<dyn AccountSource>,
}

impl NotFreezableFilter {
    pub fn new(source: Arc<dyn AccountSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl PoolFilter for NotFreezableFilter {
    fn name(&self) -> &'static str {
        "not_freezable"
    }

    async fn check(&self, pool: &PoolRecord) -> Result<FilterCheck> {
        Ok(match read_base_mint(self.source.as_ref(), pool).await? {
            None => FilterCheck::fail("mint account not found"),
            Some(mint) if mint.is_freezable() => FilterCheck::fail("freeze authority is set"),
            Some(_) => FilterCheck::pass(),
        })
    }
}

pub struct LpBurnedFilter {
    source: Arc<dyn AccountSource>,
}

impl LpBurnedFilter {
    pub fn new(source: Arc<dyn AccountSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl PoolFilter for LpBurnedFilter {
    fn name(&self) -> &'static str {
        "lp_burned"
    }

    async fn check(&self, pool: &PoolRecord) -> Result<FilterCheck> {
        // a closed LP mint means everything was burned
        let Some(data) = self.source.get_account_data(&pool.lp_mint).await? else {
            return Ok(FilterCheck::pass());
        };

        let lp = MintSnapshot::decode(&data)?;
        if lp.supply == 0 {
            Ok(FilterCheck::pass())
        } else {
            Ok(FilterCheck::fail(format!("LP supply {} not burned", lp.supply)))
        }
    }
}

pub struct PoolSizeFilter {
    source: Arc<dyn AccountSource>,
    quote: QuoteToken,
    min: f64,
    max: f64,
}

impl PoolSizeFilter {
    pub fn new(source: Arc<dyn AccountSource>, quote: QuoteToken, min: f64, max: f64) -> Self {
        Self {
            source,
            quote,
            min,
            max,
        }
    }
}

#[async_trait]
impl PoolFilter for PoolSizeFilter {
    fn name(&self) -> &'static str {
        "pool_size"
    }

    async fn check(&self, pool: &PoolRecord) -> Result<FilterCheck> {
        let raw = self.source.token_balance(&pool.quote_vault).await?;
        let size = self.quote.to_ui(raw);

        if self.max > 0.0 && size > self.max {
            return Ok(FilterCheck::fail(format!(
                "pool size {} {} above max {}",
                size, self.quote.symbol, self.max
            )));
        }
        if self.min > 0.0 && size < self.min {
            return Ok(FilterCheck::fail(format!(
                "pool size {} {} below min {}",
                size, self.quote.symbol, self.min
            )));
        }
        Ok(FilterCheck::pass())
    }
}

pub struct ImmutableMetadataFilter {
    source: Arc<dyn AccountSource>,
}

impl ImmutableMetadataFilter {
    pub fn new(source: Arc<dyn AccountSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl PoolFilter for ImmutableMetadataFilter {
    fn name(&self) -> &'static str {
        "immutable_metadata"
    }

    async fn check(&self, pool: &PoolRecord) -> Result<FilterCheck> {
        let address = metadata_address(&pool.base_mint);
        let Some(data) = self.source.get_account_data(&address).await? else {
            return Ok(FilterCheck::fail("metadata account not found"));
        };

        if metadata_is_mutable(&data)? {
            Ok(FilterCheck::fail("metadata is mutable"))
        } else {
            Ok(FilterCheck::pass())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raydium::pool::tests::sample_pool;
    use crate::raydium::token::{encode_metadata, encode_mint, encode_token_account};
    use crate::testing::MapAccountSource;
    use solana_sdk::pubkey::Pubkey;

    fn setup() -> (Arc<MapAccountSource>, PoolRecord) {
        let source = Arc::new(MapAccountSource::default());
        let pool = sample_pool(Pubkey::new_unique());
        (source, pool)
    }

    #[tokio::test]
    async fn test_mint_authority_checks() {
        let (source, pool) = setup();
        let renounced = MintRenouncedFilter::new(source.clone());
        let freeze = NotFreezableFilter::new(source.clone());

        source.insert(pool.base_mint, encode_mint(None, None, 1_000));
        assert!(renounced.check(&pool).await.unwrap().ok);
        assert!(freeze.check(&pool).await.unwrap().ok);

        let authority = Pubkey::new_unique();
        source.insert(pool.base_mint, encode_mint(Some(authority), Some(authority), 1_000));
        assert!(!renounced.check(&pool).await.unwrap().ok);
        assert!(!freeze.check(&pool).await.unwrap().ok);
    }

    #[tokio::test]
    async fn test_lp_burned() {
        let (source, pool) = setup();
        let filter = LpBurnedFilter::new(source.clone());

        // missing LP mint counts as burned
        assert!(filter.check(&pool).await.unwrap().ok);

        source.insert(pool.lp_mint, encode_mint(None, None, 0));
        assert!(filter.check(&pool).await.unwrap().ok);

        source.insert(pool.lp_mint, encode_mint(None, None, 500));
        let check = filter.check(&pool).await.unwrap();
        assert!(!check.ok);
        assert!(check.message.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_pool_size_bounds() {
        let (source, pool) = setup();
        let wsol = QuoteToken::wsol();
        source.insert(
            pool.quote_vault,
            encode_token_account(&wsol.mint, &Pubkey::new_unique(), wsol.to_raw(10.0)),
        );

        assert!(PoolSizeFilter::new(source.clone(), wsol, 5.0, 50.0)
            .check(&pool)
            .await
            .unwrap()
            .ok);
        assert!(!PoolSizeFilter::new(source.clone(), wsol, 20.0, 50.0)
            .check(&pool)
            .await
            .unwrap()
            .ok);
        assert!(!PoolSizeFilter::new(source.clone(), wsol, 1.0, 5.0)
            .check(&pool)
            .await
            .unwrap()
            .ok);
        // zero disables a bound
        assert!(PoolSizeFilter::new(source.clone(), wsol, 0.0, 0.0)
            .check(&pool)
            .await
            .unwrap()
            .ok);
    }

    #[tokio::test]
    async fn test_metadata_mutability() {
        let (source, pool) = setup();
        let filter = ImmutableMetadataFilter::new(source.clone());
        assert!(!filter.check(&pool).await.unwrap().ok);

        let address = metadata_address(&pool.base_mint);
        source.insert(address, encode_metadata(&pool.base_mint, true));
        assert!(!filter.check(&pool).await.unwrap().ok);

        source.insert(address, encode_metadata(&pool.base_mint, false));
        assert!(filter.check(&pool).await.unwrap().ok);
    }

    #[test]
    fn test_from_config_toggles() {
        let source: Arc<dyn AccountSource> = Arc::new(MapAccountSource::default());
        let mut config = FilterConfig::default();
        assert_eq!(from_config(&config, QuoteToken::wsol(), source.clone()).len(), 5);

        config.check_mutable = false;
        config.min_pool_size = 0.0;
        config.max_pool_size = 0.0;
        let names: Vec<_> = from_config(&config, QuoteToken::wsol(), source)
            .iter()
            .map(|f| f.name())
            .collect();
        assert_eq!(names, vec!["mint_renounced", "not_freezable", "lp_burned"]);
    }
}
