//! OpenBook market state and the keys the swap instruction borrows from it

use borsh::{BorshDeserialize, BorshSerialize};
use dashmap::DashMap;
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, info};

use super::program::OPENBOOK_PROGRAM_ID;
use crate::chain::AccountSource;
use crate::error::{Error, Result};

pub const MARKET_ACCOUNT_SIZE: usize = 388;
pub const MARKET_QUOTE_MINT_OFFSET: usize = 85;

/// OpenBook markets quoted in `quote_mint`
pub fn market_filters(quote_mint: &Pubkey) -> Vec<RpcFilterType> {
    vec![
        RpcFilterType::DataSize(MARKET_ACCOUNT_SIZE as u64),
        RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
            MARKET_QUOTE_MINT_OFFSET,
            quote_mint.as_ref(),
        )),
    ]
}

#[derive(Debug, Clone, BorshDeserialize, BorshSerialize)]
struct MarketStateV3 {
    _head_padding: [u8; 5],
    _account_flags: u64,
    _own_address: [u8; 32],
    vault_signer_nonce: u64,
    base_mint: [u8; 32],
    quote_mint: [u8; 32],
    base_vault: [u8; 32],
    _base_deposits_total: u64,
    _base_fees_accrued: u64,
    quote_vault: [u8; 32],
    _quote_deposits_total: u64,
    _quote_fees_accrued: u64,
    _quote_dust_threshold: u64,
    _request_queue: [u8; 32],
    event_queue: [u8; 32],
    bids: [u8; 32],
    asks: [u8; 32],
    _base_lot_size: u64,
    _quote_lot_size: u64,
    _fee_rate_bps: u64,
    _referrer_rebates_accrued: u64,
    _tail_padding: [u8; 7],
}

/// Market accounts needed to route a swap through a v4 pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketRecord {
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub vault_signer: Pubkey,
}

impl MarketRecord {
    /// Decode market bytes. `market_id` and `program_id` derive the vault signer.
    pub fn decode(data: &[u8], market_id: &Pubkey, program_id: &Pubkey) -> Result<Self> {
        if data.len() < MARKET_ACCOUNT_SIZE {
            return Err(Error::Decode(format!(
                "market account is {} bytes, expected {}",
                data.len(),
                MARKET_ACCOUNT_SIZE
            )));
        }

        let raw = MarketStateV3::deserialize(&mut &data[..MARKET_ACCOUNT_SIZE])
            .map_err(|e| Error::Decode(format!("market borsh decode failed: {}", e)))?;

        let vault_signer = Pubkey::create_program_address(
            &[market_id.as_ref(), &raw.vault_signer_nonce.to_le_bytes()],
            program_id,
        )
        .map_err(|e| Error::Decode(format!("vault signer derivation failed: {}", e)))?;

        Ok(Self {
            base_mint: Pubkey::new_from_array(raw.base_mint),
            quote_mint: Pubkey::new_from_array(raw.quote_mint),
            base_vault: Pubkey::new_from_array(raw.base_vault),
            quote_vault: Pubkey::new_from_array(raw.quote_vault),
            event_queue: Pubkey::new_from_array(raw.event_queue),
            bids: Pubkey::new_from_array(raw.bids),
            asks: Pubkey::new_from_array(raw.asks),
            vault_signer,
        })
    }
}

/// Build raw market bytes whose nonce yields a valid vault signer. Test fixtures only.
#[cfg(test)]
pub fn encode_market(market_id: &Pubkey, program_id: &Pubkey) -> Vec<u8> {
    encode_market_quoted(market_id, program_id, &Pubkey::new_unique())
}

#[cfg(test)]
pub fn encode_market_quoted(market_id: &Pubkey, program_id: &Pubkey, quote_mint: &Pubkey) -> Vec<u8> {
    let nonce = (0u64..256)
        .find(|n| {
            Pubkey::create_program_address(&[market_id.as_ref(), &n.to_le_bytes()], program_id)
                .is_ok()
        })
        .unwrap_or(0);

    let raw = MarketStateV3 {
        _head_padding: *b"serum",
        _account_flags: 3,
        _own_address: market_id.to_bytes(),
        vault_signer_nonce: nonce,
        base_mint: Pubkey::new_unique().to_bytes(),
        quote_mint: quote_mint.to_bytes(),
        base_vault: Pubkey::new_unique().to_bytes(),
        _base_deposits_total: 0,
        _base_fees_accrued: 0,
        quote_vault: Pubkey::new_unique().to_bytes(),
        _quote_deposits_total: 0,
        _quote_fees_accrued: 0,
        _quote_dust_threshold: 100,
        _request_queue: Pubkey::new_unique().to_bytes(),
        event_queue: Pubkey::new_unique().to_bytes(),
        bids: Pubkey::new_unique().to_bytes(),
        asks: Pubkey::new_unique().to_bytes(),
        _base_lot_size: 1,
        _quote_lot_size: 1,
        _fee_rate_bps: 0,
        _referrer_rebates_accrued: 0,
        _tail_padding: *b"padding",
    };
    borsh::to_vec(&raw).unwrap()
}

/// Market records keyed by market id. Filled by the startup preload and the
/// new-market subscription when enabled, otherwise fetched on first use.
pub struct MarketCache {
    source: Arc<dyn AccountSource>,
    markets: DashMap<Pubkey, MarketRecord>,
}

impl MarketCache {
    pub fn new(source: Arc<dyn AccountSource>) -> Self {
        Self {
            source,
            markets: DashMap::new(),
        }
    }

    /// Return the cached market or fetch and decode it
    pub async fn get(&self, market_id: &Pubkey, program_id: &Pubkey) -> Result<MarketRecord> {
        if let Some(market) = self.markets.get(market_id) {
            return Ok(market.clone());
        }

        debug!("Fetching market {}", market_id);
        let data = self
            .source
            .get_account_data(market_id)
            .await?
            .ok_or_else(|| Error::Rpc(format!("market {} not found", market_id)))?;

        let market = MarketRecord::decode(&data, market_id, program_id)?;
        self.markets.insert(*market_id, market.clone());
        Ok(market)
    }

    pub fn insert(&self, market_id: Pubkey, market: MarketRecord) {
        self.markets.insert(market_id, market);
    }

    pub fn contains(&self, market_id: &Pubkey) -> bool {
        self.markets.contains_key(market_id)
    }

    /// Load every OpenBook market quoted in `quote_mint`. Returns how many were cached.
    pub async fn preload(&self, quote_mint: &Pubkey) -> Result<usize> {
        let accounts = self
            .source
            .get_program_accounts(&OPENBOOK_PROGRAM_ID, market_filters(quote_mint))
            .await?;

        let mut loaded = 0;
        for (market_id, data) in accounts {
            match MarketRecord::decode(&data, &market_id, &OPENBOOK_PROGRAM_ID) {
                Ok(market) => {
                    self.markets.insert(market_id, market);
                    loaded += 1;
                }
                Err(e) => debug!("Skipping market {}: {}", market_id, e),
            }
        }

        info!("Preloaded {} markets", loaded);
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}
