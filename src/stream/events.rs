//! Typed events produced by the listener, one channel per kind

use solana_account_decoder::UiAccount;
use solana_sdk::account::Account;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::raydium::program::OPENBOOK_PROGRAM_ID;
use crate::raydium::token::token_account_amount;
use crate::raydium::{MarketRecord, PoolRecord};

/// A Raydium v4 pool account appeared or changed
#[derive(Debug, Clone)]
pub struct PoolDiscovered {
    pub pool_id: Pubkey,
    /// As laid out on chain, orientation is left to the consumer
    pub pool: PoolRecord,
    pub slot: u64,
}

/// An OpenBook market quoted in the quote token was created or updated
#[derive(Debug, Clone)]
pub struct MarketDiscovered {
    pub market_id: Pubkey,
    pub market: MarketRecord,
    pub slot: u64,
}

/// One of the wallet's token accounts changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletBalanceChanged {
    pub mint: Pubkey,
    pub token_account: Pubkey,
    pub amount: u64,
    pub slot: u64,
}

/// Receiving side handed to the sniper
pub struct EventStream {
    pub pools: mpsc::Receiver<PoolDiscovered>,
    pub wallet: mpsc::Receiver<WalletBalanceChanged>,
    pub markets: mpsc::Receiver<MarketDiscovered>,
}

/// Sending side kept by the listener
#[derive(Clone)]
pub struct EventSenders {
    pub pools: mpsc::Sender<PoolDiscovered>,
    pub wallet: mpsc::Sender<WalletBalanceChanged>,
    pub markets: mpsc::Sender<MarketDiscovered>,
}

pub fn channel(capacity: usize) -> (EventSenders, EventStream) {
    let (pools_tx, pools_rx) = mpsc::channel(capacity);
    let (wallet_tx, wallet_rx) = mpsc::channel(capacity);
    let (markets_tx, markets_rx) = mpsc::channel(capacity);
    (
        EventSenders {
            pools: pools_tx,
            wallet: wallet_tx,
            markets: markets_tx,
        },
        EventStream {
            pools: pools_rx,
            wallet: wallet_rx,
            markets: markets_rx,
        },
    )
}

fn decode_keyed(pubkey: &str, account: &UiAccount) -> Result<(Pubkey, Vec<u8>)> {
    let key = Pubkey::from_str(pubkey)
        .map_err(|e| Error::Decode(format!("bad account key {}: {}", pubkey, e)))?;
    let account: Account = account
        .decode()
        .ok_or_else(|| Error::Decode(format!("undecodable account data for {}", key)))?;
    Ok((key, account.data))
}

pub fn decode_pool_event(pubkey: &str, account: &UiAccount, slot: u64) -> Result<PoolDiscovered> {
    let (pool_id, data) = decode_keyed(pubkey, account)?;
    Ok(PoolDiscovered {
        pool_id,
        pool: PoolRecord::decode(&data)?,
        slot,
    })
}

pub fn decode_market_event(pubkey: &str, account: &UiAccount, slot: u64) -> Result<MarketDiscovered> {
    let (market_id, data) = decode_keyed(pubkey, account)?;
    Ok(MarketDiscovered {
        market_id,
        market: MarketRecord::decode(&data, &market_id, &OPENBOOK_PROGRAM_ID)?,
        slot,
    })
}

pub fn decode_wallet_event(pubkey: &str, account: &UiAccount, slot: u64) -> Result<WalletBalanceChanged> {
    let (token_account, data) = decode_keyed(pubkey, account)?;
    if data.len() < 64 {
        return Err(Error::Decode(format!("token account {} too short", token_account)));
    }
    let mint = Pubkey::try_from(&data[..32])
        .map_err(|e| Error::Decode(format!("token account mint: {}", e)))?;

    Ok(WalletBalanceChanged {
        mint,
        token_account,
        amount: token_account_amount(&data)?,
        slot,
    })
}
