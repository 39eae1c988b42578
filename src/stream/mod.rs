//! Stream module - on-chain event ingestion
//!
//! The listener turns websocket program notifications into typed events
//! on three channels: new pools, new OpenBook markets and wallet token
//! balance changes.

pub mod events;
pub mod listener;

pub use events::{
    EventSenders, EventStream, MarketDiscovered, PoolDiscovered, WalletBalanceChanged,
};
pub use listener::EventListener;
