//! Raydium AMM v4 / OpenBook integration

pub mod market;
pub mod pool;
pub mod program;
pub mod swap;
pub mod token;

pub use market::{MarketCache, MarketRecord};
pub use pool::PoolRecord;
