//! Raydium Sniper Bot Library
//!
//! Watches for newly opened Raydium AMM v4 pools, screens them, buys
//! through a pluggable executor and sells on take profit, stop loss or timeout.

pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod keypair;
pub mod position;
pub mod raydium;
pub mod sniper;
pub mod stream;
pub mod trading;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
