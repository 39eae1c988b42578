//! Trading module - instruction building and submission
//!
//! Supports three submission channels:
//! - Default RPC (compute budget priority fee)
//! - Priority relay (flat fee, warp)
//! - Jito bundles (tip, bundle-level confirmation)

pub mod executor;
pub mod jito;
pub mod rpc;
pub mod transaction;
pub mod warp;

pub use executor::{ConfirmStatus, ExecutionResult, Executor, Submission, TransactionExecutor};
pub use transaction::{Reserves, TransactionBuilder};
