//! Position tracking and the buy / hold / sell lifecycle

pub mod cache;
pub mod lifecycle;
pub mod monitor;
pub mod retry;
pub mod state;

pub use cache::PositionCache;
pub use lifecycle::{ExitReason, Lifecycle, TradeSettings};
pub use monitor::{ExitDecision, PoolPriceSource, PriceMonitor, PriceSource};
pub use retry::RetryPolicy;
pub use state::{Position, PositionState};
