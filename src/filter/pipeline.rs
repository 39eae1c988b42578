//! Polling filter pipeline
//!
//! Runs every enabled predicate once per tick and passes the pool after
//! `consecutive_matches` clean ticks in a row. Any failing tick resets
//! the streak.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::checks::{self, PoolFilter};
use super::{FilterOutcome, FilterVerdict};
use crate::chain::AccountSource;
use crate::config::{FilterConfig, QuoteToken};
use crate::raydium::PoolRecord;

/// Why a single tick failed
#[derive(Debug, Clone, PartialEq)]
pub struct TickFailure {
    pub filter: String,
    pub reason: String,
}

pub struct FilterPipeline {
    filters: Vec<Box<dyn PoolFilter>>,
    interval: Duration,
    duration: Duration,
    consecutive_matches: u32,
}

impl FilterPipeline {
    pub fn new(
        filters: Vec<Box<dyn PoolFilter>>,
        interval: Duration,
        duration: Duration,
        consecutive_matches: u32,
    ) -> Self {
        Self {
            filters,
            interval,
            duration,
            consecutive_matches: consecutive_matches.max(1),
        }
    }

    pub fn from_config(
        config: &FilterConfig,
        quote: QuoteToken,
        source: Arc<dyn AccountSource>,
    ) -> Self {
        Self::new(
            checks::from_config(config, quote, source),
            Duration::from_millis(config.check_interval_ms),
            Duration::from_millis(config.check_duration_ms),
            config.consecutive_match_count,
        )
    }

    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Evaluate every predicate once. The first failing predicate is reported.
    pub async fn check_once(&self, pool: &PoolRecord) -> Result<(), TickFailure> {
        for filter in &self.filters {
            let failure = match filter.check(pool).await {
                Ok(check) if check.ok => continue,
                Ok(check) => check.message.unwrap_or_else(|| "rejected".to_string()),
                Err(e) => e.to_string(),
            };

            return Err(TickFailure {
                filter: filter.name().to_string(),
                reason: failure,
            });
        }
        Ok(())
    }

    /// Number of ticks the pipeline may run. Zero timers mean a single tick.
    fn max_ticks(&self) -> u32 {
        if self.interval.is_zero() || self.duration.is_zero() {
            return 1;
        }
        let ticks = self.duration.as_millis() / self.interval.as_millis();
        ticks.clamp(1, u32::MAX as u128) as u32
    }

    /// Poll the pool until it passes or the check duration runs out
    pub async fn evaluate(&self, pool: &PoolRecord) -> FilterVerdict {
        let single_tick = self.interval.is_zero() || self.duration.is_zero();
        let max_ticks = self.max_ticks();
        let mut streak = 0u32;
        let mut last_failure: Option<TickFailure> = None;

        for tick in 1..=max_ticks {
            match self.check_once(pool).await {
                Ok(()) => {
                    streak += 1;
                    trace!(
                        "Filters passed for {} ({}/{})",
                        pool.base_mint,
                        streak,
                        self.consecutive_matches
                    );
                    if single_tick || streak >= self.consecutive_matches {
                        return FilterVerdict {
                            outcome: FilterOutcome::Pass,
                            ticks: tick,
                        };
                    }
                }
                Err(failure) => {
                    debug!(
                        "Filter {} failed for {}: {}",
                        failure.filter, pool.base_mint, failure.reason
                    );
                    streak = 0;
                    if single_tick {
                        return FilterVerdict {
                            outcome: FilterOutcome::Fail {
                                filter: failure.filter,
                                reason: failure.reason,
                            },
                            ticks: tick,
                        };
                    }
                    last_failure = Some(failure);
                }
            }

            if tick < max_ticks {
                tokio::time::sleep(self.interval).await;
            }
        }

        let failure = last_failure.unwrap_or_else(|| TickFailure {
            filter: "consecutive_match_count".to_string(),
            reason: format!(
                "only {} consecutive passes, {} required",
                streak, self.consecutive_matches
            ),
        });

        FilterVerdict {
            outcome: FilterOutcome::Timeout {
                filter: failure.filter,
                reason: failure.reason,
            },
            ticks: max_ticks,
        }
    }
}
