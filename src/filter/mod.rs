//! Token safety gating
//!
//! A discovered pool is either checked against the snipe list or polled
//! through the filter pipeline, never both.

pub mod checks;
pub mod pipeline;
pub mod snipe_list;

pub use checks::{FilterCheck, PoolFilter};
pub use pipeline::FilterPipeline;
pub use snipe_list::SnipeList;

use crate::error::Error;
use crate::raydium::PoolRecord;

/// Outcome of gating one pool
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Pass,
    /// Rejected on a single evaluation
    Fail { filter: String, reason: String },
    /// Check duration ran out, names the last failing predicate
    Timeout { filter: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterVerdict {
    pub outcome: FilterOutcome,
    /// Ticks evaluated before the verdict
    pub ticks: u32,
}

impl FilterVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self.outcome, FilterOutcome::Pass)
    }

    /// Error recorded on an aborted position, None on pass
    pub fn to_error(&self) -> Option<Error> {
        match &self.outcome {
            FilterOutcome::Pass => None,
            FilterOutcome::Fail { filter, reason } => Some(Error::FilterRejected {
                filter: filter.clone(),
                reason: reason.clone(),
            }),
            FilterOutcome::Timeout { filter, .. } => Some(Error::FilterTimeout {
                filter: filter.clone(),
            }),
        }
    }
}

/// Gate in front of the buy
pub enum FilterGate {
    SnipeList(SnipeList),
    Pipeline(FilterPipeline),
}

impl FilterGate {
    pub async fn evaluate(&self, pool: &PoolRecord) -> FilterVerdict {
        match self {
            FilterGate::SnipeList(list) => {
                let outcome = if list.contains(&pool.base_mint) {
                    FilterOutcome::Pass
                } else {
                    FilterOutcome::Fail {
                        filter: "snipe_list".to_string(),
                        reason: "mint not in snipe list".to_string(),
                    }
                };
                FilterVerdict { outcome, ticks: 1 }
            }
            FilterGate::Pipeline(pipeline) => pipeline.evaluate(pool).await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FilterGate::SnipeList(list) => format!("snipe list ({} mints)", list.len()),
            FilterGate::Pipeline(pipeline) => {
                format!("filter pipeline [{}]", pipeline.filter_names().join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raydium::pool::tests::sample_pool;
    use solana_sdk::pubkey::Pubkey;

    #[tokio::test]
    async fn test_snipe_list_gate() {
        let listed = Pubkey::new_unique();
        let gate = FilterGate::SnipeList(std::iter::once(listed).collect());

        assert!(gate.evaluate(&sample_pool(listed)).await.is_pass());

        let verdict = gate.evaluate(&sample_pool(Pubkey::new_unique())).await;
        assert!(!verdict.is_pass());
        assert!(matches!(verdict.to_error(), Some(Error::FilterRejected { .. })));
    }

    #[test]
    fn test_timeout_error() {
        let verdict = FilterVerdict {
            outcome: FilterOutcome::Timeout {
                filter: "lp_burned".into(),
                reason: "LP supply 10 not burned".into(),
            },
            ticks: 30,
        };
        assert!(matches!(
            verdict.to_error(),
            Some(Error::FilterTimeout { filter }) if filter == "lp_burned"
        ));
    }
}
