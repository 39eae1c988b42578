//! Position record and its forward-only state machine

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    New,
    Filtering,
    Buying,
    Open,
    Selling,
    Closed,
    Aborted,
    Failed,
}

impl PositionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionState::Closed | PositionState::Aborted | PositionState::Failed
        )
    }

    /// Allowed edges. Retries stay inside BUYING / SELLING and are not transitions.
    pub fn can_advance_to(&self, next: PositionState) -> bool {
        use PositionState::*;
        matches!(
            (self, next),
            (New, Filtering)
                | (Filtering, Buying)
                | (Filtering, Aborted)
                | (Buying, Open)
                | (Buying, Failed)
                | (Open, Selling)
                | (Selling, Closed)
                | (Selling, Failed)
        )
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PositionState::New => "NEW",
            PositionState::Filtering => "FILTERING",
            PositionState::Buying => "BUYING",
            PositionState::Open => "OPEN",
            PositionState::Selling => "SELLING",
            PositionState::Closed => "CLOSED",
            PositionState::Aborted => "ABORTED",
            PositionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A single position in a token
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    /// Token mint address
    #[serde(serialize_with = "as_string")]
    pub mint: Pubkey,
    #[serde(serialize_with = "as_string")]
    pub pool_id: Pubkey,
    pub state: PositionState,
    /// Pool spot price (quote per token) right after the buy landed
    pub entry_price: Option<f64>,
    /// Quote committed to the buy, raw units
    pub quote_amount: u64,
    /// Tokens held, raw units
    pub token_amount: u64,
    pub buy_attempts: u32,
    pub sell_attempts: u32,
    pub buy_signature: Option<String>,
    pub sell_signature: Option<String>,
    pub discovered_at: chrono::DateTime<chrono::Utc>,
    pub opened_at: Option<chrono::DateTime<chrono::Utc>>,
    pub closed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Why the position ended in ABORTED / FAILED
    pub failure: Option<String>,
}

fn as_string<S: serde::Serializer>(key: &Pubkey, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&key.to_string())
}

impl Position {
    pub fn new(mint: Pubkey, pool_id: Pubkey, quote_amount: u64) -> Self {
        Self {
            mint,
            pool_id,
            state: PositionState::New,
            entry_price: None,
            quote_amount,
            token_amount: 0,
            buy_attempts: 0,
            sell_attempts: 0,
            buy_signature: None,
            sell_signature: None,
            discovered_at: chrono::Utc::now(),
            opened_at: None,
            closed_at: None,
            failure: None,
        }
    }

    /// Move to `next`, rejecting anything that is not a forward edge
    pub fn advance(&mut self, next: PositionState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        match next {
            PositionState::Open => self.opened_at = Some(chrono::Utc::now()),
            s if s.is_terminal() => self.closed_at = Some(chrono::Utc::now()),
            _ => {}
        }
        self.state = next;
        Ok(())
    }

    /// Terminate with a failure reason
    pub fn fail(&mut self, next: PositionState, reason: impl Into<String>) -> Result<()> {
        self.advance(next)?;
        self.failure = Some(reason.into());
        Ok(())
    }

    /// Profit/loss percent at `price`, None before entry
    pub fn pnl_pct(&self, price: f64) -> Option<f64> {
        let entry = self.entry_price.filter(|p| *p > 0.0)?;
        Some((price - entry) / entry * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PositionState::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut position = Position::new(Pubkey::new_unique(), Pubkey::new_unique(), 1_000);
        for next in [Filtering, Buying, Open, Selling, Closed] {
            position.advance(next).unwrap();
        }
        assert_eq!(position.state, Closed);
        assert!(position.opened_at.is_some());
        assert!(position.closed_at.is_some());
    }

    #[test]
    fn test_no_backward_or_skipping_moves() {
        let mut position = Position::new(Pubkey::new_unique(), Pubkey::new_unique(), 1_000);
        assert!(position.advance(Buying).is_err());

        position.advance(Filtering).unwrap();
        position.advance(Buying).unwrap();
        assert!(matches!(
            position.advance(Filtering),
            Err(Error::InvalidTransition { .. })
        ));
        // a retry is not a transition
        assert!(position.advance(Buying).is_err());

        position.fail(Failed, "retries exhausted").unwrap();
        assert!(position.state.is_terminal());
        assert!(position.advance(Open).is_err());
        assert_eq!(position.failure.as_deref(), Some("retries exhausted"));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [Closed, Aborted, Failed] {
            for next in [New, Filtering, Buying, Open, Selling, Closed, Aborted, Failed] {
                assert!(!terminal.can_advance_to(next));
            }
        }
    }

    #[test]
    fn test_pnl() {
        let mut position = Position::new(Pubkey::new_unique(), Pubkey::new_unique(), 1_000);
        assert!(position.pnl_pct(1.0).is_none());
        position.entry_price = Some(100.0);
        assert_eq!(position.pnl_pct(150.0), Some(50.0));
        assert_eq!(position.pnl_pct(80.0), Some(-20.0));
    }

    #[test]
    fn test_serializes_for_logs() {
        let position = Position::new(Pubkey::new_unique(), Pubkey::new_unique(), 1_000);
        let json = serde_json::to_value(&position).unwrap();
        assert_eq!(json["state"], "NEW");
        assert_eq!(json["mint"], position.mint.to_string());
    }
}
