//! Per-mint dedup cache
//!
//! Holds at most one record per mint. Claiming is an atomic
//! insert-if-absent on the `DashMap` entry, so two discoveries of the
//! same mint racing each other can never both start a buy.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use super::state::{Position, PositionState};

#[derive(Default)]
pub struct PositionCache {
    positions: DashMap<Pubkey, Position>,
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the mint for `position`. Succeeds when the mint is unknown or its
    /// previous position closed; fails while another position is live.
    pub fn try_claim(&self, position: Position) -> bool {
        match self.positions.entry(position.mint) {
            Entry::Vacant(entry) => {
                entry.insert(position);
                true
            }
            Entry::Occupied(mut entry) if entry.get().state == PositionState::Closed => {
                debug!("Re-opening closed mint {}", position.mint);
                entry.insert(position);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, mint: &Pubkey) -> Option<Position> {
        self.positions.get(mint).map(|p| p.clone())
    }

    /// Store the latest snapshot of a claimed position
    pub fn save(&self, position: &Position) {
        self.positions.insert(position.mint, position.clone());
    }

    pub fn remove(&self, mint: &Pubkey) -> Option<Position> {
        self.positions.remove(mint).map(|(_, p)| p)
    }

    /// Drop a finished position from the active set. CLOSED stays as a
    /// marker that a later claim may overwrite, ABORTED / FAILED are removed.
    pub fn release(&self, position: &Position) {
        match position.state {
            PositionState::Closed => self.save(position),
            PositionState::Aborted | PositionState::Failed => {
                self.remove(&position.mint);
            }
            state => debug!("Not releasing {} in state {}", position.mint, state),
        }
    }

    /// Positions that are not in a terminal state
    pub fn active_count(&self) -> usize {
        self.positions
            .iter()
            .filter(|p| !p.state.is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn position(mint: Pubkey) -> Position {
        Position::new(mint, Pubkey::new_unique(), 1_000)
    }

    #[test]
    fn test_duplicate_claim_rejected() {
        let cache = PositionCache::new();
        let mint = Pubkey::new_unique();

        assert!(cache.try_claim(position(mint)));
        assert!(!cache.try_claim(position(mint)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.active_count(), 1);
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let cache = Arc::new(PositionCache::new());
        let mint = Pubkey::new_unique();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.try_claim(position(mint)))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_closed_mint_can_be_reclaimed() {
        let cache = PositionCache::new();
        let mint = Pubkey::new_unique();

        let mut first = position(mint);
        assert!(cache.try_claim(first.clone()));
        for next in [
            PositionState::Filtering,
            PositionState::Buying,
            PositionState::Open,
            PositionState::Selling,
            PositionState::Closed,
        ] {
            first.advance(next).unwrap();
        }
        cache.release(&first);
        assert_eq!(cache.get(&mint).unwrap().state, PositionState::Closed);
        assert_eq!(cache.active_count(), 0);

        assert!(cache.try_claim(position(mint)));
        assert_eq!(cache.get(&mint).unwrap().state, PositionState::New);
    }

    #[test]
    fn test_failed_and_aborted_are_removed() {
        let cache = PositionCache::new();
        let mint = Pubkey::new_unique();

        let mut aborted = position(mint);
        cache.try_claim(aborted.clone());
        aborted.advance(PositionState::Filtering).unwrap();
        aborted.advance(PositionState::Aborted).unwrap();
        cache.release(&aborted);
        assert!(cache.get(&mint).is_none());
        assert!(cache.try_claim(position(mint)));
    }

    #[test]
    fn test_release_ignores_live_positions() {
        let cache = PositionCache::new();
        let mint = Pubkey::new_unique();
        let mut live = position(mint);
        cache.try_claim(live.clone());
        live.advance(PositionState::Filtering).unwrap();
        cache.release(&live);
        // still claimed by the live position
        assert!(!cache.try_claim(position(mint)));
    }
}
