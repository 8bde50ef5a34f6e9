//! Authority-owned session state: the active player and the rating.

use crate::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Accepted,
    /// The same entity already holds the claim.
    Unchanged,
    /// Another entity already holds the claim. First claim wins.
    Rejected { holder: EntityId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    active_player: Option<EntityId>,
    rating: i32,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_player(&self) -> Option<EntityId> {
        self.active_player
    }

    pub fn rating(&self) -> i32 {
        self.rating
    }

    pub fn claim_player(&mut self, entity_id: EntityId) -> ClaimOutcome {
        match self.active_player {
            None => {
                self.active_player = Some(entity_id);
                ClaimOutcome::Accepted
            }
            Some(holder) if holder == entity_id => ClaimOutcome::Unchanged,
            Some(holder) => ClaimOutcome::Rejected { holder },
        }
    }

    /// Stores an absolute rating and returns the value it replaced.
    pub fn store_rating(&mut self, rating: i32) -> i32 {
        std::mem::replace(&mut self.rating, rating)
    }

    pub fn reset(&mut self) {
        self.active_player = None;
        self.rating = 0;
    }

    pub fn is_default(&self) -> bool {
        self.active_player.is_none() && self.rating == 0
    }
}
