//! Per-peer mirror of the authority's session state
//!
//! The replica caches the rating and the active player as last broadcast by
//! the authority. It is never authoritative: the only local write that does
//! not come from a broadcast is the optimistic rating prediction made by
//! [`Replica::predict_delta`], and the next broadcast overwrites it.
//!
//! The active player is published through a `tokio::sync::watch` channel so
//! entities waiting for it can subscribe instead of polling a global.

use log::{debug, info, warn};
use shared::{rating_text, EntityId, PeerId};
use std::collections::VecDeque;
use tokio::sync::watch;

/// Display sink for the rating, rendered as `Rating : <value>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingLabel {
    text: String,
    updates: u32,
}

impl RatingLabel {
    pub fn new() -> Self {
        Self {
            text: rating_text(0),
            updates: 0,
        }
    }

    pub fn update_rating(&mut self, rating: i32) {
        self.text = rating_text(rating);
        self.updates += 1;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of refreshes so far
    pub fn updates(&self) -> u32 {
        self.updates
    }
}

impl Default for RatingLabel {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a local rating prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingPrediction {
    /// Cached value the prediction was made from
    pub base: i32,
    /// Absolute value to send to the authority
    pub rating: i32,
}

pub struct Replica {
    rating: i32,
    /// Values this peer sent that the authority has not echoed yet
    in_flight: VecDeque<i32>,
    active_player: watch::Sender<Option<EntityId>>,
    label: RatingLabel,
}

impl Replica {
    pub fn new() -> Self {
        let (active_player, _) = watch::channel(None);
        Self {
            rating: 0,
            in_flight: VecDeque::new(),
            active_player,
            label: RatingLabel::new(),
        }
    }

    pub fn rating(&self) -> i32 {
        self.rating
    }

    pub fn label(&self) -> &RatingLabel {
        &self.label
    }

    pub fn active_player(&self) -> Option<EntityId> {
        *self.active_player.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<EntityId>> {
        self.active_player.subscribe()
    }

    /// Applies a rating delta locally and refreshes the label straight away.
    pub fn predict_delta(&mut self, delta: i32) -> RatingPrediction {
        let base = self.rating;
        self.rating = base.saturating_add(delta);
        self.label.update_rating(self.rating);
        self.in_flight.push_back(self.rating);
        RatingPrediction {
            base,
            rating: self.rating,
        }
    }

    /// Number of own rating requests not yet echoed
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Applies a rating broadcast. Echoes of this peer's own requests are
    /// consumed in order and not re-applied; the last one only corrects the
    /// cache if another peer's write landed in between.
    /// Returns true if the cache changed.
    pub fn apply_rating_broadcast(
        &mut self,
        rating: i32,
        origin: PeerId,
        me: Option<PeerId>,
    ) -> bool {
        if me == Some(origin) {
            if self.in_flight.front() == Some(&rating) {
                self.in_flight.pop_front();
                if !self.in_flight.is_empty() || rating == self.rating {
                    return false;
                }
            } else {
                self.in_flight.clear();
            }

            warn!(
                "Local rating {} overwritten by authority value {}",
                self.rating, rating
            );
        }

        self.rating = rating;
        self.label.update_rating(rating);
        true
    }

    /// Applies a rating resync unconditionally.
    pub fn apply_rating_resync(&mut self, rating: i32) {
        self.rating = rating;
        self.label.update_rating(rating);
    }

    /// Stores the active player broadcast by the authority and notifies
    /// subscribers when it changes. Returns true on change.
    pub fn set_active_player(&mut self, entity_id: Option<EntityId>) -> bool {
        let changed = self.active_player.send_if_modified(|current| {
            if *current == entity_id {
                false
            } else {
                *current = entity_id;
                true
            }
        });

        if changed {
            debug!("Active player is now {:?}", entity_id);
        }
        changed
    }

    /// Back to session defaults; the label shows the reset value.
    pub fn reset(&mut self) {
        info!("Resetting session replica");
        self.rating = 0;
        self.in_flight.clear();
        self.active_player.send_replace(None);
        self.label.update_rating(0);
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_format() {
        let mut label = RatingLabel::new();
        assert_eq!(label.text(), "Rating : 0");
        label.update_rating(-5);
        assert_eq!(label.text(), "Rating : -5");
        assert_eq!(label.updates(), 1);
    }

    #[test]
    fn test_predict_delta_updates_label_immediately() {
        let mut replica = Replica::new();
        let prediction = replica.predict_delta(5);

        assert_eq!(prediction, RatingPrediction { base: 0, rating: 5 });
        assert_eq!(replica.rating(), 5);
        assert_eq!(replica.label().text(), "Rating : 5");
    }

    #[test]
    fn test_echo_to_requester_is_not_reapplied() {
        let mut replica = Replica::new();
        replica.predict_delta(5);
        let updates = replica.label().updates();

        assert!(!replica.apply_rating_broadcast(5, 2, Some(2)));
        assert_eq!(replica.label().updates(), updates);
    }

    #[test]
    fn test_broadcast_overwrites_stale_prediction() {
        let mut replica = Replica::new();
        replica.predict_delta(5);

        assert!(replica.apply_rating_broadcast(-5, 2, Some(2)));
        assert_eq!(replica.rating(), -5);
        assert_eq!(replica.label().text(), "Rating : -5");
    }

    #[test]
    fn test_two_predictions_in_flight() {
        let mut replica = Replica::new();
        replica.predict_delta(5);
        replica.predict_delta(5);
        assert_eq!(replica.in_flight(), 2);
        let updates = replica.label().updates();

        assert!(!replica.apply_rating_broadcast(5, 2, Some(2)));
        assert_eq!(replica.label().text(), "Rating : 10");
        assert!(!replica.apply_rating_broadcast(10, 2, Some(2)));
        assert_eq!(replica.label().text(), "Rating : 10");

        assert_eq!(replica.label().updates(), updates);
        assert_eq!(replica.in_flight(), 0);
    }

    #[test]
    fn test_last_echo_restores_value_after_foreign_write() {
        let mut replica = Replica::new();
        replica.predict_delta(5);

        // Another peer's write lands before the echo
        assert!(replica.apply_rating_broadcast(-5, 3, Some(2)));
        assert_eq!(replica.rating(), -5);

        assert!(replica.apply_rating_broadcast(5, 2, Some(2)));
        assert_eq!(replica.label().text(), "Rating : 5");
        assert_eq!(replica.in_flight(), 0);
    }

    #[test]
    fn test_broadcast_from_other_peer() {
        let mut replica = Replica::new();
        assert!(replica.apply_rating_broadcast(5, 3, Some(1)));
        assert_eq!(replica.label().text(), "Rating : 5");
    }

    #[test]
    fn test_resync_always_applies() {
        let mut replica = Replica::new();
        replica.apply_rating_resync(0);
        assert_eq!(replica.label().updates(), 1);
        replica.apply_rating_resync(20);
        assert_eq!(replica.rating(), 20);
    }

    #[test]
    fn test_active_player_notifies_subscribers() {
        let mut replica = Replica::new();
        let mut rx = replica.subscribe();
        assert!(!rx.has_changed().unwrap());

        assert!(replica.set_active_player(Some(1)));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(1));

        assert!(!replica.set_active_player(Some(1)));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut replica = Replica::new();
        replica.predict_delta(15);
        replica.set_active_player(Some(2));

        replica.reset();
        replica.reset();
        assert_eq!(replica.rating(), 0);
        assert_eq!(replica.in_flight(), 0);
        assert_eq!(replica.active_player(), None);
        assert_eq!(replica.label().text(), "Rating : 0");
    }

    #[test]
    fn test_prediction_saturates() {
        let mut replica = Replica::new();
        replica.apply_rating_resync(i32::MAX);
        let prediction = replica.predict_delta(5);
        assert_eq!(prediction.rating, i32::MAX);
    }
}
