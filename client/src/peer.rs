//! Peer-side protocol handling
//!
//! A `Peer` is everything one process knows about the session: its replica
//! of the shared state, the replicated entities, and the request channel to
//! the authority. Broadcasts go in through [`Peer::handle_packet`]; commands
//! come out on the outbox. The peer never writes shared state directly, it
//! only asks.

use crate::entity::{EntityConfig, PlayerEntity};
use crate::replica::Replica;
use log::{debug, error, info, warn};
use shared::{Activation, EntityId, MoveAxis, Packet, PeerId, Role, Transform, RATING_STEP};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::mpsc;

const MAX_MESSAGES: usize = 5;

/// Input sampled once per frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    pub axis: MoveAxis,
    /// Rate the player up this frame
    pub rate_up: bool,
    /// Rate the player down this frame
    pub rate_down: bool,
    pub quit: bool,
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub name: String,
    pub entity: EntityConfig,
    pub rating_step: i32,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            name: "player".to_string(),
            entity: EntityConfig::default(),
            rating_step: RATING_STEP,
        }
    }
}

pub struct Peer {
    config: PeerConfig,
    is_authority: bool,
    peer_id: Option<PeerId>,
    local_entity: Option<EntityId>,
    connected: bool,
    replica: Replica,
    entities: BTreeMap<EntityId, PlayerEntity>,
    messages: VecDeque<String>,
    outbox: mpsc::UnboundedSender<Packet>,
}

impl Peer {
    /// `is_authority` is true when this process hosts the authority.
    pub fn new(
        config: PeerConfig,
        is_authority: bool,
        outbox: mpsc::UnboundedSender<Packet>,
    ) -> Self {
        Self {
            config,
            is_authority,
            peer_id: None,
            local_entity: None,
            connected: false,
            replica: Replica::new(),
            entities: BTreeMap::new(),
            messages: VecDeque::new(),
            outbox,
        }
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.peer_id
    }

    pub fn is_authority(&self) -> bool {
        self.is_authority
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn entity(&self, entity_id: EntityId) -> Option<&PlayerEntity> {
        self.entities.get(&entity_id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &PlayerEntity> {
        self.entities.values()
    }

    pub fn local_entity(&self) -> Option<&PlayerEntity> {
        self.local_entity.and_then(|id| self.entities.get(&id))
    }

    pub fn local_role(&self) -> Option<Role> {
        self.local_entity().and_then(|entity| entity.role())
    }

    /// Recent join announcements, oldest first
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }

    fn send(&self, packet: Packet) {
        if let Err(e) = self.outbox.send(packet) {
            error!("Failed to queue {} for the authority", e.0.kind());
        }
    }

    /// Applies one packet from the authority
    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { peer_id, entity_id } => {
                info!("Connected! Peer ID: {}, entity: {}", peer_id, entity_id);
                self.peer_id = Some(peer_id);
                self.local_entity = Some(entity_id);
                self.connected = true;
            }

            Packet::Spawned {
                entity_id,
                owner,
                speed,
                transform,
            } => self.spawn(entity_id, owner, speed, transform),

            Packet::Despawned { entity_id } => {
                if self.entities.remove(&entity_id).is_some() {
                    debug!("Despawned entity {}", entity_id);
                }
                if self.local_entity == Some(entity_id) {
                    self.local_entity = None;
                }
            }

            Packet::PlayerSet { entity_id } => {
                if self.replica.set_active_player(entity_id) {
                    self.notify_waiting();
                }
            }

            Packet::PlayerRated { rating, origin } => {
                self.replica.apply_rating_broadcast(rating, origin, self.peer_id);
            }

            Packet::RatingSet { rating } => self.replica.apply_rating_resync(rating),

            Packet::Joined { message } => {
                info!("{}", message);
                if self.messages.len() == MAX_MESSAGES {
                    self.messages.pop_front();
                }
                self.messages.push_back(message);
            }

            Packet::EntityMoved {
                entity_id,
                transform,
            } => {
                if let Some(entity) = self.entities.get_mut(&entity_id) {
                    entity.apply_remote_transform(transform);
                }
            }

            Packet::SessionReset => self.replica.reset(),

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.on_client_stop();
            }

            other => warn!("Unexpected {} packet from the authority", other.kind()),
        }
    }

    fn spawn(&mut self, entity_id: EntityId, owner: PeerId, speed: f32, transform: Transform) {
        if self.entities.contains_key(&entity_id) {
            debug!("Entity {} already spawned", entity_id);
            return;
        }

        let local = self.peer_id == Some(owner);
        self.entities.insert(
            entity_id,
            PlayerEntity::new(entity_id, owner, speed, transform, local),
        );
        self.activate(entity_id);
    }

    /// Role setup for a freshly spawned entity plus the requests it implies
    fn activate(&mut self, entity_id: EntityId) {
        let active_player = self.replica.subscribe();
        let Some(entity) = self.entities.get_mut(&entity_id) else {
            return;
        };
        let Some(activation) = entity.activate(self.is_authority, active_player) else {
            return;
        };
        let local = entity.is_local();
        let name = entity.name().to_string();

        if activation == Activation::LocalHost {
            if self.replica.active_player().is_none() {
                self.send(Packet::SetPlayer { entity_id });
            } else {
                debug!("Active player already known, not claiming entity {}", entity_id);
            }
        }

        if activation.requests_resync() {
            self.send(Packet::ResyncPlayer);
        }

        if local {
            self.send(Packet::ResyncRating);
            self.send(Packet::AnnounceJoin { name });
        }
    }

    /// Finishes setup of every entity waiting on the active player
    fn notify_waiting(&mut self) {
        for entity in self.entities.values_mut().filter(|e| e.is_waiting()) {
            entity.try_resolve();
        }
    }

    /// Rates the player: predict locally, refresh the label, then send the
    /// absolute value to the authority.
    pub fn rate_player(&mut self, delta: i32) {
        info!("Rating the player with {}", delta);
        let prediction = self.replica.predict_delta(delta);
        self.send(Packet::RatePlayer {
            rating: prediction.rating,
            base: prediction.base,
        });
    }

    /// Transform of the player a local spectator is watching, once known
    pub fn spectator_target(&self) -> Option<Transform> {
        if self.local_role() != Some(Role::LocalSpectator) {
            return None;
        }
        let target = self.replica.active_player()?;
        self.entities.get(&target).map(|entity| entity.transform)
    }

    /// Per-frame update: movement, spectator follow and rating keys
    pub fn update(&mut self, input: &FrameInput, dt: f32) {
        let config = self.config.entity;
        let mut moved = Vec::new();
        for entity in self.entities.values_mut() {
            if entity.update_movement(input.axis, dt, &config) {
                moved.push((entity.id, entity.transform));
            }
        }
        for (entity_id, transform) in moved {
            self.send(Packet::MoveEntity {
                entity_id,
                transform,
            });
        }

        let Some(target) = self.spectator_target() else {
            return;
        };
        if let Some(entity) = self.local_entity.and_then(|id| self.entities.get_mut(&id)) {
            entity.follow(target);
        }

        let step = self.config.rating_step;
        if input.rate_up {
            self.rate_player(step);
        } else if input.rate_down {
            self.rate_player(-step);
        }
    }

    /// Leaves the session and resets local state.
    pub fn disconnect(&mut self) {
        if self.connected {
            self.send(Packet::Disconnect);
            self.connected = false;
        }

        if self.is_authority {
            self.on_host_stop();
        } else {
            self.on_client_stop();
        }
    }

    /// Client stopped: drop replicated entities and return to defaults.
    pub fn on_client_stop(&mut self) {
        self.replica.reset();
        self.entities.clear();
        self.local_entity = None;
        self.peer_id = None;
    }

    /// Host stopped. The authority resets the session for remote peers; the
    /// host's own replica resets here.
    pub fn on_host_stop(&mut self) {
        self.on_client_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(is_authority: bool) -> (Peer, mpsc::UnboundedReceiver<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Peer::new(PeerConfig::default(), is_authority, tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Packet>) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(packet) = rx.try_recv() {
            packets.push(packet);
        }
        packets
    }

    fn spawned(entity_id: EntityId, owner: PeerId) -> Packet {
        Packet::Spawned {
            entity_id,
            owner,
            speed: 2.0,
            transform: Transform::default(),
        }
    }

    #[test]
    fn test_host_claims_player_on_activation() {
        let (mut host, mut rx) = peer(true);
        host.handle_packet(Packet::Connected {
            peer_id: 1,
            entity_id: 1,
        });
        host.handle_packet(spawned(1, 1));

        assert_eq!(host.local_role(), Some(Role::LocalHost));
        let sent = drain(&mut rx);
        assert_eq!(sent[0], Packet::SetPlayer { entity_id: 1 });
        assert!(!sent.contains(&Packet::ResyncPlayer));
        assert!(sent.contains(&Packet::ResyncRating));
    }

    #[test]
    fn test_host_skips_claim_when_player_known() {
        let (mut host, mut rx) = peer(true);
        host.handle_packet(Packet::Connected {
            peer_id: 1,
            entity_id: 2,
        });
        host.handle_packet(Packet::PlayerSet { entity_id: Some(9) });
        host.handle_packet(spawned(2, 1));

        let sent = drain(&mut rx);
        assert!(!sent
            .iter()
            .any(|p| matches!(p, Packet::SetPlayer { .. })));
    }

    #[test]
    fn test_spectator_activation_requests_resync() {
        let (mut spectator, mut rx) = peer(false);
        spectator.handle_packet(Packet::Connected {
            peer_id: 2,
            entity_id: 2,
        });
        spectator.handle_packet(spawned(2, 2));

        assert_eq!(spectator.local_role(), Some(Role::LocalSpectator));
        let sent = drain(&mut rx);
        assert_eq!(
            sent,
            vec![
                Packet::ResyncPlayer,
                Packet::ResyncRating,
                Packet::AnnounceJoin {
                    name: "Local - Spectator (Client Side)".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_remote_entities_resolve_on_broadcast() {
        let (mut spectator, _rx) = peer(false);
        spectator.handle_packet(Packet::Connected {
            peer_id: 2,
            entity_id: 2,
        });
        spectator.handle_packet(spawned(1, 1));
        spectator.handle_packet(spawned(2, 2));
        spectator.handle_packet(spawned(3, 3));

        assert!(spectator.entity(1).unwrap().is_waiting());
        assert!(spectator.entity(3).unwrap().is_waiting());

        spectator.handle_packet(Packet::PlayerSet { entity_id: Some(1) });
        assert_eq!(spectator.entity(1).unwrap().role(), Some(Role::RemoteHost));
        assert_eq!(
            spectator.entity(3).unwrap().role(),
            Some(Role::RemoteSpectator)
        );
        assert_eq!(
            spectator.entity(2).unwrap().role(),
            Some(Role::LocalSpectator)
        );
    }

    #[test]
    fn test_null_player_broadcast_keeps_waiting() {
        let (mut spectator, _rx) = peer(false);
        spectator.handle_packet(Packet::Connected {
            peer_id: 2,
            entity_id: 2,
        });
        spectator.handle_packet(spawned(1, 1));
        spectator.handle_packet(Packet::PlayerSet { entity_id: None });

        assert!(spectator.entity(1).unwrap().is_waiting());
    }

    #[test]
    fn test_rating_keys_need_a_target() {
        let (mut spectator, mut rx) = peer(false);
        spectator.handle_packet(Packet::Connected {
            peer_id: 2,
            entity_id: 2,
        });
        spectator.handle_packet(spawned(2, 2));
        drain(&mut rx);

        let input = FrameInput {
            rate_up: true,
            ..FrameInput::default()
        };
        spectator.update(&input, 0.016);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(spectator.replica().rating(), 0);

        spectator.handle_packet(spawned(1, 1));
        spectator.handle_packet(Packet::PlayerSet { entity_id: Some(1) });
        drain(&mut rx);

        spectator.update(&input, 0.016);
        assert_eq!(
            drain(&mut rx),
            vec![Packet::RatePlayer { rating: 5, base: 0 }]
        );
        assert_eq!(spectator.replica().label().text(), "Rating : 5");
    }

    #[test]
    fn test_own_echoes_do_not_roll_label_back() {
        let (mut spectator, mut rx) = peer(false);
        spectator.handle_packet(Packet::Connected {
            peer_id: 2,
            entity_id: 2,
        });
        spectator.rate_player(5);
        spectator.rate_player(5);
        assert_eq!(
            drain(&mut rx),
            vec![
                Packet::RatePlayer { rating: 5, base: 0 },
                Packet::RatePlayer { rating: 10, base: 5 },
            ]
        );

        let mut labels = Vec::new();
        for rating in [5, 10] {
            spectator.handle_packet(Packet::PlayerRated { rating, origin: 2 });
            labels.push(spectator.replica().label().text().to_string());
        }
        assert_eq!(labels, vec!["Rating : 10", "Rating : 10"]);
    }

    #[test]
    fn test_spectator_follows_target() {
        let (mut spectator, _rx) = peer(false);
        spectator.handle_packet(Packet::Connected {
            peer_id: 2,
            entity_id: 2,
        });
        spectator.handle_packet(spawned(2, 2));
        spectator.handle_packet(spawned(1, 1));
        spectator.handle_packet(Packet::PlayerSet { entity_id: Some(1) });
        spectator.handle_packet(Packet::EntityMoved {
            entity_id: 1,
            transform: Transform::new(2.0, 3.0),
        });

        spectator.update(&FrameInput::default(), 0.016);
        let local = spectator.local_entity().unwrap();
        assert_eq!(local.transform.x, 2.0);
        assert_eq!(local.transform.z, 3.0);
    }

    #[test]
    fn test_host_movement_is_reported() {
        let (mut host, mut rx) = peer(true);
        host.handle_packet(Packet::Connected {
            peer_id: 1,
            entity_id: 1,
        });
        host.handle_packet(spawned(1, 1));
        drain(&mut rx);

        let input = FrameInput {
            axis: MoveAxis {
                vertical: 1.0,
                horizontal: 0.0,
            },
            ..FrameInput::default()
        };
        host.update(&input, 0.5);

        assert_eq!(
            drain(&mut rx),
            vec![Packet::MoveEntity {
                entity_id: 1,
                transform: Transform::new(0.0, 1.0)
            }]
        );
    }

    #[test]
    fn test_session_reset_clears_replica() {
        let (mut spectator, _rx) = peer(false);
        spectator.handle_packet(Packet::RatingSet { rating: 10 });
        spectator.handle_packet(Packet::PlayerSet { entity_id: Some(1) });

        spectator.handle_packet(Packet::SessionReset);
        spectator.handle_packet(Packet::SessionReset);
        assert_eq!(spectator.replica().rating(), 0);
        assert_eq!(spectator.replica().active_player(), None);
        assert_eq!(spectator.replica().label().text(), "Rating : 0");
    }

    #[test]
    fn test_disconnect_sends_and_resets() {
        let (mut spectator, mut rx) = peer(false);
        spectator.handle_packet(Packet::Connected {
            peer_id: 2,
            entity_id: 2,
        });
        spectator.handle_packet(spawned(2, 2));
        spectator.handle_packet(Packet::RatingSet { rating: 5 });
        drain(&mut rx);

        spectator.disconnect();
        assert_eq!(drain(&mut rx), vec![Packet::Disconnect]);
        assert!(!spectator.is_connected());
        assert_eq!(spectator.entities().count(), 0);
        assert_eq!(spectator.replica().rating(), 0);
    }

    #[test]
    fn test_join_messages_are_capped() {
        let (mut spectator, _rx) = peer(false);
        for i in 0..(MAX_MESSAGES + 2) {
            spectator.handle_packet(Packet::Joined {
                message: format!("peer {} has joined", i),
            });
        }

        let messages: Vec<&str> = spectator.messages().collect();
        assert_eq!(messages.len(), MAX_MESSAGES);
        assert_eq!(messages[0], "peer 2 has joined");
    }
}
