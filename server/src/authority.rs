//! Authoritative session logic
//!
//! The authority is the only place where [`SessionState`] changes. Peers send
//! commands; each command is applied and the resulting value is broadcast in
//! one step, so requests are serialized by construction. The authority knows
//! nothing about sockets: every call returns the packets to deliver as a list
//! of [`Outbound`] messages that the network layer routes.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    ClaimOutcome, EntityId, Packet, PeerId, ProtocolError, SessionState, Transform, SPAWN_RADIUS,
};
use std::collections::BTreeMap;

/// A packet the authority wants delivered
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Send {
        peer: PeerId,
        packet: Packet,
    },
    Broadcast {
        packet: Packet,
        exclude: Option<PeerId>,
    },
}

/// Server-side record of a spawned player entity
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub id: EntityId,
    pub owner: PeerId,
    pub transform: Transform,
    /// Transform changed since the last flush
    pub dirty: bool,
}

pub struct Authority {
    session: SessionState,
    entities: BTreeMap<EntityId, EntityRecord>,
    next_entity_id: EntityId,
    host: Option<PeerId>,
    player_speed: f32,
    rng: StdRng,
}

impl Authority {
    /// Creates an authority with an empty session. A seed makes spawn
    /// positions reproducible.
    pub fn new(player_speed: f32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            session: SessionState::new(),
            entities: BTreeMap::new(),
            next_entity_id: 1,
            host: None,
            player_speed,
            rng,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn host(&self) -> Option<PeerId> {
        self.host
    }

    pub fn entity(&self, entity_id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(&entity_id)
    }

    pub fn entity_of(&self, peer: PeerId) -> Option<EntityId> {
        self.entities
            .values()
            .find(|record| record.owner == peer)
            .map(|record| record.id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Spawns the player entity for a newly connected peer.
    ///
    /// The new peer is told its ids, then receives every existing entity, and
    /// finally everyone (the new peer included) learns about the new entity.
    pub fn join(&mut self, peer: PeerId, host: bool) -> Result<Vec<Outbound>, ProtocolError> {
        if host {
            if let Some(existing) = self.host {
                return Err(ProtocolError::HostAlreadyPresent(existing));
            }
            self.host = Some(peer);
        }

        let entity_id = self.next_entity_id;
        self.next_entity_id += 1;

        let transform = Transform::new(
            self.rng.gen_range(-SPAWN_RADIUS..SPAWN_RADIUS),
            self.rng.gen_range(-SPAWN_RADIUS..SPAWN_RADIUS),
        );

        let mut out = vec![Outbound::Send {
            peer,
            packet: Packet::Connected { peer_id: peer, entity_id },
        }];

        for record in self.entities.values() {
            out.push(Outbound::Send {
                peer,
                packet: self.spawn_packet(record),
            });
        }

        let record = EntityRecord {
            id: entity_id,
            owner: peer,
            transform,
            dirty: false,
        };
        out.push(Outbound::Broadcast {
            packet: self.spawn_packet(&record),
            exclude: None,
        });
        self.entities.insert(entity_id, record);

        info!(
            "Spawned entity {} for peer {}{}",
            entity_id,
            peer,
            if host { " (host)" } else { "" }
        );
        Ok(out)
    }

    /// Despawns everything a departing peer owned.
    ///
    /// Losing the host, or the entity holding the active player, ends the
    /// session for everyone else.
    pub fn leave(&mut self, peer: PeerId) -> Vec<Outbound> {
        let owned: Vec<EntityId> = self
            .entities
            .values()
            .filter(|record| record.owner == peer)
            .map(|record| record.id)
            .collect();

        let mut out = Vec::new();
        let mut held_active = false;

        for entity_id in owned {
            self.entities.remove(&entity_id);
            held_active |= self.session.active_player() == Some(entity_id);
            out.push(Outbound::Broadcast {
                packet: Packet::Despawned { entity_id },
                exclude: Some(peer),
            });
        }

        let was_host = self.host == Some(peer);
        if was_host {
            self.host = None;
        }

        if was_host || held_active {
            info!("Peer {} held the session, resetting", peer);
            out.extend(self.reset_session(Some(peer)));
        }

        out
    }

    /// Applies one command from a peer and returns the resulting broadcasts.
    pub fn handle_command(
        &mut self,
        peer: PeerId,
        packet: Packet,
    ) -> Result<Vec<Outbound>, ProtocolError> {
        match packet {
            Packet::Heartbeat => Ok(Vec::new()),

            Packet::SetPlayer { entity_id } => {
                let record = self
                    .entities
                    .get(&entity_id)
                    .ok_or(ProtocolError::UnknownEntity(entity_id))?;

                // Only the host may name the player, and only its own entity
                if self.host != Some(peer) {
                    return Err(ProtocolError::NotHost(peer));
                }
                if record.owner != peer {
                    return Err(ProtocolError::NotOwner { peer, entity_id });
                }

                match self.session.claim_player(entity_id) {
                    ClaimOutcome::Accepted => {
                        info!("Peer {} claimed entity {} as the player", peer, entity_id)
                    }
                    ClaimOutcome::Unchanged => {
                        debug!("Peer {} repeated claim for entity {}", peer, entity_id)
                    }
                    ClaimOutcome::Rejected { holder } => warn!(
                        "Ignoring claim for entity {} from peer {}: entity {} holds it",
                        entity_id, peer, holder
                    ),
                }

                Ok(vec![self.player_broadcast()])
            }

            Packet::ResyncPlayer => {
                debug!("Peer {} requested player resync", peer);
                Ok(vec![self.player_broadcast()])
            }

            Packet::RatePlayer { rating, base } => {
                let previous = self.session.store_rating(rating);
                if base != previous {
                    warn!(
                        "Rating from peer {} was predicted from {} but the session held {}; \
                         last write wins, {} -> {}",
                        peer, base, previous, previous, rating
                    );
                } else {
                    debug!("Peer {} rated: {} -> {}", peer, previous, rating);
                }

                Ok(vec![Outbound::Broadcast {
                    packet: Packet::PlayerRated {
                        rating,
                        origin: peer,
                    },
                    exclude: None,
                }])
            }

            Packet::ResyncRating => Ok(vec![Outbound::Broadcast {
                packet: Packet::RatingSet {
                    rating: self.session.rating(),
                },
                exclude: None,
            }]),

            Packet::AnnounceJoin { name } => Ok(vec![Outbound::Broadcast {
                packet: Packet::Joined {
                    message: format!("{} has joined", name),
                },
                exclude: None,
            }]),

            Packet::MoveEntity {
                entity_id,
                transform,
            } => {
                let record = self
                    .entities
                    .get_mut(&entity_id)
                    .ok_or(ProtocolError::UnknownEntity(entity_id))?;

                if record.owner != peer {
                    return Err(ProtocolError::NotOwner { peer, entity_id });
                }

                record.transform = transform;
                record.dirty = true;
                Ok(Vec::new())
            }

            other => Err(ProtocolError::UnexpectedPacket {
                peer,
                kind: other.kind(),
            }),
        }
    }

    /// Broadcasts transforms that changed since the last call, skipping each
    /// entity's owner.
    pub fn flush_transforms(&mut self) -> Vec<Outbound> {
        self.entities
            .values_mut()
            .filter(|record| record.dirty)
            .map(|record| {
                record.dirty = false;
                Outbound::Broadcast {
                    packet: Packet::EntityMoved {
                        entity_id: record.id,
                        transform: record.transform,
                    },
                    exclude: Some(record.owner),
                }
            })
            .collect()
    }

    /// Host shutdown: reset the session and tell every peer to leave.
    pub fn stop(&mut self) -> Vec<Outbound> {
        let mut out = self.reset_session(None);
        out.push(Outbound::Broadcast {
            packet: Packet::Disconnected {
                reason: "Host stopped".to_string(),
            },
            exclude: None,
        });
        self.entities.clear();
        self.host = None;
        out
    }

    fn reset_session(&mut self, exclude: Option<PeerId>) -> Vec<Outbound> {
        self.session.reset();
        vec![Outbound::Broadcast {
            packet: Packet::SessionReset,
            exclude,
        }]
    }

    fn player_broadcast(&self) -> Outbound {
        Outbound::Broadcast {
            packet: Packet::PlayerSet {
                entity_id: self.session.active_player(),
            },
            exclude: None,
        }
    }

    fn spawn_packet(&self, record: &EntityRecord) -> Packet {
        Packet::Spawned {
            entity_id: record.id,
            owner: record.owner,
            speed: self.player_speed,
            transform: record.transform,
        }
    }
}
