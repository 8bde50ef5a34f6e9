use serde::{Deserialize, Serialize};

pub mod error;
pub mod role;
pub mod session;

pub use error::ProtocolError;
pub use role::{Activation, Role};
pub use session::{ClaimOutcome, SessionState};

pub type PeerId = u32;
pub type EntityId = u32;

/// Error type used at task and binary boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PLAYER_SPEED: f32 = 2.0;
pub const RATING_STEP: i32 = 5;
pub const SPAWN_RADIUS: f32 = 4.0;

/// Camera rig placement for a local spectator: up, back and pitch down.
pub const SPECTATOR_CAMERA_OFFSET: [f32; 3] = [0.0, 3.0, -5.0];
pub const SPECTATOR_CAMERA_PITCH_DEG: f32 = 45.0;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Peer -> authority
    Connect {
        client_version: u32,
        name: String,
        host: bool,
    },
    Heartbeat,
    SetPlayer {
        entity_id: EntityId,
    },
    ResyncPlayer,
    RatePlayer {
        rating: i32,
        base: i32,
    },
    ResyncRating,
    AnnounceJoin {
        name: String,
    },
    MoveEntity {
        entity_id: EntityId,
        transform: Transform,
    },
    Disconnect,

    // Authority -> peers
    Connected {
        peer_id: PeerId,
        entity_id: EntityId,
    },
    Spawned {
        entity_id: EntityId,
        owner: PeerId,
        speed: f32,
        transform: Transform,
    },
    Despawned {
        entity_id: EntityId,
    },
    PlayerSet {
        entity_id: Option<EntityId>,
    },
    PlayerRated {
        rating: i32,
        origin: PeerId,
    },
    RatingSet {
        rating: i32,
    },
    Joined {
        message: String,
    },
    EntityMoved {
        entity_id: EntityId,
        transform: Transform,
    },
    SessionReset,
    Disconnected {
        reason: String,
    },
}

impl Packet {
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "Connect",
            Packet::Heartbeat => "Heartbeat",
            Packet::SetPlayer { .. } => "SetPlayer",
            Packet::ResyncPlayer => "ResyncPlayer",
            Packet::RatePlayer { .. } => "RatePlayer",
            Packet::ResyncRating => "ResyncRating",
            Packet::AnnounceJoin { .. } => "AnnounceJoin",
            Packet::MoveEntity { .. } => "MoveEntity",
            Packet::Disconnect => "Disconnect",
            Packet::Connected { .. } => "Connected",
            Packet::Spawned { .. } => "Spawned",
            Packet::Despawned { .. } => "Despawned",
            Packet::PlayerSet { .. } => "PlayerSet",
            Packet::PlayerRated { .. } => "PlayerRated",
            Packet::RatingSet { .. } => "RatingSet",
            Packet::Joined { .. } => "Joined",
            Packet::EntityMoved { .. } => "EntityMoved",
            Packet::SessionReset => "SessionReset",
            Packet::Disconnected { .. } => "Disconnected",
        }
    }

    /// True for packets a peer sends to the authority.
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            Packet::Connect { .. }
                | Packet::Heartbeat
                | Packet::SetPlayer { .. }
                | Packet::ResyncPlayer
                | Packet::RatePlayer { .. }
                | Packet::ResyncRating
                | Packet::AnnounceJoin { .. }
                | Packet::MoveEntity { .. }
                | Packet::Disconnect
        )
    }
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    Ok(bincode::serialize(packet)?)
}

pub fn decode(bytes: &[u8]) -> Result<Packet, ProtocolError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Text shown by the rating label.
pub fn rating_text(rating: i32) -> String {
    format!("Rating : {}", rating)
}

/// Ground-plane placement of an entity. `heading` is in radians, 0 faces +z.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub x: f32,
    pub z: f32,
    pub heading: f32,
}

impl Transform {
    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z, heading: 0.0 }
    }

    pub fn forward(&self) -> (f32, f32) {
        (self.heading.sin(), self.heading.cos())
    }

    pub fn right(&self) -> (f32, f32) {
        (self.heading.cos(), -self.heading.sin())
    }

    pub fn translate(&mut self, dx: f32, dz: f32) {
        self.x += dx;
        self.z += dz;
    }
}

/// Movement axes sampled once per tick, each in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveAxis {
    pub vertical: f32,
    pub horizontal: f32,
}

/// Moves forward or backward at full `speed` depending on the sign of the
/// vertical axis. The horizontal axis is only honoured when `strafe` is set.
/// Returns true if the transform changed.
pub fn apply_movement(
    transform: &mut Transform,
    axis: MoveAxis,
    speed: f32,
    dt: f32,
    strafe: bool,
) -> bool {
    let step = speed * dt;
    let mut moved = false;

    let (fx, fz) = transform.forward();
    if axis.vertical > 0.0 {
        transform.translate(fx * step, fz * step);
        moved = true;
    } else if axis.vertical < 0.0 {
        transform.translate(-fx * step, -fz * step);
        moved = true;
    }

    if strafe && axis.horizontal != 0.0 {
        let (rx, rz) = transform.right();
        let sign = axis.horizontal.signum();
        transform.translate(rx * step * sign, rz * step * sign);
        moved = true;
    }

    moved
}
