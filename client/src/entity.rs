//! Replicated player entities and their role setup
//!
//! One `PlayerEntity` exists on every peer for every connected peer. Its role
//! is decided once at activation. Host-owned and spectator-owned entities on
//! their own process know their role immediately; mirrored entities wait on
//! the replica's active-player subscription and finish setup when the
//! authority broadcasts it.

use log::{debug, info};
use shared::role::{resolve_remote, side_suffix};
use shared::{
    apply_movement, Activation, EntityId, MoveAxis, PeerId, Role, Transform,
    SPECTATOR_CAMERA_OFFSET, SPECTATOR_CAMERA_PITCH_DEG,
};
use tokio::sync::watch;

/// Options that used to distinguish separate player variants
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityConfig {
    /// Allow lateral movement on the horizontal axis
    pub strafe: bool,
}

/// How the entity's transform is replicated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformSync {
    /// Owner simulates and reports its transform
    Owner,
    /// The authority's transform is trusted over local simulation
    SyncTransform,
}

/// Child camera rig. Offset is relative to the entity: right, up, forward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRig {
    pub active: bool,
    pub offset: [f32; 3],
    pub pitch_deg: f32,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            active: true,
            offset: [0.0, 0.0, 0.0],
            pitch_deg: 0.0,
        }
    }
}

/// Toggles that role setup flips on an entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Components {
    pub visual: bool,
    pub camera: CameraRig,
    pub movement: bool,
    pub free_camera: bool,
    pub spectator: bool,
    pub sync: TransformSync,
}

impl Default for Components {
    fn default() -> Self {
        Self {
            visual: true,
            camera: CameraRig::default(),
            movement: true,
            free_camera: true,
            spectator: false,
            sync: TransformSync::Owner,
        }
    }
}

#[derive(Debug)]
enum Setup {
    Inactive,
    Waiting(watch::Receiver<Option<EntityId>>),
    Resolved(Role),
}

#[derive(Debug)]
pub struct PlayerEntity {
    pub id: EntityId,
    pub owner: PeerId,
    pub speed: f32,
    pub transform: Transform,
    pub components: Components,
    name: String,
    local: bool,
    setup: Setup,
}

impl PlayerEntity {
    pub fn new(id: EntityId, owner: PeerId, speed: f32, transform: Transform, local: bool) -> Self {
        Self {
            id,
            owner,
            speed,
            transform,
            components: Components::default(),
            name: format!("Player {}", id),
            local,
            setup: Setup::Inactive,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn role(&self) -> Option<Role> {
        match self.setup {
            Setup::Resolved(role) => Some(role),
            _ => None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.setup, Setup::Waiting(_))
    }

    /// First setup step. Runs once; later calls return `None` and change
    /// nothing.
    ///
    /// Mirrored entities subscribe to `active_player` and resolve on the spot
    /// if the value is already known.
    pub fn activate(
        &mut self,
        authority: bool,
        active_player: watch::Receiver<Option<EntityId>>,
    ) -> Option<Activation> {
        if !matches!(self.setup, Setup::Inactive) {
            return None;
        }

        let activation = Activation::new(authority, self.local);
        match activation {
            Activation::LocalHost => {
                self.name = Role::LocalHost.label().to_string();
                self.setup = Setup::Resolved(Role::LocalHost);
            }
            Activation::LocalSpectator => {
                self.setup_spectator(true);
            }
            Activation::AwaitRemote => {
                debug!("Entity {} waiting for the active player", self.id);
                self.setup = Setup::Waiting(active_player);
                self.try_resolve();
            }
        }
        self.name.push_str(side_suffix(authority));

        info!("Entity {} activated as {}", self.id, self.name);
        Some(activation)
    }

    /// Finishes setup of a waiting entity once the active player is known.
    /// Returns the role assigned by this call.
    pub fn try_resolve(&mut self) -> Option<Role> {
        let active = match &mut self.setup {
            Setup::Waiting(rx) => (*rx.borrow_and_update())?,
            _ => return None,
        };

        let role = resolve_remote(self.id, active);
        match role {
            Role::RemoteHost => self.setup_remote_host(),
            _ => self.setup_spectator(false),
        }

        // Keep the side suffix added at activation
        let suffix = self
            .name
            .find(" (")
            .map(|at| self.name[at..].to_string())
            .unwrap_or_default();
        self.name = format!("{}{}", role.label(), suffix);

        info!("Entity {} resolved as {}", self.id, self.name);
        Some(role)
    }

    fn setup_remote_host(&mut self) {
        self.components.camera.active = false;
        self.components.movement = false;
        self.components.free_camera = false;
        self.setup = Setup::Resolved(Role::RemoteHost);
    }

    fn setup_spectator(&mut self, local: bool) {
        self.components.visual = false;
        self.components.movement = false;
        self.components.free_camera = false;
        self.components.sync = TransformSync::SyncTransform;

        if local {
            self.name = Role::LocalSpectator.label().to_string();
            self.components.camera = CameraRig {
                active: true,
                offset: SPECTATOR_CAMERA_OFFSET,
                pitch_deg: SPECTATOR_CAMERA_PITCH_DEG,
            };
            self.components.spectator = true;
            self.setup = Setup::Resolved(Role::LocalSpectator);
        } else {
            self.components.camera.active = false;
            self.components.spectator = false;
            self.setup = Setup::Resolved(Role::RemoteSpectator);
        }
    }

    /// Moves a locally controlled entity whose movement is still enabled.
    /// Returns true if the transform changed.
    pub fn update_movement(&mut self, axis: MoveAxis, dt: f32, config: &EntityConfig) -> bool {
        if !self.local || !self.components.movement {
            return false;
        }
        apply_movement(&mut self.transform, axis, self.speed, dt, config.strafe)
    }

    /// Applies a transform received from the authority to a mirrored entity.
    pub fn apply_remote_transform(&mut self, transform: Transform) -> bool {
        if self.local {
            return false;
        }
        self.transform = transform;
        true
    }

    /// Spectators ride along with their target.
    pub fn follow(&mut self, target: Transform) {
        self.transform.x = target.x;
        self.transform.z = target.z;
    }
}
