//! Role resolution for replicated player entities.
//!
//! Every peer spawns one entity per connected peer. On activation each entity
//! looks at two flags, whether this process is the authority and whether the
//! entity is owned by this process, and either settles on a role at once or
//! waits for the session's active player to be known.

use crate::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    LocalHost,
    RemoteHost,
    LocalSpectator,
    RemoteSpectator,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::LocalHost => "Local - Host",
            Role::RemoteHost => "Remote - Host",
            Role::LocalSpectator => "Local - Spectator",
            Role::RemoteSpectator => "Remote - Spectator",
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Role::LocalHost | Role::RemoteHost)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Role::LocalHost | Role::LocalSpectator)
    }
}

/// Outcome of the first setup step, before the active player may be known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Authority-side entity owned by this process. Claims the active player.
    LocalHost,
    /// Client-side entity owned by this process.
    LocalSpectator,
    /// Entity mirrors another peer; role depends on the active player.
    AwaitRemote,
}

impl Activation {
    pub fn new(authority: bool, locality: bool) -> Self {
        match (authority, locality) {
            (true, true) => Activation::LocalHost,
            (false, true) => Activation::LocalSpectator,
            (_, false) => Activation::AwaitRemote,
        }
    }

    /// Everything except the host's own entity asks the authority to
    /// rebroadcast the active player.
    pub fn requests_resync(&self) -> bool {
        !matches!(self, Activation::LocalHost)
    }

    /// Role known without waiting, if any.
    pub fn immediate_role(&self) -> Option<Role> {
        match self {
            Activation::LocalHost => Some(Role::LocalHost),
            Activation::LocalSpectator => Some(Role::LocalSpectator),
            Activation::AwaitRemote => None,
        }
    }
}

/// Final role of a remote entity once the active player is known.
pub fn resolve_remote(entity_id: EntityId, active_player: EntityId) -> Role {
    if entity_id == active_player {
        Role::RemoteHost
    } else {
        Role::RemoteSpectator
    }
}

pub fn side_suffix(authority: bool) -> &'static str {
    if authority {
        " (Server Side)"
    } else {
        " (Client Side)"
    }
}
