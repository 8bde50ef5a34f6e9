//! Protocol violations reported by the authority and the codec.

use crate::{EntityId, PeerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("client version {got} does not match protocol version {expected}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("server full ({max} clients)")]
    ServerFull { max: usize },

    #[error("session already has a host (peer {0})")]
    HostAlreadyPresent(PeerId),

    #[error("peer {0} is not the session host")]
    NotHost(PeerId),

    #[error("peer {peer} does not own entity {entity_id}")]
    NotOwner { peer: PeerId, entity_id: EntityId },

    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    #[error("unexpected {kind} packet from peer {peer}")]
    UnexpectedPacket { peer: PeerId, kind: &'static str },

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProtocolError::VersionMismatch {
            expected: 1,
            got: 3,
        };
        assert_eq!(
            err.to_string(),
            "client version 3 does not match protocol version 1"
        );

        let err = ProtocolError::NotOwner {
            peer: 2,
            entity_id: 9,
        };
        assert_eq!(err.to_string(), "peer 2 does not own entity 9");

        let err = ProtocolError::NotHost(4);
        assert_eq!(err.to_string(), "peer 4 is not the session host");
    }

    #[test]
    fn test_codec_error_conversion() {
        let result: Result<crate::Packet, bincode::Error> = bincode::deserialize(&[]);
        let err: ProtocolError = result.unwrap_err().into();
        assert!(matches!(err, ProtocolError::Codec(_)));
    }
}
