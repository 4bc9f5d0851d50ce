use crate::authority::{ClientId, EntityId};
use thiserror::Error;

/// Failures raised at the authority/observer boundary.
///
/// None of these cross the network: the side that detects one logs it and
/// drops the offending operation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A process without write authority tried to mutate a gated field.
    #[error("authority violation: field `{field}` is writable by the authority only")]
    AuthorityViolation { field: &'static str },

    /// A non-owner sent an owner-gated request.
    #[error("client {sender} does not own entity {entity}")]
    OwnershipViolation { sender: ClientId, entity: EntityId },

    #[error("not connected")]
    NotConnected,

    /// A cached cross-entity reference points at a despawned entity.
    #[error("stale reference to entity {0}")]
    StaleReference(EntityId),

    #[error("entity {entity} is not a {expected}")]
    WrongEntityKind {
        entity: EntityId,
        expected: &'static str,
    },

    #[error("player {0} is dead")]
    PlayerDead(EntityId),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
