//! Process roles and ownership rules
//!
//! Exactly one process in a session is the authority. It may write every
//! authority-only field and it executes every request. Observers only read
//! mirrored values and send requests. A host runs both halves in one process;
//! its writes still go through the authority path.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a connected observer, assigned by the authority.
pub type ClientId = u32;

/// Network identity of a spawned entity, unique for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Authority,
    Observer,
    /// Authority and a local observer in the same process.
    Host,
}

impl Role {
    pub fn is_authority(&self) -> bool {
        matches!(self, Role::Authority | Role::Host)
    }

    pub fn is_observer(&self) -> bool {
        matches!(self, Role::Observer | Role::Host)
    }
}

/// Who may write a replicated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    AuthorityOnly,
    Everyone,
}

/// Who may read a replicated field. Every field in this game is public.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPolicy {
    Everyone,
}

/// Checks an owner-gated request.
///
/// Entities without an owner (scene objects) never pass an owner-gated check.
pub fn check_ownership(
    sender: ClientId,
    entity: EntityId,
    owner: Option<ClientId>,
) -> SyncResult<()> {
    if owner == Some(sender) {
        Ok(())
    } else {
        Err(SyncError::OwnershipViolation { sender, entity })
    }
}
