//! Session context handed to every authority-side component
//!
//! Holds the process role, the authority clock, the set of connected
//! observers and an outbox of everything that must leave the process this
//! tick. Components never touch sockets; the network loop drains the outbox.

use log::{debug, warn};
use shared::{Broadcast, ClientId, EntityId, EntityKind, FieldUpdate, Packet, Role};
use std::collections::BTreeSet;

/// One message waiting to be sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Spawn {
        entity: EntityId,
        kind: EntityKind,
        owner: Option<ClientId>,
    },
    Despawn {
        entity: EntityId,
    },
    Field(FieldUpdate),
    /// Delivered to every connected observer.
    Broadcast {
        entity: EntityId,
        event: Broadcast,
    },
    /// Delivered to one observer only.
    Targeted {
        client: ClientId,
        entity: EntityId,
        event: Broadcast,
    },
}

impl Outgoing {
    /// Recipient (`None` means everyone) and wire packet.
    pub fn into_packet(self) -> (Option<ClientId>, Packet) {
        match self {
            Outgoing::Spawn {
                entity,
                kind,
                owner,
            } => (
                None,
                Packet::Spawn {
                    entity,
                    kind,
                    owner,
                },
            ),
            Outgoing::Despawn { entity } => (None, Packet::Despawn { entity }),
            Outgoing::Field(update) => (None, Packet::Field(update)),
            Outgoing::Broadcast { entity, event } => (None, Packet::Broadcast { entity, event }),
            Outgoing::Targeted {
                client,
                entity,
                event,
            } => (Some(client), Packet::Broadcast { entity, event }),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    role: Role,
    clock: f64,
    delta: f32,
    connected: BTreeSet<ClientId>,
    outbox: Vec<Outgoing>,
}

impl Session {
    pub fn new(role: Role, initial_delta: f32) -> Self {
        Self {
            role,
            clock: 0.0,
            delta: initial_delta,
            connected: BTreeSet::new(),
            outbox: Vec::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_authority(&self) -> bool {
        self.role.is_authority()
    }

    /// Authority clock in seconds since the session started.
    pub fn now(&self) -> f64 {
        self.clock
    }

    /// Duration of the tick in progress.
    pub fn delta(&self) -> f32 {
        self.delta
    }

    pub fn advance(&mut self, dt: f32) {
        self.delta = dt;
        self.clock += dt as f64;
    }

    pub fn connect(&mut self, client: ClientId) {
        self.connected.insert(client);
    }

    pub fn disconnect(&mut self, client: ClientId) -> bool {
        self.connected.remove(&client)
    }

    pub fn is_connected(&self, client: ClientId) -> bool {
        self.connected.contains(&client)
    }

    pub fn connected_clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.connected.iter().copied()
    }

    pub fn broadcast(&mut self, entity: EntityId, event: Broadcast) {
        if !self.is_authority() {
            warn!("Dropping broadcast from non-authority process: {:?}", event);
            return;
        }
        self.outbox.push(Outgoing::Broadcast { entity, event });
    }

    /// Sends to one observer. A disconnected target is a no-op.
    pub fn send_to(&mut self, client: ClientId, entity: EntityId, event: Broadcast) {
        if !self.is_authority() {
            warn!("Dropping targeted broadcast from non-authority process");
            return;
        }
        if !self.is_connected(client) {
            debug!("Client {} is not connected, dropping {:?}", client, event);
            return;
        }
        self.outbox.push(Outgoing::Targeted {
            client,
            entity,
            event,
        });
    }

    pub fn announce_spawn(&mut self, entity: EntityId, kind: EntityKind, owner: Option<ClientId>) {
        self.outbox.push(Outgoing::Spawn {
            entity,
            kind,
            owner,
        });
    }

    pub fn announce_despawn(&mut self, entity: EntityId) {
        self.outbox.push(Outgoing::Despawn { entity });
    }

    pub fn push_fields(&mut self, updates: Vec<FieldUpdate>) {
        self.outbox.extend(updates.into_iter().map(Outgoing::Field));
    }

    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    pub fn pending(&self) -> &[Outgoing] {
        &self.outbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let mut session = Session::new(Role::Authority, 0.016);
        session.advance(0.5);
        session.advance(0.25);
        assert!((session.now() - 0.75).abs() < 1e-9);
        assert_eq!(session.delta(), 0.25);
    }

    #[test]
    fn test_targeted_send_to_disconnected_is_noop() {
        let mut session = Session::new(Role::Authority, 0.016);
        session.send_to(3, EntityId(1), Broadcast::TriggerHitPause);
        assert!(session.pending().is_empty());

        session.connect(3);
        session.send_to(3, EntityId(1), Broadcast::TriggerHitPause);
        assert_eq!(session.pending().len(), 1);
    }

    #[test]
    fn test_observer_cannot_broadcast() {
        let mut session = Session::new(Role::Observer, 0.016);
        session.broadcast(
            EntityId(1),
            Broadcast::SetIndicatorLights { at_bottom: true },
        );
        assert!(session.drain_outbox().is_empty());
    }

    #[test]
    fn test_into_packet_routes_targeted() {
        let (to, packet) = Outgoing::Targeted {
            client: 9,
            entity: EntityId(2),
            event: Broadcast::TriggerHitPause,
        }
        .into_packet();
        assert_eq!(to, Some(9));
        assert!(matches!(packet, Packet::Broadcast { .. }));

        let (to, _) = Outgoing::Despawn { entity: EntityId(2) }.into_packet();
        assert_eq!(to, None);
    }
}
