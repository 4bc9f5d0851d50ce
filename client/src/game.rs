//! Observer-side mirror of the authority's entities
//!
//! The observer never decides anything. It installs delivered field values,
//! keeps a server-clock estimate, and turns local conditions (a buff running
//! out, a power-up handed over, the player pressing interact) into requests
//! for the authority.

use crate::kill_feed::KillFeed;
use crate::presentation::Presentation;
use log::{debug, info, warn};
use shared::{
    buff_remaining, Broadcast, CabinFields, ClientId, DoorFields, EntityId, EntityKind, FieldSet,
    FieldUpdate, Floor, GameMode, LightFields, LobbyFields, Packet, PlayerFields, PowerUpFields, PowerUpKind,
    ProjectileFields, Request, Role, RotatingDoorFields, SceneLayout, SyncError, SyncResult,
    Vec3, INTERACT_RADIUS,
};
use std::collections::BTreeMap;

/// Seconds before an unanswered `EndBuff` is sent again.
const END_BUFF_RETRY: f64 = 1.0;

/// Typed field mirror of one entity.
#[derive(Debug)]
pub enum Mirror {
    Player(PlayerFields),
    Projectile(ProjectileFields),
    PowerUp(PowerUpKind, PowerUpFields),
    ElevatorDoor(Floor, DoorFields),
    ElevatorCabin(CabinFields),
    RotatingDoor(RotatingDoorFields),
    /// Lit or not, as last broadcast. Lights spawn lit.
    Light(bool, LightFields),
    Lobby(LobbyFields),
}

impl Mirror {
    /// Empty mirror for `kind`. Real values arrive as field updates.
    pub fn for_kind(kind: EntityKind, role: Role) -> Self {
        match kind {
            EntityKind::Player => Mirror::Player(PlayerFields::new(role)),
            EntityKind::Projectile => {
                Mirror::Projectile(ProjectileFields::new(role, shared::Color::WHITE, Vec3::ZERO))
            }
            EntityKind::PowerUp(kind) => Mirror::PowerUp(kind, PowerUpFields::new(role, Vec3::ZERO)),
            EntityKind::ElevatorDoor(floor) => Mirror::ElevatorDoor(floor, DoorFields::new(role)),
            EntityKind::ElevatorCabin => Mirror::ElevatorCabin(CabinFields::new(role, Vec3::ZERO)),
            EntityKind::RotatingDoor => {
                Mirror::RotatingDoor(RotatingDoorFields::new(role, Vec3::ZERO))
            }
            EntityKind::Light => Mirror::Light(true, LightFields::new(role, Vec3::ZERO)),
            EntityKind::Lobby => Mirror::Lobby(LobbyFields::new(role)),
        }
    }

    pub fn fields(&self) -> &dyn FieldSet {
        match self {
            Mirror::Player(f) => f,
            Mirror::Projectile(f) => f,
            Mirror::PowerUp(_, f) => f,
            Mirror::ElevatorDoor(_, f) => f,
            Mirror::ElevatorCabin(f) => f,
            Mirror::RotatingDoor(f) => f,
            Mirror::Light(_, f) => f,
            Mirror::Lobby(f) => f,
        }
    }

    pub fn fields_mut(&mut self) -> &mut dyn FieldSet {
        match self {
            Mirror::Player(f) => f,
            Mirror::Projectile(f) => f,
            Mirror::PowerUp(_, f) => f,
            Mirror::ElevatorDoor(_, f) => f,
            Mirror::ElevatorCabin(f) => f,
            Mirror::RotatingDoor(f) => f,
            Mirror::Light(_, f) => f,
            Mirror::Lobby(f) => f,
        }
    }
}

#[derive(Debug)]
pub struct MirrorEntity {
    pub kind: EntityKind,
    pub owner: Option<ClientId>,
    pub mirror: Mirror,
}

/// Interactables the local player is standing next to. Every reference is
/// re-checked against the registry before use.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Nearby {
    pub door: Option<EntityId>,
    pub cabin: Option<EntityId>,
    pub rotating_door: Option<EntityId>,
}

/// Last lobby status broadcast.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LobbyStatus {
    pub server_up: bool,
    pub mode: Option<GameMode>,
    pub waiting: u32,
}

pub struct ObserverState {
    client_id: Option<ClientId>,
    entities: BTreeMap<EntityId, MirrorEntity>,
    scene: SceneLayout,
    /// Estimated authority clock.
    clock: f64,
    kill_feed: KillFeed,
    lobby_status: LobbyStatus,
    scenes: Vec<u32>,
    nearby: Nearby,
    /// Clock time the last `EndBuff` went out for the current buff.
    end_buff_sent: Option<f64>,
    requests: Vec<(EntityId, Request)>,
}

impl ObserverState {
    pub fn new(scene: SceneLayout) -> Self {
        Self {
            client_id: None,
            entities: BTreeMap::new(),
            scene,
            clock: 0.0,
            kill_feed: KillFeed::default(),
            lobby_status: LobbyStatus::default(),
            scenes: Vec::new(),
            nearby: Nearby::default(),
            end_buff_sent: None,
            requests: Vec::new(),
        }
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.client_id.is_some()
    }

    pub fn now(&self) -> f64 {
        self.clock
    }

    pub fn kill_feed(&self) -> &KillFeed {
        &self.kill_feed
    }

    pub fn lobby_status(&self) -> &LobbyStatus {
        &self.lobby_status
    }

    /// Scenes loaded so far, in load order.
    pub fn loaded_scenes(&self) -> &[u32] {
        &self.scenes
    }

    pub fn game_started(&self) -> bool {
        !self.scenes.is_empty()
    }

    pub fn nearby(&self) -> &Nearby {
        &self.nearby
    }

    pub fn entity(&self, id: EntityId) -> Option<&MirrorEntity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut MirrorEntity> {
        self.entities.get_mut(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn player(&self, id: EntityId) -> Option<&PlayerFields> {
        match self.entities.get(&id).map(|e| &e.mirror) {
            Some(Mirror::Player(fields)) => Some(fields),
            _ => None,
        }
    }

    pub fn light_on(&self, id: EntityId) -> Option<bool> {
        match self.entities.get(&id).map(|e| &e.mirror) {
            Some(Mirror::Light(on, _)) => Some(*on),
            _ => None,
        }
    }

    pub fn lobby(&self) -> Option<(EntityId, &LobbyFields)> {
        self.entities.iter().find_map(|(id, e)| match &e.mirror {
            Mirror::Lobby(fields) => Some((*id, fields)),
            _ => None,
        })
    }

    /// The player entity this observer owns.
    pub fn my_player(&self) -> Option<EntityId> {
        let me = self.client_id?;
        self.entities
            .iter()
            .find(|(_, e)| e.kind == EntityKind::Player && e.owner == Some(me))
            .map(|(id, _)| *id)
    }

    /// Queues a request. Fails while not connected.
    pub fn request(&mut self, target: EntityId, request: Request) -> SyncResult<()> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.requests.push((target, request));
        Ok(())
    }

    /// Queues a request against the local player.
    pub fn request_for_me(&mut self, request: Request) -> SyncResult<()> {
        let me = self.my_player().ok_or(SyncError::NotConnected)?;
        self.request(me, request)
    }

    pub fn drain_requests(&mut self) -> Vec<(EntityId, Request)> {
        std::mem::take(&mut self.requests)
    }

    /// Installs one packet from the authority.
    pub fn apply_packet(&mut self, packet: Packet, presentation: &mut dyn Presentation) {
        match packet {
            Packet::Connected {
                client_id,
                server_time,
            } => {
                info!("Connected as client {}", client_id);
                self.client_id = Some(client_id);
                self.clock = server_time;
                presentation.on_connected(client_id);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.client_id = None;
                for entity in self.entities.values_mut() {
                    entity.mirror.fields_mut().clear_subscribers();
                }
                self.entities.clear();
                self.nearby = Nearby::default();
                presentation.on_disconnected(&reason);
            }

            Packet::Spawn {
                entity,
                kind,
                owner,
            } => {
                if self.entities.contains_key(&entity) {
                    return;
                }
                self.entities.insert(
                    entity,
                    MirrorEntity {
                        kind,
                        owner,
                        mirror: Mirror::for_kind(kind, Role::Observer),
                    },
                );
                presentation.on_spawn(entity, kind, owner);
            }

            Packet::Despawn { entity } => {
                if let Some(mut removed) = self.entities.remove(&entity) {
                    removed.mirror.fields_mut().clear_subscribers();
                    presentation.on_despawn(entity);
                }
            }

            Packet::Field(update) => self.apply_field(update, presentation),

            Packet::Broadcast { entity, event } => self.apply_broadcast(entity, event, presentation),

            Packet::Clock { server_time } => {
                self.clock = server_time;
            }

            other => {
                warn!("Unexpected packet from authority: {:?}", other);
            }
        }
    }

    fn apply_field(&mut self, update: FieldUpdate, presentation: &mut dyn Presentation) {
        let Some(entity) = self.entities.get_mut(&update.entity) else {
            debug!("Field update for unknown {}", update.entity);
            return;
        };
        if entity.mirror.fields_mut().apply_update(&update) {
            presentation.on_field_changed(&update);
        } else {
            debug!(
                "Discarded {:?} rev {} for {}",
                update.field, update.revision, update.entity
            );
        }
    }

    fn apply_broadcast(&mut self, entity: EntityId, event: Broadcast, presentation: &mut dyn Presentation) {
        match &event {
            Broadcast::AddKillMessage { message } => {
                self.kill_feed.push(message.clone(), self.clock);
            }
            Broadcast::PowerUpCollected { kind } => {
                if let Err(e) = self.request_for_me(Request::SendPowerUp { kind: *kind }) {
                    debug!("Cannot claim {:?}: {}", kind, e);
                }
            }
            Broadcast::UpdateLobbyStatus {
                server_up,
                mode,
                waiting,
            } => {
                self.lobby_status = LobbyStatus {
                    server_up: *server_up,
                    mode: *mode,
                    waiting: *waiting,
                };
            }
            Broadcast::LoadScene { scene, additive } => {
                if !additive {
                    self.scenes.clear();
                }
                self.scenes.push(*scene);
            }
            Broadcast::LightFlicker { on } => {
                match self.entities.get_mut(&entity).map(|e| &mut e.mirror) {
                    Some(Mirror::Light(lit, _)) => *lit = *on,
                    _ => debug!("Flicker for unknown light {}", entity),
                }
            }
            _ => {}
        }
        presentation.on_broadcast(entity, &event);
    }

    /// Advances local timers by one frame.
    pub fn tick(&mut self, dt: f32) {
        self.clock += dt as f64;
        self.kill_feed.expire(self.clock);
        self.watch_buffs();
        self.update_nearby();
    }

    /// Sends `EndBuff` when the local player's buff has run out, and again
    /// every `END_BUFF_RETRY` seconds while the authority still reports it.
    fn watch_buffs(&mut self) {
        let Some(me) = self.my_player() else {
            return;
        };
        let Some(fields) = self.player(me) else {
            return;
        };

        let buffed = *fields.has_speed_buff.get() || *fields.has_damage_buff.get();
        if !buffed {
            self.end_buff_sent = None;
            return;
        }
        let remaining = buff_remaining(*fields.buff_end_time.get(), self.clock);
        if remaining > 0.0 {
            return;
        }
        let due = self
            .end_buff_sent
            .map_or(true, |sent| self.clock - sent >= END_BUFF_RETRY);
        if due {
            match self.end_buff_sent {
                None => info!("Buff expired, asking the authority to end it"),
                Some(_) => debug!("Buff still reported, resending EndBuff"),
            }
            if self.request(me, Request::EndBuff).is_ok() {
                self.end_buff_sent = Some(self.clock);
            }
        }
    }

    /// Remaining fraction of the local player's buff, for UI.
    pub fn buff_fraction(&self) -> f32 {
        self.my_player()
            .and_then(|me| self.player(me))
            .map(|f| buff_remaining(*f.buff_end_time.get(), self.clock))
            .unwrap_or(0.0)
    }

    /// Recomputes which interactables are in reach of the local player.
    fn update_nearby(&mut self) {
        let Some(position) = self
            .my_player()
            .and_then(|me| self.player(me))
            .map(|f| *f.position.get())
        else {
            self.nearby = Nearby::default();
            return;
        };

        let mut nearby = Nearby::default();
        let mut best_door = f32::MAX;
        let mut best_rotating = f32::MAX;
        for (id, entity) in &self.entities {
            match &entity.mirror {
                Mirror::ElevatorDoor(floor, _) => {
                    let distance = self.scene.elevator.door_position(*floor).distance(&position);
                    if distance <= INTERACT_RADIUS && distance < best_door {
                        best_door = distance;
                        nearby.door = Some(*id);
                    }
                }
                Mirror::ElevatorCabin(fields) => {
                    let volume = self.scene.elevator.cabin_volume(*fields.position.get());
                    if volume.contains(&position) {
                        nearby.cabin = Some(*id);
                    }
                }
                Mirror::RotatingDoor(fields) => {
                    let distance = fields.position.get().distance(&position);
                    if distance <= INTERACT_RADIUS && distance < best_rotating {
                        best_rotating = distance;
                        nearby.rotating_door = Some(*id);
                    }
                }
                _ => {}
            }
        }

        if nearby != self.nearby {
            debug!("Nearby interactables now {:?}", nearby);
        }
        self.nearby = nearby;
    }

    /// Checks that a remembered reference still names a live entity of the
    /// expected kind.
    fn resolve(&self, id: Option<EntityId>, is_kind: fn(&EntityKind) -> bool) -> SyncResult<EntityId> {
        let id = id.ok_or(SyncError::NotConnected)?;
        match self.entities.get(&id) {
            Some(entity) if is_kind(&entity.kind) => Ok(id),
            Some(_) => Err(SyncError::WrongEntityKind {
                entity: id,
                expected: "interactable",
            }),
            None => Err(SyncError::StaleReference(id)),
        }
    }

    /// Uses whatever is in reach: the cabin button first, then the call
    /// button of a door, then a rotating door.
    pub fn interact(&mut self) -> SyncResult<()> {
        if self.nearby.cabin.is_some() {
            match self.resolve(self.nearby.cabin, |k| *k == EntityKind::ElevatorCabin) {
                Ok(cabin) => return self.request_for_me(Request::RequestOtherFloor { cabin }),
                Err(e) => {
                    debug!("Dropping cabin reference: {}", e);
                    self.nearby.cabin = None;
                }
            }
        }
        if self.nearby.door.is_some() {
            match self.resolve(self.nearby.door, |k| matches!(k, EntityKind::ElevatorDoor(_))) {
                Ok(door) => return self.request_for_me(Request::TryOpenDoor { door }),
                Err(e) => {
                    debug!("Dropping door reference: {}", e);
                    self.nearby.door = None;
                }
            }
        }
        if self.nearby.rotating_door.is_some() {
            match self.resolve(self.nearby.rotating_door, |k| *k == EntityKind::RotatingDoor) {
                Ok(door) => return self.request_for_me(Request::ToggleRotatingDoor { door }),
                Err(e) => {
                    debug!("Dropping rotating door reference: {}", e);
                    self.nearby.rotating_door = None;
                }
            }
        }
        Ok(())
    }
}
