//! Authority-side entity registry and tick orchestration
//!
//! Every networked entity lives in one id-keyed map. Players, projectiles,
//! power-ups and rotating doors own their field sets there; the elevator and
//! the lobby keep theirs in dedicated coordinators and only leave a marker in
//! the map so ids, kinds and snapshots stay uniform.

use crate::config::ServerConfig;
use crate::elevator::Elevator;
use crate::light::{FlickerParams, Light};
use crate::lobby::Lobby;
use crate::player::Player;
use crate::powerup::{PowerUp, PowerUpSpawner};
use crate::projectile::Projectile;
use crate::rotating_door::RotatingDoor;
use crate::session::Session;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    check_ownership, Aabb, ClientId, EntityId, EntityKind, FieldSet, FieldUpdate, Floor, Packet,
    Request, Role, SceneLayout, SyncError, SyncResult,
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
pub enum Entity {
    Player(Player),
    Projectile(Projectile),
    PowerUp(PowerUp),
    /// Fields live in [`Elevator`].
    ElevatorDoor(Floor),
    /// Fields live in [`Elevator`].
    ElevatorCabin,
    RotatingDoor(RotatingDoor),
    Light(Light),
    /// Fields live in [`Lobby`].
    Lobby,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Player(_) => EntityKind::Player,
            Entity::Projectile(_) => EntityKind::Projectile,
            Entity::PowerUp(p) => EntityKind::PowerUp(p.kind),
            Entity::ElevatorDoor(floor) => EntityKind::ElevatorDoor(*floor),
            Entity::ElevatorCabin => EntityKind::ElevatorCabin,
            Entity::RotatingDoor(_) => EntityKind::RotatingDoor,
            Entity::Light(_) => EntityKind::Light,
            Entity::Lobby => EntityKind::Lobby,
        }
    }

    /// Observer bound to the entity. Scene entities have none.
    pub fn owner(&self) -> Option<ClientId> {
        match self {
            Entity::Player(p) => Some(p.owner),
            Entity::Projectile(p) => Some(p.owner),
            _ => None,
        }
    }

    pub fn field_set(&self) -> Option<&dyn FieldSet> {
        match self {
            Entity::Player(p) => Some(&p.fields),
            Entity::Projectile(p) => Some(&p.fields),
            Entity::PowerUp(p) => Some(&p.fields),
            Entity::RotatingDoor(d) => Some(&d.fields),
            Entity::Light(l) => Some(&l.fields),
            _ => None,
        }
    }

    pub fn field_set_mut(&mut self) -> Option<&mut dyn FieldSet> {
        match self {
            Entity::Player(p) => Some(&mut p.fields),
            Entity::Projectile(p) => Some(&mut p.fields),
            Entity::PowerUp(p) => Some(&mut p.fields),
            Entity::RotatingDoor(d) => Some(&mut d.fields),
            Entity::Light(l) => Some(&mut l.fields),
            _ => None,
        }
    }
}

/// Looks up a player in the registry without borrowing the rest of the world.
pub fn player_in(entities: &mut BTreeMap<EntityId, Entity>, id: EntityId) -> SyncResult<&mut Player> {
    match entities.get_mut(&id) {
        Some(Entity::Player(player)) => Ok(player),
        Some(_) => Err(SyncError::WrongEntityKind {
            entity: id,
            expected: "player",
        }),
        None => Err(SyncError::StaleReference(id)),
    }
}

pub struct World {
    pub(crate) session: Session,
    pub(crate) config: ServerConfig,
    pub(crate) scene: SceneLayout,
    pub(crate) entities: BTreeMap<EntityId, Entity>,
    pub(crate) players_by_client: HashMap<ClientId, EntityId>,
    pub(crate) elevator: Elevator,
    pub(crate) lobby: Lobby,
    pub(crate) powerups: PowerUpSpawner,
    pub(crate) rng: StdRng,
    next_entity: u32,
}

impl World {
    pub fn new(config: ServerConfig, scene: SceneLayout) -> Self {
        Self::with_role(config, scene, Role::Authority)
    }

    /// Builds the world and registers the scene entities. They are not
    /// announced here; observers learn about them from the connect snapshot.
    pub fn with_role(config: ServerConfig, scene: SceneLayout, role: Role) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let lobby_id = EntityId(1);
        let cabin_id = EntityId(2);
        let bottom_door = EntityId(3);
        let top_door = EntityId(4);

        let mut entities = BTreeMap::new();
        entities.insert(lobby_id, Entity::Lobby);
        entities.insert(cabin_id, Entity::ElevatorCabin);
        entities.insert(bottom_door, Entity::ElevatorDoor(Floor::Bottom));
        entities.insert(top_door, Entity::ElevatorDoor(Floor::Top));

        let mut next_entity = 5;
        for position in &scene.rotating_doors {
            entities.insert(
                EntityId(next_entity),
                Entity::RotatingDoor(RotatingDoor::new(*position)),
            );
            next_entity += 1;
        }
        let flicker = FlickerParams::from_config(&config);
        for position in &scene.lights {
            entities.insert(
                EntityId(next_entity),
                Entity::Light(Light::new(*position, 0.0, &mut rng, &flicker)),
            );
            next_entity += 1;
        }

        let elevator = Elevator::new(cabin_id, bottom_door, top_door, scene.elevator.clone(), &config);

        Self {
            session: Session::new(role, config.tick_secs()),
            powerups: PowerUpSpawner::new(config.powerup_interval),
            lobby: Lobby::new(lobby_id),
            elevator,
            entities,
            players_by_client: HashMap::new(),
            rng,
            next_entity,
            config,
            scene,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneLayout {
        &self.scene
    }

    pub fn elevator(&self) -> &Elevator {
        &self.elevator
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter().map(|(id, e)| (*id, e))
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn player(&self, id: EntityId) -> SyncResult<&Player> {
        match self.entities.get(&id) {
            Some(Entity::Player(player)) => Ok(player),
            Some(_) => Err(SyncError::WrongEntityKind {
                entity: id,
                expected: "player",
            }),
            None => Err(SyncError::StaleReference(id)),
        }
    }

    pub fn player_mut(&mut self, id: EntityId) -> SyncResult<&mut Player> {
        player_in(&mut self.entities, id)
    }

    /// Registers an entity and announces it with its current field values.
    pub fn spawn(&mut self, entity: Entity) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;

        self.session.announce_spawn(id, entity.kind(), entity.owner());
        let mut snapshot = Vec::new();
        if let Some(fields) = entity.field_set() {
            fields.snapshot(id, &mut snapshot);
        }
        self.session.push_fields(snapshot);

        self.entities.insert(id, entity);
        id
    }

    /// Removes an entity. Its subscribers are dropped first so nothing fires
    /// for a destroyed entity.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        let Some(mut entity) = self.entities.remove(&id) else {
            return false;
        };
        if let Some(fields) = entity.field_set_mut() {
            fields.clear_subscribers();
        }
        if let Entity::Player(player) = &entity {
            if self.players_by_client.get(&player.owner) == Some(&id) {
                self.players_by_client.remove(&player.owner);
            }
            if player.in_cabin {
                self.elevator.player_exited();
            }
        }
        self.session.announce_despawn(id);
        true
    }

    /// Solid volumes of networked scenery, with the entity that owns each.
    pub fn solid_entity_volumes(&self) -> Vec<(EntityId, Aabb)> {
        let mut volumes = Vec::new();
        for door in self.elevator.doors() {
            if let Some(volume) = self.elevator.door_volume(door.floor) {
                volumes.push((door.id, volume));
            }
        }
        for (id, entity) in &self.entities {
            if let Entity::RotatingDoor(door) = entity {
                volumes.push((*id, door.volume()));
            }
        }
        volumes
    }

    /// Executes one request from `sender` against `target`. Owner-gated
    /// requests from anyone but the target's owner are rejected before any
    /// state is touched.
    pub fn handle_request(&mut self, sender: ClientId, target: EntityId, request: Request) -> SyncResult<()> {
        if !self.session.is_authority() {
            return Err(SyncError::AuthorityViolation {
                field: request.name(),
            });
        }

        if request.requires_ownership() {
            let owner = self
                .entities
                .get(&target)
                .ok_or(SyncError::StaleReference(target))?
                .owner();
            check_ownership(sender, target, owner)?;
        }

        match request {
            Request::MovePlayer {
                axis_h,
                axis_v,
                shoot,
            } => self.move_player(target, axis_h, axis_v, shoot),
            Request::MeleeAttack => self.melee_attack(target),
            Request::ToggleFlashlight => self.toggle_flashlight(target),
            Request::RequestColorChange { color } => self.request_color_change(target, color),
            Request::SendPowerUp { kind } => self.apply_power_up(target, kind),
            Request::EndBuff => self.end_buff(target),
            Request::SubmitPosition => self.submit_position(target),
            Request::TryOpenDoor { door } => self.try_open_door(target, door),
            Request::RequestOtherFloor { cabin } => self.request_other_floor(target, cabin),
            Request::ToggleRotatingDoor { door } => {
                self.alive_player(target)?;
                self.toggle_rotating_door(door).map(|_| ())
            }
            Request::PickMode { mode } => self.pick_mode(sender, mode),
            Request::RequestSpawn => self.request_spawn(sender, target).map(|_| ()),
        }
    }

    fn alive_player(&self, id: EntityId) -> SyncResult<&Player> {
        let player = self.player(id)?;
        if player.is_alive() {
            Ok(player)
        } else {
            Err(SyncError::PlayerDead(id))
        }
    }

    /// Call button outside the elevator, pressed by `player`.
    pub fn try_open_door(&mut self, player: EntityId, door: EntityId) -> SyncResult<()> {
        self.alive_player(player)?;
        let floor = match self.entities.get(&door) {
            Some(Entity::ElevatorDoor(floor)) => *floor,
            Some(_) => {
                return Err(SyncError::WrongEntityKind {
                    entity: door,
                    expected: "elevator door",
                })
            }
            None => return Err(SyncError::StaleReference(door)),
        };
        self.elevator.try_open_from(floor)
    }

    /// Button inside the cabin, pressed by `player`.
    pub fn request_other_floor(&mut self, player: EntityId, cabin: EntityId) -> SyncResult<()> {
        self.alive_player(player)?;
        match self.entities.get(&cabin) {
            Some(Entity::ElevatorCabin) => self.elevator.request_other_floor().map(|_| ()),
            Some(_) => Err(SyncError::WrongEntityKind {
                entity: cabin,
                expected: "elevator cabin",
            }),
            None => Err(SyncError::StaleReference(cabin)),
        }
    }

    /// One fixed simulation step.
    pub fn tick(&mut self, dt: f32) {
        self.session.advance(dt);
        self.apply_gravity(dt);
        self.update_projectiles(dt);
        self.update_occupancy();
        if let Err(e) = self.elevator.tick(&mut self.session, dt) {
            warn!("Elevator tick failed: {}", e);
        }
        self.update_power_up_spawner();
        self.collect_power_ups();
        self.update_lights();
        self.flush_fields();
    }

    fn apply_gravity(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        let cabin = self.elevator.cabin_position();
        for (id, entity) in self.entities.iter_mut() {
            let Entity::Player(player) = entity else {
                continue;
            };
            if !player.is_alive() {
                continue;
            }
            let ground = self.scene.ground_height(&player.position(), Some(cabin));
            if let Err(e) = player.fall(gravity, dt, ground) {
                debug!("Gravity not applied to {}: {}", id, e);
            }
        }
    }

    /// Derives cabin enter and exit events from player positions.
    fn update_occupancy(&mut self) {
        let volume = self.elevator.cabin_volume();
        let mut entered = 0;
        let mut exited = 0;
        for entity in self.entities.values_mut() {
            let Entity::Player(player) = entity else {
                continue;
            };
            let inside = volume.contains(&player.position());
            if inside != player.in_cabin {
                player.in_cabin = inside;
                if inside {
                    entered += 1;
                } else {
                    exited += 1;
                }
            }
        }
        for _ in 0..entered {
            self.elevator.player_entered();
        }
        for _ in 0..exited {
            self.elevator.player_exited();
        }
    }

    /// Moves every pending field change into the outbox.
    pub fn flush_fields(&mut self) {
        let mut updates = Vec::new();
        for (id, entity) in self.entities.iter_mut() {
            if let Some(fields) = entity.field_set_mut() {
                fields.drain_updates(*id, &mut updates);
            }
        }
        self.elevator.drain_updates(&mut updates);
        self.lobby.drain_updates(&mut updates);
        self.session.push_fields(updates);
    }

    fn snapshot_fields(&self, id: EntityId, entity: &Entity, out: &mut Vec<FieldUpdate>) {
        match entity {
            Entity::ElevatorDoor(_) | Entity::ElevatorCabin => self.elevator.snapshot(id, out),
            Entity::Lobby => self.lobby.fields.snapshot(id, out),
            other => {
                if let Some(fields) = other.field_set() {
                    fields.snapshot(id, out);
                }
            }
        }
    }

    /// Everything a late joiner needs: every entity followed by its fields.
    pub fn snapshot(&self) -> Vec<Packet> {
        let mut packets = Vec::new();
        let mut fields = Vec::new();
        for (id, entity) in &self.entities {
            packets.push(Packet::Spawn {
                entity: *id,
                kind: entity.kind(),
                owner: entity.owner(),
            });
            fields.clear();
            self.snapshot_fields(*id, entity, &mut fields);
            packets.extend(fields.drain(..).map(Packet::Field));
        }
        packets
    }

    /// Registers an observer and returns the snapshot it must receive.
    pub fn client_connected(&mut self, client: ClientId) -> Vec<Packet> {
        self.session.connect(client);
        info!("Client {} joined the session", client);
        if let Err(e) = self.refresh_lobby() {
            warn!("Lobby refresh failed: {}", e);
        }
        self.snapshot()
    }

    /// Drops everything the observer owned and recounts the lobby.
    pub fn client_disconnected(&mut self, client: ClientId) {
        self.session.disconnect(client);
        let owned: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, e)| e.owner() == Some(client))
            .map(|(id, _)| *id)
            .collect();
        for id in owned {
            self.despawn(id);
        }
        self.lobby.remove_client(client);
        if let Err(e) = self.refresh_lobby() {
            warn!("Lobby refresh failed: {}", e);
        }
        info!("Client {} left the session", client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Outgoing;
    use shared::{Broadcast, GameMode, Vec3};

    fn world() -> World {
        let config = ServerConfig {
            seed: Some(7),
            ..ServerConfig::default()
        };
        World::new(config, SceneLayout::default())
    }

    fn face(world: &mut World, id: EntityId, pos: Vec3, yaw: f32) {
        let player = world.player_mut(id).unwrap();
        player.place(pos).unwrap();
        player.fields.yaw.set(yaw).unwrap();
    }

    #[test]
    fn test_scene_entities_in_snapshot() {
        let world = world();
        let snapshot = world.snapshot();
        let spawns: Vec<EntityKind> = snapshot
            .iter()
            .filter_map(|p| match p {
                Packet::Spawn { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            spawns,
            vec![
                EntityKind::Lobby,
                EntityKind::ElevatorCabin,
                EntityKind::ElevatorDoor(Floor::Bottom),
                EntityKind::ElevatorDoor(Floor::Top),
                EntityKind::RotatingDoor,
                EntityKind::Light,
            ]
        );
        assert!(snapshot.iter().any(|p| matches!(p, Packet::Field(_))));
        assert!(world.session().pending().is_empty());
    }

    #[test]
    fn test_spawn_and_despawn_are_announced() {
        let mut world = world();
        world.session_mut().connect(1);
        let id = world.spawn_player(1);
        assert_eq!(world.player_of(1), Some(id));

        let out = world.session_mut().drain_outbox();
        assert!(matches!(
            out[0],
            Outgoing::Spawn {
                kind: EntityKind::Player,
                owner: Some(1),
                ..
            }
        ));
        assert!(out.len() > 1);

        assert!(world.despawn(id));
        assert!(!world.despawn(id));
        assert_eq!(world.player_of(1), None);
        assert_eq!(
            world.session_mut().drain_outbox(),
            vec![Outgoing::Despawn { entity: id }]
        );
    }

    #[test]
    fn test_owner_gated_request_from_stranger_is_rejected() {
        let mut world = world();
        let a = world.spawn_player(1);
        let b = world.spawn_player(2);
        face(&mut world, a, Vec3::ZERO, 0.0);
        face(&mut world, b, Vec3::new(0.0, 0.0, 1.0), 0.0);

        let result = world.handle_request(2, a, Request::MeleeAttack);
        assert!(matches!(
            result,
            Err(SyncError::OwnershipViolation { sender: 2, .. })
        ));
        assert_eq!(world.player(b).unwrap().health(), 100);

        let result = world.handle_request(2, a, Request::ToggleFlashlight);
        assert!(result.is_err());
        assert!(*world.player(a).unwrap().fields.flashlight_on.get());
    }

    #[test]
    fn test_color_change_is_not_owner_gated() {
        let mut world = world();
        let a = world.spawn_player(1);
        let red = shared::Color::rgba(1.0, 0.0, 0.0, 1.0);
        world
            .handle_request(2, a, Request::RequestColorChange { color: red })
            .unwrap();
        assert_eq!(world.player(a).unwrap().color(), red);
    }

    #[test]
    fn test_observer_role_executes_nothing() {
        let mut world = World::with_role(ServerConfig::default(), SceneLayout::default(), Role::Observer);
        let result = world.handle_request(1, EntityId(1), Request::PickMode { mode: GameMode::Teams });
        assert!(matches!(result, Err(SyncError::AuthorityViolation { .. })));
    }

    #[test]
    fn test_projectile_hits_player_once() {
        let mut world = world();
        world.session_mut().connect(1);
        world.session_mut().connect(2);
        let a = world.spawn_player(1);
        let b = world.spawn_player(2);
        face(&mut world, a, Vec3::ZERO, 0.0);
        face(&mut world, b, Vec3::new(0.0, 0.0, 5.0), 180.0);
        world.session_mut().drain_outbox();

        world.shoot(a).unwrap();
        for _ in 0..10 {
            world.tick(1.0 / 60.0);
        }

        assert_eq!(world.player(b).unwrap().health(), 90);
        let out = world.session_mut().drain_outbox();
        let texts: Vec<i32> = out
            .iter()
            .filter_map(|o| match o {
                Outgoing::Broadcast {
                    event: Broadcast::ShowDamageText { amount, .. },
                    ..
                } => Some(*amount),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec![10]);
        assert!(!world
            .entities()
            .any(|(_, e)| matches!(e, Entity::Projectile(_))));
    }

    #[test]
    fn test_door_request_opens_elevator() {
        let mut world = world();
        let a = world.spawn_player(1);
        world
            .handle_request(1, a, Request::TryOpenDoor { door: EntityId(3) })
            .unwrap();
        assert!(*world.elevator().door(Floor::Bottom).fields.is_open.get());

        let stale = world.handle_request(1, a, Request::TryOpenDoor { door: EntityId(999) });
        assert!(matches!(stale, Err(SyncError::StaleReference(EntityId(999)))));

        let wrong = world.handle_request(1, a, Request::TryOpenDoor { door: EntityId(1) });
        assert!(matches!(wrong, Err(SyncError::WrongEntityKind { .. })));
    }

    #[test]
    fn test_disconnect_despawns_owned_entities() {
        let mut world = world();
        world.client_connected(1);
        world.pick_mode(1, GameMode::Teams).unwrap();
        let a = world.spawn_player(1);
        world.shoot(a).unwrap();
        let before = world.entity_count();

        world.client_disconnected(1);
        assert_eq!(world.entity_count(), before - 2);
        assert_eq!(world.lobby().pick_count(), 0);
        assert!(world.player(a).is_err());
    }

    #[test]
    fn test_occupancy_follows_positions() {
        let mut world = world();
        let a = world.spawn_player(1);
        face(&mut world, a, Vec3::new(10.0, 0.0, 10.0), 0.0);
        world.tick(1.0 / 60.0);
        assert_eq!(world.elevator().occupancy(), 1);

        face(&mut world, a, Vec3::ZERO, 0.0);
        world.tick(1.0 / 60.0);
        assert_eq!(world.elevator().occupancy(), 0);
    }

    #[test]
    fn test_tick_flushes_field_changes() {
        let mut world = world();
        let a = world.spawn_player(1);
        world.session_mut().drain_outbox();
        world.toggle_flashlight(a).unwrap();
        world.tick(1.0 / 60.0);

        let out = world.session_mut().drain_outbox();
        assert!(out.iter().any(|o| matches!(
            o,
            Outgoing::Field(FieldUpdate {
                field: shared::FieldId::FlashlightOn,
                ..
            })
        )));
    }
}
