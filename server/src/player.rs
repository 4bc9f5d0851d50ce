//! Player entity state machine
//!
//! A player is `Alive` until its health reaches zero and `Dead` afterwards;
//! nothing brings it back. Buffs and the flashlight are independent
//! sub-states of `Alive`. Every mutation here runs on the authority.

use crate::config::ServerConfig;
use crate::world::{player_in, Entity, World};
use log::{debug, info};
use rand::Rng;
use shared::{
    Broadcast, ClientId, Color, EntityId, PlayerFields, PowerUpKind, Role, SceneLayout,
    SpawnPoint, SyncError, SyncResult, Vec3, DEAD_COLOR, MAX_HEALTH, MAX_PLAYERS, MUZZLE_FORWARD,
    MUZZLE_HEIGHT, NORMAL_DAMAGE_MULTIPLIER,
};
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct Player {
    pub owner: ClientId,
    pub fields: PlayerFields,
    vertical_velocity: f32,
    speed: f32,
    damage_multiplier: f32,
    shoot_ready_at: f64,
    melee_ready_at: f64,
    /// Inside the elevator cabin volume as of the last occupancy pass.
    pub(crate) in_cabin: bool,
}

impl Player {
    pub fn new(owner: ClientId, spawn: &SpawnPoint, color: Color, normal_speed: f32) -> Self {
        Self {
            owner,
            fields: PlayerFields::spawned(Role::Authority, color, spawn.position, spawn.yaw),
            vertical_velocity: 0.0,
            speed: normal_speed,
            damage_multiplier: NORMAL_DAMAGE_MULTIPLIER,
            shoot_ready_at: 0.0,
            melee_ready_at: 0.0,
            in_cabin: false,
        }
    }

    /// Spawn colour derived from the client id: hue from the id, fixed
    /// saturation and value.
    pub fn spawn_color(owner: ClientId) -> Color {
        Color::rgba(owner as f32 / MAX_PLAYERS as f32, 0.8, 0.8, 1.0)
    }

    pub fn is_alive(&self) -> bool {
        !*self.fields.is_dead.get()
    }

    pub fn health(&self) -> i32 {
        *self.fields.health.get()
    }

    pub fn position(&self) -> Vec3 {
        *self.fields.position.get()
    }

    pub fn yaw(&self) -> f32 {
        *self.fields.yaw.get()
    }

    pub fn color(&self) -> Color {
        *self.fields.color.get()
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::from_yaw(self.yaw())
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn damage_multiplier(&self) -> f32 {
        self.damage_multiplier
    }

    /// Where projectiles leave the gun.
    pub fn muzzle(&self) -> Vec3 {
        self.position()
            .add(&self.forward().scale(MUZZLE_FORWARD))
            .add(&Vec3::UP.scale(MUZZLE_HEIGHT))
    }

    /// Turns by the horizontal axis and walks along the facing direction.
    pub fn walk(
        &mut self,
        axis_h: f32,
        axis_v: f32,
        dt: f32,
        rotation_speed: f32,
        scene: &SceneLayout,
    ) -> SyncResult<()> {
        if axis_h != 0.0 {
            let yaw = (self.yaw() + axis_h * rotation_speed).rem_euclid(360.0);
            self.fields.yaw.set(yaw)?;
        }

        let step = self.forward().scale(axis_v * self.speed * dt);
        let next = scene.clamp_to_arena(self.position().add(&step));
        self.fields.position.set(next)
    }

    /// Integrates gravity and clamps to the walkable surface at `ground`.
    pub fn fall(&mut self, gravity: f32, dt: f32, ground: f32) -> SyncResult<()> {
        let mut pos = self.position();
        self.vertical_velocity += gravity * dt;
        pos.y += self.vertical_velocity * dt;
        if pos.y <= ground {
            pos.y = ground;
            self.vertical_velocity = 0.0;
        }
        self.fields.position.set(pos)
    }

    /// Moves without physics, for teleports.
    pub fn place(&mut self, pos: Vec3) -> SyncResult<()> {
        self.vertical_velocity = 0.0;
        self.fields.position.set(pos)
    }

    /// Starts the shot cooldown if it has elapsed.
    pub fn try_start_shot(&mut self, now: f64, cooldown: f64) -> bool {
        if now < self.shoot_ready_at {
            return false;
        }
        self.shoot_ready_at = now + cooldown;
        true
    }

    pub fn try_start_melee(&mut self, now: f64, cooldown: f64) -> bool {
        if now < self.melee_ready_at {
            return false;
        }
        self.melee_ready_at = now + cooldown;
        true
    }

    /// Subtracts `amount`, never going below zero. Returns true when this hit
    /// brought the player to zero.
    pub fn take_damage(&mut self, amount: i32) -> SyncResult<bool> {
        if !self.is_alive() {
            return Ok(false);
        }
        let health = (self.health() - amount).max(0);
        self.fields.health.set(health)?;
        Ok(health == 0)
    }

    /// One-way transition to `Dead`.
    pub fn die(&mut self) -> SyncResult<()> {
        self.fields.is_dead.set(true)?;
        self.fields.color.set(DEAD_COLOR)?;
        self.fields.flashlight_on.set(false)?;
        self.vertical_velocity = 0.0;
        Ok(())
    }

    pub fn toggle_flashlight(&mut self) -> SyncResult<()> {
        let on = *self.fields.flashlight_on.get();
        self.fields.flashlight_on.set(!on)
    }

    /// Re-applying an active buff only pushes its expiry out.
    pub fn apply_power_up(
        &mut self,
        kind: PowerUpKind,
        now: f64,
        config: &ServerConfig,
    ) -> SyncResult<()> {
        match kind {
            PowerUpKind::Hp => self.fields.health.set(MAX_HEALTH),
            PowerUpKind::PowerBullet => {
                self.fields.has_damage_buff.set(true)?;
                self.damage_multiplier = config.buffed_damage_multiplier;
                self.fields.buff_end_time.set(now + config.buff_duration)
            }
            PowerUpKind::SpeedCola => {
                self.fields.has_speed_buff.set(true)?;
                self.speed = config.buffed_speed;
                self.fields.buff_end_time.set(now + config.buff_duration)
            }
        }
    }

    /// Clears both buffs and restores default speed and damage.
    pub fn end_buff(&mut self, config: &ServerConfig) -> SyncResult<()> {
        self.fields.has_speed_buff.set(false)?;
        self.fields.has_damage_buff.set(false)?;
        self.speed = config.normal_speed;
        self.damage_multiplier = NORMAL_DAMAGE_MULTIPLIER;
        Ok(())
    }
}

/// Kill-feed line naming both players in their colours.
pub fn kill_message(killer: ClientId, killer_color: Color, victim: ClientId, victim_color: Color) -> String {
    format!(
        "<color=#{}>Player {}</color> killed <color=#{}>Player {}</color>",
        killer_color.to_hex_rgb(),
        killer,
        victim_color.to_hex_rgb(),
        victim
    )
}

fn alive_in(entities: &mut BTreeMap<EntityId, Entity>, id: EntityId) -> SyncResult<&mut Player> {
    let player = player_in(entities, id)?;
    if player.is_alive() {
        Ok(player)
    } else {
        Err(SyncError::PlayerDead(id))
    }
}

impl World {
    /// Creates a player for `owner` at its spawn point.
    pub fn spawn_player(&mut self, owner: ClientId) -> EntityId {
        let spawn = self.scene.spawn_point(owner as usize);
        let player = Player::new(owner, &spawn, Player::spawn_color(owner), self.config.normal_speed);
        let id = self.spawn(Entity::Player(player));
        self.players_by_client.insert(owner, id);
        info!("Spawned player {} for client {} at {:?}", id, owner, spawn.position);
        id
    }

    pub fn player_of(&self, client: ClientId) -> Option<EntityId> {
        self.players_by_client.get(&client).copied()
    }

    /// Applies one movement request and fires if the trigger is held and the
    /// authority-side cooldown allows it.
    pub fn move_player(
        &mut self,
        id: EntityId,
        axis_h: f32,
        axis_v: f32,
        shoot: bool,
    ) -> SyncResult<()> {
        let now = self.session.now();
        let dt = self.session.delta();
        let rotation_speed = self.config.rotation_speed;
        let cooldown = self.config.shoot_cooldown;

        let player = alive_in(&mut self.entities, id)?;
        player.walk(axis_h, axis_v, dt, rotation_speed, &self.scene)?;
        let fire = shoot && player.try_start_shot(now, cooldown);

        if fire {
            self.shoot(id)?;
        }
        Ok(())
    }

    /// Spawns a projectile owned by the shooter and tells everyone else to
    /// show a muzzle phantom.
    pub fn shoot(&mut self, shooter: EntityId) -> SyncResult<EntityId> {
        let (owner, muzzle, forward, color, position, yaw) = {
            let player = self.player_mut(shooter)?;
            (
                player.owner,
                player.muzzle(),
                player.forward(),
                player.color(),
                player.position(),
                player.yaw(),
            )
        };

        let projectile = self.spawn_projectile(owner, shooter, muzzle, forward, color);
        self.session.broadcast(
            shooter,
            Broadcast::ShowPhantom {
                pos: position,
                yaw,
                shooter: owner,
            },
        );
        Ok(projectile)
    }

    /// Ranged damage from a hit by `attacker`'s projectile. Returns the damage
    /// dealt after the attacker's multiplier, or 0 when nothing happened.
    pub fn damage_player(&mut self, victim: EntityId, attacker: ClientId) -> i32 {
        if !self.session.is_authority() {
            return 0;
        }

        let multiplier = self
            .player_of(attacker)
            .and_then(|id| self.player(id).ok())
            .map(|p| p.damage_multiplier())
            .unwrap_or(NORMAL_DAMAGE_MULTIPLIER);
        let damage = (self.config.bullet_damage as f32 * multiplier).round() as i32;

        let lethal = match self.player_mut(victim) {
            Ok(player) if player.is_alive() => match player.take_damage(damage) {
                Ok(lethal) => lethal,
                Err(e) => {
                    debug!("Damage on {} rejected: {}", victim, e);
                    return 0;
                }
            },
            _ => return 0,
        };

        if lethal {
            if let Err(e) = self.handle_player_death(victim, attacker) {
                debug!("Death of {} not applied: {}", victim, e);
            }
        }
        damage
    }

    /// Kills `victim` and announces it on the kill feed.
    pub fn handle_player_death(&mut self, victim: EntityId, killer: ClientId) -> SyncResult<()> {
        let killer_color = self
            .player_of(killer)
            .and_then(|id| self.player(id).ok())
            .map(|p| p.color())
            .unwrap_or(Color::WHITE);

        let player = self.player_mut(victim)?;
        let message = kill_message(killer, killer_color, player.owner, player.color());
        let victim_client = player.owner;
        player.die()?;

        info!("Client {} killed client {}", killer, victim_client);
        self.session
            .broadcast(victim, Broadcast::AddKillMessage { message });
        Ok(())
    }

    /// Hits the nearest living player in front of or right behind the
    /// attacker. A hit from behind takes all remaining health.
    pub fn melee_attack(&mut self, attacker: EntityId) -> SyncResult<()> {
        let now = self.session.now();
        let cooldown = self.config.melee_cooldown;
        let (origin, forward, attacker_client) = {
            let player = alive_in(&mut self.entities, attacker)?;
            if !player.try_start_melee(now, cooldown) {
                debug!("Melee from {} still cooling down", attacker);
                return Ok(());
            }
            (player.position(), player.forward(), player.owner)
        };

        let mut best: Option<(f32, EntityId, f32)> = None;
        for (id, entity) in &self.entities {
            let Entity::Player(other) = entity else {
                continue;
            };
            if *id == attacker || !other.is_alive() {
                continue;
            }
            let to_victim = other.position().sub(&origin).flat();
            let distance = to_victim.magnitude();
            if distance > self.config.melee_range {
                continue;
            }
            let angle = forward.angle_between(&to_victim);
            if angle > self.config.melee_angle && angle <= self.config.backstab_angle {
                continue;
            }
            if best.map_or(true, |(d, _, _)| distance < d) {
                best = Some((distance, *id, angle));
            }
        }

        let Some((_, victim, angle)) = best else {
            return Ok(());
        };

        let (min, max) = self.config.melee_damage;
        let random_damage = self.rng.gen_range(min..=max);
        let backstab = angle > self.config.backstab_angle;

        let (lethal, victim_client) = {
            let player = self.player_mut(victim)?;
            let damage = if backstab { player.health() } else { random_damage };
            (player.take_damage(damage)?, player.owner)
        };

        self.session.broadcast(
            victim,
            Broadcast::TriggerCameraShake {
                duration: 0.1,
                magnitude: 0.25,
            },
        );
        self.session.broadcast(
            attacker,
            Broadcast::TriggerCameraShake {
                duration: 0.08,
                magnitude: 0.15,
            },
        );
        self.session
            .send_to(victim_client, victim, Broadcast::TriggerHitPause);

        if lethal {
            self.handle_player_death(victim, attacker_client)?;
        }
        Ok(())
    }

    /// Sets the colour, or a random one for the sentinel, and announces it.
    pub fn request_color_change(&mut self, id: EntityId, desired: Color) -> SyncResult<()> {
        let color = if desired.is_random_sentinel() {
            Color::rgba(self.rng.gen(), self.rng.gen(), self.rng.gen(), 1.0)
        } else {
            desired
        };

        alive_in(&mut self.entities, id)?.fields.color.set(color)?;
        self.session
            .broadcast(id, Broadcast::ColorChanged { color });
        Ok(())
    }

    pub fn toggle_flashlight(&mut self, id: EntityId) -> SyncResult<()> {
        alive_in(&mut self.entities, id)?.toggle_flashlight()
    }

    pub fn apply_power_up(&mut self, id: EntityId, kind: PowerUpKind) -> SyncResult<()> {
        let now = self.session.now();
        alive_in(&mut self.entities, id)?.apply_power_up(kind, now, &self.config)?;
        info!("Player {} picked up {:?}", id, kind);
        Ok(())
    }

    pub fn end_buff(&mut self, id: EntityId) -> SyncResult<()> {
        alive_in(&mut self.entities, id)?.end_buff(&self.config)
    }

    /// Teleports to a random point on the central plane.
    pub fn submit_position(&mut self, id: EntityId) -> SyncResult<()> {
        let x = self.rng.gen_range(-3.0..=3.0);
        let z = self.rng.gen_range(-3.0..=3.0);
        alive_in(&mut self.entities, id)?.place(Vec3::new(x, 1.0, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn player() -> Player {
        let spawn = SpawnPoint {
            position: Vec3::ZERO,
            yaw: 0.0,
        };
        Player::new(1, &spawn, Color::WHITE, 2.0)
    }

    #[test]
    fn test_health_never_negative() {
        let mut p = player();
        assert!(!p.take_damage(60).unwrap());
        assert!(p.take_damage(60).unwrap());
        assert_eq!(p.health(), 0);
    }

    #[test]
    fn test_death_is_terminal() {
        let mut p = player();
        p.take_damage(100).unwrap();
        p.die().unwrap();
        assert!(!p.is_alive());
        assert_eq!(p.color(), DEAD_COLOR);
        assert!(!*p.fields.flashlight_on.get());

        assert!(!p.take_damage(10).unwrap());
        assert_eq!(p.health(), 0);
    }

    #[test]
    fn test_power_ups_and_end_buff() {
        let config = ServerConfig::default();
        let mut p = player();

        p.apply_power_up(PowerUpKind::SpeedCola, 10.0, &config).unwrap();
        assert!(*p.fields.has_speed_buff.get());
        assert_approx_eq!(p.speed(), config.buffed_speed);
        assert_eq!(*p.fields.buff_end_time.get(), 40.0);

        p.apply_power_up(PowerUpKind::PowerBullet, 20.0, &config).unwrap();
        assert_approx_eq!(p.damage_multiplier(), 1.5);
        assert_eq!(*p.fields.buff_end_time.get(), 50.0);

        p.end_buff(&config).unwrap();
        assert!(!*p.fields.has_speed_buff.get());
        assert!(!*p.fields.has_damage_buff.get());
        assert_approx_eq!(p.speed(), config.normal_speed);
        assert_approx_eq!(p.damage_multiplier(), 1.0);
    }

    #[test]
    fn test_hp_power_up_restores_health() {
        let config = ServerConfig::default();
        let mut p = player();
        p.take_damage(70).unwrap();
        p.apply_power_up(PowerUpKind::Hp, 0.0, &config).unwrap();
        assert_eq!(p.health(), MAX_HEALTH);
    }

    #[test]
    fn test_shot_cooldown_window() {
        let mut p = player();
        assert!(p.try_start_shot(0.0, 0.5));
        assert!(!p.try_start_shot(0.3, 0.5));
        assert!(p.try_start_shot(0.5, 0.5));
    }

    #[test]
    fn test_walk_and_fall() {
        let scene = SceneLayout::default();
        let mut p = player();
        p.walk(0.0, 1.0, 0.5, 0.25, &scene).unwrap();
        assert_approx_eq!(p.position().z, 1.0, 1e-5);

        p.place(Vec3::new(0.0, 2.0, 0.0)).unwrap();
        for _ in 0..120 {
            p.fall(-9.81, 1.0 / 60.0, 0.0).unwrap();
        }
        assert_eq!(p.position().y, 0.0);
    }

    #[test]
    fn test_kill_message_format() {
        let msg = kill_message(1, Color::rgba(1.0, 0.0, 0.0, 1.0), 2, DEAD_COLOR);
        assert_eq!(
            msg,
            "<color=#FF0000>Player 1</color> killed <color=#808080>Player 2</color>"
        );
    }

    #[test]
    fn test_spawn_color() {
        assert_eq!(Player::spawn_color(2), Color::rgba(0.5, 0.8, 0.8, 1.0));
    }
}
