//! Power-up pickups and the timed spawner

use crate::world::{Entity, World};
use log::{debug, info};
use rand::seq::SliceRandom;
use shared::{Broadcast, EntityId, PowerUpFields, PowerUpKind, Role, Vec3, POWERUP_RADIUS};

#[derive(Debug)]
pub struct PowerUp {
    pub kind: PowerUpKind,
    pub fields: PowerUpFields,
}

impl PowerUp {
    pub fn new(kind: PowerUpKind, position: Vec3) -> Self {
        Self {
            kind,
            fields: PowerUpFields::new(Role::Authority, position),
        }
    }

    pub fn position(&self) -> Vec3 {
        *self.fields.position.get()
    }
}

/// Drops a power-up every `interval` seconds.
#[derive(Debug, Clone)]
pub struct PowerUpSpawner {
    interval: f64,
    next_at: Option<f64>,
}

impl PowerUpSpawner {
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            next_at: None,
        }
    }

    /// True when a spawn is due at `now`. The first call only arms the timer.
    pub fn poll(&mut self, now: f64) -> bool {
        match self.next_at {
            None => {
                self.next_at = Some(now + self.interval);
                false
            }
            Some(at) if now >= at => {
                self.next_at = Some(at + self.interval);
                true
            }
            Some(_) => false,
        }
    }
}

impl World {
    pub fn spawn_power_up(&mut self, kind: PowerUpKind, position: Vec3) -> EntityId {
        let id = self.spawn(Entity::PowerUp(PowerUp::new(kind, position)));
        info!("Spawned {:?} power-up {} at {:?}", kind, id, position);
        id
    }

    /// Spawns a random kind at a random spawn point once the game is running.
    pub(crate) fn update_power_up_spawner(&mut self) {
        if !self.lobby.is_started() {
            return;
        }
        let now = self.session.now();
        if !self.powerups.poll(now) {
            return;
        }

        let point = self.scene.powerup_points.choose(&mut self.rng).copied();
        let kind = PowerUpKind::ALL.choose(&mut self.rng).copied();
        if let (Some(point), Some(kind)) = (point, kind) {
            self.spawn_power_up(kind, point);
        }
    }

    /// Hands every power-up touched by a living player to that player's owner.
    pub(crate) fn collect_power_ups(&mut self) {
        let mut touched = Vec::new();
        for (id, entity) in &self.entities {
            let Entity::PowerUp(power_up) = entity else {
                continue;
            };
            let pos = power_up.position();
            let toucher = self.entities.values().find_map(|e| match e {
                Entity::Player(p) if p.is_alive() && p.position().distance(&pos) <= POWERUP_RADIUS => {
                    Some(p.owner)
                }
                _ => None,
            });
            if let Some(owner) = toucher {
                touched.push((*id, power_up.kind, owner));
            }
        }

        for (id, kind, owner) in touched {
            debug!("Power-up {} collected by client {}", id, owner);
            self.despawn(id);
            self.session
                .send_to(owner, id, Broadcast::PowerUpCollected { kind });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawner_interval() {
        let mut spawner = PowerUpSpawner::new(15.0);
        assert!(!spawner.poll(2.0));
        assert!(!spawner.poll(16.0));
        assert!(spawner.poll(17.0));
        assert!(!spawner.poll(20.0));
        assert!(spawner.poll(32.0));
    }
}
