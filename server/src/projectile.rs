//! Projectile flight and collision resolution
//!
//! A projectile resolves at most one collision. The `consumed` latch is
//! checked and set inside the same authority-side call that applies the
//! damage and effects, so a second collision report for the same projectile
//! finds it already spent.

use crate::world::{Entity, World};
use log::debug;
use rand::Rng;
use shared::{
    Broadcast, ClientId, Color, EntityId, HitKind, ProjectileFields, Role, Vec3, PLAYER_HEIGHT,
    PLAYER_RADIUS, PROJECTILE_RADIUS,
};

#[derive(Debug)]
pub struct Projectile {
    pub owner: ClientId,
    /// Player entity that fired it.
    pub shooter: EntityId,
    pub fields: ProjectileFields,
    velocity: Vec3,
    spawned_at: f64,
    consumed: bool,
}

impl Projectile {
    pub fn new(
        owner: ClientId,
        shooter: EntityId,
        position: Vec3,
        velocity: Vec3,
        color: Color,
        now: f64,
    ) -> Self {
        Self {
            owner,
            shooter,
            fields: ProjectileFields::new(Role::Authority, color, position),
            velocity,
            spawned_at: now,
            consumed: false,
        }
    }

    pub fn position(&self) -> Vec3 {
        *self.fields.position.get()
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn forward(&self) -> Vec3 {
        self.velocity.normalize()
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Check-and-set of the single-resolution latch. Returns false when the
    /// projectile was already spent.
    pub fn consume(&mut self) -> bool {
        if self.consumed {
            return false;
        }
        self.consumed = true;
        true
    }

    pub fn is_expired(&self, now: f64, lifetime: f64) -> bool {
        now - self.spawned_at >= lifetime
    }
}

/// What a projectile ran into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionTarget {
    Player(EntityId),
    /// Solid scenery; `target` names the struck entity when it has one.
    Wall {
        normal: Vec3,
        target: Option<EntityId>,
    },
    StaticGeometry {
        normal: Vec3,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub point: Vec3,
    pub target: CollisionTarget,
}

/// Sub-steps needed so a projectile never moves further than half a player
/// radius between collision checks.
pub fn required_substeps(travel: f32) -> u32 {
    let max_step = PLAYER_RADIUS * 0.5;
    if travel > max_step {
        (travel / max_step).ceil() as u32
    } else {
        1
    }
}

impl World {
    pub fn spawn_projectile(
        &mut self,
        owner: ClientId,
        shooter: EntityId,
        position: Vec3,
        direction: Vec3,
        color: Color,
    ) -> EntityId {
        let velocity = direction.normalize().scale(self.config.projectile_speed);
        let projectile = Projectile::new(owner, shooter, position, velocity, color, self.session.now());
        self.spawn(Entity::Projectile(projectile))
    }

    /// Advances every projectile, resolving the first contact along its path
    /// and retiring the ones that outlived their lifetime.
    pub(crate) fn update_projectiles(&mut self, dt: f32) {
        let now = self.session.now();
        let lifetime = self.config.projectile_lifetime;
        let ids: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, e)| matches!(e, Entity::Projectile(_)))
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            let (start, velocity, shooter, expired) = match self.entities.get(&id) {
                Some(Entity::Projectile(p)) => (
                    p.position(),
                    p.velocity(),
                    p.shooter,
                    p.is_expired(now, lifetime),
                ),
                _ => continue,
            };

            if expired {
                debug!("Projectile {} expired", id);
                self.despawn(id);
                continue;
            }

            let travel = velocity.scale(dt);
            let substeps = required_substeps(travel.magnitude());
            let step = travel.scale(1.0 / substeps as f32);

            let mut pos = start;
            let mut contact = None;
            for _ in 0..substeps {
                pos = pos.add(&step);
                if let Some(found) = self.find_contact(shooter, pos) {
                    contact = Some(found);
                    break;
                }
            }

            if let Some(Entity::Projectile(p)) = self.entities.get_mut(&id) {
                if let Err(e) = p.fields.position.set(pos) {
                    debug!("Projectile {} position not updated: {}", id, e);
                }
            }

            if let Some(contact) = contact {
                self.on_projectile_collision(id, contact);
            }
        }
    }

    /// First thing a projectile at `pos` touches, players before scenery.
    pub fn find_contact(&self, shooter: EntityId, pos: Vec3) -> Option<Contact> {
        for (id, entity) in &self.entities {
            let Entity::Player(player) = entity else {
                continue;
            };
            if *id == shooter || !player.is_alive() {
                continue;
            }
            let feet = player.position();
            let reach = PLAYER_RADIUS + PROJECTILE_RADIUS;
            let within_height =
                pos.y >= feet.y - PROJECTILE_RADIUS && pos.y <= feet.y + PLAYER_HEIGHT;
            if within_height && pos.flat().distance(&feet.flat()) <= reach {
                return Some(Contact {
                    point: pos,
                    target: CollisionTarget::Player(*id),
                });
            }
        }

        for (id, volume) in self.solid_entity_volumes() {
            if volume.contains(&pos) {
                return Some(Contact {
                    point: pos,
                    target: CollisionTarget::Wall {
                        normal: volume.surface_normal(&pos),
                        target: Some(id),
                    },
                });
            }
        }

        for wall in &self.scene.walls {
            if wall.contains(&pos) {
                return Some(Contact {
                    point: pos,
                    target: CollisionTarget::Wall {
                        normal: wall.surface_normal(&pos),
                        target: None,
                    },
                });
            }
        }

        if pos.y <= 0.0 {
            return Some(Contact {
                point: Vec3::new(pos.x, 0.0, pos.z),
                target: CollisionTarget::StaticGeometry { normal: Vec3::UP },
            });
        }
        None
    }

    /// Resolves one collision report. Returns false when the report was
    /// ignored: not the authority, unknown projectile, or already consumed.
    pub fn on_projectile_collision(&mut self, projectile: EntityId, contact: Contact) -> bool {
        if !self.session.is_authority() {
            return false;
        }

        let (owner, forward) = match self.entities.get_mut(&projectile) {
            Some(Entity::Projectile(p)) => {
                if !p.consume() {
                    return false;
                }
                (p.owner, p.forward())
            }
            _ => return false,
        };

        match contact.target {
            CollisionTarget::Player(victim) => {
                let damage = self.damage_player(victim, owner);
                let spray = self.spray_direction(forward);
                self.session.broadcast(
                    victim,
                    Broadcast::ShowHitEffect {
                        pos: contact.point,
                        dir: spray,
                        kind: HitKind::Blood,
                    },
                );
                self.session.broadcast(
                    victim,
                    Broadcast::ShowDamageText {
                        pos: contact.point,
                        amount: damage,
                    },
                );
            }
            CollisionTarget::Wall { normal, target } => {
                self.wall_hit(projectile, contact.point, forward, normal, target)
            }
            CollisionTarget::StaticGeometry { normal } => {
                self.wall_hit(projectile, contact.point, forward, normal, None)
            }
        }

        self.despawn(projectile);
        true
    }

    fn wall_hit(
        &mut self,
        projectile: EntityId,
        point: Vec3,
        forward: Vec3,
        normal: Vec3,
        target: Option<EntityId>,
    ) {
        self.session.broadcast(
            projectile,
            Broadcast::ShowWallDecal {
                pos: point,
                forward,
                normal,
                target,
            },
        );
        self.session.broadcast(
            projectile,
            Broadcast::ShowHitEffect {
                pos: point,
                dir: normal,
                kind: HitKind::Wall,
            },
        );
    }

    /// Blood sprays back toward the shooter with some jitter.
    fn spray_direction(&mut self, forward: Vec3) -> Vec3 {
        let jitter = Vec3::new(
            self.rng.gen_range(-0.3..=0.3),
            self.rng.gen_range(0.0..=0.3),
            self.rng.gen_range(-0.3..=0.3),
        );
        forward.scale(-1.0).add(&jitter).normalize()
    }
}
