//! Static arena layout known to every process
//!
//! Walls and platforms are never streamed. Scene entities (elevator, rotating
//! doors) are created by the authority at startup and announced to observers
//! on connect; their geometry comes from this layout on both sides.

use crate::math::{Aabb, Vec3};
use crate::protocol::Floor;
use crate::PLAYER_RADIUS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub position: Vec3,
    pub yaw: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevatorLayout {
    pub bottom_pose: Vec3,
    pub top_pose: Vec3,
    /// Cabin trigger volume half extents; the volume sits on the cabin floor.
    pub cabin_half_extents: Vec3,
    /// Door position relative to the floor pose it guards.
    pub door_offset: Vec3,
}

impl ElevatorLayout {
    pub fn floor_pose(&self, floor: Floor) -> Vec3 {
        match floor {
            Floor::Bottom => self.bottom_pose,
            Floor::Top => self.top_pose,
        }
    }

    pub fn door_position(&self, floor: Floor) -> Vec3 {
        self.floor_pose(floor).add(&self.door_offset)
    }

    /// Occupancy volume of a cabin whose floor is at `cabin_pos`.
    pub fn cabin_volume(&self, cabin_pos: Vec3) -> Aabb {
        Aabb::new(
            cabin_pos.add(&Vec3::new(0.0, self.cabin_half_extents.y, 0.0)),
            self.cabin_half_extents,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneLayout {
    pub spawn_points: Vec<SpawnPoint>,
    pub powerup_points: Vec<Vec3>,
    /// Solid static geometry projectiles collide with.
    pub walls: Vec<Aabb>,
    /// Walkable surfaces above the ground plane (y = 0).
    pub platforms: Vec<Aabb>,
    pub elevator: ElevatorLayout,
    pub rotating_doors: Vec<Vec3>,
    /// Flickering ceiling lights.
    pub lights: Vec<Vec3>,
    /// Distance from the origin to the inner face of the boundary walls.
    pub arena_half_size: f32,
}

/// Highest step a grounded player snaps up onto.
const STEP_HEIGHT: f32 = 0.5;

impl SceneLayout {
    /// Height of the walkable surface under `pos`. The cabin floor counts as a
    /// platform while the player stands inside its footprint.
    pub fn ground_height(&self, pos: &Vec3, cabin_pos: Option<Vec3>) -> f32 {
        let mut ground = 0.0f32;
        for platform in &self.platforms {
            let top = platform.top();
            if platform.contains_flat(pos) && top <= pos.y + STEP_HEIGHT {
                ground = ground.max(top);
            }
        }
        if let Some(cabin) = cabin_pos {
            let volume = self.elevator.cabin_volume(cabin);
            if volume.contains_flat(pos) && cabin.y <= pos.y + STEP_HEIGHT {
                ground = ground.max(cabin.y);
            }
        }
        ground
    }

    /// Keeps a player's footprint inside the boundary walls.
    pub fn clamp_to_arena(&self, pos: Vec3) -> Vec3 {
        let limit = (self.arena_half_size - PLAYER_RADIUS).max(0.0);
        Vec3::new(pos.x.clamp(-limit, limit), pos.y, pos.z.clamp(-limit, limit))
    }

    pub fn spawn_point(&self, index: usize) -> SpawnPoint {
        if self.spawn_points.is_empty() {
            return SpawnPoint {
                position: Vec3::ZERO,
                yaw: 0.0,
            };
        }
        self.spawn_points[index % self.spawn_points.len()].clone()
    }
}

impl Default for SceneLayout {
    fn default() -> Self {
        let wall_height = 1.5;
        let mezzanine = Aabb::new(Vec3::new(10.0, 2.0, 5.5), Vec3::new(4.0, 2.0, 3.0));

        Self {
            spawn_points: vec![
                SpawnPoint {
                    position: Vec3::new(-8.0, 0.0, -8.0),
                    yaw: 45.0,
                },
                SpawnPoint {
                    position: Vec3::new(8.0, 0.0, -8.0),
                    yaw: -45.0,
                },
                SpawnPoint {
                    position: Vec3::new(-8.0, 0.0, 8.0),
                    yaw: 135.0,
                },
                SpawnPoint {
                    position: Vec3::new(0.0, 0.0, 0.0),
                    yaw: 180.0,
                },
            ],
            powerup_points: vec![
                Vec3::new(0.0, 0.5, -12.0),
                Vec3::new(-12.0, 0.5, 0.0),
                Vec3::new(10.0, 4.5, 4.0),
            ],
            walls: vec![
                Aabb::new(Vec3::new(0.0, wall_height, 20.0), Vec3::new(20.0, wall_height, 0.5)),
                Aabb::new(Vec3::new(0.0, wall_height, -20.0), Vec3::new(20.0, wall_height, 0.5)),
                Aabb::new(Vec3::new(20.0, wall_height, 0.0), Vec3::new(0.5, wall_height, 20.0)),
                Aabb::new(Vec3::new(-20.0, wall_height, 0.0), Vec3::new(0.5, wall_height, 20.0)),
                mezzanine,
            ],
            platforms: vec![mezzanine],
            elevator: ElevatorLayout {
                bottom_pose: Vec3::new(10.0, 0.0, 10.0),
                top_pose: Vec3::new(10.0, 4.0, 10.0),
                cabin_half_extents: Vec3::new(1.0, 1.25, 1.0),
                door_offset: Vec3::new(0.0, 0.0, -1.2),
            },
            rotating_doors: vec![Vec3::new(-5.0, 0.0, 12.0)],
            lights: vec![Vec3::new(0.0, 3.0, 0.0)],
            arena_half_size: 19.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_height_defaults_to_zero() {
        let scene = SceneLayout::default();
        assert_eq!(scene.ground_height(&Vec3::new(-10.0, 0.0, -10.0), None), 0.0);
    }

    #[test]
    fn test_ground_height_on_mezzanine() {
        let scene = SceneLayout::default();
        let on_top = Vec3::new(10.0, 4.0, 5.0);
        assert_eq!(scene.ground_height(&on_top, None), 4.0);
        // Standing next to the block at ground level does not teleport upward.
        let below = Vec3::new(10.0, 0.0, 5.0);
        assert_eq!(scene.ground_height(&below, None), 0.0);
    }

    #[test]
    fn test_ground_height_inside_cabin() {
        let scene = SceneLayout::default();
        let cabin = Vec3::new(10.0, 2.0, 10.0);
        let inside = Vec3::new(10.0, 2.0, 10.0);
        assert_eq!(scene.ground_height(&inside, Some(cabin)), 2.0);
    }

    #[test]
    fn test_clamp_to_arena() {
        let scene = SceneLayout::default();
        let clamped = scene.clamp_to_arena(Vec3::new(50.0, 1.0, -50.0));
        assert_eq!(clamped, Vec3::new(19.0, 1.0, -19.0));
    }

    #[test]
    fn test_spawn_point_round_robin() {
        let scene = SceneLayout::default();
        assert_eq!(scene.spawn_point(5), scene.spawn_points[1]);
    }
}
