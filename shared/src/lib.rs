//! Types shared by the authority server and its observers: math, the
//! replicated field primitive, the wire protocol, per-entity field sets, the
//! static scene layout and the gameplay constants both sides agree on.

pub mod authority;
pub mod error;
pub mod field;
pub mod math;
pub mod protocol;
pub mod scene;
pub mod schema;

pub use authority::{check_ownership, ClientId, EntityId, ReadPolicy, Role, WritePolicy};
pub use error::{SyncError, SyncResult};
pub use field::{ReplicatedField, SubscriptionId};
pub use math::{move_towards, move_towards_f32, Aabb, Color, Vec3};
pub use protocol::{
    Broadcast, EntityKind, FieldId, FieldUpdate, FieldValue, Floor, GameMode, HitKind, Packet,
    PowerUpKind, Request, PROTOCOL_VERSION,
};
pub use scene::{ElevatorLayout, SceneLayout, SpawnPoint};
pub use schema::{
    CabinFields, DoorFields, FieldSet, LightFields, LobbyFields, PlayerFields, PowerUpFields,
    ProjectileFields, RotatingDoorFields, WireValue,
};

pub const MAX_HEALTH: i32 = 100;
pub const BULLET_DAMAGE: i32 = 10;
pub const MAX_PLAYERS: u32 = 4;

pub const SHOOT_COOLDOWN: f64 = 0.5;
pub const MELEE_COOLDOWN: f64 = 1.5;
pub const MELEE_RANGE: f32 = 1.5;
/// Widest attacker-forward to victim angle of a frontal melee hit, degrees.
pub const MELEE_ANGLE: f32 = 60.0;
/// Attacker-forward to victim angle above which a melee hit is a backstab.
pub const BACKSTAB_ANGLE: f32 = 120.0;
pub const MELEE_MIN_DAMAGE: i32 = BULLET_DAMAGE * 2;
pub const MELEE_MAX_DAMAGE: i32 = 100;

pub const BUFF_DURATION: f64 = 30.0;
pub const NORMAL_SPEED: f32 = 2.0;
pub const BUFFED_SPEED: f32 = 40.0;
pub const NORMAL_DAMAGE_MULTIPLIER: f32 = 1.0;
pub const BUFFED_DAMAGE_MULTIPLIER: f32 = 1.5;
/// Degrees of yaw per unit of horizontal axis per move request.
pub const ROTATION_SPEED: f32 = 0.25;
pub const GRAVITY: f32 = -9.81;

pub const PLAYER_RADIUS: f32 = 0.5;
pub const PLAYER_HEIGHT: f32 = 1.8;
pub const PROJECTILE_SPEED: f32 = 50.0;
pub const PROJECTILE_RADIUS: f32 = 0.1;
pub const PROJECTILE_LIFETIME: f64 = 5.0;
/// Muzzle offset from the player's feet: forward, then up.
pub const MUZZLE_FORWARD: f32 = 0.8;
pub const MUZZLE_HEIGHT: f32 = 1.2;

pub const POWERUP_INTERVAL: f64 = 15.0;
pub const POWERUP_RADIUS: f32 = 1.0;

pub const DOOR_SLIDE_DISTANCE: f32 = 2.0;
pub const DOOR_SLIDE_SPEED: f32 = 2.0;
pub const DOOR_DWELL: f64 = 2.0;
pub const CABIN_SPEED: f32 = 3.0;
/// Distance under which a cabin or door counts as arrived and snaps.
/// Seconds between flicker bursts.
pub const FLICKER_INTERVAL: (f64, f64) = (5.0, 15.0);
/// Off/on pairs per burst.
pub const FLICKER_COUNT: (u32, u32) = (3, 6);
/// Seconds per off or on phase inside a burst.
pub const FLICKER_PHASE: (f64, f64) = (0.05, 0.2);

pub const ARRIVAL_EPSILON: f32 = 0.01;
pub const INTERACT_RADIUS: f32 = 2.5;

pub const KILL_FEED_CAPACITY: usize = 5;
pub const KILL_FEED_TTL: f64 = 3.0;

/// Tint applied to a player on death.
pub const DEAD_COLOR: Color = Color::rgba(0.5, 0.5, 0.5, 0.5);

/// Remaining fraction of a buff, `clamp01((expiry - now) / duration)`.
pub fn buff_remaining(buff_end_time: f64, now: f64) -> f32 {
    ((buff_end_time - now) / BUFF_DURATION).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_buff_remaining() {
        assert_approx_eq!(buff_remaining(130.0, 100.0), 1.0, 1e-6);
        assert_approx_eq!(buff_remaining(130.0, 115.0), 0.5, 1e-6);
        assert_eq!(buff_remaining(130.0, 130.0), 0.0);
        assert_eq!(buff_remaining(130.0, 500.0), 0.0);
    }

    #[test]
    fn test_packet_serialization_connect() {
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Connect { client_version } => assert_eq!(client_version, PROTOCOL_VERSION),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_request() {
        let packet = Packet::Request {
            target: EntityId(12),
            request: Request::MovePlayer {
                axis_h: -1.0,
                axis_v: 0.5,
                shoot: true,
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Request {
                target,
                request:
                    Request::MovePlayer {
                        axis_h,
                        axis_v,
                        shoot,
                    },
            } => {
                assert_eq!(target, EntityId(12));
                assert_approx_eq!(axis_h, -1.0);
                assert_approx_eq!(axis_v, 0.5);
                assert!(shoot);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }
}
