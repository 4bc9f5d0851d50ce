//! Wire protocol shared by the authority and its observers
//!
//! Three kinds of traffic travel over the same unreliable datagram channel:
//! requests (observer to authority), broadcasts (authority to all or one
//! observer) and field updates (authority to observers). They carry no
//! acknowledgement and no cross-channel ordering.

use crate::authority::{ClientId, EntityId};
use crate::math::{Color, Vec3};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Floor {
    Bottom,
    Top,
}

impl Floor {
    pub fn opposite(self) -> Floor {
        match self {
            Floor::Bottom => Floor::Top,
            Floor::Top => Floor::Bottom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerUpKind {
    Hp,
    PowerBullet,
    SpeedCola,
}

impl PowerUpKind {
    pub const ALL: [PowerUpKind; 3] = [
        PowerUpKind::Hp,
        PowerUpKind::PowerBullet,
        PowerUpKind::SpeedCola,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    FreeForAll,
    Teams,
    CaptureTheFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitKind {
    Wall,
    Blood,
}

/// What an entity is, announced once at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Projectile,
    PowerUp(PowerUpKind),
    ElevatorDoor(Floor),
    ElevatorCabin,
    RotatingDoor,
    Light,
    Lobby,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Projectile => "projectile",
            EntityKind::PowerUp(_) => "power-up",
            EntityKind::ElevatorDoor(_) => "elevator door",
            EntityKind::ElevatorCabin => "elevator cabin",
            EntityKind::RotatingDoor => "rotating door",
            EntityKind::Light => "light",
            EntityKind::Lobby => "lobby",
        }
    }
}

/// Names every replicated field in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldId {
    Health,
    IsDead,
    PlayerColor,
    FlashlightOn,
    HasSpeedBuff,
    HasDamageBuff,
    BuffEndTime,
    Position,
    Yaw,
    BulletColor,
    DoorSlide,
    DoorOpen,
    CurrentMode,
    PlayerPickCount,
    RequiredCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i32),
    Bool(bool),
    Float(f32),
    /// Absolute authority-clock seconds.
    Time(f64),
    Color(Color),
    Vec3(Vec3),
    Mode(Option<GameMode>),
}

/// One accepted change of one field, in authority order per field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub entity: EntityId,
    pub field: FieldId,
    pub revision: u32,
    pub value: FieldValue,
}

/// Observer to authority messages. The target entity travels alongside in
/// [`Packet::Request`]; the sender identity is attached by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    MovePlayer {
        axis_h: f32,
        axis_v: f32,
        shoot: bool,
    },
    MeleeAttack,
    ToggleFlashlight,
    /// `Color::RANDOM_SENTINEL` asks the authority to pick a colour.
    RequestColorChange {
        color: Color,
    },
    SendPowerUp {
        kind: PowerUpKind,
    },
    EndBuff,
    /// Legacy: teleport to a random point on the plane.
    SubmitPosition,
    TryOpenDoor {
        door: EntityId,
    },
    RequestOtherFloor {
        cabin: EntityId,
    },
    ToggleRotatingDoor {
        door: EntityId,
    },
    PickMode {
        mode: GameMode,
    },
    RequestSpawn,
}

impl Request {
    /// Owner-gated requests are dropped unless the sender owns the target.
    pub fn requires_ownership(&self) -> bool {
        !matches!(
            self,
            Request::RequestColorChange { .. } | Request::PickMode { .. } | Request::RequestSpawn
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::MovePlayer { .. } => "MovePlayer",
            Request::MeleeAttack => "MeleeAttack",
            Request::ToggleFlashlight => "ToggleFlashlight",
            Request::RequestColorChange { .. } => "RequestColorChange",
            Request::SendPowerUp { .. } => "SendPowerUp",
            Request::EndBuff => "EndBuff",
            Request::SubmitPosition => "SubmitPosition",
            Request::TryOpenDoor { .. } => "TryOpenDoor",
            Request::RequestOtherFloor { .. } => "RequestOtherFloor",
            Request::ToggleRotatingDoor { .. } => "ToggleRotatingDoor",
            Request::PickMode { .. } => "PickMode",
            Request::RequestSpawn => "RequestSpawn",
        }
    }
}

/// Authority to observer one-shot events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Broadcast {
    ColorChanged {
        color: Color,
    },
    ShowHitEffect {
        pos: Vec3,
        dir: Vec3,
        kind: HitKind,
    },
    ShowDamageText {
        pos: Vec3,
        amount: i32,
    },
    ShowWallDecal {
        pos: Vec3,
        forward: Vec3,
        normal: Vec3,
        target: Option<EntityId>,
    },
    ShowPhantom {
        pos: Vec3,
        yaw: f32,
        shooter: ClientId,
    },
    AddKillMessage {
        message: String,
    },
    SetIndicatorLights {
        at_bottom: bool,
    },
    UpdateLobbyStatus {
        server_up: bool,
        mode: Option<GameMode>,
        waiting: u32,
    },
    TriggerCameraShake {
        duration: f32,
        magnitude: f32,
    },
    TriggerHitPause,
    /// Sent only to the owner of the player that touched a power-up.
    PowerUpCollected {
        kind: PowerUpKind,
    },
    LoadScene {
        scene: u32,
        additive: bool,
    },
    /// One phase of a light's flicker burst.
    LightFlicker {
        on: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Request {
        target: EntityId,
        request: Request,
    },
    Heartbeat,
    Disconnect,

    Connected {
        client_id: ClientId,
        server_time: f64,
    },
    Disconnected {
        reason: String,
    },
    Spawn {
        entity: EntityId,
        kind: EntityKind,
        owner: Option<ClientId>,
    },
    Despawn {
        entity: EntityId,
    },
    Field(FieldUpdate),
    Broadcast {
        entity: EntityId,
        event: Broadcast,
    },
    Clock {
        server_time: f64,
    },
}
