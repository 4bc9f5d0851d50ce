//! Replicated field sets, one per entity kind
//!
//! The authority and every observer build the same struct for an entity.
//! On the authority the fields are written and drained into `FieldUpdate`s;
//! on observers the updates are applied back by `FieldId`.

use crate::authority::{EntityId, Role};
use crate::field::ReplicatedField;
use crate::math::{Color, Vec3};
use crate::protocol::{FieldId, FieldUpdate, FieldValue, GameMode};
use crate::MAX_HEALTH;

/// Conversion between a field's Rust type and its wire representation.
pub trait WireValue: Sized {
    fn to_wire(&self) -> FieldValue;
    fn from_wire(value: &FieldValue) -> Option<Self>;
}

impl WireValue for i32 {
    fn to_wire(&self) -> FieldValue {
        FieldValue::Int(*self)
    }
    fn from_wire(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl WireValue for bool {
    fn to_wire(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }
    fn from_wire(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl WireValue for f32 {
    fn to_wire(&self) -> FieldValue {
        FieldValue::Float(*self)
    }
    fn from_wire(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl WireValue for f64 {
    fn to_wire(&self) -> FieldValue {
        FieldValue::Time(*self)
    }
    fn from_wire(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Time(v) => Some(*v),
            _ => None,
        }
    }
}

impl WireValue for Color {
    fn to_wire(&self) -> FieldValue {
        FieldValue::Color(*self)
    }
    fn from_wire(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Color(v) => Some(*v),
            _ => None,
        }
    }
}

impl WireValue for Vec3 {
    fn to_wire(&self) -> FieldValue {
        FieldValue::Vec3(*self)
    }
    fn from_wire(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Vec3(v) => Some(*v),
            _ => None,
        }
    }
}

impl WireValue for Option<GameMode> {
    fn to_wire(&self) -> FieldValue {
        FieldValue::Mode(*self)
    }
    fn from_wire(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Mode(v) => Some(*v),
            _ => None,
        }
    }
}

/// Operations every per-entity field set supports.
pub trait FieldSet {
    /// Moves every pending change into `out`, oldest first per field.
    fn drain_updates(&mut self, entity: EntityId, out: &mut Vec<FieldUpdate>);

    /// Current value of every field, for late joiners.
    fn snapshot(&self, entity: EntityId, out: &mut Vec<FieldUpdate>);

    /// Applies a delivered update. Returns false for stale revisions and for
    /// fields this set does not have.
    fn apply_update(&mut self, update: &FieldUpdate) -> bool;

    /// Unsubscribes everything; called before despawn.
    fn clear_subscribers(&mut self);
}

macro_rules! field_set {
    ($(#[$meta:meta])* $name:ident { $($field:ident : $ty:ty => $id:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            $(pub $field: ReplicatedField<$ty>,)+
        }

        impl FieldSet for $name {
            fn drain_updates(&mut self, entity: EntityId, out: &mut Vec<FieldUpdate>) {
                $(
                    for (revision, value) in self.$field.drain_pending() {
                        out.push(FieldUpdate {
                            entity,
                            field: FieldId::$id,
                            revision,
                            value: value.to_wire(),
                        });
                    }
                )+
            }

            fn snapshot(&self, entity: EntityId, out: &mut Vec<FieldUpdate>) {
                $(
                    let (revision, value) = self.$field.snapshot();
                    out.push(FieldUpdate {
                        entity,
                        field: FieldId::$id,
                        revision,
                        value: value.to_wire(),
                    });
                )+
            }

            #[allow(unreachable_patterns)]
            fn apply_update(&mut self, update: &FieldUpdate) -> bool {
                match update.field {
                    $(
                        FieldId::$id => match <$ty as WireValue>::from_wire(&update.value) {
                            Some(value) => self.$field.apply_remote(update.revision, value),
                            None => false,
                        },
                    )+
                    _ => false,
                }
            }

            fn clear_subscribers(&mut self) {
                $(self.$field.clear_subscribers();)+
            }
        }
    };
}

field_set! {
    /// Everything the presentation layer needs to draw a player.
    PlayerFields {
        health: i32 => Health,
        is_dead: bool => IsDead,
        color: Color => PlayerColor,
        flashlight_on: bool => FlashlightOn,
        has_speed_buff: bool => HasSpeedBuff,
        has_damage_buff: bool => HasDamageBuff,
        buff_end_time: f64 => BuffEndTime,
        position: Vec3 => Position,
        yaw: f32 => Yaw,
    }
}

impl PlayerFields {
    pub fn new(role: Role) -> Self {
        Self::spawned(role, Color::WHITE, Vec3::ZERO, 0.0)
    }

    pub fn spawned(role: Role, color: Color, position: Vec3, yaw: f32) -> Self {
        Self {
            health: ReplicatedField::new("current_health", role, MAX_HEALTH),
            is_dead: ReplicatedField::new("is_dead", role, false),
            color: ReplicatedField::new("player_color", role, color),
            flashlight_on: ReplicatedField::new("flashlight_on", role, true),
            has_speed_buff: ReplicatedField::new("has_speed_buff", role, false),
            has_damage_buff: ReplicatedField::new("has_damage_buff", role, false),
            buff_end_time: ReplicatedField::new("buff_end_time", role, 0.0),
            position: ReplicatedField::new("position", role, position),
            yaw: ReplicatedField::new("yaw", role, yaw),
        }
    }
}

field_set! {
    ProjectileFields {
        bullet_color: Color => BulletColor,
        position: Vec3 => Position,
    }
}

impl ProjectileFields {
    pub fn new(role: Role, color: Color, position: Vec3) -> Self {
        Self {
            bullet_color: ReplicatedField::new("bullet_color", role, color),
            position: ReplicatedField::new("position", role, position),
        }
    }
}

field_set! {
    PowerUpFields {
        position: Vec3 => Position,
    }
}

impl PowerUpFields {
    pub fn new(role: Role, position: Vec3) -> Self {
        Self {
            position: ReplicatedField::new("position", role, position),
        }
    }
}

field_set! {
    /// Sliding elevator door: `slide` is the distance from the closed pose.
    DoorFields {
        slide: f32 => DoorSlide,
        is_open: bool => DoorOpen,
    }
}

impl DoorFields {
    pub fn new(role: Role) -> Self {
        Self {
            slide: ReplicatedField::new("door_slide", role, 0.0),
            is_open: ReplicatedField::new("door_open", role, false),
        }
    }
}

field_set! {
    CabinFields {
        position: Vec3 => Position,
    }
}

impl CabinFields {
    pub fn new(role: Role, position: Vec3) -> Self {
        Self {
            position: ReplicatedField::new("cabin_position", role, position),
        }
    }
}

field_set! {
    /// Hinged door. The hinge position never changes after spawn.
    RotatingDoorFields {
        is_open: bool => DoorOpen,
        position: Vec3 => Position,
    }
}

impl RotatingDoorFields {
    pub fn new(role: Role, position: Vec3) -> Self {
        Self {
            is_open: ReplicatedField::new("rotating_door_open", role, false),
            position: ReplicatedField::new("position", role, position),
        }
    }
}

field_set! {
    /// Scene light. Its flicker state travels as broadcasts only.
    LightFields {
        position: Vec3 => Position,
    }
}

impl LightFields {
    pub fn new(role: Role, position: Vec3) -> Self {
        Self {
            position: ReplicatedField::new("light_position", role, position),
        }
    }
}

field_set! {
    LobbyFields {
        current_mode: Option<GameMode> => CurrentMode,
        player_pick_count: i32 => PlayerPickCount,
        required_count: i32 => RequiredCount,
    }
}

impl LobbyFields {
    pub fn new(role: Role) -> Self {
        Self {
            current_mode: ReplicatedField::new("current_mode", role, None),
            player_pick_count: ReplicatedField::new("player_pick_count", role, 0),
            required_count: ReplicatedField::new("required_count", role, 0),
        }
    }
}
