//! Hinged door that swings between two poses on request

use crate::world::{Entity, World};
use shared::{Aabb, EntityId, RotatingDoorFields, Role, SyncError, SyncResult, Vec3};

#[derive(Debug)]
pub struct RotatingDoor {
    pub fields: RotatingDoorFields,
}

impl RotatingDoor {
    pub fn new(position: Vec3) -> Self {
        Self {
            fields: RotatingDoorFields::new(Role::Authority, position),
        }
    }

    pub fn position(&self) -> Vec3 {
        *self.fields.position.get()
    }

    pub fn is_open(&self) -> bool {
        *self.fields.is_open.get()
    }

    pub fn toggle(&mut self) -> SyncResult<bool> {
        let open = !self.is_open();
        self.fields.is_open.set(open)?;
        Ok(open)
    }

    /// Closed it spans the x axis; open it is swung a quarter turn.
    pub fn volume(&self) -> Aabb {
        let center = self.position().add(&Vec3::new(0.0, 1.25, 0.0));
        if self.is_open() {
            Aabb::new(center, Vec3::new(0.1, 1.25, 1.0))
        } else {
            Aabb::new(center, Vec3::new(1.0, 1.25, 0.1))
        }
    }
}

impl World {
    pub fn toggle_rotating_door(&mut self, door: EntityId) -> SyncResult<bool> {
        match self.entities.get_mut(&door) {
            Some(Entity::RotatingDoor(d)) => d.toggle(),
            Some(_) => Err(SyncError::WrongEntityKind {
                entity: door,
                expected: "rotating door",
            }),
            None => Err(SyncError::StaleReference(door)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_swings_volume() {
        let mut door = RotatingDoor::new(Vec3::new(-5.0, 0.0, 12.0));
        assert!(door.volume().contains(&Vec3::new(-4.5, 1.0, 12.0)));

        assert!(door.toggle().unwrap());
        assert!(door.is_open());
        assert!(!door.volume().contains(&Vec3::new(-4.5, 1.0, 12.0)));
        assert!(door.volume().contains(&Vec3::new(-5.0, 1.0, 12.8)));

        assert!(!door.toggle().unwrap());
    }
}
