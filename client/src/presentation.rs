//! Presentation sink
//!
//! Rendering, audio and UI are not part of this crate. They plug in through
//! [`Presentation`], which receives every mirror change and broadcast in the
//! order the observer applied them. [`LogPresentation`] is the headless
//! implementation used by the binary.

use log::{debug, info};
use shared::{
    Broadcast, ClientId, EntityId, EntityKind, FieldId, FieldUpdate, FieldValue, HitKind,
};

pub trait Presentation {
    fn on_connected(&mut self, _client_id: ClientId) {}

    fn on_disconnected(&mut self, _reason: &str) {}

    fn on_spawn(&mut self, _entity: EntityId, _kind: EntityKind, _owner: Option<ClientId>) {}

    fn on_despawn(&mut self, _entity: EntityId) {}

    /// A delivered field value was installed in the mirror.
    fn on_field_changed(&mut self, _update: &FieldUpdate) {}

    fn on_broadcast(&mut self, _entity: EntityId, _event: &Broadcast) {}
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullPresentation;

impl Presentation for NullPresentation {}

/// Writes the interesting events to the log.
#[derive(Debug)]
pub struct LogPresentation {
    /// Intensity a flashlight or scene light returns to when switched back on.
    light_intensity: f32,
}

impl LogPresentation {
    pub fn new(light_intensity: f32) -> Self {
        Self {
            light_intensity,
        }
    }

    /// Lights are either fully off or at their default intensity.
    pub fn light_intensity(&self, on: bool) -> f32 {
        if on {
            self.light_intensity
        } else {
            0.0
        }
    }
}

impl Default for LogPresentation {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Presentation for LogPresentation {
    fn on_connected(&mut self, client_id: ClientId) {
        info!("Joined as client {}", client_id);
    }

    fn on_disconnected(&mut self, reason: &str) {
        info!("Disconnected: {}", reason);
    }

    fn on_spawn(&mut self, entity: EntityId, kind: EntityKind, owner: Option<ClientId>) {
        debug!("Spawned {} {} (owner {:?})", kind.name(), entity, owner);
    }

    fn on_despawn(&mut self, entity: EntityId) {
        debug!("Despawned {}", entity);
    }

    fn on_field_changed(&mut self, update: &FieldUpdate) {
        match (update.field, update.value) {
            (FieldId::IsDead, FieldValue::Bool(true)) => info!("{} died", update.entity),
            (FieldId::FlashlightOn, FieldValue::Bool(on)) => debug!(
                "{} flashlight at {:.1}",
                update.entity,
                self.light_intensity(on)
            ),
            (FieldId::Health, FieldValue::Int(health)) => {
                debug!("{} health {}", update.entity, health)
            }
            _ => {}
        }
    }

    fn on_broadcast(&mut self, entity: EntityId, event: &Broadcast) {
        match event {
            Broadcast::AddKillMessage { message } => info!("{}", message),
            Broadcast::ShowDamageText { amount, .. } => debug!("{} took {} damage", entity, amount),
            Broadcast::ShowHitEffect {
                kind: HitKind::Blood,
                ..
            } => debug!("Blood on {}", entity),
            Broadcast::LoadScene { scene, additive } => {
                info!("Loading scene {} (additive: {})", scene, additive)
            }
            Broadcast::UpdateLobbyStatus { mode, waiting, .. } => {
                info!("Lobby: {:?}, {} waiting", mode, waiting)
            }
            Broadcast::PowerUpCollected { kind } => info!("Picked up {:?}", kind),
            Broadcast::LightFlicker { on } => {
                debug!("Light {} at {:.1}", entity, self.light_intensity(*on))
            }
            Broadcast::SetIndicatorLights { at_bottom } => {
                debug!("Elevator lights: {}", if *at_bottom { "bottom" } else { "top" })
            }
            other => debug!("{} event {:?}", entity, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lights_restore_default_intensity() {
        let presentation = LogPresentation::new(2.5);
        assert_eq!(presentation.light_intensity(false), 0.0);
        assert_eq!(presentation.light_intensity(true), 2.5);
    }
}
