//! Scene light that flickers in short bursts
//!
//! The authority alone decides the timing. Between bursts the light is lit;
//! a burst is a run of off/on phase pairs, each phase announced to every
//! observer as a `LightFlicker` broadcast.

use crate::config::ServerConfig;
use crate::world::{Entity, World};
use rand::Rng;
use shared::{Broadcast, EntityId, LightFields, Role, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlickerParams {
    pub interval: (f64, f64),
    pub count: (u32, u32),
    pub phase: (f64, f64),
}

impl FlickerParams {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            interval: config.flicker_interval,
            count: config.flicker_count,
            phase: config.flicker_phase,
        }
    }
}

fn pick(rng: &mut impl Rng, (min, max): (f64, f64)) -> f64 {
    rng.gen_range(min..=max)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FlickerTask {
    Waiting { until: f64 },
    /// `pairs` counts the off/on pairs still to run, this one included.
    Off { until: f64, pairs: u32 },
    On { until: f64, pairs: u32 },
}

#[derive(Debug)]
pub struct Light {
    pub fields: LightFields,
    on: bool,
    task: FlickerTask,
}

impl Light {
    pub fn new(position: Vec3, now: f64, rng: &mut impl Rng, params: &FlickerParams) -> Self {
        Self {
            fields: LightFields::new(Role::Authority, position),
            on: true,
            task: FlickerTask::Waiting {
                until: now + pick(rng, params.interval),
            },
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn in_burst(&self) -> bool {
        !matches!(self.task, FlickerTask::Waiting { .. })
    }

    /// Runs the flicker loop up to `now`. Returns the new state when a phase
    /// boundary was crossed.
    pub fn advance(&mut self, now: f64, rng: &mut impl Rng, params: &FlickerParams) -> Option<bool> {
        match self.task {
            FlickerTask::Waiting { until } if now >= until => {
                let pairs = rng.gen_range(params.count.0..=params.count.1);
                if pairs == 0 {
                    self.task = FlickerTask::Waiting {
                        until: now + pick(rng, params.interval),
                    };
                    return None;
                }
                self.task = FlickerTask::Off {
                    until: now + pick(rng, params.phase),
                    pairs,
                };
                self.on = false;
            }
            FlickerTask::Off { until, pairs } if now >= until => {
                self.task = FlickerTask::On {
                    until: now + pick(rng, params.phase),
                    pairs,
                };
                self.on = true;
            }
            FlickerTask::On { until, pairs } if now >= until => {
                if pairs > 1 {
                    self.task = FlickerTask::Off {
                        until: now + pick(rng, params.phase),
                        pairs: pairs - 1,
                    };
                    self.on = false;
                } else {
                    self.task = FlickerTask::Waiting {
                        until: now + pick(rng, params.interval),
                    };
                    return None;
                }
            }
            _ => return None,
        }
        Some(self.on)
    }
}

impl World {
    pub fn update_lights(&mut self) {
        let now = self.session.now();
        let params = FlickerParams::from_config(&self.config);
        for (id, entity) in self.entities.iter_mut() {
            let Entity::Light(light) = entity else {
                continue;
            };
            if let Some(on) = light.advance(now, &mut self.rng, &params) {
                self.session.broadcast(*id, Broadcast::LightFlicker { on });
            }
        }
    }

    pub fn light(&self, id: EntityId) -> Option<&Light> {
        match self.entities.get(&id) {
            Some(Entity::Light(light)) => Some(light),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DT: f64 = 0.01;

    fn params() -> FlickerParams {
        FlickerParams::from_config(&ServerConfig::default())
    }

    /// Steps the light until its first burst is over and returns every phase
    /// change with the time it happened.
    fn first_burst(seed: u64) -> (Light, Vec<(f64, bool)>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let params = params();
        let mut light = Light::new(Vec3::ZERO, 0.0, &mut rng, &params);
        let mut changes = Vec::new();
        let mut now = 0.0;
        while now < 30.0 {
            now += DT;
            let before = light.in_burst();
            if let Some(on) = light.advance(now, &mut rng, &params) {
                changes.push((now, on));
            }
            if before && !light.in_burst() {
                break;
            }
        }
        (light, changes)
    }

    #[test]
    fn test_burst_timing_stays_in_range() {
        for seed in [1, 7, 42, 1234] {
            let (light, changes) = first_burst(seed);

            let (start, _) = changes[0];
            assert!(start >= 5.0 && start <= 15.0 + DT, "burst started at {}", start);

            assert_eq!(changes.len() % 2, 0);
            let pairs = changes.len() / 2;
            assert!((3..=6).contains(&pairs), "{} pairs", pairs);

            for (i, (_, on)) in changes.iter().enumerate() {
                assert_eq!(*on, i % 2 == 1);
            }
            for window in changes.windows(2) {
                let gap = window[1].0 - window[0].0;
                assert!(gap >= 0.05 - 1e-9 && gap <= 0.2 + DT + 1e-9, "phase of {}", gap);
            }

            assert_eq!(changes.last().map(|(_, on)| *on), Some(true));
            assert!(light.is_on());
            assert!(!light.in_burst());
        }
    }

    #[test]
    fn test_lit_between_bursts() {
        let mut rng = StdRng::seed_from_u64(3);
        let params = params();
        let mut light = Light::new(Vec3::ZERO, 0.0, &mut rng, &params);
        assert!(light.is_on());
        assert_eq!(light.advance(4.9, &mut rng, &params), None);
        assert!(light.is_on());
    }

    #[test]
    fn test_world_broadcasts_flicker() {
        let config = ServerConfig {
            seed: Some(11),
            ..ServerConfig::default()
        };
        let mut world = World::new(config, shared::SceneLayout::default());
        world.session_mut().connect(1);

        let mut flickers = Vec::new();
        for _ in 0..(18.0 / DT) as usize {
            world.tick(DT as f32);
            for outgoing in world.session_mut().drain_outbox() {
                if let (_, shared::Packet::Broadcast {
                    event: Broadcast::LightFlicker { on },
                    ..
                }) = outgoing.into_packet()
                {
                    flickers.push(on);
                }
            }
        }

        assert!(flickers.len() >= 6);
        assert!(!flickers[0]);
    }
}
