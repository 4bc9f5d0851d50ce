//! Input sampling and its translation into authority requests
//!
//! Input arrives as an [`InputFrame`] per frame, either from whatever front
//! end embeds the client or from [`BotInput`]. Button actions fire on the
//! press edge only. Cooldowns here are local predictions: the shoot cooldown
//! only drives UI, the melee cooldown also keeps us from spamming requests
//! the authority would reject anyway.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Request, MELEE_COOLDOWN, SHOOT_COOLDOWN};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputFrame {
    pub axis_h: f32,
    pub axis_v: f32,
    pub shoot: bool,
    pub melee: bool,
    pub flashlight: bool,
    pub interact: bool,
}

/// What one frame of input asks for.
#[derive(Debug, Default, PartialEq)]
pub struct InputActions {
    /// Requests against the local player, in send order.
    pub requests: Vec<Request>,
    /// Interact was pressed; resolved against nearby interactables.
    pub interact: bool,
}

pub struct InputManager {
    prev: InputFrame,
    last_shot: Option<f64>,
    last_melee: Option<f64>,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            prev: InputFrame::default(),
            last_shot: None,
            last_melee: None,
        }
    }

    pub fn update(&mut self, frame: InputFrame, now: f64) -> InputActions {
        let mut actions = InputActions::default();

        let moving = frame.axis_h != 0.0 || frame.axis_v != 0.0;
        if moving || frame.shoot {
            if frame.shoot && self.shoot_ready(now) {
                self.last_shot = Some(now);
            }
            actions.requests.push(Request::MovePlayer {
                axis_h: frame.axis_h.clamp(-1.0, 1.0),
                axis_v: frame.axis_v.clamp(-1.0, 1.0),
                shoot: frame.shoot,
            });
        }

        if frame.melee && !self.prev.melee && self.melee_ready(now) {
            self.last_melee = Some(now);
            actions.requests.push(Request::MeleeAttack);
        }

        if frame.flashlight && !self.prev.flashlight {
            actions.requests.push(Request::ToggleFlashlight);
        }

        actions.interact = frame.interact && !self.prev.interact;

        self.prev = frame;
        actions
    }

    fn shoot_ready(&self, now: f64) -> bool {
        self.last_shot.map_or(true, |t| now - t >= SHOOT_COOLDOWN)
    }

    fn melee_ready(&self, now: f64) -> bool {
        self.last_melee.map_or(true, |t| now - t >= MELEE_COOLDOWN)
    }

    /// Fraction of the shoot cooldown still running, for a crosshair.
    pub fn shoot_cooldown(&self, now: f64) -> f32 {
        match self.last_shot {
            Some(t) => (1.0 - (now - t) / SHOOT_COOLDOWN).clamp(0.0, 1.0) as f32,
            None => 0.0,
        }
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Wanders, turns and shoots at random.
pub struct BotInput {
    rng: StdRng,
    axis_h: f32,
    axis_v: f32,
    next_turn: f64,
}

impl BotInput {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            axis_h: 0.0,
            axis_v: 0.0,
            next_turn: 0.0,
        }
    }

    pub fn next_frame(&mut self, now: f64) -> InputFrame {
        if now >= self.next_turn {
            self.axis_h = self.rng.gen_range(-1.0..=1.0);
            self.axis_v = self.rng.gen_range(0.0..=1.0);
            self.next_turn = now + self.rng.gen_range(1.0..3.0);
        }

        InputFrame {
            axis_h: self.axis_h,
            axis_v: self.axis_v,
            shoot: self.rng.gen_bool(0.05),
            melee: self.rng.gen_bool(0.01),
            flashlight: self.rng.gen_bool(0.002),
            interact: self.rng.gen_bool(0.01),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_idle_frame_sends_nothing() {
        let mut input = InputManager::new();
        assert_eq!(input.update(InputFrame::default(), 0.0), InputActions::default());
    }

    #[test]
    fn test_move_is_clamped() {
        let mut input = InputManager::new();
        let actions = input.update(
            InputFrame {
                axis_h: 3.0,
                axis_v: -0.5,
                ..Default::default()
            },
            0.0,
        );
        assert_eq!(
            actions.requests,
            vec![Request::MovePlayer {
                axis_h: 1.0,
                axis_v: -0.5,
                shoot: false
            }]
        );
    }

    #[test]
    fn test_buttons_fire_on_press_edge() {
        let mut input = InputManager::new();
        let held = InputFrame {
            flashlight: true,
            interact: true,
            ..Default::default()
        };

        let first = input.update(held, 0.0);
        assert_eq!(first.requests, vec![Request::ToggleFlashlight]);
        assert!(first.interact);

        let second = input.update(held, 0.1);
        assert!(second.requests.is_empty());
        assert!(!second.interact);
    }

    #[test]
    fn test_melee_cooldown_gates_requests() {
        let mut input = InputManager::new();
        let press = InputFrame {
            melee: true,
            ..Default::default()
        };
        let release = InputFrame::default();

        assert_eq!(input.update(press, 0.0).requests, vec![Request::MeleeAttack]);
        input.update(release, 0.5);
        assert!(input.update(press, 1.0).requests.is_empty());
        input.update(release, 1.2);
        assert_eq!(input.update(press, 1.6).requests, vec![Request::MeleeAttack]);
    }

    #[test]
    fn test_shoot_cooldown_fraction() {
        let mut input = InputManager::new();
        assert_eq!(input.shoot_cooldown(0.0), 0.0);
        input.update(
            InputFrame {
                shoot: true,
                ..Default::default()
            },
            1.0,
        );
        assert_approx_eq!(input.shoot_cooldown(1.25), 0.5, 1e-6);
        assert_eq!(input.shoot_cooldown(2.0), 0.0);
    }

    #[test]
    fn test_seeded_bot_is_deterministic() {
        let mut a = BotInput::new(Some(7));
        let mut b = BotInput::new(Some(7));
        for i in 0..20 {
            let now = i as f64 * 0.25;
            assert_eq!(a.next_frame(now), b.next_frame(now));
        }
    }
}
