//! Tunables for the authority simulation

use shared::{
    GameMode, BACKSTAB_ANGLE, BUFFED_DAMAGE_MULTIPLIER, BUFFED_SPEED, BUFF_DURATION,
    BULLET_DAMAGE, CABIN_SPEED, DOOR_DWELL, DOOR_SLIDE_DISTANCE, DOOR_SLIDE_SPEED,
    FLICKER_COUNT, FLICKER_INTERVAL, FLICKER_PHASE, GRAVITY,
    MELEE_ANGLE, MELEE_COOLDOWN, MELEE_MAX_DAMAGE, MELEE_MIN_DAMAGE, MELEE_RANGE, NORMAL_SPEED,
    POWERUP_INTERVAL, PROJECTILE_LIFETIME, PROJECTILE_SPEED, ROTATION_SPEED, SHOOT_COOLDOWN,
};
use std::collections::HashMap;
use std::time::Duration;

/// Quorum and scene set for one game mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeRule {
    pub required_players: u32,
    /// Scene indices loaded once the quorum is reached. The first replaces the
    /// lobby, the rest are added on top.
    pub scenes: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_duration: Duration,
    pub max_clients: usize,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,

    pub normal_speed: f32,
    pub buffed_speed: f32,
    pub rotation_speed: f32,
    pub gravity: f32,

    pub bullet_damage: i32,
    pub buffed_damage_multiplier: f32,
    pub buff_duration: f64,
    pub shoot_cooldown: f64,
    pub projectile_speed: f32,
    pub projectile_lifetime: f64,

    pub melee_cooldown: f64,
    pub melee_range: f32,
    pub melee_angle: f32,
    pub backstab_angle: f32,
    pub melee_damage: (i32, i32),

    pub powerup_interval: f64,

    pub door_slide_distance: f32,
    pub door_slide_speed: f32,
    pub door_dwell: f64,
    pub cabin_speed: f32,

    pub flicker_interval: (f64, f64),
    pub flicker_count: (u32, u32),
    pub flicker_phase: (f64, f64),

    pub modes: HashMap<GameMode, ModeRule>,
}

impl ServerConfig {
    /// Rule for `mode`; a mode missing from the table needs one player and
    /// loads nothing.
    pub fn mode_rule(&self, mode: GameMode) -> ModeRule {
        self.modes.get(&mode).cloned().unwrap_or(ModeRule {
            required_players: 1,
            scenes: Vec::new(),
        })
    }

    pub fn tick_secs(&self) -> f32 {
        self.tick_duration.as_secs_f32()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut modes = HashMap::new();
        modes.insert(
            GameMode::FreeForAll,
            ModeRule {
                required_players: 2,
                scenes: vec![1, 2],
            },
        );
        modes.insert(
            GameMode::Teams,
            ModeRule {
                required_players: 2,
                scenes: vec![1, 3],
            },
        );
        modes.insert(
            GameMode::CaptureTheFlag,
            ModeRule {
                required_players: 4,
                scenes: vec![1, 3, 4],
            },
        );

        Self {
            tick_duration: Duration::from_millis(16),
            max_clients: 16,
            seed: None,
            normal_speed: NORMAL_SPEED,
            buffed_speed: BUFFED_SPEED,
            rotation_speed: ROTATION_SPEED,
            gravity: GRAVITY,
            bullet_damage: BULLET_DAMAGE,
            buffed_damage_multiplier: BUFFED_DAMAGE_MULTIPLIER,
            buff_duration: BUFF_DURATION,
            shoot_cooldown: SHOOT_COOLDOWN,
            projectile_speed: PROJECTILE_SPEED,
            projectile_lifetime: PROJECTILE_LIFETIME,
            melee_cooldown: MELEE_COOLDOWN,
            melee_range: MELEE_RANGE,
            melee_angle: MELEE_ANGLE,
            backstab_angle: BACKSTAB_ANGLE,
            melee_damage: (MELEE_MIN_DAMAGE, MELEE_MAX_DAMAGE),
            powerup_interval: POWERUP_INTERVAL,
            door_slide_distance: DOOR_SLIDE_DISTANCE,
            door_slide_speed: DOOR_SLIDE_SPEED,
            door_dwell: DOOR_DWELL,
            cabin_speed: CABIN_SPEED,
            flicker_interval: FLICKER_INTERVAL,
            flicker_count: FLICKER_COUNT,
            flicker_phase: FLICKER_PHASE,
            modes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_rules() {
        let config = ServerConfig::default();
        assert_eq!(config.mode_rule(GameMode::Teams).required_players, 2);
        assert_eq!(config.mode_rule(GameMode::CaptureTheFlag).scenes, vec![1, 3, 4]);
    }

    #[test]
    fn test_missing_mode_falls_back() {
        let mut config = ServerConfig::default();
        config.modes.clear();
        let rule = config.mode_rule(GameMode::FreeForAll);
        assert_eq!(rule.required_players, 1);
        assert!(rule.scenes.is_empty());
    }
}
