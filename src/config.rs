use std::str::FromStr;

use crate::swarm::constants::population::{DEFAULT_CORPSE_CAPACITY, INITIAL_AGENT_CAPACITY, MAX_MERGED_POPULATIONS};
use crate::swarm::flocking::FlockingParams;
use crate::swarm::simulator::SimulatorSettings;
use crate::util::vec2::Vec2;

/// Swarm engine and demo runner configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SwarmConfig {
    /// Half-extent of the square world
    pub world_bound: f32,
    /// Colonies spawned by the demo runner
    pub colonies: usize,
    /// Starting alive count per colony
    pub agents_per_colony: u32,
    /// Steps per second
    pub tick_rate: u32,
    /// Steps before the demo exits (0 = run until Ctrl+C)
    pub ticks: u64,
    /// Agent slots allocated per simulator up front
    pub initial_capacity: usize,
    /// Corpses retained by combat simulators
    pub corpse_capacity: usize,
    /// Base spawn seed; each simulator offsets it
    pub seed: u64,
    pub colony_params: FlockingParams,
    pub combat_params: FlockingParams,
    /// Obstacle circles scattered by the demo runner
    pub pois: usize,
    pub poi_radius: f32,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            world_bound: 128.0,
            colonies: 4,
            agents_per_colony: 500,
            tick_rate: 30,
            ticks: 0,
            initial_capacity: INITIAL_AGENT_CAPACITY,
            corpse_capacity: DEFAULT_CORPSE_CAPACITY,
            seed: 0x5eed,
            colony_params: FlockingParams::colony(),
            combat_params: FlockingParams::combat(),
            pois: 8,
            poi_radius: 3.0,
        }
    }
}

/// Parse `name` from the environment if set, keeping `current` (with a warning)
/// when the value does not parse or fails `accept`
fn env_override<T, F>(name: &str, current: T, accept: F) -> T
where
    T: FromStr,
    F: Fn(&T) -> bool,
{
    let Ok(raw) = std::env::var(name) else {
        return current;
    };
    match raw.parse::<T>() {
        Ok(parsed) if accept(&parsed) => parsed,
        Ok(_) => {
            tracing::warn!("{} '{}' out of range, using default", name, raw);
            current
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            current
        }
    }
}

impl SwarmConfig {
    /// Load config from `SWARM_*` environment variables or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        config.world_bound = env_override("SWARM_WORLD_BOUND", config.world_bound, |v| v.is_finite() && *v > 0.0);
        config.colonies = env_override("SWARM_COLONIES", config.colonies, |v| (1..=MAX_MERGED_POPULATIONS).contains(v));
        config.agents_per_colony = env_override("SWARM_AGENTS_PER_COLONY", config.agents_per_colony, |v| *v <= 1_000_000);
        config.tick_rate = env_override("SWARM_TICK_RATE", config.tick_rate, |v| (1..=240).contains(v));
        config.ticks = env_override("SWARM_TICKS", config.ticks, |_| true);
        config.initial_capacity = env_override("SWARM_INITIAL_CAPACITY", config.initial_capacity, |_| true);
        config.corpse_capacity = env_override("SWARM_CORPSE_CAPACITY", config.corpse_capacity, |v| *v <= 1 << 20);
        config.seed = env_override("SWARM_SEED", config.seed, |_| true);
        config.colony_params.visual_range = env_override(
            "SWARM_COLONY_VISUAL_RANGE",
            config.colony_params.visual_range,
            |v| v.is_finite() && *v > 0.0,
        );
        config.combat_params.visual_range = env_override(
            "SWARM_COMBAT_VISUAL_RANGE",
            config.combat_params.visual_range,
            |v| v.is_finite() && *v > 0.0,
        );
        config.pois = env_override("SWARM_POIS", config.pois, |v| *v <= 10_000);

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if !(self.world_bound.is_finite() && self.world_bound > 0.0) {
            return Err("world_bound must be positive".to_string());
        }
        if self.colonies == 0 || self.colonies > MAX_MERGED_POPULATIONS {
            return Err(format!("colonies must be 1-{}", MAX_MERGED_POPULATIONS));
        }
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if self.poi_radius < 0.0 {
            return Err("poi_radius cannot be negative".to_string());
        }
        self.colony_params
            .validate()
            .map_err(|e| format!("colony params: {}", e))?;
        self.combat_params
            .validate()
            .map_err(|e| format!("combat params: {}", e))?;
        Ok(())
    }

    /// Settings for the `index`-th colony simulator
    pub fn colony_settings(&self, index: u64) -> SimulatorSettings {
        SimulatorSettings {
            world_bound: Vec2::splat(self.world_bound),
            params: self.colony_params,
            initial_capacity: self.initial_capacity,
            corpse_capacity: 0,
            seed: self.seed.wrapping_add(index),
        }
    }

    pub fn combat_settings(&self) -> SimulatorSettings {
        SimulatorSettings {
            world_bound: Vec2::splat(self.world_bound),
            params: self.combat_params,
            initial_capacity: self.initial_capacity,
            corpse_capacity: self.corpse_capacity,
            seed: self.seed.wrapping_sub(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SwarmConfig::default();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.colonies, 4);
        assert_eq!(config.initial_capacity, 2048);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = SwarmConfig::load_or_default();
        assert!(config.tick_rate > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_parses_and_rejects() {
        std::env::set_var("SWARM_TEST_OVERRIDE_OK", "12");
        std::env::set_var("SWARM_TEST_OVERRIDE_BAD", "twelve");
        std::env::set_var("SWARM_TEST_OVERRIDE_RANGE", "500");

        assert_eq!(env_override("SWARM_TEST_OVERRIDE_OK", 3u32, |_| true), 12);
        assert_eq!(env_override("SWARM_TEST_OVERRIDE_BAD", 3u32, |_| true), 3);
        assert_eq!(env_override("SWARM_TEST_OVERRIDE_RANGE", 3u32, |v| *v < 100), 3);
        assert_eq!(env_override("SWARM_TEST_OVERRIDE_UNSET", 3u32, |_| true), 3);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SwarmConfig::default();
        config.colonies = MAX_MERGED_POPULATIONS + 1;
        assert!(config.validate().is_err());

        let mut config = SwarmConfig::default();
        config.combat_params.min_speed = -1.0;
        assert!(config.validate().unwrap_err().starts_with("combat params"));
    }

    #[test]
    fn test_settings_follow_config() {
        let config = SwarmConfig::default();
        let colony = config.colony_settings(3);
        assert_eq!(colony.world_bound, Vec2::splat(128.0));
        assert_eq!(colony.seed, config.seed + 3);
        assert_eq!(colony.corpse_capacity, 0);

        let combat = config.combat_settings();
        assert_eq!(combat.params, FlockingParams::combat());
        assert_eq!(combat.corpse_capacity, DEFAULT_CORPSE_CAPACITY);
    }
}
