use crate::error::{FountainError, Result};
use crate::scheduler::GrowthPolicy;
use serde::{Deserialize, Serialize};

// Parameters that define the engine. These don't change at runtime.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct EngineParams {
    pub initial_capacity: u32,
    pub initial_population: u32,
    pub max_emit_per_frame: u32,
    pub fps: f64,
    pub seed: u64,

    #[serde(default)]
    pub growth: GrowthParams,

    #[serde(default)]
    pub emission: EmissionParams,

    #[serde(default)]
    pub nozzle: NozzleParams,

    #[serde(default)]
    pub simulation: SimulationParams,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct GrowthParams {
    pub enabled: bool,
    pub max_capacity: u32,
}

impl Default for GrowthParams {
    fn default() -> Self {
        GrowthParams {
            enabled: false,
            max_capacity: 1 << 20,
        }
    }
}

impl GrowthParams {
    pub fn policy(&self) -> GrowthPolicy {
        if self.enabled {
            GrowthPolicy::Double {
                max_capacity: self.max_capacity,
            }
        } else {
            GrowthPolicy::Fixed
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Immediate,
    Staged,
    Procedural,
    /// A different strategy every frame.
    Cycle,
}

impl std::str::FromStr for Strategy {
    type Err = FountainError;
    fn from_str(name: &str) -> Result<Self> {
        match name {
            "immediate" => Ok(Strategy::Immediate),
            "staged" => Ok(Strategy::Staged),
            "procedural" => Ok(Strategy::Procedural),
            "cycle" => Ok(Strategy::Cycle),
            other => Err(FountainError::InvalidConfig(format!(
                "unknown emission strategy `{}`",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct EmissionParams {
    pub strategy: Strategy,
    pub staging_capacity: u32,
    // Batches in flight between a background producer and the engine.
    pub queue_capacity: u32,
    pub ttl: f32,
}

impl Default for EmissionParams {
    fn default() -> Self {
        EmissionParams {
            strategy: Strategy::Cycle,
            staging_capacity: 250,
            queue_capacity: 60,
            ttl: 4.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct NozzleParams {
    pub speed_min: f32,
    pub speed_max: f32,
    pub ttl_min: f32,
    pub ttl_max: f32,
}

impl Default for NozzleParams {
    fn default() -> Self {
        NozzleParams {
            speed_min: 0.1,
            speed_max: 0.9,
            ttl_min: 2.0,
            ttl_max: 4.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct SimulationParams {
    pub gravity: f32,
    pub floor: f32,
    pub aspect_ratio: f32,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            gravity: -0.6,
            floor: -1.0,
            aspect_ratio: 16.0 / 9.0,
        }
    }
}

impl std::str::FromStr for EngineParams {
    type Err = toml::de::Error;
    fn from_str(serialized: &str) -> std::result::Result<Self, Self::Err> {
        let params = toml::from_str(serialized)?;
        Ok(params)
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        EngineParams {
            initial_capacity: 25_000,
            initial_population: 250,
            max_emit_per_frame: 250,
            fps: 60.0,
            seed: 0,
            growth: GrowthParams::default(),
            emission: EmissionParams::default(),
            nozzle: NozzleParams::default(),
            simulation: SimulationParams::default(),
        }
    }
}

impl EngineParams {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(FountainError::InvalidConfig(msg));
        if self.initial_capacity == 0 {
            return invalid("initial_capacity must be non-zero".into());
        }
        if self.initial_population > self.initial_capacity {
            return invalid(format!(
                "initial_population {} exceeds initial_capacity {}",
                self.initial_population, self.initial_capacity
            ));
        }
        if self.emission.staging_capacity == 0 {
            return invalid("emission.staging_capacity must be non-zero".into());
        }
        if self.emission.queue_capacity == 0 {
            return invalid("emission.queue_capacity must be non-zero".into());
        }
        if self.growth.enabled && self.growth.max_capacity < self.initial_capacity {
            return invalid(format!(
                "growth.max_capacity {} is below initial_capacity {}",
                self.growth.max_capacity, self.initial_capacity
            ));
        }
        let nozzle = &self.nozzle;
        if !(nozzle.speed_min <= nozzle.speed_max && nozzle.ttl_min <= nozzle.ttl_max) {
            return invalid("nozzle ranges must have min <= max".into());
        }
        if nozzle.ttl_min <= 0.0 || self.emission.ttl <= 0.0 {
            return invalid("particle lifetimes must be positive".into());
        }
        if self.fps <= 0.0 {
            return invalid("fps must be positive".into());
        }
        Ok(())
    }

    /// Adjusts the strategy for records fed from a background producer.
    /// Only host-built strategies can take them: `cycle` falls back to
    /// `immediate`, `procedural` is rejected.
    pub fn with_background_producer(mut self) -> Result<Self> {
        match self.emission.strategy {
            Strategy::Immediate | Strategy::Staged => {}
            Strategy::Cycle => {
                log::warn!("Background producer: emitting with `immediate` instead of `cycle`");
                self.emission.strategy = Strategy::Immediate;
            }
            Strategy::Procedural => {
                return Err(FountainError::InvalidConfig(
                    "a background producer needs the immediate or staged strategy, not procedural"
                        .into(),
                ))
            }
        }
        Ok(self)
    }
}

pub fn get_engine_config_from_default_file() -> EngineParams {
    let config_data = include_str!("../fountain_config.toml");
    match config_data.parse() {
        Ok(params) => params,
        Err(e) => {
            log::error!(
                "Failed to parse config file({}): {:?}",
                "../fountain_config.toml",
                e
            );
            EngineParams::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoke() {
        let params = EngineParams {
            initial_capacity: 64,
            initial_population: 8,
            max_emit_per_frame: 10,
            fps: 30.0,
            seed: 9,
            growth: GrowthParams {
                enabled: true,
                max_capacity: 1024,
            },
            emission: EmissionParams {
                strategy: Strategy::Staged,
                ..EmissionParams::default()
            },
            nozzle: NozzleParams::default(),
            simulation: SimulationParams::default(),
        };
        let serialized = toml::to_string(&params).unwrap();
        println!("serialized = {}", serialized);
        let deserialized: EngineParams = toml::from_str(&serialized).unwrap();
        println!("deserialized = {:?}", deserialized);
        assert_eq!(params.initial_capacity, deserialized.initial_capacity);
        assert_eq!(params.max_emit_per_frame, deserialized.max_emit_per_frame);
        assert_eq!(deserialized.emission.strategy, Strategy::Staged);
        assert_eq!(
            deserialized.growth.policy(),
            GrowthPolicy::Double { max_capacity: 1024 }
        );
    }

    #[test]
    fn default_file_parses_and_validates() {
        let params: EngineParams = include_str!("../fountain_config.toml").parse().unwrap();
        params.validate().unwrap();
        get_engine_config_from_default_file().validate().unwrap();
    }

    #[test]
    fn missing_sections_use_defaults() {
        let params: EngineParams = "initial_capacity = 100\ninitial_population = 0\nmax_emit_per_frame = 5\nfps = 60.0\nseed = 1\n"
            .parse()
            .unwrap();
        assert_eq!(params.growth.policy(), GrowthPolicy::Fixed);
        assert_eq!(params.emission.strategy, Strategy::Cycle);
        params.validate().unwrap();
    }

    #[test]
    fn inconsistent_values_rejected() {
        let mut params = EngineParams::default();
        params.growth = GrowthParams {
            enabled: true,
            max_capacity: 10,
        };
        assert!(params.validate().is_err());

        let mut params = EngineParams::default();
        params.emission.staging_capacity = 0;
        assert!(params.validate().is_err());

        let mut params = EngineParams::default();
        params.initial_population = params.initial_capacity + 1;
        assert!(params.validate().is_err());
    }

    #[test]
    fn background_producer_needs_host_strategy() {
        let mut params = get_engine_config_from_default_file();
        assert_eq!(params.emission.strategy, Strategy::Cycle);
        let adjusted = params.with_background_producer().unwrap();
        assert_eq!(adjusted.emission.strategy, Strategy::Immediate);

        params.emission.strategy = Strategy::Staged;
        let kept = params.with_background_producer().unwrap();
        assert_eq!(kept.emission.strategy, Strategy::Staged);

        params.emission.strategy = Strategy::Procedural;
        assert!(matches!(
            params.with_background_producer(),
            Err(FountainError::InvalidConfig(_))
        ));
    }

    #[test]
    fn strategy_names() {
        assert_eq!("staged".parse::<Strategy>(), Ok(Strategy::Staged));
        assert!("bogus".parse::<Strategy>().is_err());
    }
}
