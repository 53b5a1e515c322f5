//! Run configuration loaded from TOML.
//!
//! ```toml
//! capacity = 65536
//! spawn_per_step = 512
//! steps = 600
//! tree = "scene.sdf"
//!
//! [params]
//! delta_time = 0.016
//!
//! [params.emitter]
//! position = [0.0, 1.0, 0.0]
//! spread = 0.3
//!
//! [params.physics]
//! gravity = [0.0, -9.81, 0.0]
//! bounce = 0.6
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::uniforms::SimParams;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of particle slots.
    pub capacity: u32,
    /// Particles requested before every step.
    pub spawn_per_step: u32,
    /// Steps the headless runner executes.
    pub steps: u32,
    /// Optional serialized spatial index.
    pub tree: Option<PathBuf>,
    pub params: SimParams,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            spawn_per_step: 100,
            steps: 600,
            tree: None,
            params: SimParams::default(),
        }
    }
}

impl SimulationConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&source)?;
        log::info!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "capacity",
                reason: "must be at least 1",
            });
        }
        self.params.validate()
    }
}
