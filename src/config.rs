//! Cartogram configuration
//!
//! One explicit struct with named fields. Values can be set in code through the
//! `with_*` builders or loaded from a partial YAML file over the defaults.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::radius::{MissingValuePolicy, RadiusModel};
use crate::simulation::SimulationParams;

/// Default radius multiplier applied on top of the square-root scale
pub const DEFAULT_EXAGGERATION: f64 = 1.2;

/// Default square-root scale coefficient (radius = scale * sqrt(value))
pub const DEFAULT_RADIUS_SCALE: f64 = 0.005;

/// Default positional-restoring strength
pub const DEFAULT_POSITION_STRENGTH: f64 = 0.2;

/// Default collision strength
pub const DEFAULT_COLLISION_STRENGTH: f64 = 0.6;

/// Default collision padding, as a fraction of the circle radius
pub const DEFAULT_COLLISION_PADDING: f64 = 0.1;

/// Default dwell on the map before morphing into circles
pub const DEFAULT_DWELL_MS: u64 = 2000;

/// Default delay between two simulation ticks (~60 frames per second)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 16;

/// Default minimum alpha before a run is considered converged
pub const DEFAULT_ALPHA_MIN: f64 = 0.001;

/// Default number of ticks for alpha to decay from 1 to `DEFAULT_ALPHA_MIN`
pub const DEFAULT_ALPHA_DECAY_TICKS: f64 = 300.0;

/// Default velocity multiplier applied each tick (friction)
pub const DEFAULT_VELOCITY_DECAY: f64 = 0.6;

/// Default viewbox width
pub const DEFAULT_WIDTH: f64 = 1000.0;

/// Alpha decay rate that brings alpha from 1 to `alpha_min` in `ticks` ticks
pub fn alpha_decay_for(alpha_min: f64, ticks: f64) -> f64 {
    1.0 - alpha_min.powf(1.0 / ticks)
}

/// Whole milliseconds of a duration, saturating at `u64::MAX`
pub fn dwell_millis(dwell: Duration) -> u64 {
    u64::try_from(dwell.as_millis()).unwrap_or(u64::MAX)
}

/// Errors raised while loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid YAML for this struct
    #[error("parse error: {0}")]
    Parse(String),

    /// A field is out of its accepted range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Geographic granularity of the regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NutsLevel {
    Country,
    Nuts1,
    Nuts2,
    Nuts3,
}

impl NutsLevel {
    /// Numeric level (0 = country)
    pub fn as_u8(self) -> u8 {
        match self {
            NutsLevel::Country => 0,
            NutsLevel::Nuts1 => 1,
            NutsLevel::Nuts2 => 2,
            NutsLevel::Nuts3 => 3,
        }
    }

    /// Name used by the statistics service for its `geoLevel` parameter
    pub fn geo_level_param(self) -> String {
        match self {
            NutsLevel::Country => "country".to_string(),
            level => format!("nuts{}", level.as_u8()),
        }
    }
}

impl TryFrom<u8> for NutsLevel {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NutsLevel::Country),
            1 => Ok(NutsLevel::Nuts1),
            2 => Ok(NutsLevel::Nuts2),
            3 => Ok(NutsLevel::Nuts3),
            other => Err(ConfigError::Invalid(format!(
                "nuts level must be between 0 and 3, got {other}"
            ))),
        }
    }
}

impl From<NutsLevel> for u8 {
    fn from(level: NutsLevel) -> Self {
        level.as_u8()
    }
}

impl fmt::Display for NutsLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NutsLevel::Country => write!(f, "Country"),
            level => write!(f, "NUTS {}", level.as_u8()),
        }
    }
}

/// Full configuration of a cartogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DorlingConfig {
    /// Geographic level of the regions
    pub nuts_level: NutsLevel,
    /// Two-letter country prefixes whose regions are left out
    pub exclude: Vec<String>,
    /// Viewbox width; height follows the data's aspect ratio
    pub width: f64,
    /// Extra space added to the fitted extent
    pub fit_padding: f64,

    /// Radius multiplier for small-value legibility
    pub circle_exaggeration_factor: f64,
    /// Square-root scale coefficient
    pub radius_scale: f64,
    /// What to draw for regions without a value
    pub missing_value: MissingValuePolicy,
    /// Explicit size legend values; derived from the data when empty
    pub size_legend_values: Vec<f64>,

    /// Pull toward the geographic centroid (0 = none, 1 = snap back)
    pub position_strength: f64,
    /// Strength of the pairwise overlap resolution
    pub collision_strength: f64,
    /// Fraction added to every radius for collision purposes
    pub collision_padding: f64,
    /// Minimum alpha before a run converges
    pub alpha_min: f64,
    /// Fraction of the remaining alpha removed each tick
    pub alpha_decay: f64,
    /// Velocity multiplier applied each tick
    pub velocity_decay: f64,

    /// Dwell on the map phase, in milliseconds
    pub dwell_ms: u64,
    /// Delay between two ticks, in milliseconds
    pub tick_interval_ms: u64,
    /// Run the map/cartogram loop; when false the cartogram is shown directly
    pub animate: bool,
}

impl Default for DorlingConfig {
    fn default() -> Self {
        Self {
            nuts_level: NutsLevel::Nuts2,
            exclude: Vec::new(),
            width: DEFAULT_WIDTH,
            fit_padding: 0.0,
            circle_exaggeration_factor: DEFAULT_EXAGGERATION,
            radius_scale: DEFAULT_RADIUS_SCALE,
            missing_value: MissingValuePolicy::Zero,
            size_legend_values: Vec::new(),
            position_strength: DEFAULT_POSITION_STRENGTH,
            collision_strength: DEFAULT_COLLISION_STRENGTH,
            collision_padding: DEFAULT_COLLISION_PADDING,
            alpha_min: DEFAULT_ALPHA_MIN,
            alpha_decay: alpha_decay_for(DEFAULT_ALPHA_MIN, DEFAULT_ALPHA_DECAY_TICKS),
            velocity_decay: DEFAULT_VELOCITY_DECAY,
            dwell_ms: DEFAULT_DWELL_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            animate: true,
        }
    }
}

impl DorlingConfig {
    /// Load a YAML file; missing fields keep their defaults
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse YAML text; missing fields keep their defaults
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DorlingConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn unit(name: &str, value: f64) -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )))
            }
        }
        fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "{name} must be a positive number, got {value}"
                )))
            }
        }

        unit("position_strength", self.position_strength)?;
        unit("collision_strength", self.collision_strength)?;
        unit("velocity_decay", self.velocity_decay)?;
        positive("alpha_min", self.alpha_min)?;
        positive("width", self.width)?;
        positive("radius_scale", self.radius_scale)?;
        positive("circle_exaggeration_factor", self.circle_exaggeration_factor)?;
        if !(self.alpha_decay > 0.0 && self.alpha_decay < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "alpha_decay must be within (0, 1), got {}",
                self.alpha_decay
            )));
        }
        if !(self.collision_padding.is_finite() && self.collision_padding >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "collision_padding must be non-negative, got {}",
                self.collision_padding
            )));
        }
        if let MissingValuePolicy::Minimum { radius } = self.missing_value {
            if !(radius.is_finite() && radius >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "minimum radius must be non-negative, got {radius}"
                )));
            }
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the geographic level
    pub fn with_nuts_level(mut self, level: NutsLevel) -> Self {
        self.nuts_level = level;
        self
    }

    /// Set the excluded country prefixes
    pub fn with_exclude<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the positional-restoring strength
    pub fn with_position_strength(mut self, strength: f64) -> Self {
        self.position_strength = strength;
        self
    }

    /// Set the collision strength
    pub fn with_collision_strength(mut self, strength: f64) -> Self {
        self.collision_strength = strength;
        self
    }

    /// Set the collision padding fraction
    pub fn with_collision_padding(mut self, padding: f64) -> Self {
        self.collision_padding = padding;
        self
    }

    /// Set the map dwell duration
    pub fn with_dwell(mut self, dwell: Duration) -> Self {
        self.dwell_ms = dwell_millis(dwell);
        self
    }

    /// Set the radius exaggeration factor
    pub fn with_exaggeration(mut self, factor: f64) -> Self {
        self.circle_exaggeration_factor = factor;
        self
    }

    /// Set the square-root scale coefficient
    pub fn with_radius_scale(mut self, scale: f64) -> Self {
        self.radius_scale = scale;
        self
    }

    /// Set the missing-value policy
    pub fn with_missing_value(mut self, policy: MissingValuePolicy) -> Self {
        self.missing_value = policy;
        self
    }

    /// Enable or disable the map/cartogram loop
    pub fn with_animate(mut self, animate: bool) -> Self {
        self.animate = animate;
        self
    }

    /// Map dwell duration
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    /// Delay between two ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Radius model described by this configuration
    pub fn radius_model(&self) -> RadiusModel {
        RadiusModel {
            scale: self.radius_scale,
            exaggeration: self.circle_exaggeration_factor,
            missing: self.missing_value,
        }
    }

    /// Simulation parameters described by this configuration
    pub fn simulation_params(&self) -> SimulationParams {
        SimulationParams {
            position_strength: self.position_strength,
            collision_strength: self.collision_strength,
            collision_padding: self.collision_padding,
            alpha_min: self.alpha_min,
            alpha_decay: self.alpha_decay,
            alpha_target: 0.0,
            velocity_decay: self.velocity_decay,
        }
    }
}
