//! Radius model
//!
//! Maps a statistical value to a circle radius on a square-root scale, so the
//! rendered area (not the radius) is proportional to the value.

use serde::{Deserialize, Serialize};

/// What to draw for a region whose value is absent, negative or not a number
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Collapse the circle to nothing
    Zero,
    /// Keep a fixed, visible radius
    Minimum { radius: f64 },
}

impl MissingValuePolicy {
    fn radius(self) -> f64 {
        match self {
            MissingValuePolicy::Zero => 0.0,
            MissingValuePolicy::Minimum { radius } if radius.is_finite() => radius.max(0.0),
            MissingValuePolicy::Minimum { .. } => 0.0,
        }
    }
}

/// Square-root radius scale with an exaggeration multiplier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusModel {
    /// radius = exaggeration * scale * sqrt(value)
    pub scale: f64,
    pub exaggeration: f64,
    pub missing: MissingValuePolicy,
}

impl Default for RadiusModel {
    fn default() -> Self {
        Self {
            scale: crate::config::DEFAULT_RADIUS_SCALE,
            exaggeration: crate::config::DEFAULT_EXAGGERATION,
            missing: MissingValuePolicy::Zero,
        }
    }
}

impl RadiusModel {
    /// Radius for a value. Never NaN, never negative.
    pub fn radius(&self, value: Option<f64>) -> f64 {
        match value {
            Some(v) if v.is_finite() && v >= 0.0 => {
                let r = self.exaggeration * self.scale * v.sqrt();
                if r.is_finite() { r.max(0.0) } else { self.missing.radius() }
            }
            _ => self.missing.radius(),
        }
    }

    /// Whether a value counts as data (as opposed to the "no data" marker)
    pub fn has_data(value: Option<f64>) -> bool {
        matches!(value, Some(v) if v.is_finite() && v >= 0.0)
    }
}

/// Default size legend values: the maximum, half of it and a tenth of it
pub fn default_legend_values(max: f64) -> Vec<f64> {
    if !max.is_finite() || max <= 0.0 {
        return Vec::new();
    }
    vec![max.floor(), (max / 2.0).floor(), (max / 10.0).floor()]
}
