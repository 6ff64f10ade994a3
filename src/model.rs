use serde::Serialize;

/// One circle per geographic region
#[derive(Debug, Clone, PartialEq)]
pub struct CircleEntity {
    /// Stable region identifier (e.g. "DE21")
    pub id: String,
    /// Region name, when the geometry provides one
    pub name: Option<String>,
    /// Projected geographic centroid
    pub target_x: f64,
    pub target_y: f64,
    /// Simulated position
    pub x: f64,
    pub y: f64,
    /// Velocity
    pub vx: f64,
    pub vy: f64,
    /// Statistical value driving the radius
    pub value: Option<f64>,
    /// Statistical value driving the fill color
    pub color_value: Option<f64>,
    /// Radius derived from `value`
    pub radius: f64,
}

impl CircleEntity {
    /// Create an entity resting on its target
    pub fn new(id: impl Into<String>, target_x: f64, target_y: f64) -> Self {
        Self {
            id: id.into(),
            name: None,
            target_x,
            target_y,
            x: target_x,
            y: target_y,
            vx: 0.0,
            vy: 0.0,
            value: None,
            color_value: None,
            radius: 0.0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_value(mut self, value: Option<f64>) -> Self {
        self.value = value;
        self
    }

    pub fn with_color_value(mut self, value: Option<f64>) -> Self {
        self.color_value = value;
        self
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    /// Put the entity back on its target, at rest
    pub fn reset_to_target(&mut self) {
        self.x = self.target_x;
        self.y = self.target_y;
        self.vx = 0.0;
        self.vy = 0.0;
    }

    /// Two-letter country prefix of the region id
    pub fn country_code(&self) -> &str {
        country_code(&self.id)
    }

    pub fn position(&self) -> Position {
        Position {
            id: self.id.clone(),
            x: self.x,
            y: self.y,
        }
    }
}

/// Two-letter country prefix of a region id (the whole id when shorter)
pub fn country_code(id: &str) -> &str {
    id.get(..2).unwrap_or(id)
}

/// Position of one circle in a tick frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// Everything the render layer needs to draw a circle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircleSnapshot {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_value: Option<f64>,
    /// False draws the "no data" marker
    pub has_data: bool,
}

impl From<&CircleEntity> for CircleSnapshot {
    fn from(entity: &CircleEntity) -> Self {
        Self {
            id: entity.id.clone(),
            x: entity.x,
            y: entity.y,
            radius: entity.radius,
            color_value: entity.color_value,
            has_data: crate::radius::RadiusModel::has_data(entity.value),
        }
    }
}

/// Data shown when a circle is hovered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipInfo {
    pub id: String,
    pub name: Option<String>,
    pub country: Option<&'static str>,
    pub size_value: Option<f64>,
    /// Share of the country's total, in whole percent
    pub share_percent: Option<i64>,
    pub color_value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entity_rests_on_target() {
        let e = CircleEntity::new("FR10", 3.0, 4.0);
        assert_eq!((e.x, e.y), (3.0, 4.0));
        assert_eq!((e.vx, e.vy), (0.0, 0.0));
    }

    #[test]
    fn reset_to_target_clears_motion() {
        let mut e = CircleEntity::new("FR10", 3.0, 4.0);
        e.x = 10.0;
        e.vy = 2.0;
        e.target_x = 7.0;
        e.reset_to_target();
        assert_eq!((e.x, e.y, e.vy), (7.0, 4.0, 0.0));
    }

    #[test]
    fn country_code_handles_short_ids() {
        assert_eq!(country_code("DE212"), "DE");
        assert_eq!(country_code("D"), "D");
    }

    #[test]
    fn snapshot_marks_missing_data() {
        let e = CircleEntity::new("PT11", 0.0, 0.0).with_value(None);
        assert!(!CircleSnapshot::from(&e).has_data);
        let e = e.with_value(Some(12.0));
        assert!(CircleSnapshot::from(&e).has_data);
    }
}
