//! Planar identity projection fitted to the viewbox
//!
//! Centroids arrive already projected (e.g. ETRS89-LAEA metres). This module
//! only scales them uniformly into the viewbox and flips the Y axis so north is
//! up in screen coordinates.

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create an empty bounding box
    pub fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// Bounding box of a set of points
    pub fn of_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut bounds = Self::empty();
        for (x, y) in points {
            bounds.include_point(x, y);
        }
        bounds
    }

    /// Check if the bounding box is empty
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Expand the bounding box to include a point
    pub fn include_point(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    /// Width, never below 1 so a single point still has a scale
    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).max(1.0)
    }

    /// Height, never below 1
    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).max(1.0)
    }

    pub fn center_x(&self) -> f64 {
        (self.min_x + self.max_x) / 2.0
    }

    pub fn center_y(&self) -> f64 {
        (self.min_y + self.max_y) / 2.0
    }
}

/// Uniform scale + translation with the Y axis reflected
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdentityFit {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    /// Viewbox width
    pub width: f64,
    /// Viewbox height, derived from the data aspect ratio
    pub height: f64,
}

impl IdentityFit {
    /// Fit `bounds` into a viewbox of the given width.
    ///
    /// The height follows the aspect ratio of `bounds`; `padding` enlarges the
    /// fitted extent on both axes.
    pub fn fit(bounds: &BoundingBox, width: f64, padding: f64) -> Self {
        if bounds.is_empty() {
            return Self {
                scale: 1.0,
                offset_x: 0.0,
                offset_y: 0.0,
                width,
                height: width,
            };
        }

        let height = width * bounds.height() / bounds.width();
        let extent_w = width + padding;
        let extent_h = height + padding;
        let scale = (extent_w / bounds.width()).min(extent_h / bounds.height());

        // center the reflected box in the extent
        let offset_x = extent_w / 2.0 - bounds.center_x() * scale;
        let offset_y = extent_h / 2.0 + bounds.center_y() * scale;

        Self {
            scale,
            offset_x,
            offset_y,
            width,
            height,
        }
    }

    /// Project a planar point into viewbox coordinates
    pub fn project(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale + self.offset_x, -y * self.scale + self.offset_y)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}
