use serde::{Deserialize, Serialize};

/// Axis-aligned box with the origin at the top-left corner of the page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }

    pub fn diagonal(&self) -> f32 {
        (self.width().powi(2) + self.height().powi(2)).sqrt()
    }

    pub fn is_well_formed(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite())
            && self.x0 <= self.x1
            && self.y0 <= self.y1
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn expand(&self, margin: f32) -> Self {
        Self {
            x0: self.x0 - margin,
            y0: self.y0 - margin,
            x1: self.x1 + margin,
            y1: self.y1 + margin,
        }
    }

    pub fn scale(&self, factor: f32) -> Self {
        Self {
            x0: self.x0 * factor,
            y0: self.y0 * factor,
            x1: self.x1 * factor,
            y1: self.y1 * factor,
        }
    }

    /// Every coordinate ends up >= 0; a box lying entirely left of or above
    /// the origin collapses onto the axis instead of inverting.
    pub fn clamp_non_negative(&self) -> Self {
        Self {
            x0: self.x0.max(0.0),
            y0: self.y0.max(0.0),
            x1: self.x1.max(0.0),
            y1: self.y1.max(0.0),
        }
    }

    pub fn clamp_to(&self, width: f32, height: f32) -> Self {
        let clamped = self.clamp_non_negative();
        Self {
            x0: clamped.x0.min(width),
            y0: clamped.y0.min(height),
            x1: clamped.x1.min(width),
            y1: clamped.y1.min(height),
        }
    }

    pub fn center_distance(&self, other: &Self) -> f32 {
        let (cx1, cy1) = self.center();
        let (cx2, cy2) = other.center();
        ((cx1 - cx2).powi(2) + (cy1 - cy2).powi(2)).sqrt()
    }
}

/// Ratio between rendered-image pixels and text-layer points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScaleFactor(f32);

impl ScaleFactor {
    pub const POINTS_PER_INCH: f32 = 72.0;

    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    pub fn from_dpi(dpi: u32) -> Self {
        Self(dpi as f32 / Self::POINTS_PER_INCH)
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self(1.0)
    }
}
