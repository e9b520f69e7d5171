//! Pixel-space geometry shared by targets, the start checkpoint and the
//! score widget, plus the circle hit test.

use serde::{Deserialize, Serialize};

use crate::GameError;

fn unit_scale() -> f64 {
    1.0
}

/// A point in the session's pixel coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Size of the drawing area landmarks are projected onto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280.0, 720.0)
    }
}

/// Circle geometry of a target or the start checkpoint.
///
/// `rotation` and `stroke_width` are carried for the renderer only; the hit
/// test looks at position, radius and scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleGeometry {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    #[serde(default = "unit_scale")]
    pub scale_x: f64,
    #[serde(default = "unit_scale")]
    pub scale_y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub stroke_width: f64,
}

impl CircleGeometry {
    pub fn new(center: Point, radius: f64) -> Self {
        Self {
            x: center.x,
            y: center.y,
            radius,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            stroke_width: 0.0,
        }
    }

    pub fn with_stroke(mut self, stroke_width: f64) -> Self {
        self.stroke_width = stroke_width;
        self
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Collision radius: `radius * max(scale_x, scale_y)`.
    pub fn effective_radius(&self) -> f64 {
        self.radius * self.scale_x.max(self.scale_y)
    }

    /// Boundary-inclusive hit test for a landmark point with detection
    /// radius `point_radius`.
    pub fn hit(&self, point: Point, point_radius: f64) -> bool {
        self.center().distance(point) <= point_radius + self.effective_radius()
    }

    /// Multiply radius and stroke width by `factor`. Returns `None` when
    /// either would end up non-positive.
    pub fn resized(&self, factor: f64) -> Option<Self> {
        let radius = self.radius * factor;
        let stroke_width = self.stroke_width * factor;
        if radius <= 0.0 || (self.stroke_width > 0.0 && stroke_width <= 0.0) {
            return None;
        }
        Some(Self {
            radius,
            stroke_width,
            ..*self
        })
    }

    pub fn validate(&self) -> Result<(), GameError> {
        let finite = [
            self.x,
            self.y,
            self.radius,
            self.scale_x,
            self.scale_y,
            self.rotation,
            self.stroke_width,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(GameError::InvalidGeometry("non-finite component".into()));
        }
        if self.radius <= 0.0 {
            return Err(GameError::InvalidGeometry(format!(
                "radius must be positive, got {}",
                self.radius
            )));
        }
        if self.scale_x < 0.0 || self.scale_y < 0.0 {
            return Err(GameError::InvalidGeometry(format!(
                "scale must be >= 0, got ({}, {})",
                self.scale_x, self.scale_y
            )));
        }
        if self.stroke_width < 0.0 {
            return Err(GameError::InvalidGeometry(format!(
                "stroke width must be >= 0, got {}",
                self.stroke_width
            )));
        }
        Ok(())
    }
}

/// Anchor of the score / total time widget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreGeometry {
    pub x: f64,
    pub y: f64,
}

impl ScoreGeometry {
    pub fn validate(&self) -> Result<(), GameError> {
        if self.x.is_finite() && self.y.is_finite() {
            Ok(())
        } else {
            Err(GameError::InvalidGeometry("non-finite score anchor".into()))
        }
    }
}
