//! Touchable circular targets.

use serde::{Deserialize, Serialize};

use crate::{CircleGeometry, Point};

/// Session-unique target id. Ids start at 1 and are never reused until the
/// target collection is cleared.
pub type TargetId = u32;

/// Scoring weight of a freshly created target.
pub const DEFAULT_TARGET_WEIGHT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub touched: bool,
    pub geometry: CircleGeometry,
    /// Added to the score when the target goes untouched -> touched.
    pub weight: u32,
}

impl Target {
    pub fn new(id: TargetId, geometry: CircleGeometry) -> Self {
        Self {
            id,
            touched: false,
            geometry,
            weight: DEFAULT_TARGET_WEIGHT,
        }
    }

    pub fn hit(&self, point: Point, point_radius: f64) -> bool {
        self.geometry.hit(point, point_radius)
    }
}
