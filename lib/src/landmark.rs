//! Landmark frames delivered by the tracking engine.
//!
//! The JSON shape follows the holistic tracker results object: any of the
//! three landmark arrays may be absent or `null`, which is read as empty.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Point, Viewport};

/// Detection radius (pixels) applied to every landmark point.
pub const DEFAULT_POINT_RADIUS: f64 = 10.0;

/// One tracked body location. `x` and `y` are normalized to `[0, 1]`
/// relative to the frame width/height; `z` is relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility: None,
        }
    }

    /// Project into pixel space: `(x * width, y * height)`.
    pub fn to_pixels(&self, viewport: Viewport) -> Point {
        Point::new(self.x * viewport.width, self.y * viewport.height)
    }
}

/// Which hand a landmark array belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hand {
    Left,
    Right,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Landmark>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Landmark>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One delivery of landmark arrays, corresponding to one camera sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkFrame {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pose_landmarks: Vec<Landmark>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub left_hand_landmarks: Vec<Landmark>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub right_hand_landmarks: Vec<Landmark>,
}

impl LandmarkFrame {
    pub fn is_empty(&self) -> bool {
        self.pose_landmarks.is_empty()
            && self.left_hand_landmarks.is_empty()
            && self.right_hand_landmarks.is_empty()
    }

    /// All points in pixel space, in a stable order: pose, right hand, left hand.
    pub fn points(&self, viewport: Viewport) -> impl Iterator<Item = Point> + '_ {
        self.pose_landmarks
            .iter()
            .chain(&self.right_hand_landmarks)
            .chain(&self.left_hand_landmarks)
            .map(move |lm| lm.to_pixels(viewport))
    }

    /// Points of a single hand in pixel space.
    pub fn hand_points(&self, hand: Hand, viewport: Viewport) -> impl Iterator<Item = Point> + '_ {
        let landmarks = match hand {
            Hand::Left => &self.left_hand_landmarks,
            Hand::Right => &self.right_hand_landmarks,
        };
        landmarks.iter().map(move |lm| lm.to_pixels(viewport))
    }
}
