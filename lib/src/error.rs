//! Engine error type.
//!
//! Precondition violations surface synchronously and are never retried:
//! the caller has to fix its call ordering.

use std::fmt;

use crate::TargetId;

#[derive(Debug, Clone, PartialEq)]
pub enum GameError {
    /// A rendering-dependent call was made before a drawing surface was attached.
    LayerNotSetup,
    /// The tracking engine was used before it was loaded (or after it was closed).
    TrackingEngineNotLoaded,
    /// No target with this id exists in the session.
    UnknownTarget(TargetId),
    /// Geometry rejected by validation (non-positive radius, negative scale, NaN).
    InvalidGeometry(String),
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LayerNotSetup => write!(f, "drawing surface is not set up yet"),
            Self::TrackingEngineNotLoaded => write!(f, "tracking engine is not loaded yet"),
            Self::UnknownTarget(id) => write!(f, "no target with id {id}"),
            Self::InvalidGeometry(reason) => write!(f, "invalid geometry: {reason}"),
        }
    }
}

impl std::error::Error for GameError {}
