//! Modifier state passed into click interactions.

use serde::{Deserialize, Serialize};

/// Growth / shrink factor applied per click.
pub const CLICK_RESIZE_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    /// Shrink instead of grow.
    #[serde(default)]
    pub decrease_held: bool,
    /// Remove the clicked target.
    #[serde(default)]
    pub remove_held: bool,
}

/// What a click on a target does under the given modifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClickAction {
    Remove,
    Resize(f64),
}

impl InputState {
    pub fn target_click(&self) -> ClickAction {
        if self.remove_held {
            ClickAction::Remove
        } else if self.decrease_held {
            ClickAction::Resize(1.0 - CLICK_RESIZE_STEP)
        } else {
            ClickAction::Resize(1.0 + CLICK_RESIZE_STEP)
        }
    }
}
