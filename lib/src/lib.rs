mod api;
mod checkpoint;
mod clock;
mod collision;
mod config;
mod controller;
mod error;
mod event;
mod game_state;
mod geometry;
mod input;
mod landmark;
mod message;
mod session;
mod target;
mod ticker;

pub use api::*;
pub use checkpoint::*;
pub use clock::*;
pub use collision::*;
pub use config::*;
pub use controller::*;
pub use error::*;
pub use event::*;
pub use game_state::*;
pub use geometry::*;
pub use input::*;
pub use landmark::*;
pub use message::*;
pub use session::*;
pub use target::*;
pub use ticker::*;
