//! The evermix jukebox engine.
//!
//! Feed it a normalized track analysis and it plays the track beat by beat
//! forever: a similarity graph over beats decides where jumps are allowed,
//! a probabilistic selector decides when to take one, and a wall-clock
//! driver keeps the whole thing aligned with the audio player and schedules
//! sample-accurate seeks at beat boundaries.
//!
//! The usual entry point is [`engine::JukeboxSender`], which runs the
//! engine on its own thread; [`engine::Jukebox`] is the same machine for
//! callers that already have an event loop.

#![deny(clippy::missing_inline_in_public_items)]

#[cfg(feature = "audio")]
pub mod audio;
pub mod config;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod logger;
pub mod player;
pub mod selector;
pub mod state;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod viz;

pub use engine::{Jukebox, JukeboxSender};
pub use errors::{EngineError, PlayerError};
pub use state::{EngineUpdate, RuntimeState};
