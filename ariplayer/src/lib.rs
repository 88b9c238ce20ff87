//! # ariplayer — per-guild players for Ari
//!
//! The coordination core of the service: one [`Player`] per guild ties
//! together the queue and history lists, the scalar player state in Redis
//! and the audio node, and emits an event for every observable change.
//! The [`PlayerManager`] keeps at most one live player per guild and
//! rebuilds node-side state after a crash; the [`VoiceCorrelator`] pairs
//! the two halves of the Discord voice handshake before anything reaches
//! the node.

mod bus;
mod error;
mod events;
mod manager;
mod player;
mod resolver;
mod state;
mod voice;

pub use bus::EventBus;
pub use error::{PlayerError, Result};
pub use events::{AriEvent, PlayerEvent};
pub use manager::PlayerManager;
pub use player::Player;
pub use resolver::TrackResolver;
pub use state::PlayerState;
pub use voice::{VoiceCorrelator, VoiceState};
