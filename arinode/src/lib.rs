//! # arinode — audio-node client for Ari
//!
//! The audio node ("andesite") is the remote service that actually decodes
//! and transmits audio over the voice transport. This crate carries:
//!
//! - the wire [`model`] (outgoing ops, player snapshots, voice-server
//!   updates, track-end events),
//! - the [`AudioNode`] control contract and its websocket implementation
//!   [`WsNode`],
//! - the [`NodeEventHandler`] seam through which node pushes flow back
//!   into the service,
//! - the LavaPlayer [`encode_track`] descriptor codec and the
//!   [`AudioSource`] value it consumes.

mod client;
mod error;
pub mod model;
mod track;

pub use client::{AudioNode, NodeEventHandler, WsNode};
pub use error::{NodeError, Result};
pub use model::{
    NodePlayer, PlayTrack, PlayerUpdate, TrackEnd, TrackEndReason, VoiceServerUpdate,
};
pub use track::{AudioSource, Chapter, encode_track};
