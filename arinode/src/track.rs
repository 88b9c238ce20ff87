//! LavaPlayer track descriptors.
//!
//! The node identifies playable sources through an opaque base64 blob in
//! the LavaPlayer "message" framing: a 4-byte header carrying the body
//! size and a flags field, then a versioned body with the track fields in
//! Java `DataOutput` encoding (big-endian, length-prefixed UTF strings).
//! Nothing in this service ever reads a descriptor back; decoding here
//! exists only for the tests.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use byteorder::{BigEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

/// Message flag marking a versioned body.
const TRACK_INFO_VERSIONED: u32 = 1;
/// Track format version written by this encoder.
const TRACK_INFO_VERSION: u8 = 2;

/// A playable source resolved by the metadata service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSource {
    /// Source manager name the node should use ("youtube", "http", …).
    pub source: String,
    /// Source-specific identifier.
    pub identifier: String,
    /// Canonical URI of the source.
    pub uri: String,
    /// Seconds into the source where playback starts.
    #[serde(default)]
    pub start_offset: f64,
    /// Seconds into the source where playback ends.
    #[serde(default)]
    pub end_offset: f64,
    /// Live streams have no usable duration or seek.
    #[serde(default)]
    pub is_live: bool,
}

/// A chapter boundary within a playable source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Seconds into the source.
    pub start: f64,
    #[serde(default)]
    pub title: Option<String>,
}

/// Encode the track descriptor for an audio source.
///
/// Pure; the caller treats the result as opaque.
pub fn encode_track(audio: &AudioSource) -> String {
    let mut body = Vec::with_capacity(64);

    // infallible: writing into a Vec
    let _ = body.write_u8(TRACK_INFO_VERSION);
    write_utf(&mut body, &audio.identifier);
    write_utf(&mut body, &audio.source);
    let duration_ms = if audio.is_live {
        i64::MAX
    } else {
        ((audio.end_offset - audio.start_offset).max(0.0) * 1000.0) as i64
    };
    let _ = body.write_i64::<BigEndian>(duration_ms);
    write_utf(&mut body, &audio.identifier);
    let _ = body.write_u8(audio.is_live as u8);
    let _ = body.write_u8(1); // uri present
    write_utf(&mut body, &audio.uri);
    write_utf(&mut body, &audio.source);
    let _ = body.write_i64::<BigEndian>(0); // initial position

    let mut message = Vec::with_capacity(body.len() + 4);
    let header = (body.len() as u32) | (TRACK_INFO_VERSIONED << 30);
    let _ = message.write_u32::<BigEndian>(header);
    message.extend_from_slice(&body);

    BASE64.encode(message)
}

/// Java `DataOutput::writeUTF`: u16 byte length, then the bytes.
fn write_utf(out: &mut Vec<u8>, value: &str) {
    let bytes = value.as_bytes();
    debug_assert!(bytes.len() <= u16::MAX as usize);
    let _ = out.write_u16::<BigEndian>(bytes.len() as u16);
    out.extend_from_slice(bytes);
}
