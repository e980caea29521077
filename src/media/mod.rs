//! Media transport seam.
//!
//! The signaling core never talks to an ICE/DTLS/SRTP stack directly. It asks a
//! [`MediaEngine`] for a codec-pinned [`MediaApi`] when a room is created, asks
//! that API for one [`MediaSession`] per published stream, and reads packets
//! from the [`TrackReceiver`]s the session reports.

pub mod codecs;
pub mod rtc;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
pub use codecs::CodecPreset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// SDP payload exchanged with the client, shaped like the browser's
/// `RTCSessionDescriptionInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Trickled ICE candidate, shaped like the browser's `RTCIceCandidateInit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

/// State change reported by a media session. States are carried as the
/// engine's own lowercase names ("stable", "checking", "connected", ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignalingState(String),
    IceConnectionState(String),
    ConnectionState(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
    Unknown,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
            TrackKind::Unknown => write!(f, "unknown"),
        }
    }
}

pub type EventHandler = Box<dyn Fn(SessionEvent) + Send + Sync>;

pub type TrackHandler = Box<dyn Fn(Arc<dyn TrackReceiver>) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub ice_servers: Vec<String>,
}

/// Factory for codec-pinned negotiation contexts.
pub trait MediaEngine: Send + Sync {
    /// Builds the negotiation state for one room. Called before the room
    /// exists, so a failure here leaves nothing behind.
    fn build_api(&self, preset: CodecPreset) -> Result<Arc<dyn MediaApi>>;
}

#[async_trait]
pub trait MediaApi: Send + Sync {
    fn preset(&self) -> CodecPreset;

    async fn new_session(&self, config: &SessionConfig) -> Result<Arc<dyn MediaSession>>;
}

/// One negotiated transport with a publisher.
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Handler for signaling, ICE and connection state changes.
    fn on_event(&self, handler: EventHandler);

    /// Handler invoked once per remote track.
    fn on_track(&self, handler: TrackHandler);

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Closes the transport. Pending track reads fail afterwards.
    async fn graceful_close(&self) -> Result<()>;
}

/// Receiving side of one remote track.
#[async_trait]
pub trait TrackReceiver: Send + Sync {
    fn track_id(&self) -> String;

    fn kind(&self) -> TrackKind;

    /// Reads one packet into `buf` and returns its length. Any error means the
    /// track is finished.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;
}
