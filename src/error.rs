use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use webrtc::Error as WebRTCError;

/// Every failure the signaling core can report.
///
/// State-conflict variants are surfaced to the originating connection as a
/// typed `<op>_failure` reply; transport and engine variants are mostly
/// logged.
#[derive(Debug, Error)]
pub enum SfuError {
    #[error("you are already in a room")]
    AlreadyInRoom,

    #[error("you are not in a room")]
    NotInRoom,

    #[error("the room does not exist")]
    RoomNotFound,

    #[error("the room has been destroyed")]
    RoomClosed,

    #[error("user already is in the room")]
    AlreadyMember,

    #[error("user is not in the room")]
    NotMember,

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("stream {0} already registered in the room")]
    DuplicateStream(String),

    #[error("stream {0} not found")]
    StreamNotFound(String),

    /// One offer/answer step failed after the media session was created.
    #[error("negotiation failed during {step}: {reason}")]
    Negotiation { step: &'static str, reason: String },

    #[error("media engine error: {0}")]
    Engine(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("WebRTC error: {0}")]
    WebRTC(#[from] WebRTCError),

    #[error("WebSocket error: {0}")]
    Ws(#[from] WsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SfuError {
    /// Stable machine-readable code, used as a log field.
    pub fn code(&self) -> &'static str {
        match self {
            SfuError::AlreadyInRoom => "already_in_room",
            SfuError::NotInRoom => "not_in_room",
            SfuError::RoomNotFound => "room_not_found",
            SfuError::RoomClosed => "room_closed",
            SfuError::AlreadyMember => "already_member",
            SfuError::NotMember => "not_member",
            SfuError::UnsupportedCodec(_) => "unsupported_codec",
            SfuError::DuplicateStream(_) => "duplicate_stream",
            SfuError::StreamNotFound(_) => "stream_not_found",
            SfuError::Negotiation { .. } => "negotiation_failed",
            SfuError::Engine(_) | SfuError::WebRTC(_) => "engine_error",
            SfuError::Transport(_) | SfuError::Ws(_) => "transport_error",
            SfuError::InvalidRequest(_) | SfuError::Json(_) => "invalid_request",
        }
    }

    pub(crate) fn negotiation(step: &'static str, err: impl std::fmt::Display) -> Self {
        SfuError::Negotiation {
            step,
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SfuError>;
