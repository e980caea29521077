//! JSON wire protocol spoken over the websocket.
//!
//! Every envelope carries a `type` discriminator. Inbound messages are parsed
//! in two steps so that an unknown `type` can be told apart from a known one
//! with a bad body: the former is dropped, the latter earns an
//! `<op>_failure` reply.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::SfuError;
use crate::media::{IceCandidate, SessionDescription};
use crate::room::RoomSnapshot;
use crate::user::UserSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    UsersList,
    CreateRoom {
        #[serde(default)]
        codec: Option<String>,
    },
    LeaveRoom,
    JoinRoom {
        room_id: String,
    },
    Publish {
        offer: SessionDescription,
    },
    #[serde(rename = "icecandidate")]
    IceCandidate {
        #[serde(default)]
        stream_id: Option<String>,
        candidate: IceCandidate,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::UsersList => MessageKind::UsersList,
            ClientMessage::CreateRoom { .. } => MessageKind::CreateRoom,
            ClientMessage::LeaveRoom => MessageKind::LeaveRoom,
            ClientMessage::JoinRoom { .. } => MessageKind::JoinRoom,
            ClientMessage::Publish { .. } => MessageKind::Publish,
            ClientMessage::IceCandidate { .. } => MessageKind::IceCandidate,
        }
    }
}

/// The inbound discriminators this server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    UsersList,
    CreateRoom,
    LeaveRoom,
    JoinRoom,
    Publish,
    IceCandidate,
}

impl MessageKind {
    pub fn parse(discriminator: &str) -> Option<Self> {
        match discriminator {
            "users_list" => Some(MessageKind::UsersList),
            "create_room" => Some(MessageKind::CreateRoom),
            "leave_room" => Some(MessageKind::LeaveRoom),
            "join_room" => Some(MessageKind::JoinRoom),
            "publish" => Some(MessageKind::Publish),
            "icecandidate" => Some(MessageKind::IceCandidate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::UsersList => "users_list",
            MessageKind::CreateRoom => "create_room",
            MessageKind::LeaveRoom => "leave_room",
            MessageKind::JoinRoom => "join_room",
            MessageKind::Publish => "publish",
            MessageKind::IceCandidate => "icecandidate",
        }
    }

    /// Failure reply for this operation.
    pub fn failure(&self, err: &SfuError) -> ServerMessage {
        let reply = ErrorReply {
            error: err.code().to_string(),
            reason: err.to_string(),
        };

        match self {
            MessageKind::UsersList => ServerMessage::UsersListFailure(reply),
            MessageKind::CreateRoom => ServerMessage::CreateRoomFailure(reply),
            MessageKind::LeaveRoom => ServerMessage::LeaveRoomFailure(reply),
            MessageKind::JoinRoom => ServerMessage::JoinRoomFailure(reply),
            MessageKind::Publish => ServerMessage::PublishFailure(reply),
            MessageKind::IceCandidate => ServerMessage::IceCandidateFailure(reply),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    UsersList {
        users: Vec<UserSnapshot>,
    },
    RoomJoined {
        room: RoomSnapshot,
    },
    RoomLeaved {
        room: RoomSnapshot,
        cause: String,
    },
    Published {
        stream_id: String,
        answer: SessionDescription,
    },
    UsersListFailure(ErrorReply),
    CreateRoomFailure(ErrorReply),
    LeaveRoomFailure(ErrorReply),
    JoinRoomFailure(ErrorReply),
    PublishFailure(ErrorReply),
    #[serde(rename = "icecandidate_failure")]
    IceCandidateFailure(ErrorReply),
}

impl ServerMessage {
    /// The outbound `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::UsersList { .. } => "users_list",
            ServerMessage::RoomJoined { .. } => "room_joined",
            ServerMessage::RoomLeaved { .. } => "room_leaved",
            ServerMessage::Published { .. } => "published",
            ServerMessage::UsersListFailure(_) => "users_list_failure",
            ServerMessage::CreateRoomFailure(_) => "create_room_failure",
            ServerMessage::LeaveRoomFailure(_) => "leave_room_failure",
            ServerMessage::JoinRoomFailure(_) => "join_room_failure",
            ServerMessage::PublishFailure(_) => "publish_failure",
            ServerMessage::IceCandidateFailure(_) => "icecandidate_failure",
        }
    }

    pub fn error_reply(&self) -> Option<&ErrorReply> {
        match self {
            ServerMessage::UsersListFailure(reply)
            | ServerMessage::CreateRoomFailure(reply)
            | ServerMessage::LeaveRoomFailure(reply)
            | ServerMessage::JoinRoomFailure(reply)
            | ServerMessage::PublishFailure(reply)
            | ServerMessage::IceCandidateFailure(reply) => Some(reply),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("unknown message type: {0}")]
    UnknownKind(String),

    #[error("invalid {kind} message: {reason}")]
    InvalidBody { kind: MessageKind, reason: String },
}

pub fn parse_message(text: &str) -> Result<ClientMessage, EnvelopeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    let discriminator = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| EnvelopeError::Malformed("missing \"type\" field".to_string()))?;

    let kind = MessageKind::parse(discriminator)
        .ok_or_else(|| EnvelopeError::UnknownKind(discriminator.to_string()))?;

    serde_json::from_value(value).map_err(|e| EnvelopeError::InvalidBody {
        kind,
        reason: e.to_string(),
    })
}
