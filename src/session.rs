//! Per-connection message dispatch.
//!
//! A `UserSession` is driven by exactly one reader task, so messages from one
//! user are handled one at a time in arrival order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, SfuError};
use crate::media::{IceCandidate, SessionDescription};
use crate::registry::Hub;
use crate::signaling::{parse_message, ClientMessage, EnvelopeError, ServerMessage};
use crate::stream::{self, IncomingStream};
use crate::user::{User, DISCONNECTED_CAUSE, LEAVE_ACTION_CAUSE};

pub struct UserSession {
    user: Arc<User>,
    hub: Arc<Hub>,
}

impl UserSession {
    /// Registers a new user writing to `outbound`. Everyone, the new user
    /// included, receives the updated `users_list`.
    pub async fn open(hub: Arc<Hub>, outbound: mpsc::Sender<ServerMessage>) -> Self {
        let user = User::new(outbound);
        info!(target: "sfu.user", user_id = %user.id(), "User connected");
        hub.users.add(Arc::clone(&user)).await;
        Self { user, hub }
    }

    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Parses and dispatches one text frame.
    pub async fn handle_text(&self, text: &str) {
        match parse_message(text) {
            Ok(message) => self.handle(message).await,
            Err(EnvelopeError::InvalidBody { kind, reason }) => {
                warn!(
                    target: "sfu.user",
                    user_id = %self.user.id(),
                    kind = %kind,
                    reason = %reason,
                    "Rejecting message with invalid body"
                );
                self.user.send(kind.failure(&SfuError::InvalidRequest(reason)));
            }
            Err(e) => {
                warn!(
                    target: "sfu.user",
                    user_id = %self.user.id(),
                    error = %e,
                    "Dropping message"
                );
            }
        }
    }

    pub async fn handle(&self, message: ClientMessage) {
        let kind = message.kind();
        debug!(target: "sfu.user", user_id = %self.user.id(), kind = %kind, "Received message");

        let result = match message {
            ClientMessage::UsersList => {
                self.hub.users.send_users_list(&self.user).await;
                Ok(())
            }
            ClientMessage::CreateRoom { codec } => self.create_room(codec.as_deref()).await,
            ClientMessage::LeaveRoom => self.user.leave_current_room(LEAVE_ACTION_CAUSE).await,
            ClientMessage::JoinRoom { room_id } => self.join_room(&room_id).await,
            ClientMessage::Publish { offer } => self.publish(offer).await,
            ClientMessage::IceCandidate {
                stream_id,
                candidate,
            } => self.ice_candidate(stream_id.as_deref(), candidate).await,
        };

        if let Err(e) = result {
            warn!(
                target: "sfu.user",
                user_id = %self.user.id(),
                kind = %kind,
                code = e.code(),
                error = %e,
                "Request failed"
            );
            self.user.send(kind.failure(&e));
        }
    }

    async fn create_room(&self, codec: Option<&str>) -> Result<()> {
        if self.user.current_room().await.is_some() {
            return Err(SfuError::AlreadyInRoom);
        }

        let room = self.hub.rooms.create(codec).await?;
        info!(
            target: "sfu.user",
            user_id = %self.user.id(),
            room_id = %room.id(),
            "User created a room"
        );

        if let Err(e) = self.user.join_room(&room).await {
            room.destroy().await;
            return Err(e);
        }
        Ok(())
    }

    async fn join_room(&self, room_id: &str) -> Result<()> {
        let room = self.hub.room(room_id).await?;
        self.user.join_room(&room).await
    }

    async fn publish(&self, offer: SessionDescription) -> Result<()> {
        let (stream, answer) =
            IncomingStream::publish(&self.user, offer, &self.hub.settings).await?;

        self.user.send(ServerMessage::Published {
            stream_id: stream.id().to_string(),
            answer,
        });
        Ok(())
    }

    async fn ice_candidate(&self, stream_id: Option<&str>, candidate: IceCandidate) -> Result<()> {
        let Some(stream_id) = stream_id else {
            self.user.queue_candidate(candidate).await;
            return Ok(());
        };

        let room = self.user.current_room().await.ok_or(SfuError::NotInRoom)?;
        let stream = stream::find_in_room(&room, stream_id).await?;
        if stream.publisher_id() != self.user.id() {
            return Err(SfuError::StreamNotFound(stream_id.to_string()));
        }

        stream.add_ice_candidate(candidate).await
    }

    /// Connection cleanup: leaves the current room, if any, then unregisters
    /// the user. Never fails.
    pub async fn close(&self) {
        if self.user.current_room().await.is_some() {
            if let Err(e) = self.user.leave_current_room(DISCONNECTED_CAUSE).await {
                warn!(
                    target: "sfu.user",
                    user_id = %self.user.id(),
                    error = %e,
                    "Failed to leave room on disconnect"
                );
            }
        }

        self.hub.users.remove(self.user.id()).await;
        info!(target: "sfu.user", user_id = %self.user.id(), "User disconnected");
    }
}
