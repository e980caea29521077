//! Connected users and their room affiliation.

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SfuError};
use crate::media::IceCandidate;
use crate::room::Room;
use crate::signaling::ServerMessage;

pub const LEAVE_ACTION_CAUSE: &str = "leave action";
pub const DISCONNECTED_CAUSE: &str = "user disconnected";
pub const SWITCH_ROOM_CAUSE: &str = "leave current room, because joining another one";

/// User as listed in `users_list` and room snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: String,
}

pub struct User {
    id: String,
    outbound: mpsc::Sender<ServerMessage>,
    room: Mutex<Option<Weak<Room>>>,
    pending_candidates: Mutex<Vec<IceCandidate>>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User").field("id", &self.id).finish_non_exhaustive()
    }
}

impl User {
    pub fn new(outbound: mpsc::Sender<ServerMessage>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            outbound,
            room: Mutex::new(None),
            pending_candidates: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id.clone(),
        }
    }

    /// Queues `message` for the connection's writer without waiting. A full
    /// queue or a closed connection drops the message; the reader side will
    /// clean up a closed one.
    pub fn send(&self, message: ServerMessage) {
        match self.outbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(
                    target: "sfu.user",
                    user_id = %self.id,
                    kind = %message.kind(),
                    "Dropping outbound message, client is not keeping up"
                );
            }
            Err(TrySendError::Closed(message)) => {
                warn!(
                    target: "sfu.user",
                    user_id = %self.id,
                    kind = %message.kind(),
                    "Dropping outbound message, connection is gone"
                );
            }
        }
    }

    pub async fn current_room(&self) -> Option<Arc<Room>> {
        self.room.lock().await.as_ref().and_then(Weak::upgrade)
    }

    /// Leaves the current room first, if any, then joins `room`. If the
    /// leave succeeds but the join fails the user ends up in no room.
    pub async fn join_room(self: &Arc<Self>, room: &Arc<Room>) -> Result<()> {
        let mut slot = self.room.lock().await;

        if slot.is_some() {
            self.leave_locked(&mut slot, SWITCH_ROOM_CAUSE).await?;
        }

        room.add_user(self).await?;
        *slot = Some(Arc::downgrade(room));
        drop(slot);

        info!(target: "sfu.user", user_id = %self.id, room_id = %room.id(), "Joined room");
        self.send(ServerMessage::RoomJoined {
            room: room.snapshot().await,
        });
        Ok(())
    }

    pub async fn leave_current_room(&self, cause: &str) -> Result<()> {
        let mut slot = self.room.lock().await;
        self.leave_locked(&mut slot, cause).await
    }

    /// Leaves `room` on its behalf. Used by room destruction, where the
    /// user may already have moved elsewhere.
    pub async fn leave_room(&self, room: &Arc<Room>, cause: &str) -> Result<()> {
        let mut slot = self.room.lock().await;

        let current = slot.as_ref().and_then(Weak::upgrade);
        match current {
            Some(current) if Arc::ptr_eq(&current, room) => self.leave_locked(&mut slot, cause).await,
            _ => room.remove_user(self).await,
        }
    }

    async fn leave_locked(&self, slot: &mut Option<Weak<Room>>, cause: &str) -> Result<()> {
        let Some(room) = slot.as_ref().and_then(Weak::upgrade) else {
            *slot = None;
            return Err(SfuError::NotInRoom);
        };

        room.remove_user(self).await?;

        info!(
            target: "sfu.user",
            user_id = %self.id,
            room_id = %room.id(),
            cause,
            "Left room"
        );
        self.send(ServerMessage::RoomLeaved {
            room: room.snapshot().await,
            cause: cause.to_string(),
        });
        *slot = None;
        Ok(())
    }

    /// Holds a candidate that arrived without a target stream until the
    /// next publish.
    pub async fn queue_candidate(&self, candidate: IceCandidate) {
        let mut pending = self.pending_candidates.lock().await;
        pending.push(candidate);
        debug!(
            target: "sfu.user",
            user_id = %self.id,
            queued = pending.len(),
            "ICE candidate queued"
        );
    }

    pub async fn take_pending_candidates(&self) -> Vec<IceCandidate> {
        std::mem::take(&mut *self.pending_candidates.lock().await)
    }

    pub async fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.lock().await.len()
    }
}
