//! Rooms: membership, published streams and the empty-room lifecycle.
//!
//! Membership and the stream map sit behind two separate locks. The destroy
//! timer lives under the membership lock so that the emptiness check, arming,
//! disarming and firing are decided together.
//!
//! Lock order is membership before streams; neither is held across engine
//! calls.

mod state;
pub mod timer;

pub use state::{Membership, RoomSnapshot};
pub use timer::{ArmTicket, DestroyTimer, TimerState};

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, SfuError};
use crate::media::{CodecPreset, MediaApi};
use crate::registry::RoomRegistry;
use crate::stream::IncomingStream;
use crate::user::User;

pub const DESTROYED_CAUSE: &str = "room has been destroyed";

pub struct Room {
    id: String,
    codec: CodecPreset,
    api: Arc<dyn MediaApi>,
    registry: Weak<RoomRegistry>,
    grace: Duration,
    members: Mutex<Membership>,
    streams: Mutex<HashMap<String, Arc<IncomingStream>>>,
}

impl Room {
    pub(crate) fn new(
        id: String,
        api: Arc<dyn MediaApi>,
        registry: Weak<RoomRegistry>,
        grace: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            codec: api.preset(),
            api,
            registry,
            grace,
            members: Mutex::new(Membership::new()),
            streams: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn codec(&self) -> CodecPreset {
        self.codec
    }

    pub fn api(&self) -> &Arc<dyn MediaApi> {
        &self.api
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    pub async fn add_user(self: &Arc<Self>, user: &Arc<User>) -> Result<()> {
        let mut members = self.members.lock().await;

        if members.timer.is_destroyed() {
            return Err(SfuError::RoomClosed);
        }

        members.add_user(Arc::clone(user))?;

        if members.timer.disarm() {
            debug!(
                target: "sfu.room",
                room_id = %self.id,
                user_id = %user.id(),
                "Destroy timer disarmed by join"
            );
        }

        Ok(())
    }

    /// Removes `user`, closing every stream they published first. Arms the
    /// destroy timer when the room becomes empty.
    pub async fn remove_user(self: &Arc<Self>, user: &User) -> Result<()> {
        if !self.members.lock().await.contains(user.id()) {
            return Err(SfuError::NotMember);
        }

        let owned: Vec<Arc<IncomingStream>> = {
            let mut streams = self.streams.lock().await;
            let ids: Vec<String> = streams
                .values()
                .filter(|stream| stream.publisher_id() == user.id())
                .map(|stream| stream.id().to_string())
                .collect();
            ids.iter().filter_map(|id| streams.remove(id)).collect()
        };

        if !owned.is_empty() {
            debug!(
                target: "sfu.room",
                room_id = %self.id,
                user_id = %user.id(),
                streams = owned.len(),
                "Tearing down streams of leaving user"
            );
            join_all(owned.iter().map(|stream| stream.teardown())).await;
        }

        let mut members = self.members.lock().await;
        members.remove_user(user.id())?;

        if members.is_empty() {
            self.arm_locked(&mut members);
        }

        Ok(())
    }

    /// Arms the destroy timer if the room has no members. Called once right
    /// after creation.
    pub(crate) async fn arm_while_empty(self: &Arc<Self>) {
        let mut members = self.members.lock().await;
        if members.is_empty() {
            self.arm_locked(&mut members);
        }
    }

    fn arm_locked(self: &Arc<Self>, members: &mut Membership) {
        let Some(ticket) = members.timer.arm() else {
            return;
        };

        debug!(
            target: "sfu.room",
            room_id = %self.id,
            grace_secs = self.grace.as_secs(),
            "Room is empty, destroy timer armed"
        );

        let room = Arc::downgrade(self);
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::select! {
                () = ticket.token.cancelled() => {}
                () = tokio::time::sleep(grace) => {
                    if let Some(room) = room.upgrade() {
                        room.expire(ticket.generation).await;
                    }
                }
            }
        });
    }

    async fn expire(self: &Arc<Self>, generation: u64) {
        {
            let mut members = self.members.lock().await;
            if !members.is_empty() || !members.timer.fire(generation) {
                return;
            }
        }

        info!(
            target: "sfu.room",
            room_id = %self.id,
            "Room stayed empty for the grace period"
        );
        self.finish_destroy().await;
    }

    /// Cancels any armed timer, force-leaves every member and unregisters the
    /// room. Member failures are logged, never returned. Idempotent.
    pub async fn destroy(self: &Arc<Self>) {
        let members: Vec<Arc<User>> = {
            let mut members = self.members.lock().await;
            if !members.timer.destroy() {
                return;
            }
            members.users().to_vec()
        };

        for user in members {
            if let Err(e) = user.leave_room(self, DESTROYED_CAUSE).await {
                warn!(
                    target: "sfu.room",
                    room_id = %self.id,
                    user_id = %user.id(),
                    error = %e,
                    "Failed to remove member while destroying room"
                );
            }
        }

        self.finish_destroy().await;
    }

    async fn finish_destroy(&self) {
        let leftovers: Vec<Arc<IncomingStream>> =
            self.streams.lock().await.drain().map(|(_, stream)| stream).collect();
        join_all(leftovers.iter().map(|stream| stream.teardown())).await;

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id).await;
        }

        info!(target: "sfu.room", room_id = %self.id, "Room has been destroyed");
    }

    /// Registers `stream`. Its publisher must still be a member, so a stream
    /// can never outlive its publisher's membership.
    pub async fn add_in_stream(&self, stream: Arc<IncomingStream>) -> Result<()> {
        let members = self.members.lock().await;
        if !members.contains(stream.publisher_id()) {
            return Err(SfuError::NotInRoom);
        }

        let mut streams = self.streams.lock().await;
        if streams.contains_key(stream.id()) {
            return Err(SfuError::DuplicateStream(stream.id().to_string()));
        }

        debug!(
            target: "sfu.room",
            room_id = %self.id,
            stream_id = %stream.id(),
            publisher_id = %stream.publisher_id(),
            "Stream registered"
        );
        streams.insert(stream.id().to_string(), stream);
        Ok(())
    }

    pub async fn remove_in_stream(&self, stream_id: &str) -> Result<Arc<IncomingStream>> {
        self.streams
            .lock()
            .await
            .remove(stream_id)
            .ok_or_else(|| SfuError::StreamNotFound(stream_id.to_string()))
    }

    pub async fn stream(&self, stream_id: &str) -> Option<Arc<IncomingStream>> {
        self.streams.lock().await.get(stream_id).cloned()
    }

    pub async fn streams(&self) -> Vec<Arc<IncomingStream>> {
        self.streams.lock().await.values().cloned().collect()
    }

    pub async fn members(&self) -> Vec<Arc<User>> {
        self.members.lock().await.users().to_vec()
    }

    pub async fn member_count(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn is_member(&self, user: &User) -> bool {
        self.members.lock().await.contains(user.id())
    }

    pub async fn timer_state(&self) -> TimerState {
        self.members.lock().await.timer.state()
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let members = self.members.lock().await;
        RoomSnapshot {
            id: self.id.clone(),
            users: members.users().iter().map(|user| user.snapshot()).collect(),
        }
    }
}
