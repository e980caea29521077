//! Process-wide registries of rooms and connected users.
//!
//! Both are plain values owned by a [`Hub`] and handed to each connection;
//! nothing here is a global.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, SfuError};
use crate::media::{CodecPreset, MediaEngine};
use crate::room::Room;
use crate::signaling::ServerMessage;
use crate::stream::StreamSettings;
use crate::user::User;

pub struct RoomRegistry {
    engine: Arc<dyn MediaEngine>,
    grace: Duration,
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new(engine: Arc<dyn MediaEngine>, grace: Duration) -> Arc<Self> {
        Arc::new(Self {
            engine,
            grace,
            rooms: RwLock::new(HashMap::new()),
        })
    }

    /// Resolves the codec and builds the engine API before any room exists,
    /// so a failure leaves nothing registered. The new room starts empty with
    /// its destroy timer armed.
    pub async fn create(self: &Arc<Self>, codec: Option<&str>) -> Result<Arc<Room>> {
        let preset = CodecPreset::resolve(codec)?;
        let api = self.engine.build_api(preset)?;

        let room = Room::new(
            Uuid::new_v4().to_string(),
            api,
            Arc::downgrade(self),
            self.grace,
        );

        room.arm_while_empty().await;
        self.rooms
            .write()
            .await
            .insert(room.id().to_string(), Arc::clone(&room));

        info!(target: "sfu.room", room_id = %room.id(), codec = %preset, "Room created");
        Ok(room)
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Idempotent.
    pub async fn remove(&self, room_id: &str) -> Option<Arc<Room>> {
        let removed = self.rooms.write().await.remove(room_id);
        if removed.is_some() {
            debug!(target: "sfu.room", room_id, "Room unregistered");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}

/// Every connected user, in connection order.
#[derive(Default)]
pub struct UserRegistry {
    users: RwLock<Vec<Arc<User>>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `user` and broadcasts the new roster to everyone.
    pub async fn add(&self, user: Arc<User>) {
        {
            let mut users = self.users.write().await;
            if users.iter().any(|u| u.id() == user.id()) {
                return;
            }
            users.push(user);
        }
        self.broadcast().await;
    }

    /// Unregisters the user and broadcasts the new roster to everyone left.
    pub async fn remove(&self, user_id: &str) -> Option<Arc<User>> {
        let removed = {
            let mut users = self.users.write().await;
            let index = users.iter().position(|u| u.id() == user_id)?;
            users.remove(index)
        };
        self.broadcast().await;
        Some(removed)
    }

    pub async fn list(&self) -> Vec<Arc<User>> {
        self.users.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    pub async fn users_list_message(&self) -> ServerMessage {
        ServerMessage::UsersList {
            users: self.users.read().await.iter().map(|u| u.snapshot()).collect(),
        }
    }

    pub async fn send_users_list(&self, user: &User) {
        user.send(self.users_list_message().await);
    }

    pub async fn broadcast(&self) {
        let users = self.list().await;
        let message = ServerMessage::UsersList {
            users: users.iter().map(|u| u.snapshot()).collect(),
        };

        debug!(target: "sfu.user", recipients = users.len(), "Broadcasting users list");
        for user in &users {
            user.send(message.clone());
        }
    }
}

/// Shared state handed to every connection.
pub struct Hub {
    pub rooms: Arc<RoomRegistry>,
    pub users: UserRegistry,
    pub settings: StreamSettings,
    /// Per-connection outbound queue size.
    pub outbound_capacity: usize,
}

impl Hub {
    pub fn new(engine: Arc<dyn MediaEngine>, config: &Config) -> Arc<Self> {
        Arc::new(Self {
            rooms: RoomRegistry::new(engine, config.empty_room_grace),
            users: UserRegistry::new(),
            settings: StreamSettings::from(config),
            outbound_capacity: config.outbound_queue_capacity,
        })
    }

    pub async fn room(&self, room_id: &str) -> Result<Arc<Room>> {
        self.rooms.get(room_id).await.ok_or(SfuError::RoomNotFound)
    }
}
