//! Streams published by users into their current room.

pub mod receiver;
pub mod status;

pub use receiver::{TrackInfo, TrackTable};
pub use status::{NegotiationPhase, SessionMonitor, SessionStatus};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, SfuError};
use crate::media::{IceCandidate, MediaSession, SdpType, SessionConfig, SessionDescription};
use crate::room::Room;
use crate::user::User;

/// Per-stream knobs taken from [`Config`].
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub ice_servers: Vec<String>,
    pub rtp_buffer_size: usize,
    pub track_channel_capacity: usize,
}

impl From<&Config> for StreamSettings {
    fn from(config: &Config) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
            rtp_buffer_size: config.rtp_buffer_size,
            track_channel_capacity: config.track_channel_capacity,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// A publisher's inbound media session and the tracks it carries.
pub struct IncomingStream {
    id: String,
    publisher_id: String,
    publisher: Weak<User>,
    session: Arc<dyn MediaSession>,
    tracks: Arc<TrackTable>,
    monitor: SessionMonitor,
    closed: AtomicBool,
}

impl IncomingStream {
    /// Negotiates a new inbound stream for `publisher` in their current room
    /// and returns it with the SDP answer.
    ///
    /// Either the stream ends up registered in the room with a local
    /// description set, or nothing is left behind.
    pub async fn publish(
        publisher: &Arc<User>,
        offer: SessionDescription,
        settings: &StreamSettings,
    ) -> Result<(Arc<Self>, SessionDescription)> {
        if offer.sdp_type != SdpType::Offer {
            return Err(SfuError::InvalidRequest(
                "publish expects an SDP offer".to_string(),
            ));
        }

        let room = publisher.current_room().await.ok_or(SfuError::NotInRoom)?;
        if !room.is_member(publisher).await {
            return Err(SfuError::NotInRoom);
        }

        let session = room
            .api()
            .new_session(&SessionConfig {
                ice_servers: settings.ice_servers.clone(),
            })
            .await?;

        let stream = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            publisher_id: publisher.id().to_string(),
            publisher: Arc::downgrade(publisher),
            session,
            tracks: Arc::new(TrackTable::new(settings.track_channel_capacity)),
            monitor: SessionMonitor::new(),
            closed: AtomicBool::new(false),
        });

        stream.attach_handlers(settings.rtp_buffer_size);

        if let Err(e) = room.add_in_stream(Arc::clone(&stream)).await {
            stream.teardown().await;
            return Err(e);
        }

        match stream.negotiate(publisher, offer).await {
            Ok(answer) => {
                info!(
                    target: "sfu.stream",
                    stream_id = %stream.id,
                    room_id = %room.id(),
                    publisher_id = %stream.publisher_id,
                    "Stream published"
                );
                Ok((stream, answer))
            }
            Err(e) => {
                warn!(
                    target: "sfu.stream",
                    stream_id = %stream.id,
                    room_id = %room.id(),
                    error = %e,
                    "Negotiation failed, discarding stream"
                );
                stream.monitor.set_error(e.to_string());
                // A concurrent leave may already have taken it out.
                let _ = room.remove_in_stream(&stream.id).await;
                stream.teardown().await;
                Err(e)
            }
        }
    }

    fn attach_handlers(self: &Arc<Self>, buffer_size: usize) {
        let monitor = self.monitor.clone();
        let stream_id = self.id.clone();
        self.session.on_event(Box::new(move |event| {
            debug!(target: "sfu.stream", stream_id = %stream_id, ?event, "Session state changed");
            monitor.record(&event);
        }));

        let tracks = Arc::clone(&self.tracks);
        let stream_id = self.id.clone();
        self.session.on_track(Box::new(move |track| {
            info!(
                target: "sfu.stream",
                stream_id = %stream_id,
                track_id = %track.track_id(),
                kind = %track.kind(),
                "Remote track arrived"
            );
            tokio::spawn(receiver::receive_packets(
                stream_id.clone(),
                Arc::clone(&tracks),
                track,
                buffer_size,
            ));
        }));
    }

    async fn negotiate(
        &self,
        publisher: &User,
        offer: SessionDescription,
    ) -> Result<SessionDescription> {
        self.monitor.set_phase(NegotiationPhase::Negotiating);

        self.session
            .set_remote_description(offer)
            .await
            .map_err(|e| SfuError::negotiation("set_remote_description", e))?;

        for candidate in publisher.take_pending_candidates().await {
            if let Err(e) = self.session.add_ice_candidate(candidate).await {
                warn!(
                    target: "sfu.stream",
                    stream_id = %self.id,
                    error = %e,
                    "Dropping queued ICE candidate"
                );
            }
        }

        let answer = self
            .session
            .create_answer()
            .await
            .map_err(|e| SfuError::negotiation("create_answer", e))?;

        self.session
            .set_local_description(answer.clone())
            .await
            .map_err(|e| SfuError::negotiation("set_local_description", e))?;

        Ok(answer)
    }

    /// Closes the media session. Safe to call more than once; only the first
    /// call reaches the engine.
    pub async fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.session.graceful_close().await {
            warn!(
                target: "sfu.stream",
                stream_id = %self.id,
                error = %e,
                "Media session did not close cleanly"
            );
        }

        self.monitor.set_phase(NegotiationPhase::Closed);
        debug!(target: "sfu.stream", stream_id = %self.id, "Stream torn down");
    }

    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if self.is_closed() {
            return Err(SfuError::StreamNotFound(self.id.clone()));
        }
        self.session.add_ice_candidate(candidate).await
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn publisher_id(&self) -> &str {
        &self.publisher_id
    }

    pub fn publisher(&self) -> Option<Arc<User>> {
        self.publisher.upgrade()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SessionStatus {
        self.monitor.snapshot()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.monitor.subscribe()
    }

    pub fn tracks(&self) -> &Arc<TrackTable> {
        &self.tracks
    }

    /// Packets of the first live track named `track_id`.
    pub async fn subscribe(&self, track_id: &str) -> Option<broadcast::Receiver<Bytes>> {
        self.tracks.subscribe(track_id).await
    }
}

/// Looks up `stream_id` in the publisher's current room.
pub(crate) async fn find_in_room(room: &Arc<Room>, stream_id: &str) -> Result<Arc<IncomingStream>> {
    room.stream(stream_id)
        .await
        .ok_or_else(|| SfuError::StreamNotFound(stream_id.to_string()))
}
