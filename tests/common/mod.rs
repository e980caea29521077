//! Scripted media engine and connection helpers shared by the integration
//! tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sfu_server::config::Config;
use sfu_server::media::{
    CodecPreset, EventHandler, IceCandidate, MediaApi, MediaEngine, MediaSession, SessionConfig,
    SessionDescription, SessionEvent, TrackHandler, TrackKind, TrackReceiver,
};
use sfu_server::registry::Hub;
use sfu_server::session::UserSession;
use sfu_server::signaling::ServerMessage;
use sfu_server::SfuError;

pub const GRACE: Duration = Duration::from_secs(30);

pub const OFFER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

pub const ANSWER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=fake-answer\r\nt=0 0\r\n";

/// Switches that make the next engine call fail.
#[derive(Default)]
pub struct Faults {
    pub build_api: AtomicBool,
    pub new_session: AtomicBool,
    pub set_remote: AtomicBool,
    pub create_answer: AtomicBool,
    pub set_local: AtomicBool,
}

#[derive(Default)]
pub struct FakeEngine {
    pub faults: Arc<Faults>,
    pub sessions: Arc<Mutex<Vec<Arc<FakeSession>>>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn last_session(&self) -> Arc<FakeSession> {
        self.sessions().last().cloned().expect("no session was created")
    }
}

impl MediaEngine for FakeEngine {
    fn build_api(&self, preset: CodecPreset) -> sfu_server::Result<Arc<dyn MediaApi>> {
        if self.faults.build_api.load(Ordering::SeqCst) {
            return Err(SfuError::Engine("codec registration failed".to_string()));
        }
        Ok(Arc::new(FakeApi {
            preset,
            faults: Arc::clone(&self.faults),
            sessions: Arc::clone(&self.sessions),
        }))
    }
}

pub struct FakeApi {
    preset: CodecPreset,
    faults: Arc<Faults>,
    sessions: Arc<Mutex<Vec<Arc<FakeSession>>>>,
}

#[async_trait]
impl MediaApi for FakeApi {
    fn preset(&self) -> CodecPreset {
        self.preset
    }

    async fn new_session(&self, config: &SessionConfig) -> sfu_server::Result<Arc<dyn MediaSession>> {
        if self.faults.new_session.load(Ordering::SeqCst) {
            return Err(SfuError::Engine("no ports left".to_string()));
        }

        let session = Arc::new(FakeSession {
            faults: Arc::clone(&self.faults),
            ice_servers: config.ice_servers.clone(),
            ..FakeSession::default()
        });
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        Ok(session)
    }
}

#[derive(Default)]
pub struct FakeSession {
    faults: Arc<Faults>,
    pub ice_servers: Vec<String>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub local: Mutex<Option<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    closed: CancellationToken,
    close_calls: Mutex<usize>,
    event_handler: Mutex<Option<Arc<EventHandler>>>,
    track_handler: Mutex<Option<Arc<TrackHandler>>>,
}

impl FakeSession {
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn close_calls(&self) -> usize {
        *self.close_calls.lock().unwrap()
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.candidates
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.candidate.clone())
            .collect()
    }

    pub fn emit(&self, event: SessionEvent) {
        let handler = self.event_handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    /// Announces a remote track and returns the feed for its packets.
    pub fn push_track(&self, track_id: &str, kind: TrackKind) -> mpsc::UnboundedSender<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let track = Arc::new(FakeTrack {
            id: track_id.to_string(),
            kind,
            packets: tokio::sync::Mutex::new(rx),
            closed: self.closed.clone(),
        });

        let handler = self.track_handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(track);
        }
        tx
    }
}

#[async_trait]
impl MediaSession for FakeSession {
    fn on_event(&self, handler: EventHandler) {
        *self.event_handler.lock().unwrap() = Some(Arc::new(handler));
    }

    fn on_track(&self, handler: TrackHandler) {
        *self.track_handler.lock().unwrap() = Some(Arc::new(handler));
    }

    async fn set_remote_description(&self, description: SessionDescription) -> sfu_server::Result<()> {
        if self.faults.set_remote.load(Ordering::SeqCst) {
            return Err(SfuError::Engine("unparseable offer".to_string()));
        }
        *self.remote.lock().unwrap() = Some(description);
        self.emit(SessionEvent::SignalingState("have-remote-offer".to_string()));
        Ok(())
    }

    async fn create_answer(&self) -> sfu_server::Result<SessionDescription> {
        if self.faults.create_answer.load(Ordering::SeqCst) {
            return Err(SfuError::Engine("no codecs in common".to_string()));
        }
        Ok(SessionDescription::answer(ANSWER_SDP))
    }

    async fn set_local_description(&self, description: SessionDescription) -> sfu_server::Result<()> {
        if self.faults.set_local.load(Ordering::SeqCst) {
            return Err(SfuError::Engine("local description rejected".to_string()));
        }
        *self.local.lock().unwrap() = Some(description);
        self.emit(SessionEvent::SignalingState("stable".to_string()));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> sfu_server::Result<()> {
        if self.remote.lock().unwrap().is_none() {
            return Err(SfuError::Engine("remote description not set".to_string()));
        }
        if candidate.candidate.starts_with("bad") {
            return Err(SfuError::Engine("unparseable candidate".to_string()));
        }
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn graceful_close(&self) -> sfu_server::Result<()> {
        *self.close_calls.lock().unwrap() += 1;
        self.closed.cancel();
        self.emit(SessionEvent::ConnectionState("closed".to_string()));
        Ok(())
    }
}

pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    packets: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: CancellationToken,
}

#[async_trait]
impl TrackReceiver for FakeTrack {
    fn track_id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    async fn read(&self, buf: &mut [u8]) -> sfu_server::Result<usize> {
        let mut packets = self.packets.lock().await;
        tokio::select! {
            () = self.closed.cancelled() => Err(SfuError::Transport("session closed".to_string())),
            packet = packets.recv() => {
                let packet = packet.ok_or_else(|| SfuError::Transport("track ended".to_string()))?;
                buf[..packet.len()].copy_from_slice(&packet);
                Ok(packet.len())
            }
        }
    }
}

pub fn test_config() -> Config {
    Config {
        empty_room_grace: GRACE,
        ..Config::default()
    }
}

pub fn hub(engine: &Arc<FakeEngine>) -> Arc<Hub> {
    let engine: Arc<dyn MediaEngine> = Arc::clone(engine) as Arc<dyn MediaEngine>;
    Hub::new(engine, &test_config())
}

pub struct Client {
    pub session: UserSession,
    pub inbox: mpsc::Receiver<ServerMessage>,
}

impl Client {
    pub async fn connect(hub: &Arc<Hub>) -> Self {
        let (tx, inbox) = mpsc::channel(test_config().outbound_queue_capacity);
        let session = UserSession::open(Arc::clone(hub), tx).await;
        Self { session, inbox }
    }

    pub fn id(&self) -> String {
        self.session.user().id().to_string()
    }

    pub async fn send(&self, json: &str) {
        self.session.handle_text(json).await;
    }

    /// Everything queued for this client so far.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Like [`drain`](Self::drain) but without the roster broadcasts.
    pub fn drain_replies(&mut self) -> Vec<ServerMessage> {
        self.drain()
            .into_iter()
            .filter(|m| !matches!(m, ServerMessage::UsersList { .. }))
            .collect()
    }

    pub async fn create_room(&mut self) -> String {
        self.send(r#"{"type":"create_room"}"#).await;
        match self.drain_replies().pop() {
            Some(ServerMessage::RoomJoined { room }) => room.id,
            other => panic!("expected room_joined, got {:?}", other),
        }
    }

    pub async fn join(&self, room_id: &str) {
        self.send(&format!(r#"{{"type":"join_room","room_id":"{}"}}"#, room_id))
            .await;
    }

    pub async fn publish(&self) {
        let message = serde_json::json!({
            "type": "publish",
            "offer": {"type": "offer", "sdp": OFFER_SDP},
        });
        self.send(&message.to_string()).await;
    }
}

/// Waits until `check` holds, yielding to spawned tasks in between.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..1000 {
        if check().await {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition was never met");
}
