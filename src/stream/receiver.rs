//! Per-track packet ingestion.
//!
//! Every remote track gets a key from a monotonic counter, a broadcast channel
//! of raw packets, and one receive loop. The loop is the only place that
//! removes the entry, so each track is cleaned up exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::media::{TrackKind, TrackReceiver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub key: u64,
    pub track_id: String,
    pub kind: TrackKind,
}

struct TrackEntry {
    track_id: String,
    kind: TrackKind,
    packets: broadcast::Sender<Bytes>,
}

pub struct TrackTable {
    next_key: AtomicU64,
    capacity: usize,
    entries: Mutex<HashMap<u64, TrackEntry>>,
}

impl TrackTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            next_key: AtomicU64::new(1),
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, track_id: String, kind: TrackKind) -> (u64, broadcast::Sender<Bytes>) {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let (packets, _) = broadcast::channel(self.capacity);

        self.entries.lock().await.insert(
            key,
            TrackEntry {
                track_id,
                kind,
                packets: packets.clone(),
            },
        );

        (key, packets)
    }

    /// Drops the table's sender. Subscribers see the channel close once the
    /// receive loop has dropped its own.
    pub async fn remove(&self, key: u64) -> bool {
        self.entries.lock().await.remove(&key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn tracks(&self) -> Vec<TrackInfo> {
        let entries = self.entries.lock().await;
        let mut tracks: Vec<TrackInfo> = entries
            .iter()
            .map(|(key, entry)| TrackInfo {
                key: *key,
                track_id: entry.track_id.clone(),
                kind: entry.kind,
            })
            .collect();
        tracks.sort_by_key(|track| track.key);
        tracks
    }

    pub async fn subscribe(&self, track_id: &str) -> Option<broadcast::Receiver<Bytes>> {
        self.entries
            .lock()
            .await
            .values()
            .find(|entry| entry.track_id == track_id)
            .map(|entry| entry.packets.subscribe())
    }
}

/// Reads `receiver` until it fails, forwarding every packet to the track's
/// channel. A read error is end-of-track; there is no retry.
pub(crate) async fn receive_packets(
    stream_id: String,
    table: Arc<TrackTable>,
    receiver: Arc<dyn TrackReceiver>,
    buffer_size: usize,
) {
    let track_id = receiver.track_id();
    let (key, packets) = table.register(track_id.clone(), receiver.kind()).await;

    debug!(
        target: "sfu.stream",
        stream_id = %stream_id,
        track_id = %track_id,
        kind = %receiver.kind(),
        "Packet receive loop started"
    );

    let mut buffer = vec![0u8; buffer_size];
    let mut forwarded: u64 = 0;

    loop {
        let read = match receiver.read(&mut buffer).await {
            Ok(read) => read,
            Err(e) => {
                debug!(
                    target: "sfu.stream",
                    stream_id = %stream_id,
                    track_id = %track_id,
                    error = %e,
                    "Track read ended"
                );
                break;
            }
        };

        let Some(packet) = buffer.get(..read) else {
            break;
        };

        // No subscriber is not an error.
        let _ = packets.send(Bytes::copy_from_slice(packet));
        forwarded += 1;
    }

    drop(packets);
    table.remove(key).await;

    debug!(
        target: "sfu.stream",
        stream_id = %stream_id,
        track_id = %track_id,
        packets_forwarded = forwarded,
        "Packet receive loop stopped"
    );
}
