//! [`MediaEngine`] backed by the `webrtc` crate.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine as RtcMediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::{RTCPFeedback, RTCRtpTransceiver};
use webrtc::track::track_remote::TrackRemote;
use webrtc::util::{Marshal, MarshalSize};

use super::codecs::{CodecSpec, VideoCodec, MIME_TYPE_RTX, VIDEO_RTCP_FEEDBACK};
use super::{
    CodecPreset, EventHandler, IceCandidate, MediaApi, MediaEngine, MediaSession, SdpType,
    SessionConfig, SessionDescription, SessionEvent, TrackHandler, TrackKind, TrackReceiver,
};
use crate::error::{Result, SfuError};

#[derive(Debug, Default, Clone)]
pub struct WebRtcEngine;

impl WebRtcEngine {
    pub fn new() -> Self {
        Self
    }
}

impl MediaEngine for WebRtcEngine {
    fn build_api(&self, preset: CodecPreset) -> Result<Arc<dyn MediaApi>> {
        let mut media_engine = RtcMediaEngine::default();

        match (preset.audio(), preset.video()) {
            (Some(audio), Some(video)) => {
                register_audio(&mut media_engine, audio)?;
                register_video(&mut media_engine, video)?;
            }
            _ => media_engine.register_default_codecs()?,
        }

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        debug!(target: "sfu.media", codec = %preset, "Built media API");

        Ok(Arc::new(WebRtcApi { api, preset }))
    }
}

fn register_audio(media_engine: &mut RtcMediaEngine, audio: CodecSpec) -> Result<()> {
    media_engine.register_codec(codec_parameters(audio, Vec::new()), RTPCodecType::Audio)?;
    Ok(())
}

fn register_video(media_engine: &mut RtcMediaEngine, video: VideoCodec) -> Result<()> {
    let feedback = VIDEO_RTCP_FEEDBACK
        .iter()
        .map(|(typ, parameter)| RTCPFeedback {
            typ: typ.to_string(),
            parameter: parameter.to_string(),
        })
        .collect();

    media_engine.register_codec(codec_parameters(video.codec, feedback), RTPCodecType::Video)?;

    let rtx_line = video.rtx_fmtp_line();
    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: MIME_TYPE_RTX.to_owned(),
                clock_rate: video.codec.clock_rate,
                channels: 0,
                sdp_fmtp_line: rtx_line,
                rtcp_feedback: Vec::new(),
            },
            payload_type: video.rtx_payload_type,
            ..Default::default()
        },
        RTPCodecType::Video,
    )?;

    Ok(())
}

fn codec_parameters(spec: CodecSpec, rtcp_feedback: Vec<RTCPFeedback>) -> RTCRtpCodecParameters {
    RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: spec.mime_type.to_owned(),
            clock_rate: spec.clock_rate,
            channels: spec.channels,
            sdp_fmtp_line: spec.sdp_fmtp_line.to_owned(),
            rtcp_feedback,
        },
        payload_type: spec.payload_type,
        ..Default::default()
    }
}

pub struct WebRtcApi {
    api: API,
    preset: CodecPreset,
}

#[async_trait]
impl MediaApi for WebRtcApi {
    fn preset(&self) -> CodecPreset {
        self.preset
    }

    async fn new_session(&self, config: &SessionConfig) -> Result<Arc<dyn MediaSession>> {
        let ice_servers = if config.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }]
        };

        let configuration = RTCConfiguration {
            ice_servers,
            bundle_policy: RTCBundlePolicy::MaxBundle,
            ..Default::default()
        };

        let peer_connection = Arc::new(self.api.new_peer_connection(configuration).await?);

        Ok(Arc::new(WebRtcSession { peer_connection }))
    }
}

pub struct WebRtcSession {
    peer_connection: Arc<RTCPeerConnection>,
}

impl WebRtcSession {
    fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
        let rtc = match description.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
            SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
        };
        Ok(rtc)
    }
}

#[async_trait]
impl MediaSession for WebRtcSession {
    fn on_event(&self, handler: EventHandler) {
        let handler = Arc::new(handler);

        let signaling = Arc::clone(&handler);
        self.peer_connection
            .on_signaling_state_change(Box::new(move |s: RTCSignalingState| {
                signaling(SessionEvent::SignalingState(s.to_string()));
                Box::pin(async {})
            }));

        let ice = Arc::clone(&handler);
        self.peer_connection
            .on_ice_connection_state_change(Box::new(move |s: RTCIceConnectionState| {
                ice(SessionEvent::IceConnectionState(s.to_string()));
                Box::pin(async {})
            }));

        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                handler(SessionEvent::ConnectionState(s.to_string()));
                Box::pin(async {})
            }));
    }

    fn on_track(&self, handler: TrackHandler) {
        self.peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                handler(Arc::new(WebRtcTrack { track }));
                Box::pin(async {})
            },
        ));
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = Self::to_rtc(description)?;
        self.peer_connection
            .set_remote_description(description)
            .await?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.peer_connection.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = Self::to_rtc(description)?;
        self.peer_connection
            .set_local_description(description)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let candidate_init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection.add_ice_candidate(candidate_init).await?;
        Ok(())
    }

    async fn graceful_close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

pub struct WebRtcTrack {
    track: Arc<TrackRemote>,
}

#[async_trait]
impl TrackReceiver for WebRtcTrack {
    fn track_id(&self) -> String {
        self.track.id()
    }

    fn kind(&self) -> TrackKind {
        match self.track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            RTPCodecType::Video => TrackKind::Video,
            _ => TrackKind::Unknown,
        }
    }

    /// Oversize packets are dropped so one bad packet does not end the track.
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let (packet, _) = self.track.read_rtp().await?;
            let size = packet.marshal_size();
            if size > buf.len() {
                warn!(
                    target: "sfu.stream",
                    track_id = %self.track.id(),
                    size,
                    buffer = buf.len(),
                    "Skipping RTP packet larger than the receive buffer"
                );
                continue;
            }
            return packet
                .marshal_to(buf)
                .map_err(|e| SfuError::Transport(format!("rtp packet marshal failed: {e}")));
        }
    }
}
