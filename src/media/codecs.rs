//! Named codec presets a room can be created with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SfuError;

pub const MIME_TYPE_OPUS: &str = "audio/opus";
pub const MIME_TYPE_VP8: &str = "video/VP8";
pub const MIME_TYPE_VP9: &str = "video/VP9";
pub const MIME_TYPE_H264: &str = "video/H264";
pub const MIME_TYPE_AV1: &str = "video/AV1";
pub const MIME_TYPE_RTX: &str = "video/rtx";

/// RTCP feedback every preset video codec advertises, as `(type, parameter)`.
pub const VIDEO_RTCP_FEEDBACK: [(&str, &str); 4] =
    [("goog-remb", ""), ("ccm", "fir"), ("nack", ""), ("nack", "pli")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecSpec {
    pub mime_type: &'static str,
    pub clock_rate: u32,
    pub channels: u16,
    pub sdp_fmtp_line: &'static str,
    pub payload_type: u8,
}

pub const OPUS: CodecSpec = CodecSpec {
    mime_type: MIME_TYPE_OPUS,
    clock_rate: 48000,
    channels: 2,
    sdp_fmtp_line: "minptime=10;useinbandfec=1",
    payload_type: 111,
};

/// A video codec plus the payload type of its RTX companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoCodec {
    pub codec: CodecSpec,
    pub rtx_payload_type: u8,
}

impl VideoCodec {
    pub fn rtx_fmtp_line(&self) -> String {
        format!("apt={}", self.codec.payload_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecPreset {
    /// Whatever the engine registers by default.
    #[default]
    Default,
    Vp8,
    Vp9,
    H264,
    Av1,
}

impl CodecPreset {
    /// Resolves the optional `codec` field of a `create_room` request.
    pub fn resolve(requested: Option<&str>) -> Result<Self, SfuError> {
        match requested {
            None => Ok(CodecPreset::Default),
            Some(name) => name.parse(),
        }
    }

    pub fn audio(&self) -> Option<CodecSpec> {
        match self {
            CodecPreset::Default => None,
            _ => Some(OPUS),
        }
    }

    pub fn video(&self) -> Option<VideoCodec> {
        let (codec, rtx_payload_type) = match self {
            CodecPreset::Default => return None,
            CodecPreset::Vp8 => (
                CodecSpec {
                    mime_type: MIME_TYPE_VP8,
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: "",
                    payload_type: 96,
                },
                97,
            ),
            CodecPreset::Vp9 => (
                CodecSpec {
                    mime_type: MIME_TYPE_VP9,
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: "profile-id=0",
                    payload_type: 98,
                },
                99,
            ),
            CodecPreset::H264 => (
                CodecSpec {
                    mime_type: MIME_TYPE_H264,
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line:
                        "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f",
                    payload_type: 102,
                },
                103,
            ),
            CodecPreset::Av1 => (
                CodecSpec {
                    mime_type: MIME_TYPE_AV1,
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: "",
                    payload_type: 45,
                },
                46,
            ),
        };

        Some(VideoCodec {
            codec,
            rtx_payload_type,
        })
    }
}

impl FromStr for CodecPreset {
    type Err = SfuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(CodecPreset::Default),
            "vp8" => Ok(CodecPreset::Vp8),
            "vp9" => Ok(CodecPreset::Vp9),
            "h264" => Ok(CodecPreset::H264),
            "av1" => Ok(CodecPreset::Av1),
            _ => Err(SfuError::UnsupportedCodec(s.to_string())),
        }
    }
}

impl fmt::Display for CodecPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecPreset::Default => write!(f, "default"),
            CodecPreset::Vp8 => write!(f, "vp8"),
            CodecPreset::Vp9 => write!(f, "vp9"),
            CodecPreset::H264 => write!(f, "h264"),
            CodecPreset::Av1 => write!(f, "av1"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults_when_absent() {
        assert_eq!(CodecPreset::resolve(None).unwrap(), CodecPreset::Default);
        assert_eq!(CodecPreset::resolve(Some("")).unwrap(), CodecPreset::Default);
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        assert_eq!(CodecPreset::resolve(Some("AV1")).unwrap(), CodecPreset::Av1);
        assert_eq!(CodecPreset::resolve(Some("H264")).unwrap(), CodecPreset::H264);
    }

    #[test]
    fn test_resolve_rejects_unknown() {
        let err = CodecPreset::resolve(Some("theora")).unwrap_err();
        assert!(matches!(err, SfuError::UnsupportedCodec(name) if name == "theora"));
    }

    #[test]
    fn test_default_preset_defers_to_engine() {
        assert!(CodecPreset::Default.audio().is_none());
        assert!(CodecPreset::Default.video().is_none());
    }

    #[test]
    fn test_av1_payload_types() {
        let video = CodecPreset::Av1.video().unwrap();
        assert_eq!(video.codec.payload_type, 45);
        assert_eq!(video.rtx_payload_type, 46);
        assert_eq!(video.rtx_fmtp_line(), "apt=45");
        assert_eq!(CodecPreset::Av1.audio(), Some(OPUS));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for preset in [
            CodecPreset::Default,
            CodecPreset::Vp8,
            CodecPreset::Vp9,
            CodecPreset::H264,
            CodecPreset::Av1,
        ] {
            assert_eq!(preset.to_string().parse::<CodecPreset>().unwrap(), preset);
        }
    }
}
