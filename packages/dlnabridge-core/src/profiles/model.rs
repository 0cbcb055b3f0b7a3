//! Capability profile types and playback-method evaluation.

use serde::{Deserialize, Serialize};

/// Broad media category used by direct-play and transcoding rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
    Photo,
}

/// Technical description of a playable item, as far as the upstream knows it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaInfo {
    pub media_type: Option<MediaType>,
    /// Upstream container, possibly a comma-separated alias list (`mov,mp4,m4a`).
    pub container: Option<String>,
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
    /// Overall bitrate in bits per second.
    pub bitrate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Formats a client plays unmodified.
///
/// An empty codec list accepts any codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectPlayRule {
    pub media_type: MediaType,
    pub containers: Vec<String>,
    #[serde(default)]
    pub audio_codecs: Vec<String>,
    #[serde(default)]
    pub video_codecs: Vec<String>,
}

/// Delivery protocol requested from the upstream transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeProtocol {
    /// Progressive HTTP stream.
    Http,
    /// HTTP Live Streaming segments.
    Hls,
}

/// Target format the upstream should produce for items the client cannot
/// play directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodingRule {
    pub media_type: MediaType,
    pub container: String,
    pub audio_codec: String,
    #[serde(default)]
    pub video_codec: Option<String>,
    pub protocol: TranscodeProtocol,
    /// MIME type announced for the transcoded stream.
    pub mime_type: String,
}

/// Outcome of evaluating an item against a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackMethod {
    DirectPlay,
    Transcode(TranscodingRule),
}

impl PlaybackMethod {
    #[must_use]
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::DirectPlay)
    }
}

/// Capability profile of a class of renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    /// Cap for streamed (video) direct play, bits per second.
    #[serde(default)]
    pub max_streaming_bitrate: Option<u64>,
    /// Cap for static (audio-only) direct play, bits per second.
    #[serde(default)]
    pub max_static_bitrate: Option<u64>,
    #[serde(default)]
    pub max_width: Option<u32>,
    #[serde(default)]
    pub max_height: Option<u32>,
    pub direct_play: Vec<DirectPlayRule>,
    pub transcoding: Vec<TranscodingRule>,
}

impl DeviceProfile {
    /// Decides how `media` would be delivered to this profile.
    ///
    /// Returns `None` when the item matches neither a direct-play nor a
    /// transcoding rule; such items are hidden from the client.
    #[must_use]
    pub fn playback_method(&self, media: &MediaInfo) -> Option<PlaybackMethod> {
        let media_type = media.media_type?;

        if self.within_caps(media_type, media)
            && self
                .direct_play
                .iter()
                .any(|rule| rule.media_type == media_type && rule.matches(media))
        {
            return Some(PlaybackMethod::DirectPlay);
        }

        self.transcoding
            .iter()
            .find(|rule| rule.media_type == media_type)
            .map(|rule| PlaybackMethod::Transcode(rule.clone()))
    }

    fn within_caps(&self, media_type: MediaType, media: &MediaInfo) -> bool {
        let cap = match media_type {
            MediaType::Audio => self.max_static_bitrate,
            MediaType::Video => self.max_streaming_bitrate,
            MediaType::Photo => None,
        };
        if let (Some(cap), Some(bitrate)) = (cap, media.bitrate) {
            if bitrate > cap {
                return false;
            }
        }
        if let (Some(max), Some(w)) = (self.max_width, media.width) {
            if w > max {
                return false;
            }
        }
        if let (Some(max), Some(h)) = (self.max_height, media.height) {
            if h > max {
                return false;
            }
        }
        true
    }
}

impl DirectPlayRule {
    fn matches(&self, media: &MediaInfo) -> bool {
        let Some(container) = media.container.as_deref() else {
            return false;
        };
        let container_ok = container
            .split(',')
            .map(str::trim)
            .any(|c| contains_ignore_case(&self.containers, c));

        container_ok
            && codec_ok(&self.audio_codecs, media.audio_codec.as_deref())
            && codec_ok(&self.video_codecs, media.video_codec.as_deref())
    }
}

fn codec_ok(allowed: &[String], codec: Option<&str>) -> bool {
    match codec {
        _ if allowed.is_empty() => true,
        Some(codec) => contains_ignore_case(allowed, codec),
        // Unknown codec with a restricted list: trust the container.
        None => true,
    }
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    list.iter().any(|v| v.eq_ignore_ascii_case(value))
}
