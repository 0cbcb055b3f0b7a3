//! Built-in device profiles for common renderers.

use super::model::{DeviceProfile, DirectPlayRule, MediaType, TranscodeProtocol, TranscodingRule};
use super::resolver::{MatchKind, ProfileRule};
use std::sync::Arc;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

fn audio_rule(containers: &[&str]) -> DirectPlayRule {
    DirectPlayRule {
        media_type: MediaType::Audio,
        containers: strings(containers),
        audio_codecs: Vec::new(),
        video_codecs: Vec::new(),
    }
}

fn video_rule(containers: &[&str], video: &[&str], audio: &[&str]) -> DirectPlayRule {
    DirectPlayRule {
        media_type: MediaType::Video,
        containers: strings(containers),
        audio_codecs: strings(audio),
        video_codecs: strings(video),
    }
}

fn photo_rule() -> DirectPlayRule {
    DirectPlayRule {
        media_type: MediaType::Photo,
        containers: strings(&["jpg", "jpeg", "png", "gif"]),
        audio_codecs: Vec::new(),
        video_codecs: Vec::new(),
    }
}

fn mp3_transcode() -> TranscodingRule {
    TranscodingRule {
        media_type: MediaType::Audio,
        container: "mp3".into(),
        audio_codec: "mp3".into(),
        video_codec: None,
        protocol: TranscodeProtocol::Http,
        mime_type: "audio/mpeg".into(),
    }
}

fn ts_transcode() -> TranscodingRule {
    TranscodingRule {
        media_type: MediaType::Video,
        container: "ts".into(),
        audio_codec: "aac".into(),
        video_codec: Some("h264".into()),
        protocol: TranscodeProtocol::Http,
        mime_type: "video/mp2t".into(),
    }
}

/// Profile for clients no rule recognises.
///
/// Plays the usual audio containers and H.264 video directly and transcodes
/// everything else to MP3 or MPEG-TS.
#[must_use]
pub fn baseline() -> DeviceProfile {
    DeviceProfile {
        name: "Generic DLNA Renderer".into(),
        max_streaming_bitrate: Some(40_000_000),
        max_static_bitrate: Some(100_000_000),
        max_width: None,
        max_height: None,
        direct_play: vec![
            audio_rule(&["mp3", "flac", "wav", "aac", "m4a", "ogg"]),
            video_rule(&["mp4", "m4v", "mkv", "ts"], &["h264"], &["aac", "mp3", "ac3"]),
            photo_rule(),
        ],
        transcoding: vec![mp3_transcode(), ts_transcode()],
    }
}

fn samsung() -> DeviceProfile {
    DeviceProfile {
        name: "Samsung Smart TV".into(),
        max_streaming_bitrate: Some(80_000_000),
        direct_play: vec![
            audio_rule(&["mp3", "flac", "wav", "aac", "m4a", "wma", "ogg"]),
            video_rule(
                &["mp4", "mkv", "ts", "avi", "mov"],
                &["h264", "hevc", "mpeg4", "mpeg2video"],
                &["aac", "ac3", "eac3", "mp3", "dts"],
            ),
            photo_rule(),
        ],
        ..baseline()
    }
}

fn lg_webos() -> DeviceProfile {
    DeviceProfile {
        name: "LG webOS TV".into(),
        max_streaming_bitrate: Some(80_000_000),
        direct_play: vec![
            audio_rule(&["mp3", "flac", "wav", "aac", "m4a", "ogg"]),
            video_rule(
                &["mp4", "mkv", "ts", "mov"],
                &["h264", "hevc", "vp9"],
                &["aac", "ac3", "eac3", "mp3"],
            ),
            photo_rule(),
        ],
        ..baseline()
    }
}

fn sony_bravia() -> DeviceProfile {
    DeviceProfile {
        name: "Sony Bravia".into(),
        max_streaming_bitrate: Some(60_000_000),
        direct_play: vec![
            audio_rule(&["mp3", "aac", "m4a", "wav", "flac"]),
            video_rule(&["mp4", "ts", "mkv"], &["h264", "hevc"], &["aac", "ac3", "mp3"]),
            photo_rule(),
        ],
        ..baseline()
    }
}

fn xbox() -> DeviceProfile {
    DeviceProfile {
        name: "Xbox".into(),
        max_streaming_bitrate: Some(40_000_000),
        max_width: Some(1920),
        max_height: Some(1080),
        direct_play: vec![
            audio_rule(&["mp3", "wma", "aac", "m4a"]),
            video_rule(&["mp4", "avi", "ts"], &["h264", "mpeg4"], &["aac", "mp3", "ac3"]),
            photo_rule(),
        ],
        ..baseline()
    }
}

fn media_player() -> DeviceProfile {
    DeviceProfile {
        name: "Desktop Media Player".into(),
        max_streaming_bitrate: None,
        max_static_bitrate: None,
        direct_play: vec![
            audio_rule(&[
                "mp3", "flac", "wav", "aac", "m4a", "ogg", "opus", "wma", "alac", "ape",
            ]),
            video_rule(
                &["mp4", "mkv", "ts", "avi", "mov", "webm", "wmv"],
                &[],
                &[],
            ),
            photo_rule(),
        ],
        ..baseline()
    }
}

/// Ordered rules for the built-in profiles, most specific first.
#[must_use]
pub fn builtin_rules() -> Vec<ProfileRule> {
    let samsung = Arc::new(samsung());
    let media_player = Arc::new(media_player());
    vec![
        ProfileRule::user_agent(MatchKind::Substring("SEC_HHP".into()), samsung.clone()),
        ProfileRule::user_agent(MatchKind::Substring("Samsung".into()), samsung),
        ProfileRule::user_agent(MatchKind::Substring("webOS".into()), Arc::new(lg_webos())),
        ProfileRule::new(
            "X-AV-Client-Info",
            MatchKind::Substring("BRAVIA".into()),
            Arc::new(sony_bravia()),
        ),
        ProfileRule::user_agent(MatchKind::Substring("Xbox".into()), Arc::new(xbox())),
        ProfileRule::user_agent(MatchKind::Substring("VLC".into()), media_player.clone()),
        ProfileRule::user_agent(MatchKind::Substring("Kodi".into()), media_player),
    ]
}
