//! REST client for the upstream media server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::auth::AccessTokenProvider;
use super::retry::with_retry;
use super::{
    mime_for_container, EntryKind, MediaEntry, MediaSource, PlaybackRequest, PlaybackTarget,
    UpstreamError,
};
use crate::config::UpstreamConfig;
use crate::profiles::{MediaInfo, MediaType, PlaybackMethod, TranscodeProtocol};

const ITEM_FIELDS: &str = "MediaSources,ChildCount";

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<UpstreamItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpstreamItem {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(rename = "Type", default)]
    item_type: Option<String>,
    #[serde(default)]
    is_folder: Option<bool>,
    #[serde(default)]
    child_count: Option<u32>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    container: Option<String>,
    #[serde(default)]
    run_time_ticks: Option<u64>,
    #[serde(default)]
    media_sources: Vec<UpstreamMediaSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpstreamMediaSource {
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    container: Option<String>,
    #[serde(default)]
    bitrate: Option<u64>,
    #[serde(default)]
    media_streams: Vec<UpstreamMediaStream>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpstreamMediaStream {
    #[serde(rename = "Type", default)]
    stream_type: Option<String>,
    #[serde(default)]
    codec: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PlaybackReport<'a> {
    item_id: &'a str,
    play_session_id: &'a str,
    position_ticks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_paused: Option<bool>,
}

impl UpstreamItem {
    fn kind(&self) -> Option<EntryKind> {
        let kind = match self.item_type.as_deref() {
            Some("MusicAlbum") => EntryKind::MusicAlbum,
            Some("MusicArtist") => EntryKind::MusicArtist,
            Some("Audio") => EntryKind::Audio,
            Some("Movie") => EntryKind::Movie,
            Some("Episode" | "Video" | "MusicVideo" | "Trailer") => EntryKind::Video,
            Some("Photo") => EntryKind::Photo,
            _ if self.is_folder == Some(true) => EntryKind::Folder,
            _ => match self.media_type.as_deref() {
                Some("Audio") => EntryKind::Audio,
                Some("Video") => EntryKind::Video,
                Some("Photo") => EntryKind::Photo,
                _ => return None,
            },
        };
        Some(kind)
    }

    fn into_entry(self) -> Option<MediaEntry> {
        let Some(kind) = self.kind() else {
            log::debug!(
                "[Upstream] Skipping {} of unsupported type {:?}",
                self.id,
                self.item_type
            );
            return None;
        };

        let source = self.media_sources.into_iter().next();
        let mut media = MediaInfo::default();
        let mut size = None;
        if !kind.is_container() {
            media.media_type = Some(match kind {
                EntryKind::Audio => MediaType::Audio,
                EntryKind::Photo => MediaType::Photo,
                _ => MediaType::Video,
            });
            media.container = self.container.clone();
            if let Some(source) = source {
                size = source.size;
                media.bitrate = source.bitrate;
                if source.container.is_some() {
                    media.container = source.container;
                }
                for stream in source.media_streams {
                    match stream.stream_type.as_deref() {
                        Some("Audio") if media.audio_codec.is_none() => {
                            media.audio_codec = stream.codec;
                        }
                        Some("Video") if media.video_codec.is_none() => {
                            media.video_codec = stream.codec;
                            media.width = stream.width;
                            media.height = stream.height;
                        }
                        _ => {}
                    }
                }
            }
        }

        let mime_type =
            (!kind.is_container()).then(|| mime_for_container(kind, media.container.as_deref()));

        Some(MediaEntry {
            title: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            parent_id: self.parent_id,
            kind,
            child_count: self.child_count,
            media,
            mime_type,
            size,
            duration_ticks: self.run_time_ticks,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// [`MediaSource`] backed by the upstream server's REST API.
pub struct HttpMediaSource {
    client: Client,
    base_url: Url,
    user_id: String,
    tokens: Arc<dyn AccessTokenProvider>,
    timeout: Duration,
}

impl HttpMediaSource {
    /// Creates a client for `config`. Every request is bounded by `timeout`.
    pub fn new(
        config: UpstreamConfig,
        tokens: Arc<dyn AccessTokenProvider>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let base = format!("{}/", config.server_url.trim_end_matches('/'));
        let base_url = Url::parse(&base)
            .map_err(|e| UpstreamError::Parse(format!("server url '{}': {}", base, e)))?;
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            user_id: config.user_id,
            tokens,
            timeout,
        })
    }

    fn token(&self) -> Result<String, UpstreamError> {
        self.tokens
            .access_token()
            .ok_or(UpstreamError::Unauthorized)
    }

    fn auth_header(token: &str) -> String {
        format!("MediaBrowser Token=\"{}\"", token)
    }

    /// Appends `segments` to the server URL, each percent-encoded as a
    /// single path segment.
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                UpstreamError::Parse(format!("server url '{}' has no path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let token = self.token()?;
        let url = self.url(segments, query)?;
        let what = segments.join("/");
        with_retry(&what, self.timeout, || async {
            let response = self
                .client
                .get(url.clone())
                .header("Authorization", Self::auth_header(&token))
                .send()
                .await?;
            let response = check_status(response, &what).await?;
            response
                .json::<T>()
                .await
                .map_err(|e| UpstreamError::Parse(e.to_string()))
        })
        .await
    }

    async fn post_report(
        &self,
        segments: &[&str],
        report: &PlaybackReport<'_>,
    ) -> Result<(), UpstreamError> {
        let token = self.token()?;
        let url = self.url(segments, &[])?;
        let path = segments.join("/");
        let response = self
            .client
            .post(url)
            .header("Authorization", Self::auth_header(&token))
            .json(report)
            .send()
            .await?;
        check_status(response, &path).await?;
        Ok(())
    }
}

/// Upstream ids are opaque alphanumeric tokens (GUIDs without dashes on
/// most servers). Anything else never names an item and is not sent.
fn item_segment(id: &str) -> Result<&str, UpstreamError> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(id)
    } else {
        log::debug!("[Upstream] Rejecting malformed item id {:?}", id);
        Err(UpstreamError::NotFound(id.to_string()))
    }
}

async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(UpstreamError::Unauthorized),
        StatusCode::NOT_FOUND => Err(UpstreamError::NotFound(what.to_string())),
        _ => {
            let body = response.text().await.unwrap_or_default();
            log::debug!("[Upstream] {} returned {}: {}", what, status, body);
            let reason = status.canonical_reason().unwrap_or("error").to_string();
            Err(UpstreamError::HttpStatus(status.as_u16(), reason))
        }
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn list_children(
        &self,
        container_id: Option<&str>,
    ) -> Result<Vec<MediaEntry>, UpstreamError> {
        let response: ItemsResponse = match container_id {
            None => {
                self.get_json(&["UserViews"], &[("userId", self.user_id.as_str())])
                    .await?
            }
            Some(parent) => {
                self.get_json(
                    &["Items"],
                    &[
                        ("ParentId", parent),
                        ("UserId", self.user_id.as_str()),
                        ("Fields", ITEM_FIELDS),
                    ],
                )
                .await?
            }
        };
        let entries: Vec<MediaEntry> = response
            .items
            .into_iter()
            .filter_map(UpstreamItem::into_entry)
            .collect();
        log::debug!(
            "[Upstream] Listed {} children of {}",
            entries.len(),
            container_id.unwrap_or("<root>")
        );
        Ok(entries)
    }

    async fn get_entry(&self, id: &str) -> Result<MediaEntry, UpstreamError> {
        let segment = item_segment(id)?;
        let item: UpstreamItem = self
            .get_json(&["Items", segment], &[("userId", self.user_id.as_str()), ("Fields", ITEM_FIELDS)])
            .await
            .map_err(|e| match e {
                UpstreamError::NotFound(_) => UpstreamError::NotFound(id.to_string()),
                other => other,
            })?;
        item.into_entry()
            .ok_or_else(|| UpstreamError::NotFound(id.to_string()))
    }

    async fn resolve_playback_url(
        &self,
        item: &MediaEntry,
        request: &PlaybackRequest,
    ) -> Result<PlaybackTarget, UpstreamError> {
        let token = self.token()?;
        let id = item_segment(&item.id)?;
        let collection = match item.media.media_type {
            Some(MediaType::Audio) => "Audio",
            _ => "Videos",
        };

        match &request.method {
            PlaybackMethod::DirectPlay => {
                let url = self.url(
                    &[collection, id, "stream"],
                    &[("static", "true"), ("api_key", token.as_str())],
                )?;
                Ok(PlaybackTarget {
                    url: url.to_string(),
                    mime_type: item
                        .mime_type
                        .clone()
                        .unwrap_or_else(|| mime_for_container(item.kind, None)),
                    supports_range: true,
                })
            }
            PlaybackMethod::Transcode(rule) => {
                let file = match rule.protocol {
                    TranscodeProtocol::Http => format!("stream.{}", rule.container),
                    TranscodeProtocol::Hls => "master.m3u8".to_string(),
                };
                let start = request.start_ticks.map(|t| t.to_string());
                let mut query: Vec<(&str, &str)> = vec![
                    ("api_key", token.as_str()),
                    ("Container", rule.container.as_str()),
                    ("AudioCodec", rule.audio_codec.as_str()),
                ];
                if let Some(video) = rule.video_codec.as_deref() {
                    query.push(("VideoCodec", video));
                }
                if let Some(start) = start.as_deref() {
                    query.push(("StartTimeTicks", start));
                }
                let url = self.url(&[collection, id, file.as_str()], &query)?;
                Ok(PlaybackTarget {
                    url: url.to_string(),
                    mime_type: rule.mime_type.clone(),
                    supports_range: false,
                })
            }
        }
    }

    async fn report_progress(
        &self,
        session_id: &str,
        item_id: &str,
        position_ticks: u64,
        is_paused: bool,
    ) -> Result<(), UpstreamError> {
        let report = PlaybackReport {
            item_id,
            play_session_id: session_id,
            position_ticks,
            is_paused: Some(is_paused),
        };
        self.post_report(&["Sessions", "Playing", "Progress"], &report).await
    }

    async fn report_stopped(
        &self,
        session_id: &str,
        item_id: &str,
        position_ticks: u64,
    ) -> Result<(), UpstreamError> {
        let report = PlaybackReport {
            item_id,
            play_session_id: session_id,
            position_ticks,
            is_paused: None,
        };
        self.post_report(&["Sessions", "Playing", "Stopped"], &report).await
    }
}
