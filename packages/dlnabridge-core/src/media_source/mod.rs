//! Upstream media library access.
//!
//! The [`MediaSource`] trait is the only way the ContentDirectory engine and
//! the streaming proxy see the remote library. [`HttpMediaSource`] talks to
//! the upstream server over its REST API; a fresh instance is built from the
//! current [`UpstreamConfig`] snapshot on every (re)start of the DLNA stack.

mod auth;
mod http;
#[cfg(test)]
pub(crate) mod memory;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::UpstreamConfig;
use crate::profiles::{MediaInfo, PlaybackMethod};

pub use auth::{AccessTokenProvider, StaticToken};
pub use http::HttpMediaSource;

/// Errors raised by the upstream media source.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// No access token, or the server rejected it.
    #[error("Not authorized by the media server")]
    Unauthorized,

    #[error("Not found upstream: {0}")]
    NotFound(String),

    #[error("Media server request timed out")]
    Timeout,

    /// Connection-level failure (refused, reset, DNS).
    #[error("Media server request failed: {0}")]
    Http(String),

    #[error("Media server returned HTTP {0}: {1}")]
    HttpStatus(u16, String),

    #[error("Malformed media server response: {0}")]
    Parse(String),

    #[error("No media server configured")]
    NotConfigured,
}

impl UpstreamError {
    /// Failures worth retrying: connection errors and 5xx. A timeout has
    /// already spent the request budget and is returned as is.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::HttpStatus(status, _) => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// What an upstream entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    MusicAlbum,
    MusicArtist,
    Audio,
    Video,
    Movie,
    Photo,
}

impl EntryKind {
    #[must_use]
    pub fn is_container(self) -> bool {
        matches!(self, Self::Folder | Self::MusicAlbum | Self::MusicArtist)
    }
}

/// A library entry as reported by the upstream server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    pub id: String,
    pub parent_id: Option<String>,
    pub title: String,
    pub kind: EntryKind,
    pub child_count: Option<u32>,
    /// Technical details of playable entries. Default for containers.
    pub media: MediaInfo,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub duration_ticks: Option<u64>,
}

/// How an item should be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub method: PlaybackMethod,
    /// Resume position for transcoded delivery.
    pub start_ticks: Option<u64>,
}

/// A resolved upstream URL plus what the client should be told about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackTarget {
    pub url: String,
    pub mime_type: String,
    /// Whether the upstream honours byte ranges on this URL.
    pub supports_range: bool,
}

/// The remote library the bridge exposes.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Children of a container; `None` lists the top-level library views.
    async fn list_children(&self, container_id: Option<&str>)
        -> Result<Vec<MediaEntry>, UpstreamError>;

    /// A single entry by id.
    async fn get_entry(&self, id: &str) -> Result<MediaEntry, UpstreamError>;

    /// URL the proxy should fetch to deliver `item` as requested.
    async fn resolve_playback_url(
        &self,
        item: &MediaEntry,
        request: &PlaybackRequest,
    ) -> Result<PlaybackTarget, UpstreamError>;

    async fn report_progress(
        &self,
        session_id: &str,
        item_id: &str,
        position_ticks: u64,
        is_paused: bool,
    ) -> Result<(), UpstreamError>;

    async fn report_stopped(
        &self,
        session_id: &str,
        item_id: &str,
        position_ticks: u64,
    ) -> Result<(), UpstreamError>;
}

/// Builds a media source from a configuration snapshot.
pub trait MediaSourceFactory: Send + Sync {
    fn create(&self, config: &UpstreamConfig) -> Result<Arc<dyn MediaSource>, UpstreamError>;
}

/// Factory producing [`HttpMediaSource`] instances.
pub struct HttpMediaSourceFactory {
    timeout: Duration,
}

impl HttpMediaSourceFactory {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl MediaSourceFactory for HttpMediaSourceFactory {
    fn create(&self, config: &UpstreamConfig) -> Result<Arc<dyn MediaSource>, UpstreamError> {
        let tokens = Arc::new(StaticToken::new(config.access_token.clone()));
        let source = HttpMediaSource::new(config.clone(), tokens, self.timeout)?;
        Ok(Arc::new(source))
    }
}

/// MIME type for an upstream container name (first alias wins).
#[must_use]
pub fn mime_for_container(kind: EntryKind, container: Option<&str>) -> String {
    let container = container
        .and_then(|c| c.split(',').next())
        .map(|c| c.trim().to_ascii_lowercase());
    let mime = match (kind, container.as_deref()) {
        (_, Some("mp3")) => "audio/mpeg",
        (_, Some("flac")) => "audio/flac",
        (EntryKind::Audio, Some("m4a" | "mp4" | "aac" | "alac")) => "audio/mp4",
        (_, Some("wav")) => "audio/wav",
        (_, Some("ogg" | "oga")) => "audio/ogg",
        (_, Some("opus")) => "audio/opus",
        (_, Some("wma" | "asf")) => "audio/x-ms-wma",
        (_, Some("mp4" | "m4v" | "mov")) => "video/mp4",
        (_, Some("mkv")) => "video/x-matroska",
        (_, Some("ts" | "m2ts" | "mpegts")) => "video/mp2t",
        (_, Some("avi")) => "video/x-msvideo",
        (_, Some("webm")) => "video/webm",
        (_, Some("wmv")) => "video/x-ms-wmv",
        (_, Some("jpg" | "jpeg")) => "image/jpeg",
        (_, Some("png")) => "image/png",
        (_, Some("gif")) => "image/gif",
        (EntryKind::Audio, _) => "audio/mpeg",
        (EntryKind::Photo, _) => "image/jpeg",
        _ => "video/mpeg",
    };
    mime.to_string()
}
