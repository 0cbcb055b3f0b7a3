//! In-memory media source used by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    mime_for_container, EntryKind, MediaEntry, MediaSource, PlaybackRequest, PlaybackTarget,
    UpstreamError,
};
use crate::profiles::{MediaInfo, MediaType, PlaybackMethod};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub session_id: String,
    pub item_id: String,
    pub position_ticks: u64,
    pub is_paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub session_id: String,
    pub item_id: String,
    pub position_ticks: u64,
}

/// Flat list of entries linked by `parent_id`; `None` parents are root views.
#[derive(Default)]
pub struct MemoryMediaSource {
    entries: Mutex<Vec<MediaEntry>>,
    stream_base: String,
    failure: Mutex<Option<UpstreamError>>,
    pub progress: Mutex<Vec<ProgressReport>>,
    pub stopped: Mutex<Vec<StopReport>>,
}

impl MemoryMediaSource {
    pub fn new(stream_base: impl Into<String>) -> Self {
        Self {
            stream_base: stream_base.into(),
            ..Default::default()
        }
    }

    pub fn add(&self, entry: MediaEntry) {
        self.entries.lock().push(entry);
    }

    /// Makes every subsequent call fail with `err` (or succeed again with `None`).
    pub fn fail_with(&self, err: Option<UpstreamError>) {
        *self.failure.lock() = err;
    }

    fn check(&self) -> Result<(), UpstreamError> {
        match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn folder(id: &str, parent: Option<&str>, title: &str) -> MediaEntry {
        MediaEntry {
            id: id.into(),
            parent_id: parent.map(String::from),
            title: title.into(),
            kind: EntryKind::Folder,
            child_count: None,
            media: MediaInfo::default(),
            mime_type: None,
            size: None,
            duration_ticks: None,
        }
    }

    pub fn audio(id: &str, parent: &str, title: &str, container: &str) -> MediaEntry {
        MediaEntry {
            id: id.into(),
            parent_id: Some(parent.into()),
            title: title.into(),
            kind: EntryKind::Audio,
            child_count: None,
            media: MediaInfo {
                media_type: Some(MediaType::Audio),
                container: Some(container.into()),
                ..Default::default()
            },
            mime_type: Some(mime_for_container(EntryKind::Audio, Some(container))),
            size: Some(10_000),
            duration_ticks: Some(100 * crate::protocol_constants::TICKS_PER_SECOND),
        }
    }

    pub fn video(id: &str, parent: &str, title: &str, container: &str, codec: &str) -> MediaEntry {
        MediaEntry {
            id: id.into(),
            parent_id: Some(parent.into()),
            title: title.into(),
            kind: EntryKind::Video,
            child_count: None,
            media: MediaInfo {
                media_type: Some(MediaType::Video),
                container: Some(container.into()),
                video_codec: Some(codec.into()),
                audio_codec: Some("aac".into()),
                width: Some(1280),
                height: Some(720),
                ..Default::default()
            },
            mime_type: Some(mime_for_container(EntryKind::Video, Some(container))),
            size: Some(1_000_000),
            duration_ticks: Some(600 * crate::protocol_constants::TICKS_PER_SECOND),
        }
    }
}

#[async_trait]
impl MediaSource for MemoryMediaSource {
    async fn list_children(
        &self,
        container_id: Option<&str>,
    ) -> Result<Vec<MediaEntry>, UpstreamError> {
        self.check()?;
        let entries = self.entries.lock();
        if let Some(id) = container_id {
            if !entries.iter().any(|e| e.id == id && e.kind.is_container()) {
                return Err(UpstreamError::NotFound(id.to_string()));
            }
        }
        Ok(entries
            .iter()
            .filter(|e| e.parent_id.as_deref() == container_id)
            .cloned()
            .collect())
    }

    async fn get_entry(&self, id: &str) -> Result<MediaEntry, UpstreamError> {
        self.check()?;
        self.entries
            .lock()
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| UpstreamError::NotFound(id.to_string()))
    }

    async fn resolve_playback_url(
        &self,
        item: &MediaEntry,
        request: &PlaybackRequest,
    ) -> Result<PlaybackTarget, UpstreamError> {
        self.check()?;
        Ok(match &request.method {
            PlaybackMethod::DirectPlay => PlaybackTarget {
                url: format!("{}/media/{}", self.stream_base, item.id),
                mime_type: item.mime_type.clone().unwrap_or_default(),
                supports_range: true,
            },
            PlaybackMethod::Transcode(rule) => PlaybackTarget {
                url: format!(
                    "{}/transcode/{}.{}?start={}",
                    self.stream_base,
                    item.id,
                    rule.container,
                    request.start_ticks.unwrap_or(0)
                ),
                mime_type: rule.mime_type.clone(),
                supports_range: false,
            },
        })
    }

    async fn report_progress(
        &self,
        session_id: &str,
        item_id: &str,
        position_ticks: u64,
        is_paused: bool,
    ) -> Result<(), UpstreamError> {
        self.check()?;
        self.progress.lock().push(ProgressReport {
            session_id: session_id.into(),
            item_id: item_id.into(),
            position_ticks,
            is_paused,
        });
        Ok(())
    }

    async fn report_stopped(
        &self,
        session_id: &str,
        item_id: &str,
        position_ticks: u64,
    ) -> Result<(), UpstreamError> {
        self.check()?;
        self.stopped.lock().push(StopReport {
            session_id: session_id.into(),
            item_id: item_id.into(),
            position_ticks,
        });
        Ok(())
    }
}
