//! Virtual ContentDirectory objects.
//!
//! Nodes are derived from upstream entries per request and never stored
//! beyond the children cache.

use crate::media_source::{EntryKind, MediaEntry};
use crate::protocol_constants::DLNA_FLAGS;

// ─────────────────────────────────────────────────────────────────────────────
// UPnP classes
// ─────────────────────────────────────────────────────────────────────────────

pub const CLASS_STORAGE_FOLDER: &str = "object.container.storageFolder";
pub const CLASS_MUSIC_ALBUM: &str = "object.container.album.musicAlbum";
pub const CLASS_MUSIC_ARTIST: &str = "object.container.person.musicArtist";
pub const CLASS_MUSIC_TRACK: &str = "object.item.audioItem.musicTrack";
pub const CLASS_VIDEO: &str = "object.item.videoItem";
pub const CLASS_MOVIE: &str = "object.item.videoItem.movie";
pub const CLASS_PHOTO: &str = "object.item.imageItem.photo";

/// UPnP class for an upstream entry kind.
#[must_use]
pub fn upnp_class(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Folder => CLASS_STORAGE_FOLDER,
        EntryKind::MusicAlbum => CLASS_MUSIC_ALBUM,
        EntryKind::MusicArtist => CLASS_MUSIC_ARTIST,
        EntryKind::Audio => CLASS_MUSIC_TRACK,
        EntryKind::Video => CLASS_VIDEO,
        EntryKind::Movie => CLASS_MOVIE,
        EntryKind::Photo => CLASS_PHOTO,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DLNA protocolInfo
// ─────────────────────────────────────────────────────────────────────────────

/// Fourth protocolInfo field, also sent as `contentFeatures.dlna.org`.
///
/// Direct play advertises byte seeking (`OP=01`); transcoded streams are
/// flagged as converted content (`CI=1`) without seek support.
#[must_use]
pub fn dlna_features(direct: bool) -> String {
    let (op, ci) = if direct { ("01", "0") } else { ("00", "1") };
    format!(
        "DLNA.ORG_OP={};DLNA.ORG_CI={};DLNA.ORG_FLAGS={}",
        op, ci, DLNA_FLAGS
    )
}

#[must_use]
pub fn protocol_info(mime_type: &str, direct: bool) -> String {
    format!("http-get:*:{}:{}", mime_type, dlna_features(direct))
}

// ─────────────────────────────────────────────────────────────────────────────
// Nodes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNode {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub class: String,
    pub child_count: Option<u32>,
    pub restricted: bool,
    pub searchable: bool,
}

/// The `<res>` element of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub url: String,
    pub protocol_info: String,
    pub size: Option<u64>,
    pub duration_ticks: Option<u64>,
    pub resolution: Option<(u32, u32)>,
    pub bitrate: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemNode {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub class: String,
    pub mime_type: String,
    pub resource: Resource,
    pub restricted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Container(ContainerNode),
    Item(ItemNode),
}

impl Node {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Container(c) => &c.id,
            Self::Item(i) => &i.id,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Container(c) => &c.title,
            Self::Item(i) => &i.title,
        }
    }

    #[must_use]
    pub fn class(&self) -> &str {
        match self {
            Self::Container(c) => &c.class,
            Self::Item(i) => &i.class,
        }
    }

    #[must_use]
    pub fn parent_id(&self) -> &str {
        match self {
            Self::Container(c) => &c.parent_id,
            Self::Item(i) => &i.parent_id,
        }
    }
}

impl ContainerNode {
    /// Container for an upstream folder-like entry.
    #[must_use]
    pub fn from_entry(entry: &MediaEntry, parent_id: &str) -> Self {
        Self {
            id: entry.id.clone(),
            parent_id: parent_id.to_string(),
            title: entry.title.clone(),
            class: upnp_class(entry.kind).to_string(),
            child_count: entry.child_count,
            restricted: true,
            searchable: true,
        }
    }
}

impl ItemNode {
    /// Item for a playable entry.
    ///
    /// `mime_type` and `direct` describe how the stream endpoint will
    /// deliver it to the requesting profile.
    #[must_use]
    pub fn from_entry(
        entry: &MediaEntry,
        parent_id: &str,
        url: String,
        mime_type: String,
        direct: bool,
    ) -> Self {
        let resolution = entry.media.width.zip(entry.media.height);
        Self {
            id: entry.id.clone(),
            parent_id: parent_id.to_string(),
            title: entry.title.clone(),
            class: upnp_class(entry.kind).to_string(),
            resource: Resource {
                url,
                protocol_info: protocol_info(&mime_type, direct),
                // Transcoded size is unknown up front.
                size: if direct { entry.size } else { None },
                duration_ticks: entry.duration_ticks,
                resolution,
                bitrate: if direct { entry.media.bitrate } else { None },
            },
            mime_type,
            restricted: true,
        }
    }
}
