//! Browse and Search over the upstream library.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::cache::ChildrenCache;
use super::didl::write_didl;
use super::node::{ContainerNode, ItemNode, Node, CLASS_STORAGE_FOLDER};
use super::search::SearchCriteria;
use crate::context::NetworkContext;
use crate::media_source::{mime_for_container, MediaEntry, MediaSource, UpstreamError};
use crate::profiles::{DeviceProfile, PlaybackMethod};
use crate::protocol_constants::{ROOT_OBJECT_ID, ROOT_PARENT_ID};
use crate::soap::SoapFault;
use crate::utils::now_millis;

/// `BrowseFlag` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseFlag {
    Metadata,
    DirectChildren,
}

impl FromStr for BrowseFlag {
    type Err = SoapFault;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "BrowseMetadata" => Ok(Self::Metadata),
            "BrowseDirectChildren" => Ok(Self::DirectChildren),
            other => Err(SoapFault::invalid_args(format!("BrowseFlag '{}'", other))),
        }
    }
}

/// Result of a Browse or Search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseResult {
    pub didl: String,
    pub number_returned: u32,
    pub total_matches: u32,
    pub update_id: u32,
}

/// The ContentDirectory service.
///
/// Holds no per-request state besides the listing cache; every call is a
/// function of its arguments, the requesting profile and the upstream.
pub struct ContentDirectory {
    source: Arc<dyn MediaSource>,
    cache: ChildrenCache,
    network: NetworkContext,
    root_title: String,
    update_id: u32,
}

impl ContentDirectory {
    pub fn new(
        source: Arc<dyn MediaSource>,
        network: NetworkContext,
        cache_ttl: Duration,
        root_title: impl Into<String>,
    ) -> Self {
        Self {
            source,
            cache: ChildrenCache::new(cache_ttl),
            network,
            root_title: root_title.into(),
            // Changes with every start so renderers drop stale listings.
            update_id: ((now_millis() / 1000) & u64::from(u32::MAX)) as u32,
        }
    }

    #[must_use]
    pub fn system_update_id(&self) -> u32 {
        self.update_id
    }

    /// Drops cached listings past their TTL.
    pub fn purge_cache(&self) {
        self.cache.purge_expired();
    }

    pub async fn browse(
        &self,
        object_id: &str,
        flag: BrowseFlag,
        starting_index: u32,
        requested_count: u32,
        profile: &DeviceProfile,
    ) -> Result<BrowseResult, SoapFault> {
        log::debug!(
            "[Browse] {} {:?} start={} count={} profile={}",
            object_id,
            flag,
            starting_index,
            requested_count,
            profile.name
        );
        match flag {
            BrowseFlag::Metadata => {
                let node = self.metadata_node(object_id, profile).await?;
                Ok(self.page(vec![node], 0, 0))
            }
            BrowseFlag::DirectChildren => {
                let nodes = self.child_nodes(object_id, profile).await?;
                Ok(self.page(nodes, starting_index, requested_count))
            }
        }
    }

    /// Searches the direct children of `container_id` by class.
    pub async fn search(
        &self,
        container_id: &str,
        criteria: &str,
        starting_index: u32,
        requested_count: u32,
        profile: &DeviceProfile,
    ) -> Result<BrowseResult, SoapFault> {
        let criteria = SearchCriteria::parse(criteria)?;
        let nodes: Vec<Node> = self
            .child_nodes(container_id, profile)
            .await?
            .into_iter()
            .filter(|n| criteria.matches_class(n.class()))
            .collect();
        log::debug!(
            "[Browse] Search in {} matched {} objects",
            container_id,
            nodes.len()
        );
        Ok(self.page(nodes, starting_index, requested_count))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn children(&self, container_id: &str) -> Result<Arc<Vec<MediaEntry>>, UpstreamError> {
        if let Some(cached) = self.cache.get(container_id) {
            return Ok(cached);
        }
        let upstream_id = (container_id != ROOT_OBJECT_ID).then_some(container_id);
        let entries = self.source.list_children(upstream_id).await?;
        Ok(self.cache.insert(container_id, entries))
    }

    async fn child_nodes(
        &self,
        container_id: &str,
        profile: &DeviceProfile,
    ) -> Result<Vec<Node>, SoapFault> {
        let entries = self.children(container_id).await.map_err(|e| {
            log::warn!("[Browse] Listing {} failed: {}", container_id, e);
            SoapFault::from(e)
        })?;
        Ok(entries
            .iter()
            .filter_map(|entry| self.to_node(entry, container_id, profile))
            .collect())
    }

    async fn metadata_node(&self, object_id: &str, profile: &DeviceProfile) -> Result<Node, SoapFault> {
        if object_id == ROOT_OBJECT_ID {
            let child_count = self.child_nodes(ROOT_OBJECT_ID, profile).await?.len() as u32;
            return Ok(Node::Container(ContainerNode {
                id: ROOT_OBJECT_ID.to_string(),
                parent_id: ROOT_PARENT_ID.to_string(),
                title: self.root_title.clone(),
                class: CLASS_STORAGE_FOLDER.to_string(),
                child_count: Some(child_count),
                restricted: true,
                searchable: true,
            }));
        }

        let entry = self.source.get_entry(object_id).await.map_err(|e| {
            log::warn!("[Browse] Metadata for {} failed: {}", object_id, e);
            SoapFault::from(e)
        })?;

        // Library views hang off the virtual root.
        let is_view = match self.children(ROOT_OBJECT_ID).await {
            Ok(views) => views.iter().any(|v| v.id == object_id),
            Err(_) => false,
        };
        let parent_id = if is_view {
            ROOT_OBJECT_ID.to_string()
        } else {
            entry
                .parent_id
                .clone()
                .unwrap_or_else(|| ROOT_OBJECT_ID.to_string())
        };

        self.to_node(&entry, &parent_id, profile)
            .ok_or_else(|| SoapFault::no_such_object(object_id))
    }

    /// Maps an entry to a node, or `None` when `profile` can't play it.
    fn to_node(&self, entry: &MediaEntry, parent_id: &str, profile: &DeviceProfile) -> Option<Node> {
        if entry.kind.is_container() {
            return Some(Node::Container(ContainerNode::from_entry(entry, parent_id)));
        }

        let Some(method) = profile.playback_method(&entry.media) else {
            log::debug!(
                "[Browse] Hiding {} ({:?}) from profile {}",
                entry.id,
                entry.media.container,
                profile.name
            );
            return None;
        };

        let (mime_type, direct) = match &method {
            PlaybackMethod::DirectPlay => (
                entry
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| mime_for_container(entry.kind, entry.media.container.as_deref())),
                true,
            ),
            PlaybackMethod::Transcode(rule) => (rule.mime_type.clone(), false),
        };

        Some(Node::Item(ItemNode::from_entry(
            entry,
            parent_id,
            self.network.stream_url(&entry.id),
            mime_type,
            direct,
        )))
    }

    /// Slices `[start, start + count)`; a count of 0 means all remaining.
    fn page(&self, nodes: Vec<Node>, start: u32, count: u32) -> BrowseResult {
        let total = nodes.len();
        let start = (start as usize).min(total);
        let end = if count == 0 {
            total
        } else {
            start.saturating_add(count as usize).min(total)
        };
        let slice = &nodes[start..end];
        BrowseResult {
            didl: write_didl(slice),
            number_returned: slice.len() as u32,
            total_matches: total as u32,
            update_id: self.update_id,
        }
    }
}
